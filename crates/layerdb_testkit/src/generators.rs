//! Property-based test generators using proptest.
//!
//! Ids and owners are drawn from small domains so that generated operation
//! sequences regularly hit unique-key conflicts.

use crate::fixtures::Account;
use proptest::prelude::*;

/// Strategy for account ids, small enough to collide.
pub fn account_id_strategy() -> impl Strategy<Value = u64> {
    0u64..32
}

/// Strategy for owner names, small enough to collide.
pub fn owner_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-e]{1,2}").expect("Invalid regex")
}

/// Strategy for balances with plenty of duplicates.
pub fn balance_strategy() -> impl Strategy<Value = i64> {
    (-3i64..=3).prop_map(|b| b * 100)
}

/// Strategy for whole accounts.
pub fn account_strategy() -> impl Strategy<Value = Account> {
    (account_id_strategy(), owner_strategy(), balance_strategy())
        .prop_map(|(id, owner, balance)| Account::new(id, owner, balance))
}

/// One container mutation.
///
/// `pick` selects a live record by arrival position, modulo the current
/// size, so every generated sequence stays applicable.
#[derive(Debug, Clone)]
pub enum ContainerOp {
    /// Insert an account.
    Insert(Account),
    /// Change the owner and balance of a live account.
    Modify {
        /// Which live account.
        pick: usize,
        /// New owner.
        owner: String,
        /// New balance.
        balance: i64,
    },
    /// Erase a live account.
    Erase {
        /// Which live account.
        pick: usize,
    },
    /// Move a live account to one end of the arrival layer.
    Relocate {
        /// Which live account.
        pick: usize,
        /// Front when true, back otherwise.
        front: bool,
    },
}

/// Strategy for a single mutation.
pub fn container_op_strategy() -> impl Strategy<Value = ContainerOp> {
    prop_oneof![
        4 => account_strategy().prop_map(ContainerOp::Insert),
        2 => (any::<usize>(), owner_strategy(), balance_strategy())
            .prop_map(|(pick, owner, balance)| ContainerOp::Modify { pick, owner, balance }),
        1 => any::<usize>().prop_map(|pick| ContainerOp::Erase { pick }),
        1 => (any::<usize>(), any::<bool>())
            .prop_map(|(pick, front)| ContainerOp::Relocate { pick, front }),
    ]
}

/// Strategy for a sequence of mutations.
pub fn op_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<ContainerOp>> {
    prop::collection::vec(container_op_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn owners_are_short_lowercase(owner in owner_strategy()) {
            prop_assert!(!owner.is_empty() && owner.len() <= 2);
            prop_assert!(owner.chars().all(|c| ('a'..='e').contains(&c)));
        }

        #[test]
        fn balances_are_whole_hundreds(balance in balance_strategy()) {
            prop_assert_eq!(balance % 100, 0);
            prop_assert!((-300..=300).contains(&balance));
        }

        #[test]
        fn sequences_respect_bounds(ops in op_sequence_strategy(2, 10)) {
            prop_assert!(ops.len() >= 2 && ops.len() < 10);
        }
    }
}
