//! Model-checking harness.
//!
//! Mirrors a container built from [`account_specs`] in plain collections and
//! checks after every operation that each layer agrees with the model.

use crate::fixtures::{account_specs, layer_orders, test_config, Account, ARRIVAL};
use crate::generators::ContainerOp;
use layerdb_core::{CoreError, MultiIndexContainer, NodeId};
use std::collections::{BTreeMap, HashMap};

/// A container paired with the model it must agree with.
pub struct ModelHarness {
    /// The container under test.
    pub accounts: MultiIndexContainer<Account>,
    model: BTreeMap<u64, Account>,
    nodes: HashMap<u64, NodeId>,
    arrival: Vec<u64>,
    position: Vec<u64>,
    /// When each account last took its balance; orders equal balances.
    joined: HashMap<u64, u64>,
    clock: u64,
}

impl ModelHarness {
    /// Wraps an empty container.
    ///
    /// # Panics
    ///
    /// Panics if the container is not empty.
    pub fn new(accounts: MultiIndexContainer<Account>) -> Self {
        assert!(accounts.is_empty(), "harness needs an empty container");
        Self {
            accounts,
            model: BTreeMap::new(),
            nodes: HashMap::new(),
            arrival: Vec::new(),
            position: Vec::new(),
            joined: HashMap::new(),
            clock: 0,
        }
    }

    /// Wraps a fresh memory-only container.
    pub fn in_memory() -> Self {
        let accounts = MultiIndexContainer::new(account_specs(), test_config())
            .expect("Failed to build container");
        Self::new(accounts)
    }

    /// Returns the number of tracked accounts.
    pub fn tracked_count(&self) -> usize {
        self.model.len()
    }

    /// Tracked accounts in id order.
    pub fn tracked(&self) -> impl Iterator<Item = &Account> + '_ {
        self.model.values()
    }

    /// Releases the container.
    pub fn into_container(self) -> MultiIndexContainer<Account> {
        self.accounts
    }

    /// Applies `op` to both the container and the model.
    ///
    /// Returns true if the container accepted the operation. Panics when the
    /// container's answer differs from what the model predicts.
    pub fn apply(&mut self, op: &ContainerOp) -> bool {
        match op {
            ContainerOp::Insert(account) => self.insert(account.clone()),
            ContainerOp::Modify {
                pick,
                owner,
                balance,
            } => match self.pick(*pick) {
                Some(id) => self.modify(id, owner, *balance),
                None => false,
            },
            ContainerOp::Erase { pick } => match self.pick(*pick) {
                Some(id) => {
                    self.erase(id);
                    true
                }
                None => false,
            },
            ContainerOp::Relocate { pick, front } => match self.pick(*pick) {
                Some(id) => {
                    self.relocate(id, *front);
                    true
                }
                None => false,
            },
        }
    }

    /// Applies every operation, checking the container after each one.
    pub fn run(&mut self, ops: &[ContainerOp]) {
        for op in ops {
            self.apply(op);
            self.check();
        }
    }

    /// Asserts that the container matches the model.
    pub fn check(&self) {
        self.accounts.verify().expect("container invariant violated");
        assert_eq!(self.accounts.len(), self.model.len());
        for (id, account) in &self.model {
            let node = self.nodes[id];
            assert_eq!(self.accounts.get(node), Some(account));
        }

        let orders = layer_orders(&self.accounts);
        let ids: Vec<u64> = self.model.keys().copied().collect();
        assert_eq!(orders.by_id, ids);

        let mut by_owner: Vec<&Account> = self.model.values().collect();
        by_owner.sort_by(|a, b| a.owner.cmp(&b.owner));
        let by_owner: Vec<u64> = by_owner.iter().map(|a| a.id).collect();
        assert_eq!(orders.by_owner, by_owner);

        let mut by_balance: Vec<&Account> = self.model.values().collect();
        by_balance.sort_by_key(|a| (a.balance, self.joined[&a.id]));
        let by_balance: Vec<u64> = by_balance.iter().map(|a| a.id).collect();
        assert_eq!(orders.by_balance, by_balance);

        assert_eq!(orders.arrival, self.arrival);
        assert_eq!(orders.position, self.position);
    }

    fn pick(&self, pick: usize) -> Option<u64> {
        if self.arrival.is_empty() {
            return None;
        }
        Some(self.arrival[pick % self.arrival.len()])
    }

    fn owner_taken(&self, owner: &str, except: Option<u64>) -> bool {
        self.model
            .values()
            .any(|a| a.owner == owner && Some(a.id) != except)
    }

    fn insert(&mut self, account: Account) -> bool {
        let expected = if self.model.contains_key(&account.id) {
            Some("by_id")
        } else if self.owner_taken(&account.owner, None) {
            Some("by_owner")
        } else {
            None
        };
        match (self.accounts.insert(account.clone()), expected) {
            (Ok(node), None) => {
                self.nodes.insert(account.id, node);
                self.arrival.push(account.id);
                self.position.push(account.id);
                self.join(account.id);
                self.model.insert(account.id, account);
                true
            }
            (Err(CoreError::Conflict { layer, .. }), Some(refusing)) => {
                assert_eq!(layer, refusing);
                false
            }
            (result, expected) => {
                panic!("insert {account:?}: got {result:?}, expected conflict {expected:?}")
            }
        }
    }

    fn modify(&mut self, id: u64, owner: &str, balance: i64) -> bool {
        let node = self.nodes[&id];
        let taken = self.owner_taken(owner, Some(id));
        let result = self.accounts.modify(node, |a| {
            a.owner = owner.to_string();
            a.balance = balance;
        });
        match (result, taken) {
            (Ok(()), false) => {
                let account = self.model.get_mut(&id).expect("tracked account");
                account.owner = owner.to_string();
                if account.balance != balance {
                    account.balance = balance;
                    self.join(id);
                }
                true
            }
            (Err(CoreError::Conflict { layer, .. }), true) => {
                assert_eq!(layer, "by_owner");
                assert_eq!(self.accounts.get(node), self.model.get(&id));
                false
            }
            (result, taken) => {
                panic!("modify {id} to owner {owner}: got {result:?}, owner taken: {taken}")
            }
        }
    }

    fn join(&mut self, id: u64) {
        self.joined.insert(id, self.clock);
        self.clock += 1;
    }

    fn erase(&mut self, id: u64) {
        let node = self.nodes.remove(&id).expect("tracked node");
        let erased = self.accounts.erase(node).expect("Failed to erase account");
        assert_eq!(Some(erased), self.model.remove(&id));
        self.arrival.retain(|x| *x != id);
        self.position.retain(|x| *x != id);
        self.joined.remove(&id);
    }

    fn relocate(&mut self, id: u64, front: bool) {
        let node = self.nodes[&id];
        self.arrival.retain(|x| *x != id);
        if front {
            self.accounts
                .relocate_to_front(ARRIVAL, node)
                .expect("Failed to relocate");
            self.arrival.insert(0, id);
        } else {
            self.accounts
                .relocate_to_back(ARRIVAL, node)
                .expect("Failed to relocate");
            self.arrival.push(id);
        }
    }
}
