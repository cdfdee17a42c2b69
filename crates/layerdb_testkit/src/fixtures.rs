//! Test fixtures and store helpers.
//!
//! Provides a sample record type, the layer lists used across the test
//! suite, and stores that clean up after themselves.

use layerdb_core::{
    ContainerConfig, HashedIndex, IndexSpecifierList, MultiIndexContainer, NodeId, OrderedIndex,
    RandomAccessIndex, SequencedIndex,
};
use layerdb_kv::{KvEngine, LogEngine, LogOptions, MemoryEngine};
use layerdb_storage::InMemoryBackend;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Sample record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account number.
    pub id: u64,
    /// Unique owner name.
    pub owner: String,
    /// Balance; several accounts may share one.
    pub balance: i64,
}

impl Account {
    /// Creates an account.
    pub fn new(id: u64, owner: impl Into<String>, balance: i64) -> Self {
        Self {
            id,
            owner: owner.into(),
            balance,
        }
    }
}

/// Hashed layer on `id`.
pub type ById = HashedIndex<Account, u64>;
/// Ordered layer on `owner`.
pub type ByOwner = OrderedIndex<Account, String>;
/// Ordered layer on `balance`.
pub type ByBalance = OrderedIndex<Account, i64>;

/// Position of the `by_id` layer in [`account_specs`].
pub const BY_ID: usize = 0;
/// Position of the `by_owner` layer in [`account_specs`].
pub const BY_OWNER: usize = 1;
/// Position of the `by_balance` layer in [`account_specs`].
pub const BY_BALANCE: usize = 2;
/// Position of the `arrival` layer in [`account_specs`].
pub const ARRIVAL: usize = 3;
/// Position of the `position` layer in [`account_specs`].
pub const POSITION: usize = 4;

/// One layer of every kind.
pub fn account_specs() -> IndexSpecifierList<Account> {
    IndexSpecifierList::new()
        .hashed_unique("by_id", |a: &Account| a.id)
        .ordered_unique("by_owner", |a: &Account| a.owner.clone())
        .ordered_non_unique("by_balance", |a: &Account| a.balance)
        .sequenced("arrival")
        .random_access("position")
}

/// A single unique ordered layer on `owner`.
pub fn owner_specs() -> IndexSpecifierList<Account> {
    IndexSpecifierList::new().ordered_unique("by_owner", |a: &Account| a.owner.clone())
}

/// Configuration shared by the fixtures.
pub fn test_config() -> ContainerConfig {
    ContainerConfig::new().name("accounts")
}

/// Opens a memory engine holding every column family of `specs`.
pub fn memory_engine(specs: &IndexSpecifierList<Account>) -> Arc<MemoryEngine> {
    let descs = specs.column_descriptors(&test_config());
    Arc::new(MemoryEngine::open(&descs).expect("Failed to open memory engine"))
}

/// A persistent container over a fresh memory engine.
pub fn memory_container() -> (Arc<MemoryEngine>, MultiIndexContainer<Account>) {
    let engine = memory_engine(&account_specs());
    let container = MultiIndexContainer::open(engine.clone(), account_specs(), test_config())
        .expect("Failed to open container");
    (engine, container)
}

/// A log engine over a shared in-memory buffer, reopenable without touching
/// the filesystem.
#[derive(Debug, Default)]
pub struct MemoryLog {
    backend: InMemoryBackend,
}

impl MemoryLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replays the log into a new engine.
    pub fn engine(&self) -> Arc<LogEngine> {
        let descs = account_specs().column_descriptors(&test_config());
        let engine = LogEngine::open(
            Box::new(self.backend.share()),
            &descs,
            LogOptions::new().sync_on_write(false),
        )
        .expect("Failed to open log engine");
        Arc::new(engine)
    }

    /// Opens the account container on a fresh replay of the log.
    pub fn open(&self) -> MultiIndexContainer<Account> {
        MultiIndexContainer::open(self.engine(), account_specs(), test_config())
            .expect("Failed to open container")
    }

    /// Current log bytes.
    pub fn bytes(&self) -> Vec<u8> {
        self.backend.data()
    }
}

/// A store directory with automatic cleanup.
pub struct TestStore {
    dir: TempDir,
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TestStore {
    /// Creates an empty store directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Opens the directory's engine with the column families of `specs`.
    ///
    /// Only one engine may be open at a time; drop containers before
    /// opening again.
    pub fn engine(&self, specs: &IndexSpecifierList<Account>) -> Arc<LogEngine> {
        let descs = specs.column_descriptors(&test_config());
        let engine = LogEngine::open_dir(self.path(), &descs, LogOptions::new().sync_on_write(false))
            .expect("Failed to open store directory");
        Arc::new(engine)
    }

    /// Opens the account container.
    pub fn open(&self) -> MultiIndexContainer<Account> {
        MultiIndexContainer::open(self.engine(&account_specs()), account_specs(), test_config())
            .expect("Failed to open container")
    }
}

/// Every layer's order, as account ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerOrders {
    /// Ids in `by_id`, sorted (hash order is unspecified).
    pub by_id: Vec<u64>,
    /// Ids in owner order.
    pub by_owner: Vec<u64>,
    /// Ids in balance order.
    pub by_balance: Vec<u64>,
    /// Ids in arrival order.
    pub arrival: Vec<u64>,
    /// Ids in position order.
    pub position: Vec<u64>,
}

/// Reads every layer of a container built from [`account_specs`].
pub fn layer_orders(accounts: &MultiIndexContainer<Account>) -> LayerOrders {
    let ids = |nodes: Vec<NodeId>| -> Vec<u64> {
        nodes
            .into_iter()
            .map(|node| accounts.get(node).expect("layer holds a dead node").id)
            .collect()
    };
    let layer = |pos: usize| accounts.layer_names()[pos].to_string();
    let by_id = accounts.index::<ById>(BY_ID).expect("by_id layer");
    let by_owner = accounts.index::<ByOwner>(BY_OWNER).expect("by_owner layer");
    let by_balance = accounts.index::<ByBalance>(BY_BALANCE).expect("by_balance layer");
    let arrival = accounts
        .index::<SequencedIndex>(ARRIVAL)
        .unwrap_or_else(|_| panic!("{} is not sequenced", layer(ARRIVAL)));
    let position = accounts
        .index::<RandomAccessIndex>(POSITION)
        .unwrap_or_else(|_| panic!("{} is not random access", layer(POSITION)));

    let mut by_id = ids(by_id.iter().collect());
    by_id.sort_unstable();
    LayerOrders {
        by_id,
        by_owner: ids(by_owner.iter().collect()),
        by_balance: ids(by_balance.iter().collect()),
        arrival: ids(arrival.iter().collect()),
        position: ids(position.iter().collect()),
    }
}

/// Every entry of every column family, by name.
pub fn persisted_columns(engine: &dyn KvEngine) -> Vec<(String, Vec<(Vec<u8>, Vec<u8>)>)> {
    engine
        .column_family_names()
        .into_iter()
        .map(|name| {
            let cf = engine.column_family(&name).expect("listed column family");
            let entries = engine.scan(&cf).expect("Failed to scan column family");
            (name, entries)
        })
        .collect()
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Owner name for the `i`-th generated account.
    pub fn owner(i: u64) -> String {
        format!("owner-{i:04}")
    }

    /// Inserts `count` accounts with distinct ids and owners and a handful
    /// of shared balances.
    pub fn populate(accounts: &mut MultiIndexContainer<Account>, count: u64) {
        for i in 0..count {
            let balance = (i % 5) as i64 * 100;
            accounts
                .insert(Account::new(i, owner(i), balance))
                .expect("Failed to insert account");
        }
    }

    /// A memory-only container with `count` accounts.
    pub fn populated(count: u64) -> MultiIndexContainer<Account> {
        let mut accounts = MultiIndexContainer::new(account_specs(), test_config())
            .expect("Failed to build container");
        populate(&mut accounts, count);
        accounts
    }
}
