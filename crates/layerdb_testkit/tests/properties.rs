//! Container properties checked against random operation sequences.

use layerdb_core::{CoreError, MultiIndexContainer, NEXT_ID_KEY};
use layerdb_testkit::prelude::*;
use proptest::prelude::*;

fn run_persistent(log: &MemoryLog, ops: &[ContainerOp]) -> LayerOrders {
    let mut harness = ModelHarness::new(log.open());
    harness.run(ops);
    layer_orders(&harness.accounts)
}

fn open_with(log: &MemoryLog, snapshot: &[u8]) -> Result<MultiIndexContainer<Account>, CoreError> {
    MultiIndexContainer::open_with_snapshot(
        log.engine(),
        account_specs(),
        test_config(),
        &mut &snapshot[..],
    )
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn memory_container_matches_model(ops in op_sequence_strategy(1, 60)) {
        let mut harness = ModelHarness::in_memory();
        harness.run(&ops);
    }

    #[test]
    fn reopen_restores_every_layer(ops in op_sequence_strategy(1, 60)) {
        let log = MemoryLog::new();
        let before = run_persistent(&log, &ops);

        let reopened = log.open();
        reopened.verify().unwrap();
        prop_assert_eq!(layer_orders(&reopened), before);
    }

    #[test]
    fn snapshot_restores_exact_order(ops in op_sequence_strategy(1, 60)) {
        let log = MemoryLog::new();
        let mut harness = ModelHarness::new(log.open());
        harness.run(&ops);
        let expected = layer_orders(&harness.accounts);
        let mut snapshot = Vec::new();
        harness.accounts.save_snapshot(&mut snapshot).unwrap();
        drop(harness);

        let restored = open_with(&log, &snapshot).unwrap();
        prop_assert_eq!(layer_orders(&restored), expected.clone());
        prop_assert_eq!(layer_orders(&log.open()), expected);
    }

    #[test]
    fn snapshot_never_disagrees_with_a_later_store(
        ops in op_sequence_strategy(1, 40),
        later in op_sequence_strategy(1, 10),
    ) {
        let log = MemoryLog::new();
        let mut harness = ModelHarness::new(log.open());
        harness.run(&ops);
        let mut snapshot = Vec::new();
        harness.accounts.save_snapshot(&mut snapshot).unwrap();
        harness.run(&later);
        let current = layer_orders(&harness.accounts);
        drop(harness);

        // Accepted only if it still describes the store exactly.
        match open_with(&log, &snapshot) {
            Ok(restored) => {
                prop_assert_eq!(layer_orders(&restored), current.clone());
            }
            Err(err) => {
                prop_assert!(matches!(err, CoreError::InvalidFormat { .. }), "{}", err);
            }
        }
        prop_assert_eq!(layer_orders(&log.open()), current);
    }

    #[test]
    fn clone_is_independent(ops in op_sequence_strategy(1, 40), extra in account_strategy()) {
        let mut harness = ModelHarness::in_memory();
        harness.run(&ops);
        let source = layer_orders(&harness.accounts);

        let mut clone = harness.accounts.try_clone().unwrap();
        prop_assert_eq!(layer_orders(&clone), source.clone());
        let _ = clone.insert(extra);
        let first = clone.iter().next().map(|(node, _)| node);
        if let Some(node) = first {
            clone.erase(node).unwrap();
        }
        prop_assert_eq!(layer_orders(&harness.accounts), source);
        harness.check();
    }
}

#[test]
fn refused_insert_writes_nothing() {
    let (engine, mut accounts) = memory_container();
    scenarios::populate(&mut accounts, 5);
    let before = persisted_columns(engine.as_ref());

    // Fresh id, taken owner: by_id accepts, by_owner refuses.
    let err = accounts
        .insert(Account::new(99, scenarios::owner(2), 0))
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict { ref layer, .. } if layer == "by_owner"));
    assert_eq!(persisted_columns(engine.as_ref()), before);
    assert_eq!(accounts.len(), 5);
    accounts.verify().unwrap();
}

#[test]
fn refused_modify_writes_nothing() {
    let (engine, mut accounts) = memory_container();
    scenarios::populate(&mut accounts, 5);
    let before = persisted_columns(engine.as_ref());
    let node = accounts
        .index::<ById>(BY_ID)
        .unwrap()
        .find(&3)
        .unwrap();

    let err = accounts
        .modify(node, |a| {
            a.balance = 1;
            a.owner = scenarios::owner(4);
        })
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(accounts.get(node), Some(&Account::new(3, scenarios::owner(3), 300)));
    assert_eq!(persisted_columns(engine.as_ref()), before);
}

#[test]
fn erasing_everything_leaves_only_the_id_counter() {
    let (engine, mut accounts) = memory_container();
    scenarios::populate(&mut accounts, 8);
    let nodes: Vec<_> = accounts.iter().map(|(node, _)| node).collect();
    for node in nodes {
        accounts.erase(node).unwrap();
    }
    assert!(accounts.is_empty());

    for (name, entries) in persisted_columns(engine.as_ref()) {
        if name == test_config().name {
            let keys: Vec<&[u8]> = entries.iter().map(|(k, _)| k.as_slice()).collect();
            assert_eq!(keys, vec![NEXT_ID_KEY]);
        } else {
            assert!(entries.is_empty(), "{name} still holds entries");
        }
    }
}

#[test]
fn clear_then_reopen_is_empty() {
    let log = MemoryLog::new();
    {
        let mut accounts = log.open();
        scenarios::populate(&mut accounts, 6);
        accounts.clear().unwrap();
        accounts.insert(Account::new(42, "late", 7)).unwrap();
    }
    let accounts = log.open();
    assert_eq!(accounts.len(), 1);
    let orders = layer_orders(&accounts);
    assert_eq!(orders.arrival, vec![42]);
    assert_eq!(orders.position, vec![42]);
}

#[test]
fn directory_store_survives_reopen() {
    let store = TestStore::new();
    let expected = {
        let mut harness = ModelHarness::new(store.open());
        harness.run(&[
            ContainerOp::Insert(Account::new(1, "a", 100)),
            ContainerOp::Insert(Account::new(2, "b", 0)),
            ContainerOp::Insert(Account::new(3, "c", 100)),
            ContainerOp::Relocate {
                pick: 2,
                front: true,
            },
            ContainerOp::Modify {
                pick: 1,
                owner: "d".into(),
                balance: -100,
            },
        ]);
        layer_orders(&harness.accounts)
    };
    let accounts = store.open();
    assert_eq!(layer_orders(&accounts), expected);
    assert_eq!(expected.arrival, vec![3, 1, 2]);
}

#[test]
fn equal_balances_reopen_in_join_order() {
    let log = MemoryLog::new();
    let expected = run_persistent(
        &log,
        &[
            ContainerOp::Insert(Account::new(1, "x", 10)),
            ContainerOp::Insert(Account::new(2, "y", 20)),
            ContainerOp::Modify {
                pick: 0,
                owner: "x".into(),
                balance: 20,
            },
        ],
    );
    assert_eq!(expected.by_balance, vec![2, 1]);
    assert_eq!(layer_orders(&log.open()), expected);
}

#[test]
fn relocating_after_a_stale_snapshot_keeps_the_store_usable() {
    let log = MemoryLog::new();
    let mut snapshot = Vec::new();
    {
        let mut accounts = log.open();
        scenarios::populate(&mut accounts, 3);
        accounts.save_snapshot(&mut snapshot).unwrap();
        let last = accounts.index::<ById>(BY_ID).unwrap().find(&2).unwrap();
        accounts.relocate_to_front(ARRIVAL, last).unwrap();
    }

    let err = open_with(&log, &snapshot).unwrap_err();
    assert!(matches!(err, CoreError::InvalidFormat { .. }));

    let mut accounts = log.open();
    let by_id = |accounts: &MultiIndexContainer<Account>, id: u64| {
        accounts.index::<ById>(BY_ID).unwrap().find(&id).unwrap()
    };
    let first = by_id(&accounts, 0);
    accounts.relocate_to_back(ARRIVAL, first).unwrap();
    let last = by_id(&accounts, 2);
    accounts.relocate_to_back(ARRIVAL, last).unwrap();
    drop(accounts);

    assert_eq!(layer_orders(&log.open()).arrival, vec![1, 0, 2]);
}
