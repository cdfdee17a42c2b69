//! Container operation benchmarks.

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use layerdb_bench::utils::generate_accounts;
use layerdb_core::{ContainerConfig, MultiIndexContainer};
use layerdb_kv::MemoryEngine;
use layerdb_testkit::{account_specs, memory_engine, test_config, Account, ByOwner, BY_OWNER};
use std::sync::Arc;

fn populated(accounts: &[Account]) -> MultiIndexContainer<Account> {
    let mut container = MultiIndexContainer::new(account_specs(), test_config()).unwrap();
    for account in accounts {
        container.insert(account.clone()).unwrap();
    }
    container
}

fn persistent(config: ContainerConfig) -> (Arc<MemoryEngine>, MultiIndexContainer<Account>) {
    let engine = memory_engine(&account_specs());
    let container = MultiIndexContainer::open(engine.clone(), account_specs(), config).unwrap();
    (engine, container)
}

/// Benchmark inserts into every layer.
fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for count in [100u64, 1000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count));
        let accounts = generate_accounts(*count, 16);

        group.bench_with_input(BenchmarkId::new("memory", count), &accounts, |b, accounts| {
            b.iter_batched(
                || MultiIndexContainer::new(account_specs(), test_config()).unwrap(),
                |mut container| {
                    for account in accounts {
                        container.insert(black_box(account.clone())).unwrap();
                    }
                    container
                },
                BatchSize::LargeInput,
            );
        });

        group.bench_with_input(
            BenchmarkId::new("persistent_batched", count),
            &accounts,
            |b, accounts| {
                b.iter_batched(
                    || persistent(test_config().auto_flush(false)),
                    |(engine, mut container)| {
                        for account in accounts {
                            container.insert(black_box(account.clone())).unwrap();
                        }
                        container.flush().unwrap();
                        (engine, container)
                    },
                    BatchSize::LargeInput,
                );
            },
        );
    }
    group.finish();
}

/// Benchmark a single persisted insert, flushed on its own.
fn bench_insert_autoflush(c: &mut Criterion) {
    let accounts = generate_accounts(1000, 16);
    c.bench_function("insert_autoflush", |b| {
        b.iter_batched(
            || persistent(test_config()),
            |(engine, mut container)| {
                for account in &accounts[..100] {
                    container.insert(black_box(account.clone())).unwrap();
                }
                (engine, container)
            },
            BatchSize::LargeInput,
        );
    });
}

/// Benchmark key lookups on the ordered layer.
fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("find");

    for count in [1000u64, 10_000].iter() {
        let accounts = generate_accounts(*count, 16);
        let container = populated(&accounts);
        let owners: Vec<String> = accounts.iter().map(|a| a.owner.clone()).collect();

        group.bench_with_input(BenchmarkId::new("by_owner", count), &owners, |b, owners| {
            let index = container.index::<ByOwner>(BY_OWNER).unwrap();
            let mut i = 0;
            b.iter(|| {
                let node = index.find(black_box(&owners[i % owners.len()]));
                i += 1;
                black_box(node);
            });
        });
    }
    group.finish();
}

/// Benchmark modifications that re-key two layers.
fn bench_modify(c: &mut Criterion) {
    let accounts = generate_accounts(1000, 16);
    let mut container = populated(&accounts);
    let nodes: Vec<_> = container.iter().map(|(node, _)| node).collect();

    c.bench_function("modify_rekey", |b| {
        let mut round = 0i64;
        b.iter(|| {
            round += 1;
            for (i, node) in nodes.iter().enumerate().take(100) {
                container
                    .modify(*node, |a| {
                        a.owner = format!("owner-{i:08}-{round}");
                        a.balance = round;
                    })
                    .unwrap();
            }
        });
    });
}

/// Benchmark erasing every record.
fn bench_erase(c: &mut Criterion) {
    let accounts = generate_accounts(1000, 16);
    c.bench_function("erase_all", |b| {
        b.iter_batched(
            || populated(&accounts),
            |mut container| {
                let nodes: Vec<_> = container.iter().map(|(node, _)| node).collect();
                for node in nodes {
                    black_box(container.erase(node).unwrap());
                }
                container
            },
            BatchSize::LargeInput,
        );
    });
}

/// Benchmark deep copies.
fn bench_clone(c: &mut Criterion) {
    let mut group = c.benchmark_group("clone");

    for count in [1000u64, 10_000].iter() {
        group.throughput(Throughput::Elements(*count));
        let container = populated(&generate_accounts(*count, 16));
        group.bench_with_input(BenchmarkId::from_parameter(count), &container, |b, container| {
            b.iter(|| black_box(container.try_clone().unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_insert_autoflush,
    bench_find,
    bench_modify,
    bench_erase,
    bench_clone,
);

criterion_main!(benches);
