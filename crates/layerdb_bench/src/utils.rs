//! Benchmark utilities.

use layerdb_kv::{ColumnDescriptor, ColumnHandle, WriteBatch};
use layerdb_testkit::Account;

/// Generate `count` accounts with distinct ids and owners.
///
/// Balances cycle through `distinct_balances` values so the non-unique
/// layer sees realistic bucket sizes.
pub fn generate_accounts(count: u64, distinct_balances: u64) -> Vec<Account> {
    let distinct = distinct_balances.max(1);
    (0..count)
        .map(|i| Account::new(i, format!("owner-{i:08}"), (i % distinct) as i64))
        .collect()
}

/// Deterministic filler bytes of the given size.
pub fn filler(size: usize, seed: u8) -> Vec<u8> {
    (0..size).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect()
}

/// Descriptors for `count` column families named `cf0`, `cf1`, ...
pub fn column_descriptors(count: usize) -> Vec<ColumnDescriptor> {
    (0..count).map(|i| ColumnDescriptor::new(format!("cf{i}"))).collect()
}

/// A batch of `ops` puts spread over `columns`.
pub fn put_batch(columns: &[ColumnHandle], ops: usize, value_size: usize) -> WriteBatch {
    let mut batch = WriteBatch::new();
    for i in 0..ops {
        let cf = &columns[i % columns.len()];
        batch.put(cf, (i as u64).to_be_bytes().to_vec(), filler(value_size, i as u8));
    }
    batch
}
