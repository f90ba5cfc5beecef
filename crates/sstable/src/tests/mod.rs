use std::sync::Arc;

use crate::*;

mod block_tests;

fn bytewise() -> Arc<dyn Comparator> {
    Arc::new(BytewiseComparator)
}

/// `count` sorted entries: `key00000 -> value0`, `key00001 -> value1`, ...
fn sample_entries(count: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..count)
        .map(|i| {
            (
                format!("key{:05}", i).into_bytes(),
                format!("value{}", i).into_bytes(),
            )
        })
        .collect()
}

/// Serializes `entries` into a block image.
fn build_block(entries: &[(Vec<u8>, Vec<u8>)], restart_interval: usize) -> Vec<u8> {
    let mut builder = BlockBuilder::new(restart_interval, bytewise());
    for (k, v) in entries {
        builder.add(k, v);
    }
    builder.finish().to_vec()
}

/// Drains `iter` front to back from `seek_to_first`.
fn collect_forward<I: InternalIterator + ?Sized>(iter: &mut I) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    iter.seek_to_first();
    while iter.valid() {
        out.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.next();
    }
    out
}

/// Drains `iter` back to front from `seek_to_last`.
fn collect_backward<I: InternalIterator + ?Sized>(iter: &mut I) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    iter.seek_to_last();
    while iter.valid() {
        out.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.prev();
    }
    out
}
