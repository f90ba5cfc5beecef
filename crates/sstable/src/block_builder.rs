use std::cmp::Ordering;
use std::sync::Arc;

use crate::coding::{put_fixed32, put_varint32};
use crate::comparator::Comparator;

/// Builds the byte image of one [`Block`](crate::Block).
///
/// Keys must be added in strictly increasing comparator order. Every
/// `restart_interval` keys the full key is stored and its offset recorded in
/// the restart array; the keys in between store only the suffix that differs
/// from the previous key.
pub struct BlockBuilder {
    comparator: Arc<dyn Comparator>,
    restart_interval: usize,
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    /// Entries emitted since the last restart.
    counter: usize,
    finished: bool,
    last_key: Vec<u8>,
}

impl BlockBuilder {
    /// # Panics
    ///
    /// Panics if `restart_interval` is 0.
    pub fn new(restart_interval: usize, comparator: Arc<dyn Comparator>) -> Self {
        assert!(restart_interval >= 1, "restart_interval must be >= 1");
        Self {
            comparator,
            restart_interval,
            buffer: Vec::new(),
            restarts: vec![0],
            counter: 0,
            finished: false,
            last_key: Vec::new(),
        }
    }

    /// Clears the builder so it can produce another block.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.finished = false;
        self.last_key.clear();
    }

    /// Appends an entry.
    ///
    /// REQUIRES: `finish()` has not been called since the last `reset()`, and
    /// `key` is greater than every previously added key.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        debug_assert!(!self.finished, "add() after finish()");
        debug_assert!(self.counter <= self.restart_interval);
        debug_assert!(
            self.buffer.is_empty()
                || self.comparator.compare(key, &self.last_key) == Ordering::Greater,
            "keys must be added in increasing order"
        );

        let mut shared = 0;
        if self.counter < self.restart_interval {
            shared = self
                .last_key
                .iter()
                .zip(key.iter())
                .take_while(|(a, b)| a == b)
                .count();
        } else {
            // Restart compression
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
        }
        let non_shared = key.len() - shared;

        put_varint32(&mut self.buffer, shared as u32);
        put_varint32(&mut self.buffer, non_shared as u32);
        put_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        debug_assert_eq!(self.last_key.as_slice(), key);
        self.counter += 1;
    }

    /// Appends the restart array and returns the finished block.
    ///
    /// The slice stays valid until the builder is reset or dropped.
    pub fn finish(&mut self) -> &[u8] {
        debug_assert!(!self.finished, "finish() called twice");
        for &restart in &self.restarts {
            put_fixed32(&mut self.buffer, restart);
        }
        put_fixed32(&mut self.buffer, self.restarts.len() as u32);
        self.finished = true;
        &self.buffer
    }

    /// Size the block would have if finished now.
    #[must_use]
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    /// Returns `true` if no entries have been added since the last reset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The last key added.
    #[must_use]
    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }
}
