//! The per-table filter block.
//!
//! Data block offsets are bucketed into ranges of `1 << base_lg` bytes and
//! every bucket gets one filter built from the keys of all data blocks that
//! start inside it. Buckets with no blocks still get an empty entry so the
//! reader can map `offset >> base_lg` straight to a filter index.
//!
//! ```text
//! [filter 0][filter 1]...[filter N-1]
//! [offset of filter 0: u32 LE]...[offset of filter N-1: u32 LE]
//! [offset of the offset array: u32 LE]
//! [base_lg: u8]
//! ```

use std::sync::Arc;

use bloom::FilterPolicy;
use config::DEFAULT_FILTER_BASE_LG;
use tracing::warn;

use crate::block::BlockContents;
use crate::coding::{decode_fixed32, put_fixed32};

/// Trailer size: offset-array start (u32) + base_lg (u8).
const TRAILER_BYTES: usize = 5;

/// Accumulates keys while a table is written and emits its filter block.
///
/// The sequence of calls must match `(start_block add_key*)* finish`.
pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    base_lg: u8,
    /// Flattened key contents.
    keys: Vec<u8>,
    /// Starting index in `keys` of each key.
    start: Vec<usize>,
    /// Filter data computed so far.
    result: Vec<u8>,
    filter_offsets: Vec<u32>,
    finished: bool,
}

impl FilterBlockBuilder {
    /// A builder using the default 2 KiB bucket size.
    pub fn new(policy: Arc<dyn FilterPolicy>) -> Self {
        Self::with_base_lg(policy, DEFAULT_FILTER_BASE_LG)
    }

    /// A builder generating one filter per `1 << base_lg` bytes of data
    /// block offsets.
    ///
    /// # Panics
    ///
    /// Panics if `base_lg >= 32`.
    pub fn with_base_lg(policy: Arc<dyn FilterPolicy>, base_lg: u8) -> Self {
        assert!(base_lg < 32, "base_lg must be < 32");
        Self {
            policy,
            base_lg,
            keys: Vec::new(),
            start: Vec::new(),
            result: Vec::new(),
            filter_offsets: Vec::new(),
            finished: false,
        }
    }

    /// Announces that the next keys belong to a data block starting at
    /// `block_offset`.
    ///
    /// REQUIRES: offsets passed in successive calls never decrease.
    pub fn start_block(&mut self, block_offset: u64) {
        debug_assert!(!self.finished, "start_block() after finish()");
        let filter_index = (block_offset >> self.base_lg) as usize;
        debug_assert!(
            filter_index >= self.filter_offsets.len(),
            "block offsets must not decrease"
        );
        while filter_index > self.filter_offsets.len() {
            self.generate_filter();
        }
    }

    pub fn add_key(&mut self, key: &[u8]) {
        debug_assert!(!self.finished, "add_key() after finish()");
        self.start.push(self.keys.len());
        self.keys.extend_from_slice(key);
    }

    /// Flushes pending keys and returns the serialized filter block.
    ///
    /// The returned slice borrows the builder's buffer.
    pub fn finish(&mut self) -> &[u8] {
        debug_assert!(!self.finished, "finish() called twice");
        if !self.start.is_empty() {
            self.generate_filter();
        }

        // Append array of per-filter offsets
        let array_offset = self.result.len() as u32;
        for &offset in &self.filter_offsets {
            put_fixed32(&mut self.result, offset);
        }

        put_fixed32(&mut self.result, array_offset);
        self.result.push(self.base_lg);
        self.finished = true;
        &self.result
    }

    fn generate_filter(&mut self) {
        self.filter_offsets.push(self.result.len() as u32);
        if self.start.is_empty() {
            // Fast path if there are no keys for this filter
            return;
        }

        // Make list of keys from flattened key structure
        self.start.push(self.keys.len());
        let tmp_keys: Vec<&[u8]> = self
            .start
            .windows(2)
            .map(|w| &self.keys[w[0]..w[1]])
            .collect();

        self.policy.create_filter(&tmp_keys, &mut self.result);

        self.keys.clear();
        self.start.clear();
    }
}

/// Answers "may `key` be in the data block at `block_offset`" against a
/// serialized filter block.
///
/// Malformed contents never fail construction; the reader degrades to
/// matching everything instead, trading the filter's benefit for
/// correctness.
pub struct FilterBlockReader<'a> {
    policy: Arc<dyn FilterPolicy>,
    contents: BlockContents<'a>,
    /// Offset of the per-filter offset array; filter data is `[0, offset)`.
    offset: usize,
    /// Number of entries in the offset array.
    num: usize,
    base_lg: u8,
}

impl<'a> FilterBlockReader<'a> {
    pub fn new(policy: Arc<dyn FilterPolicy>, contents: BlockContents<'a>) -> Self {
        let mut reader = Self {
            policy,
            contents,
            offset: 0,
            num: 0,
            base_lg: 0,
        };

        let n = reader.contents.len();
        if n < TRAILER_BYTES {
            warn!(len = n, "filter block too short, filtering disabled");
            return reader;
        }

        let base_lg = reader.contents[n - 1];
        let last_word = decode_fixed32(&reader.contents[n - TRAILER_BYTES..]) as usize;
        if last_word > n - TRAILER_BYTES {
            warn!(
                len = n,
                array_offset = last_word,
                "filter offset array out of bounds, filtering disabled"
            );
            return reader;
        }
        if base_lg >= 64 {
            warn!(base_lg, "filter base_lg out of range, filtering disabled");
            return reader;
        }

        reader.base_lg = base_lg;
        reader.offset = last_word;
        reader.num = (n - TRAILER_BYTES - last_word) / 4;
        reader
    }

    /// Returns `false` only if `key` is certainly absent from the data block
    /// starting at `block_offset`.
    pub fn key_may_match(&self, block_offset: u64, key: &[u8]) -> bool {
        let index = (block_offset >> self.base_lg) as usize;
        if index < self.num {
            let data = self.contents.as_slice();
            let entry = self.offset + index * 4;
            let start = decode_fixed32(&data[entry..]) as usize;
            // For the last filter this reads the array offset itself.
            let limit = decode_fixed32(&data[entry + 4..]) as usize;
            if start <= limit && limit <= self.offset {
                if start == limit {
                    // Empty filters do not match any keys
                    return false;
                }
                return self.policy.key_may_match(key, &data[start..limit]);
            }
        }
        // Errors are treated as potential matches
        true
    }

    /// Number of filters in the block; `0` when degraded.
    #[must_use]
    pub fn num_filters(&self) -> usize {
        self.num
    }

    #[must_use]
    pub fn base_lg(&self) -> u8 {
        self.base_lg
    }
}
