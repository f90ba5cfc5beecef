//! Immutable sorted blocks with prefix-delta compressed keys.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ entry 0 (restart)                                            │
//! │ entry 1 ... entry N                                          │
//! │                                                              │
//! │ entry: shared (varint32) | non_shared (varint32)             │
//! │        value_len (varint32) | key[shared..] | value          │
//! ├──────────────────────────────────────────────────────────────┤
//! │ restart[0] (u32 LE) ... restart[R-1] (u32 LE)                │
//! │ num_restarts R (u32 LE)                                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entry pointed at by a restart offset stores its full key
//! (`shared == 0`), which lets [`BlockIter::seek`] binary-search the restart
//! array before scanning forward.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use tracing::warn;

use crate::coding::{decode_fixed32, get_varint32};
use crate::comparator::Comparator;
use crate::error::{Error, Result};
use crate::iterator::InternalIterator;

/// Width of one restart array slot and of the trailing restart count.
const U32_SIZE: usize = std::mem::size_of::<u32>();

/// Raw block bytes together with who owns them.
///
/// Decided once when the block is loaded: a block read off disk owns its
/// buffer, a block viewed inside a caller's buffer (a builder's output, a
/// memory-mapped file) borrows it for `'a`.
pub enum BlockContents<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a [u8]),
}

impl BlockContents<'_> {
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            BlockContents::Owned(v) => v,
            BlockContents::Borrowed(s) => s,
        }
    }

    /// Returns `true` if dropping these contents frees the buffer.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        matches!(self, BlockContents::Owned(_))
    }
}

impl Deref for BlockContents<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Vec<u8>> for BlockContents<'static> {
    fn from(v: Vec<u8>) -> Self {
        BlockContents::Owned(v)
    }
}

impl<'a> From<&'a [u8]> for BlockContents<'a> {
    fn from(s: &'a [u8]) -> Self {
        BlockContents::Borrowed(s)
    }
}

impl fmt::Debug for BlockContents<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockContents")
            .field("owned", &self.is_owned())
            .field("len", &self.len())
            .finish()
    }
}

/// A read-only view of one block.
///
/// Blocks are shared between iterators through an [`Arc`]; any number of
/// [`BlockIter`]s may walk the same block concurrently.
pub struct Block<'a> {
    contents: BlockContents<'a>,
    /// Offset in `contents` of the restart array.
    restart_offset: usize,
    num_restarts: u32,
}

impl<'a> Block<'a> {
    /// Parses the restart trailer of `contents`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corruption`] if the buffer cannot hold the restart
    /// count, or if the declared restart array would not fit in the buffer.
    pub fn new(contents: BlockContents<'a>) -> Result<Self> {
        let size = contents.len();
        if size < U32_SIZE {
            return Err(Error::corruption(format!(
                "block too small: {} bytes, need at least {}",
                size, U32_SIZE
            )));
        }

        let num_restarts = decode_fixed32(&contents[size - U32_SIZE..]);
        let max_restarts_allowed = (size - U32_SIZE) / U32_SIZE;
        if num_restarts as usize > max_restarts_allowed {
            return Err(Error::corruption(format!(
                "block restart count {} exceeds maximum {} for {} bytes",
                num_restarts, max_restarts_allowed, size
            )));
        }

        let restart_offset = size - (1 + num_restarts as usize) * U32_SIZE;
        Ok(Self {
            contents,
            restart_offset,
            num_restarts,
        })
    }

    /// Total size of the block in bytes, restart trailer included.
    #[must_use]
    pub fn size(&self) -> usize {
        self.contents.len()
    }

    #[must_use]
    pub fn num_restarts(&self) -> u32 {
        self.num_restarts
    }

    #[must_use]
    pub fn contents(&self) -> &BlockContents<'a> {
        &self.contents
    }

    /// Returns a new unpositioned cursor over this block.
    pub fn iter(self: &Arc<Self>, comparator: Arc<dyn Comparator>) -> BlockIter<'a> {
        BlockIter::new(Arc::clone(self), comparator)
    }

    fn data(&self) -> &[u8] {
        self.contents.as_slice()
    }

    /// REQUIRES: `index < num_restarts`.
    fn restart_point(&self, index: u32) -> usize {
        debug_assert!(index < self.num_restarts);
        let pos = self.restart_offset + index as usize * U32_SIZE;
        decode_fixed32(&self.data()[pos..pos + U32_SIZE]) as usize
    }
}

impl fmt::Debug for Block<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("size", &self.size())
            .field("restart_offset", &self.restart_offset)
            .field("num_restarts", &self.num_restarts)
            .field("owned", &self.contents.is_owned())
            .finish()
    }
}

/// Decoded header of one entry.
struct EntryHeader {
    shared: usize,
    non_shared: usize,
    value_len: usize,
    /// Offset of the unshared key bytes.
    key_offset: usize,
}

/// Decodes the entry header at `p`, refusing to read at or beyond `limit`.
///
/// Returns `None` if the header is malformed or the key/value bytes it
/// declares would run past `limit`.
fn decode_entry(data: &[u8], p: usize, limit: usize) -> Option<EntryHeader> {
    if p >= limit || limit - p < 3 {
        return None;
    }

    let (shared, non_shared, value_len, header_len) =
        if data[p] < 0x80 && data[p + 1] < 0x80 && data[p + 2] < 0x80 {
            // Fast path: all three lengths fit in one byte each.
            (data[p] as usize, data[p + 1] as usize, data[p + 2] as usize, 3)
        } else {
            let (shared, n1) = get_varint32(&data[p..limit])?;
            let (non_shared, n2) = get_varint32(&data[p + n1..limit])?;
            let (value_len, n3) = get_varint32(&data[p + n1 + n2..limit])?;
            (
                shared as usize,
                non_shared as usize,
                value_len as usize,
                n1 + n2 + n3,
            )
        };

    let key_offset = p + header_len;
    if limit - key_offset < non_shared + value_len {
        return None;
    }

    Some(EntryHeader {
        shared,
        non_shared,
        value_len,
        key_offset,
    })
}

/// Stateful cursor over a [`Block`].
///
/// Keys are materialized into an owned buffer by replaying prefix sharing
/// from the nearest restart point; values are borrowed from the block.
///
/// `next` is a single entry decode. `prev` has no backward delta chain to
/// follow, so it jumps back to the restart point before the current entry
/// and replays forward.
pub struct BlockIter<'a> {
    block: Arc<Block<'a>>,
    comparator: Arc<dyn Comparator>,
    /// Offset of the restart array; entries live in `[0, restarts)`.
    restarts: usize,
    num_restarts: u32,

    /// Offset of the current entry. `current >= restarts` means invalid.
    current: usize,
    /// Index of the restart block containing `current`.
    restart_index: u32,
    key: Vec<u8>,
    value_offset: usize,
    value_len: usize,
    status: Option<Error>,
}

impl<'a> BlockIter<'a> {
    pub fn new(block: Arc<Block<'a>>, comparator: Arc<dyn Comparator>) -> Self {
        let restarts = block.restart_offset;
        let num_restarts = block.num_restarts;
        Self {
            block,
            comparator,
            restarts,
            num_restarts,
            current: restarts,
            restart_index: num_restarts,
            key: Vec::new(),
            value_offset: 0,
            value_len: 0,
            status: None,
        }
    }

    fn next_entry_offset(&self) -> usize {
        self.value_offset + self.value_len
    }

    fn mark_exhausted(&mut self) {
        self.current = self.restarts;
        self.restart_index = self.num_restarts;
    }

    /// Returns `false`, with a corruption status, if the restart offset
    /// points outside the entry region.
    fn seek_to_restart_point(&mut self, index: u32) -> bool {
        let offset = self.block.restart_point(index);
        // Only an empty block may point its restart at the restart array.
        if offset > self.restarts || (offset == self.restarts && offset != 0) {
            self.corruption_error();
            return false;
        }
        self.key.clear();
        self.restart_index = index;
        // parse_next_key() starts at the end of the current value, so point
        // an empty value at the restart offset.
        self.value_offset = offset;
        self.value_len = 0;
        true
    }

    fn corruption_error(&mut self) {
        self.mark_exhausted();
        self.key.clear();
        self.value_offset = 0;
        self.value_len = 0;
        if self.status.is_none() {
            warn!(
                block_size = self.block.size(),
                num_restarts = self.num_restarts,
                "bad entry in block"
            );
            self.status = Some(Error::corruption("bad entry in block"));
        }
    }

    /// Decodes the entry following the current one.
    ///
    /// Returns `false` at end of block or on corruption.
    fn parse_next_key(&mut self) -> bool {
        self.current = self.next_entry_offset();
        if self.current >= self.restarts {
            self.mark_exhausted();
            return false;
        }

        let header = match decode_entry(self.block.data(), self.current, self.restarts) {
            Some(h) if h.shared <= self.key.len() => h,
            _ => {
                self.corruption_error();
                return false;
            }
        };

        let data = self.block.data();
        self.key.truncate(header.shared);
        self.key
            .extend_from_slice(&data[header.key_offset..header.key_offset + header.non_shared]);
        self.value_offset = header.key_offset + header.non_shared;
        self.value_len = header.value_len;

        while self.restart_index + 1 < self.num_restarts
            && self.block.restart_point(self.restart_index + 1) < self.current
        {
            self.restart_index += 1;
        }
        true
    }
}

impl InternalIterator for BlockIter<'_> {
    fn valid(&self) -> bool {
        self.current < self.restarts
    }

    fn seek_to_first(&mut self) {
        if self.num_restarts == 0 {
            self.mark_exhausted();
            return;
        }
        if self.seek_to_restart_point(0) {
            self.parse_next_key();
        }
    }

    fn seek_to_last(&mut self) {
        if self.num_restarts == 0 {
            self.mark_exhausted();
            return;
        }
        if !self.seek_to_restart_point(self.num_restarts - 1) {
            return;
        }
        while self.parse_next_key() && self.next_entry_offset() < self.restarts {
            // Keep skipping
        }
    }

    fn seek(&mut self, target: &[u8]) {
        if self.num_restarts == 0 {
            self.mark_exhausted();
            return;
        }

        // Binary search for the last restart point with a key < target.
        let mut left = 0u32;
        let mut right = self.num_restarts - 1;
        let mut current_key_compare = Ordering::Equal;

        if self.valid() {
            // Already positioned: use the current entry to narrow the range.
            current_key_compare = self.comparator.compare(&self.key, target);
            match current_key_compare {
                Ordering::Less => left = self.restart_index,
                Ordering::Greater => right = self.restart_index,
                Ordering::Equal => return,
            }
        }

        while left < right {
            let mid = (left + right + 1) / 2;
            let region_offset = self.block.restart_point(mid);
            let data = self.block.data();
            let ordering = match decode_entry(data, region_offset, self.restarts) {
                Some(h) if h.shared == 0 => self.comparator.compare(
                    &data[h.key_offset..h.key_offset + h.non_shared],
                    target,
                ),
                _ => {
                    self.corruption_error();
                    return;
                }
            };
            if ordering == Ordering::Less {
                // Key at "mid" is smaller than "target"; blocks before "mid"
                // are uninteresting.
                left = mid;
            } else {
                right = mid - 1;
            }
        }

        // Scanning forward from the current entry is cheaper when it already
        // sits in the chosen restart block before the target.
        let skip_seek = left == self.restart_index && current_key_compare == Ordering::Less;
        if !skip_seek && !self.seek_to_restart_point(left) {
            return;
        }

        while self.parse_next_key() {
            if self.comparator.compare(&self.key, target) != Ordering::Less {
                return;
            }
        }
    }

    fn next(&mut self) {
        debug_assert!(self.valid(), "next() on an invalid block iterator");
        if !self.valid() {
            return;
        }
        self.parse_next_key();
    }

    fn prev(&mut self) {
        debug_assert!(self.valid(), "prev() on an invalid block iterator");
        if !self.valid() {
            return;
        }

        // Scan backwards to a restart point before current.
        let original = self.current;
        while self.block.restart_point(self.restart_index) >= original {
            if self.restart_index == 0 {
                // No more entries.
                self.mark_exhausted();
                return;
            }
            self.restart_index -= 1;
        }

        if !self.seek_to_restart_point(self.restart_index) {
            return;
        }
        while self.parse_next_key() && self.next_entry_offset() < original {
            // Loop until end of current entry hits the start of original.
        }
    }

    fn key(&self) -> &[u8] {
        debug_assert!(self.valid(), "key() on an invalid block iterator");
        &self.key
    }

    fn value(&self) -> &[u8] {
        debug_assert!(self.valid(), "value() on an invalid block iterator");
        &self.block.data()[self.value_offset..self.value_offset + self.value_len]
    }

    fn status(&self) -> Result<()> {
        match &self.status {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}
