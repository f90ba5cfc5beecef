//! # SSTable - Sorted String Table
//!
//! Immutable, on-disk table files for the RiptideKV storage engine: the block
//! format, the per-table filter block and the iterators that read them back.
//!
//! Tables are *write-once, read-many*. A [`TableBuilder`] streams sorted
//! key/value pairs into a file; a [`Table`] opens it for point lookups and
//! ordered scans through a [`TwoLevelIterator`].
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA BLOCKS (prefix-compressed sorted entries)                │
//! │                                                               │
//! │ shared (varint32) | non_shared (varint32) | val_len (varint32)│
//! │ key suffix | value                                            │
//! │ ... restart array (u32 LE each) | num_restarts (u32 LE)       │
//! │ + trailer: type (u8) | masked crc32 (u32 LE)                  │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FILTER BLOCK (optional)                                       │
//! │                                                               │
//! │ filters | filter offsets (u32 LE) | array offset (u32 LE)     │
//! │ base_lg (u8) + trailer                                        │
//! ├───────────────────────────────────────────────────────────────┤
//! │ METAINDEX BLOCK                                               │
//! │                                                               │
//! │ "filter.<policy name>" -> filter block handle + trailer       │
//! ├───────────────────────────────────────────────────────────────┤
//! │ INDEX BLOCK                                                   │
//! │                                                               │
//! │ separator key -> data block handle (restart every entry)      │
//! │ + trailer                                                     │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (always last 48 bytes)                                 │
//! │                                                               │
//! │ metaindex handle | index handle | zero padding to 40 bytes    │
//! │ magic (u64 LE) 0xdb4775248b80fb57                             │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Block handles are `offset (varint64) | size (varint64)`; the size
//! excludes the 5-byte trailer. Fixed-width integers are little-endian.

mod block;
mod block_builder;
mod coding;
mod comparator;
mod error;
mod filter_block;
mod format;
mod iterator;
mod options;
mod reader;
mod two_level;
mod writer;

pub use block::{Block, BlockContents, BlockIter};
pub use block_builder::BlockBuilder;
pub use bloom::{BloomFilterPolicy, FilterPolicy};
pub use comparator::{BytewiseComparator, Comparator};
pub use error::{Error, Result};
pub use filter_block::{FilterBlockBuilder, FilterBlockReader};
pub use format::{
    read_block, BlockHandle, Footer, BLOCK_TRAILER_BYTES, FOOTER_BYTES, MAX_BLOCK_HANDLE_BYTES,
    TABLE_MAGIC,
};
pub use iterator::{EmptyIterator, InternalIterator};
pub use options::{filter_policy, ReadOptions};
pub use reader::Table;
pub use two_level::{BlockSource, TwoLevelIterator};
pub use writer::TableBuilder;

#[cfg(test)]
mod tests;
