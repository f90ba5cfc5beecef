//! Iterator composing an index with on-demand per-block iterators.
//!
//! The index iterator yields `(separator key, block locator)` pairs. For the
//! current index entry a [`BlockSource`] materializes an iterator over the
//! referenced block; the two-level iterator walks it and moves on to the next
//! index entry when it runs dry, so callers see one ordered stream across the
//! whole table.

use crate::error::{Error, Result};
use crate::iterator::InternalIterator;
use crate::options::ReadOptions;

/// Turns an index value into an iterator over the block it references.
///
/// Implemented by whatever owns the blocks (a table reader, a test fixture).
/// Failures are reported through the returned iterator's status, typically
/// an [`EmptyIterator`](crate::EmptyIterator) carrying the error.
pub trait BlockSource {
    fn block_iter(
        &self,
        options: &ReadOptions,
        index_value: &[u8],
    ) -> Box<dyn InternalIterator + '_>;
}

/// Holds at most one data iterator.
///
/// Replacing the iterator drops the old one first, so a block iterator is
/// released exactly once whichever way the two-level iterator leaves it:
/// re-seek, exhaustion, error or drop.
struct DataSlot<'a> {
    iter: Option<Box<dyn InternalIterator + 'a>>,
}

impl<'a> DataSlot<'a> {
    fn empty() -> Self {
        Self { iter: None }
    }

    /// Drops the current iterator (if any) and installs `iter`.
    ///
    /// Returns the error status of the discarded iterator so it is not lost.
    fn replace(&mut self, iter: Option<Box<dyn InternalIterator + 'a>>) -> Option<Error> {
        let old_status = self.iter.take().and_then(|old| old.status().err());
        self.iter = iter;
        old_status
    }

    fn get(&self) -> Option<&(dyn InternalIterator + 'a)> {
        self.iter.as_deref()
    }

    fn get_mut(&mut self) -> Option<&mut (dyn InternalIterator + 'a)> {
        self.iter.as_deref_mut()
    }

    fn is_valid(&self) -> bool {
        self.iter.as_ref().map_or(false, |it| it.valid())
    }
}

/// Concatenates the blocks referenced by an index into one ordered cursor.
///
/// Owns the index iterator and the current data iterator; borrows the
/// block source for `'a`.
pub struct TwoLevelIterator<'a> {
    source: &'a dyn BlockSource,
    options: ReadOptions,
    index_iter: Box<dyn InternalIterator + 'a>,
    data_iter: DataSlot<'a>,
    /// Sticky error saved from discarded data iterators.
    status: Option<Error>,
    /// Index value that produced the current data iterator; lets repeated
    /// seeks into the same block reuse it.
    data_block_handle: Vec<u8>,
}

impl<'a> TwoLevelIterator<'a> {
    /// Takes ownership of `index_iter`; blocks are materialized through
    /// `source` with `options`.
    pub fn new(
        index_iter: Box<dyn InternalIterator + 'a>,
        source: &'a dyn BlockSource,
        options: ReadOptions,
    ) -> Self {
        Self {
            source,
            options,
            index_iter,
            data_iter: DataSlot::empty(),
            status: None,
            data_block_handle: Vec::new(),
        }
    }

    fn save_error(&mut self, err: Option<Error>) {
        if self.status.is_none() {
            self.status = err;
        }
    }

    fn set_data_iterator(&mut self, iter: Option<Box<dyn InternalIterator + 'a>>) {
        let discarded = self.data_iter.replace(iter);
        self.save_error(discarded);
    }

    fn init_data_block(&mut self) {
        if !self.index_iter.valid() {
            self.set_data_iterator(None);
            return;
        }

        let handle = self.index_iter.value();
        if self.data_iter.get().is_some() && handle == self.data_block_handle.as_slice() {
            // data_iter is already constructed with this iterator, so
            // no need to change anything
            return;
        }

        let handle = handle.to_vec();
        let source = self.source;
        let iter = source.block_iter(&self.options, &handle);
        self.data_block_handle = handle;
        self.set_data_iterator(Some(iter));
    }

    fn skip_empty_data_blocks_forward(&mut self) {
        while !self.data_iter.is_valid() {
            if !self.index_iter.valid() {
                self.set_data_iterator(None);
                return;
            }
            self.index_iter.next();
            self.init_data_block();
            if let Some(data) = self.data_iter.get_mut() {
                data.seek_to_first();
            }
        }
    }

    fn skip_empty_data_blocks_backward(&mut self) {
        while !self.data_iter.is_valid() {
            if !self.index_iter.valid() {
                self.set_data_iterator(None);
                return;
            }
            self.index_iter.prev();
            self.init_data_block();
            if let Some(data) = self.data_iter.get_mut() {
                data.seek_to_last();
            }
        }
    }
}

impl InternalIterator for TwoLevelIterator<'_> {
    fn valid(&self) -> bool {
        self.data_iter.is_valid()
    }

    fn seek_to_first(&mut self) {
        self.index_iter.seek_to_first();
        self.init_data_block();
        if let Some(data) = self.data_iter.get_mut() {
            data.seek_to_first();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn seek_to_last(&mut self) {
        self.index_iter.seek_to_last();
        self.init_data_block();
        if let Some(data) = self.data_iter.get_mut() {
            data.seek_to_last();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn seek(&mut self, target: &[u8]) {
        self.index_iter.seek(target);
        self.init_data_block();
        if let Some(data) = self.data_iter.get_mut() {
            data.seek(target);
        }
        self.skip_empty_data_blocks_forward();
    }

    fn next(&mut self) {
        debug_assert!(self.valid(), "next() on an invalid two-level iterator");
        if let Some(data) = self.data_iter.get_mut() {
            if data.valid() {
                data.next();
            }
        }
        self.skip_empty_data_blocks_forward();
    }

    fn prev(&mut self) {
        debug_assert!(self.valid(), "prev() on an invalid two-level iterator");
        if let Some(data) = self.data_iter.get_mut() {
            if data.valid() {
                data.prev();
            }
        }
        self.skip_empty_data_blocks_backward();
    }

    fn key(&self) -> &[u8] {
        debug_assert!(self.valid(), "key() on an invalid two-level iterator");
        match self.data_iter.get() {
            Some(data) => data.key(),
            None => &[],
        }
    }

    fn value(&self) -> &[u8] {
        debug_assert!(self.valid(), "value() on an invalid two-level iterator");
        match self.data_iter.get() {
            Some(data) => data.value(),
            None => &[],
        }
    }

    /// First error seen, in priority order: errors saved from discarded
    /// data iterators, then the index iterator, then the current data
    /// iterator.
    fn status(&self) -> Result<()> {
        if let Some(e) = &self.status {
            return Err(e.clone());
        }
        self.index_iter.status()?;
        if let Some(data) = self.data_iter.get() {
            data.status()?;
        }
        Ok(())
    }
}
