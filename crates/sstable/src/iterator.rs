//! The cursor protocol shared by block iterators, index iterators and the
//! two-level iterator.

use crate::error::{Error, Result};

/// A bidirectional cursor over sorted key/value pairs.
///
/// A freshly created iterator is not positioned; call one of the seek methods
/// first. [`key`](InternalIterator::key) and [`value`](InternalIterator::value)
/// may only be called while [`valid`](InternalIterator::valid) is `true`.
///
/// Errors never panic: a cursor that hits a problem becomes invalid and
/// reports it through [`status`](InternalIterator::status).
pub trait InternalIterator {
    /// Returns `true` if positioned at an entry.
    fn valid(&self) -> bool;

    /// Positions at the first entry, or invalid if the source is empty.
    fn seek_to_first(&mut self);

    /// Positions at the last entry, or invalid if the source is empty.
    fn seek_to_last(&mut self);

    /// Positions at the first entry with key `>= target`.
    fn seek(&mut self, target: &[u8]);

    /// REQUIRES: `valid()`.
    fn next(&mut self);

    /// REQUIRES: `valid()`.
    fn prev(&mut self);

    /// REQUIRES: `valid()`.
    fn key(&self) -> &[u8];

    /// REQUIRES: `valid()`.
    fn value(&self) -> &[u8];

    /// The first error this iterator ran into, if any.
    fn status(&self) -> Result<()>;
}

/// An iterator with no entries, optionally carrying an error.
///
/// Returned wherever a real iterator cannot be produced, such as a data
/// block that failed to load.
#[derive(Debug, Default)]
pub struct EmptyIterator {
    status: Option<Error>,
}

impl EmptyIterator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty iterator whose status reports `err`.
    pub fn with_error(err: Error) -> Self {
        Self { status: Some(err) }
    }
}

impl InternalIterator for EmptyIterator {
    fn valid(&self) -> bool {
        false
    }

    fn seek_to_first(&mut self) {}

    fn seek_to_last(&mut self) {}

    fn seek(&mut self, _target: &[u8]) {}

    fn next(&mut self) {
        debug_assert!(false, "next() on an empty iterator");
    }

    fn prev(&mut self) {
        debug_assert!(false, "prev() on an empty iterator");
    }

    fn key(&self) -> &[u8] {
        debug_assert!(false, "key() on an empty iterator");
        &[]
    }

    fn value(&self) -> &[u8] {
        debug_assert!(false, "value() on an empty iterator");
        &[]
    }

    fn status(&self) -> Result<()> {
        match &self.status {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

impl<I: InternalIterator + ?Sized> InternalIterator for Box<I> {
    fn valid(&self) -> bool {
        (**self).valid()
    }

    fn seek_to_first(&mut self) {
        (**self).seek_to_first()
    }

    fn seek_to_last(&mut self) {
        (**self).seek_to_last()
    }

    fn seek(&mut self, target: &[u8]) {
        (**self).seek(target)
    }

    fn next(&mut self) {
        (**self).next()
    }

    fn prev(&mut self) {
        (**self).prev()
    }

    fn key(&self) -> &[u8] {
        (**self).key()
    }

    fn value(&self) -> &[u8] {
        (**self).value()
    }

    fn status(&self) -> Result<()> {
        (**self).status()
    }
}
