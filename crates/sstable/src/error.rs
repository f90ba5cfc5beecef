use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by blocks, iterators and the table format.
///
/// `Clone` so that iterators can keep a sticky status and hand out copies of
/// it from [`status`](crate::InternalIterator::status).
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed on-disk bytes: bad trailer, out-of-bounds lengths,
    /// checksum mismatch.
    #[error("corruption: {0}")]
    Corruption(String),

    /// The caller handed in something the format cannot represent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(Arc<io::Error>),
}

impl Error {
    /// Shorthand for building a [`Error::Corruption`].
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Returns `true` for [`Error::Corruption`].
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
