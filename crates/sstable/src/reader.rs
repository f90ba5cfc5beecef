use anyhow::{bail, Result};
use bloom::FilterPolicy;
use std::cmp::Ordering;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::block::{Block, BlockContents};
use crate::comparator::{BytewiseComparator, Comparator};
use crate::error::Error;
use crate::filter_block::FilterBlockReader;
use crate::format::{self, BlockHandle, Footer, BLOCK_TRAILER_BYTES, FOOTER_BYTES};
use crate::iterator::{EmptyIterator, InternalIterator};
use crate::options::ReadOptions;
use crate::two_level::{BlockSource, TwoLevelIterator};
use crate::writer::FILTER_META_PREFIX;

/// Blocks read while opening a table are always checksummed.
const OPEN_OPTIONS: ReadOptions = ReadOptions {
    verify_checksums: true,
};

/// An open, immutable table file.
///
/// On [`open`](Table::open) the footer and the **index block** are read into
/// memory, along with the filter block when the metaindex names one built by
/// the supplied policy. Data blocks are read on demand, one per lookup or per
/// block an iterator crosses.
///
/// A persistent file handle is kept for the lifetime of the table, wrapped in
/// a `Mutex` so reads can go through a shared `&self`.
pub struct Table {
    /// Path to the table file on disk (kept for diagnostics).
    path: PathBuf,
    file: Mutex<File>,
    file_size: u64,
    comparator: Arc<dyn Comparator>,
    index_block: Arc<Block<'static>>,
    filter: Option<FilterBlockReader<'static>>,
    footer: Footer,
}

impl Table {
    /// Opens a table file written by [`TableBuilder`](crate::TableBuilder).
    ///
    /// # Validation
    ///
    /// - The file must be at least as large as the footer.
    /// - The footer magic must match.
    /// - The index block must be in bounds, pass its checksum and decode.
    ///
    /// A missing or unreadable filter block is not an error; the table just
    /// answers every lookup from the data blocks.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is too small, the footer or index block
    /// is corrupt, or any I/O operation fails.
    pub fn open<P: AsRef<Path>>(
        path: P,
        comparator: Arc<dyn Comparator>,
        policy: Option<Arc<dyn FilterPolicy>>,
    ) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let mut f = File::open(&path_buf)?;
        let file_size = f.metadata()?.len();

        if file_size < FOOTER_BYTES as u64 {
            bail!(
                "table file too small: {} bytes, footer alone is {}",
                file_size,
                FOOTER_BYTES
            );
        }

        let mut footer_buf = [0u8; FOOTER_BYTES];
        f.seek(SeekFrom::Start(file_size - FOOTER_BYTES as u64))?;
        f.read_exact(&mut footer_buf)?;
        let footer = Footer::decode_from(&footer_buf)?;

        let index_contents = read_checked(&mut f, file_size, &OPEN_OPTIONS, &footer.index_handle)?;
        let index_block = Arc::new(Block::new(index_contents)?);

        let filter = match policy {
            Some(policy) => match read_filter(&mut f, file_size, &footer, Arc::clone(&policy)) {
                Ok(filter) => filter,
                Err(e) => {
                    warn!(
                        path = %path_buf.display(),
                        error = %e,
                        "could not load filter block, continuing without it"
                    );
                    None
                }
            },
            None => None,
        };

        debug!(
            path = %path_buf.display(),
            bytes = file_size,
            index_restarts = index_block.num_restarts(),
            filter = filter.is_some(),
            "opened table"
        );

        Ok(Self {
            path: path_buf,
            file: Mutex::new(f),
            file_size,
            comparator,
            index_block,
            filter,
            footer,
        })
    }

    /// Returns an iterator over every entry of the table, positioned nowhere.
    ///
    /// Data blocks are read lazily as the iterator reaches them; a block
    /// that cannot be read shows up in the iterator's `status()`.
    pub fn iter(&self, options: &ReadOptions) -> TwoLevelIterator<'_> {
        let index_iter = self.index_block.iter(Arc::clone(&self.comparator));
        TwoLevelIterator::new(Box::new(index_iter), self, *options)
    }

    /// Point lookup for a single key.
    ///
    /// If a filter is loaded it is checked first. A negative result means the
    /// key is **definitely not** in this table, avoiding the data block read
    /// entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if the index or data block holding `key` is corrupt,
    /// or on I/O failure.
    pub fn get(&self, options: &ReadOptions, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut index_iter = self.index_block.iter(Arc::clone(&self.comparator));
        index_iter.seek(key);
        if !index_iter.valid() {
            index_iter.status()?;
            return Ok(None);
        }

        let (handle, _) = BlockHandle::decode_from(index_iter.value())?;

        // Fast path: filter says "definitely not here"
        if let Some(filter) = &self.filter {
            if !filter.key_may_match(handle.offset, key) {
                return Ok(None);
            }
        }

        let contents = self.read_block(options, &handle)?;
        let block = Arc::new(Block::new(contents)?);
        let mut block_iter = block.iter(Arc::clone(&self.comparator));
        block_iter.seek(key);
        if block_iter.valid() && self.comparator.compare(block_iter.key(), key) == Ordering::Equal {
            return Ok(Some(block_iter.value().to_vec()));
        }
        block_iter.status()?;
        Ok(None)
    }

    /// Approximate file offset at which the data for `key` begins (or would
    /// begin, if absent).
    ///
    /// Keys past the last entry map to the offset just after the data
    /// blocks.
    #[must_use]
    pub fn approximate_offset_of(&self, key: &[u8]) -> u64 {
        let mut index_iter = self.index_block.iter(Arc::clone(&self.comparator));
        index_iter.seek(key);
        if index_iter.valid() {
            if let Ok((handle, _)) = BlockHandle::decode_from(index_iter.value()) {
                return handle.offset;
            }
        }
        // Past the last key, or an undecodable index entry: answer with the
        // start of the metaindex block, which sits after all data.
        self.footer.metaindex_handle.offset
    }

    /// Returns `true` if a filter block was loaded.
    #[must_use]
    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    fn read_block(
        &self,
        options: &ReadOptions,
        handle: &BlockHandle,
    ) -> crate::Result<BlockContents<'static>> {
        let mut f = self.file.lock().map_err(|_| {
            Error::from(io::Error::new(
                io::ErrorKind::Other,
                "table file lock poisoned",
            ))
        })?;
        read_checked(&mut *f, self.file_size, options, handle)
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("path", &self.path)
            .field("file_size", &self.file_size)
            .field("footer", &self.footer)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl BlockSource for Table {
    fn block_iter(
        &self,
        options: &ReadOptions,
        index_value: &[u8],
    ) -> Box<dyn InternalIterator + '_> {
        let block = BlockHandle::decode_from(index_value)
            .and_then(|(handle, _)| self.read_block(options, &handle))
            .and_then(Block::new);

        match block {
            Ok(block) => Box::new(Arc::new(block).iter(Arc::clone(&self.comparator))),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable data block");
                Box::new(EmptyIterator::with_error(e))
            }
        }
    }
}

/// Reads a block after checking that it (and its trailer) lies inside the
/// file.
fn read_checked<R: Read + Seek>(
    r: &mut R,
    file_size: u64,
    options: &ReadOptions,
    handle: &BlockHandle,
) -> crate::Result<BlockContents<'static>> {
    let end = handle
        .offset
        .checked_add(handle.size)
        .and_then(|end| end.checked_add(BLOCK_TRAILER_BYTES as u64));
    match end {
        Some(end) if end <= file_size => format::read_block(r, options, handle),
        _ => Err(Error::corruption(format!(
            "block at offset {} (size {}) extends past end of file ({} bytes)",
            handle.offset, handle.size, file_size
        ))),
    }
}

/// Looks up the filter block for `policy` through the metaindex.
///
/// `Ok(None)` means the table was written without a filter or with a
/// different policy.
fn read_filter<R: Read + Seek>(
    r: &mut R,
    file_size: u64,
    footer: &Footer,
    policy: Arc<dyn FilterPolicy>,
) -> crate::Result<Option<FilterBlockReader<'static>>> {
    let meta_contents = read_checked(r, file_size, &OPEN_OPTIONS, &footer.metaindex_handle)?;
    let meta_block = Arc::new(Block::new(meta_contents)?);

    let key = format!("{}{}", FILTER_META_PREFIX, policy.name());
    let mut meta_iter = meta_block.iter(Arc::new(BytewiseComparator));
    meta_iter.seek(key.as_bytes());
    meta_iter.status()?;
    if !meta_iter.valid() || meta_iter.key() != key.as_bytes() {
        return Ok(None);
    }

    let (handle, _) = BlockHandle::decode_from(meta_iter.value())?;
    let contents = read_checked(r, file_size, &OPEN_OPTIONS, &handle)?;
    Ok(Some(FilterBlockReader::new(policy, contents)))
}
