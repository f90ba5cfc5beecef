use anyhow::{bail, Result};
use bloom::FilterPolicy;
use config::TableConfig;
use std::cmp::Ordering;
use std::fs::{remove_file, rename, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::block_builder::BlockBuilder;
use crate::comparator::{BytewiseComparator, Comparator};
use crate::filter_block::FilterBlockBuilder;
use crate::format::{block_checksum, BlockHandle, Footer, BLOCK_TRAILER_BYTES, NO_COMPRESSION};

/// Prefix of the metaindex key naming the filter block.
pub(crate) const FILTER_META_PREFIX: &str = "filter.";

/// Streams sorted key/value pairs into a new table file.
///
/// # File Layout
///
/// ```text
/// [DATA]      data block 0 + trailer ... data block N + trailer
/// [FILTER]    filter block + trailer          (only with a filter policy)
/// [METAINDEX] "filter.<policy>" -> filter handle, + trailer
/// [INDEX]     separator key -> data block handle, + trailer
/// [FOOTER]    metaindex handle | index handle | padding | magic (48 bytes)
/// ```
///
/// # Crash Safety
///
/// Writes to `path.sst.tmp`, calls `sync_all()` on
/// [`finish`](TableBuilder::finish), then atomically renames. A builder
/// dropped before `finish` succeeds removes its temp file. If the process
/// crashes mid-write the temp file is left behind and never opened as a
/// table.
pub struct TableBuilder {
    config: TableConfig,
    comparator: Arc<dyn Comparator>,
    policy: Option<Arc<dyn FilterPolicy>>,
    path: PathBuf,
    tmp_path: PathBuf,
    file: BufWriter<File>,
    /// Bytes written so far; the offset of the next block.
    offset: u64,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    filter_block: Option<FilterBlockBuilder>,
    last_key: Vec<u8>,
    num_entries: u64,
    /// Handle of the last flushed data block. Its index entry is only added
    /// once the next key is known, so the separator can be shortened.
    pending_index_entry: Option<BlockHandle>,
    /// Set once the temp file has been renamed into place.
    renamed: bool,
}

impl TableBuilder {
    /// Starts a table at `path`.
    ///
    /// A filter block is written when `policy` is given.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the temp file cannot be
    /// created.
    pub fn create(
        path: &Path,
        config: TableConfig,
        comparator: Arc<dyn Comparator>,
        policy: Option<Arc<dyn FilterPolicy>>,
    ) -> Result<Self> {
        config.validate()?;

        // Create temporary file next to target for atomic rename later
        let tmp_path = path.with_extension("sst.tmp");
        let raw_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let filter_block = policy.as_ref().map(|p| {
            let mut fb = FilterBlockBuilder::with_base_lg(Arc::clone(p), config.filter_base_lg);
            fb.start_block(0);
            fb
        });

        Ok(Self {
            data_block: BlockBuilder::new(config.block_restart_interval, Arc::clone(&comparator)),
            // Every index entry is a restart so seeks never delta-decode.
            index_block: BlockBuilder::new(1, Arc::clone(&comparator)),
            config,
            comparator,
            policy,
            path: path.to_path_buf(),
            tmp_path,
            file: BufWriter::new(raw_file),
            offset: 0,
            filter_block,
            last_key: Vec::new(),
            num_entries: 0,
            pending_index_entry: None,
            renamed: false,
        })
    }

    /// Writes a complete table from an iterator of `(key, value)` pairs in
    /// ascending key order, returning the file size.
    ///
    /// # Errors
    ///
    /// Returns an error if the iterator yields zero entries, keys are out of
    /// order, or on I/O failure.
    pub fn write_from_iterator<I>(
        path: &Path,
        config: TableConfig,
        comparator: Arc<dyn Comparator>,
        policy: Option<Arc<dyn FilterPolicy>>,
        iter: I,
    ) -> Result<u64>
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    {
        let mut builder = Self::create(path, config, comparator, policy)?;
        for (key, value) in iter {
            builder.add(&key, &value)?;
        }
        builder.finish()
    }

    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if `key` is not greater than the previous key, or on
    /// I/O failure while flushing a full data block.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.num_entries > 0 && self.comparator.compare(key, &self.last_key) != Ordering::Greater
        {
            bail!(
                "keys must be added in strictly increasing order ({:?} after {:?})",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(&self.last_key)
            );
        }

        if let Some(handle) = self.pending_index_entry.take() {
            debug_assert!(self.data_block.is_empty());
            self.comparator.find_shortest_separator(&mut self.last_key, key);
            self.index_block.add(&self.last_key, &handle.encoded());
        }

        if let Some(fb) = self.filter_block.as_mut() {
            fb.add_key(key);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value);

        if self.data_block.current_size_estimate() >= self.config.block_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes out the current data block, if it has any entries.
    ///
    /// Mostly useful to force a block boundary; [`add`](TableBuilder::add)
    /// flushes on its own when a block reaches the configured size.
    pub fn flush(&mut self) -> Result<()> {
        if self.data_block.is_empty() {
            return Ok(());
        }
        debug_assert!(self.pending_index_entry.is_none());

        let handle = write_raw_block(&mut self.file, &mut self.offset, self.data_block.finish())?;
        self.data_block.reset();
        self.pending_index_entry = Some(handle);
        self.file.flush()?;

        if let Some(fb) = self.filter_block.as_mut() {
            fb.start_block(self.offset);
        }
        Ok(())
    }

    /// Writes the filter, metaindex and index blocks plus the footer, syncs
    /// and renames the file into place. Returns the final file size.
    ///
    /// # Errors
    ///
    /// Returns an error if no entries were added or on any I/O failure. The
    /// temp file is removed in both cases.
    pub fn finish(mut self) -> Result<u64> {
        self.flush()?;

        if self.num_entries == 0 {
            // Nothing to write; drop the temp file.
            self.abandon();
            bail!("refusing to write an empty table (no entries)");
        }

        // Write FILTER block
        let filter_handle = match self.filter_block.as_mut() {
            Some(fb) => Some(write_raw_block(&mut self.file, &mut self.offset, fb.finish())?),
            None => None,
        };

        // Write METAINDEX block
        let mut meta_block = BlockBuilder::new(
            self.config.block_restart_interval,
            Arc::new(BytewiseComparator),
        );
        if let (Some(handle), Some(policy)) = (filter_handle, self.policy.as_ref()) {
            let key = format!("{}{}", FILTER_META_PREFIX, policy.name());
            meta_block.add(key.as_bytes(), &handle.encoded());
        }
        let metaindex_handle =
            write_raw_block(&mut self.file, &mut self.offset, meta_block.finish())?;

        // Write INDEX block
        if let Some(handle) = self.pending_index_entry.take() {
            self.comparator.find_short_successor(&mut self.last_key);
            self.index_block.add(&self.last_key, &handle.encoded());
        }
        let index_handle =
            write_raw_block(&mut self.file, &mut self.offset, self.index_block.finish())?;

        // Write FOOTER
        let mut footer = Vec::new();
        Footer {
            metaindex_handle,
            index_handle,
        }
        .encode_to(&mut footer);
        self.file.write_all(&footer)?;
        self.offset += footer.len() as u64;

        // Flush BufWriter, then sync the underlying file
        self.file.flush()?;
        self.file.get_ref().sync_all()?;

        // Atomically move into place
        rename(&self.tmp_path, &self.path)?;
        self.renamed = true;

        // Fsync the parent directory to ensure the rename is durable.
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        debug!(
            path = %self.path.display(),
            entries = self.num_entries,
            bytes = self.offset,
            filter = filter_handle.is_some(),
            "finished table"
        );
        Ok(self.offset)
    }

    /// Gives up on the table and removes the temp file.
    pub fn abandon(self) {
        drop(self);
    }

    /// Number of entries added so far.
    #[must_use]
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Bytes written so far; after [`finish`](TableBuilder::finish) this is
    /// the file size.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.offset
    }
}

impl Drop for TableBuilder {
    fn drop(&mut self) {
        if self.renamed {
            return;
        }
        if let Err(e) = remove_file(&self.tmp_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(
                    path = %self.tmp_path.display(),
                    error = %e,
                    "could not remove temp table file"
                );
            }
        }
    }
}

/// Writes `contents` followed by its trailer at `*offset` and advances it.
fn write_raw_block<W: Write>(
    w: &mut W,
    offset: &mut u64,
    contents: &[u8],
) -> io::Result<BlockHandle> {
    let handle = BlockHandle::new(*offset, contents.len() as u64);
    w.write_all(contents)?;

    let mut trailer = [0u8; BLOCK_TRAILER_BYTES];
    trailer[0] = NO_COMPRESSION;
    trailer[1..].copy_from_slice(&block_checksum(contents, NO_COMPRESSION).to_le_bytes());
    w.write_all(&trailer)?;

    *offset += (contents.len() + trailer.len()) as u64;
    Ok(handle)
}
