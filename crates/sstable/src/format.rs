//! Table binary format constants, block handles, the footer and block
//! trailer helpers.
//!
//! ## Block handle
//!
//! ```text
//! [offset: varint64][size: varint64]          (at most 20 bytes)
//! ```
//!
//! ## Block trailer (5 bytes, after every block)
//!
//! ```text
//! [compression type: u8][masked crc32 of block + type byte: u32 LE]
//! ```
//!
//! ## Footer (always the last 48 bytes)
//!
//! ```text
//! [metaindex handle][index handle][zero padding to 40 bytes][magic: u64 LE]
//! ```

use crc32fast::Hasher as Crc32;
use std::io::{self, Read, Seek, SeekFrom};

use crate::block::BlockContents;
use crate::coding::{decode_fixed32, decode_fixed64, get_varint64, put_fixed64, put_varint64};
use crate::error::{Error, Result};
use crate::options::ReadOptions;

/// Magic number closing every table file.
pub const TABLE_MAGIC: u64 = 0xdb47_7524_8b80_fb57;

/// Maximum encoded length of a [`BlockHandle`].
pub const MAX_BLOCK_HANDLE_BYTES: usize = 10 + 10;

/// Size of the footer in bytes: two padded handles + magic.
pub const FOOTER_BYTES: usize = 2 * MAX_BLOCK_HANDLE_BYTES + 8;

/// Size of the trailer following every block: type (u8) + crc (u32).
pub const BLOCK_TRAILER_BYTES: usize = 1 + 4;

/// Compression type byte for uncompressed blocks, the only one written.
pub const NO_COMPRESSION: u8 = 0;

const MASK_DELTA: u32 = 0xa282_ead8;

/// Location of a block within a table file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockHandle {
    pub offset: u64,
    /// Block size, trailer excluded.
    pub size: u64,
}

impl BlockHandle {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        put_varint64(dst, self.offset);
        put_varint64(dst, self.size);
    }

    #[must_use]
    pub fn encoded(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(MAX_BLOCK_HANDLE_BYTES);
        self.encode_to(&mut v);
        v
    }

    /// Decodes a handle from the front of `src`, returning it and the number
    /// of bytes consumed.
    pub fn decode_from(src: &[u8]) -> Result<(Self, usize)> {
        let bad = || Error::corruption("bad block handle");
        let (offset, n1) = get_varint64(src).ok_or_else(bad)?;
        let (size, n2) = get_varint64(&src[n1..]).ok_or_else(bad)?;
        Ok((Self { offset, size }, n1 + n2))
    }
}

/// Parsed table footer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Footer {
    pub metaindex_handle: BlockHandle,
    pub index_handle: BlockHandle,
}

impl Footer {
    /// Appends exactly [`FOOTER_BYTES`] to `dst`.
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        let start = dst.len();
        self.metaindex_handle.encode_to(dst);
        self.index_handle.encode_to(dst);
        dst.resize(start + 2 * MAX_BLOCK_HANDLE_BYTES, 0);
        put_fixed64(dst, TABLE_MAGIC);
        debug_assert_eq!(dst.len(), start + FOOTER_BYTES);
    }

    /// Decodes a footer from the last [`FOOTER_BYTES`] of `src`.
    pub fn decode_from(src: &[u8]) -> Result<Self> {
        if src.len() < FOOTER_BYTES {
            return Err(Error::corruption(format!(
                "footer too short: {} bytes",
                src.len()
            )));
        }
        let footer = &src[src.len() - FOOTER_BYTES..];

        let magic = decode_fixed64(&footer[2 * MAX_BLOCK_HANDLE_BYTES..]);
        if magic != TABLE_MAGIC {
            return Err(Error::corruption(format!(
                "not a table file (bad magic number {:#x})",
                magic
            )));
        }

        let (metaindex_handle, n) = BlockHandle::decode_from(footer)?;
        let (index_handle, _) = BlockHandle::decode_from(&footer[n..])?;
        Ok(Self {
            metaindex_handle,
            index_handle,
        })
    }
}

/// Masks a CRC so that checksumming data that embeds CRCs stays robust.
pub fn mask_crc(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

pub fn unmask_crc(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_left(15)
}

/// Masked CRC32 over the block contents followed by its type byte.
pub fn block_checksum(contents: &[u8], compression: u8) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(contents);
    hasher.update(&[compression]);
    mask_crc(hasher.finalize())
}

/// Reads the block identified by `handle` from `r`, verifying its checksum
/// if `options` asks for it.
///
/// The returned contents own their buffer.
pub fn read_block<R: Read + Seek>(
    r: &mut R,
    options: &ReadOptions,
    handle: &BlockHandle,
) -> Result<BlockContents<'static>> {
    let n = handle.size as usize;
    let mut buf = vec![0u8; n + BLOCK_TRAILER_BYTES];

    r.seek(SeekFrom::Start(handle.offset))?;
    r.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::corruption("truncated block read"),
        _ => Error::from(e),
    })?;

    if options.verify_checksums {
        let expected = unmask_crc(decode_fixed32(&buf[n + 1..]));
        let actual = unmask_crc(block_checksum(&buf[..n], buf[n]));
        if actual != expected {
            return Err(Error::corruption(format!(
                "block checksum mismatch at offset {}: expected {:#010x}, got {:#010x}",
                handle.offset, expected, actual
            )));
        }
    }

    match buf[n] {
        NO_COMPRESSION => {
            buf.truncate(n);
            Ok(BlockContents::Owned(buf))
        }
        other => Err(Error::corruption(format!(
            "unsupported block compression type {}",
            other
        ))),
    }
}
