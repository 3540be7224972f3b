#![forbid(unsafe_code)]
//! Block I/O layer.
//!
//! Provides the positional-read [`ByteDevice`] trait, a file-backed
//! implementation, and the [`BlockDevice`] view that reads whole
//! fixed-size blocks. Every read specifies an explicit byte offset; no
//! shared cursor exists, so independent sessions may read the same
//! image concurrently.

use rext2_error::{Ext2Error, Result};
use rext2_types::{BlockNumber, ByteOffset, EXT2_SUPERBLOCK_OFFSET, EXT2_SUPERBLOCK_SIZE};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;

/// Owned block buffer.
///
/// Invariant: length == the block size of the originating device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBuf {
    bytes: Vec<u8>,
}

impl BlockBuf {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

/// Byte-addressed device for fixed-offset reads (pread semantics).
///
/// The image is immutable for the life of an accessor session; this trait
/// deliberately has no write or sync surface.
pub trait ByteDevice: Send + Sync {
    /// Total length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read exactly `buf.len()` bytes from `offset` into `buf`.
    ///
    /// A short read is an error: it indicates a truncated image or a dead
    /// backing source, never a transient condition.
    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()>;
}

impl<D: ByteDevice + ?Sized> ByteDevice for Box<D> {
    fn len_bytes(&self) -> u64 {
        (**self).len_bytes()
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact_at(offset, buf)
    }
}

impl<D: ByteDevice + ?Sized> ByteDevice for Arc<D> {
    fn len_bytes(&self) -> u64 {
        (**self).len_bytes()
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact_at(offset, buf)
    }
}

/// File-backed byte device using `pread`-style I/O.
///
/// Uses `std::os::unix::fs::FileExt`, which is thread-safe and does not
/// require a shared seek position. The file is opened read-only.
#[derive(Debug, Clone)]
pub struct FileByteDevice {
    file: Arc<File>,
    len: u64,
}

impl FileByteDevice {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path.as_ref())?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            len,
        })
    }

    #[must_use]
    pub fn file(&self) -> &Arc<File> {
        &self.file
    }
}

impl ByteDevice for FileByteDevice {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()> {
        let len = u64::try_from(buf.len()).map_err(|_| {
            Ext2Error::InvalidArgument("read length overflows u64".to_owned())
        })?;
        let end = offset.checked_add(len).ok_or_else(|| {
            Ext2Error::InvalidArgument("read range overflows u64".to_owned())
        })?;
        if end.0 > self.len {
            return Err(Ext2Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "read out of bounds: offset={} len={} image_len={}",
                    offset,
                    buf.len(),
                    self.len
                ),
            )));
        }

        self.file.read_exact_at(buf, offset.0)?;
        Ok(())
    }
}

/// In-memory byte device, used for harness-built images and tests.
#[derive(Debug, Clone)]
pub struct MemoryByteDevice {
    bytes: Arc<Vec<u8>>,
}

impl MemoryByteDevice {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(bytes),
        }
    }
}

impl ByteDevice for MemoryByteDevice {
    fn len_bytes(&self) -> u64 {
        u64::try_from(self.bytes.len()).unwrap_or(u64::MAX)
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()> {
        let offset = usize::try_from(offset.0)
            .map_err(|_| Ext2Error::InvalidArgument("offset overflows usize".to_owned()))?;
        let end = offset
            .checked_add(buf.len())
            .ok_or_else(|| Ext2Error::InvalidArgument("read range overflow".to_owned()))?;
        if end > self.bytes.len() {
            return Err(Ext2Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "read out of bounds: offset={offset} len={} image_len={}",
                    buf.len(),
                    self.bytes.len()
                ),
            )));
        }
        buf.copy_from_slice(&self.bytes[offset..end]);
        Ok(())
    }
}

/// Block-addressed read interface.
pub trait BlockDevice: Send + Sync {
    /// Read a block by number. The returned buffer is exactly `block_size()`
    /// bytes.
    fn read_block(&self, block: BlockNumber) -> Result<BlockBuf>;

    /// Device block size in bytes.
    fn block_size(&self) -> u32;

    /// Total number of whole blocks addressable on this device.
    fn block_count(&self) -> u64;
}

/// Adapter exposing a [`ByteDevice`] as fixed-size blocks.
///
/// The block size comes from the superblock, not the device, so an image
/// whose length is not block-aligned is tolerated: the trailing partial
/// block is simply not addressable.
#[derive(Debug)]
pub struct ByteBlockDevice<D: ByteDevice> {
    inner: D,
    block_size: u32,
    block_count: u64,
}

impl<D: ByteDevice> ByteBlockDevice<D> {
    pub fn new(inner: D, block_size: u32) -> Result<Self> {
        if block_size == 0 || !block_size.is_power_of_two() {
            return Err(Ext2Error::InvalidArgument(format!(
                "invalid block_size={block_size} (must be power of two)"
            )));
        }

        let block_count = inner.len_bytes() / u64::from(block_size);
        Ok(Self {
            inner,
            block_size,
            block_count,
        })
    }

    #[must_use]
    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: ByteDevice> BlockDevice for ByteBlockDevice<D> {
    fn read_block(&self, block: BlockNumber) -> Result<BlockBuf> {
        if u64::from(block.0) >= self.block_count {
            return Err(Ext2Error::Corruption {
                block: u64::from(block.0),
                detail: format!("block out of range (block_count={})", self.block_count),
            });
        }

        let offset = u64::from(block.0)
            .checked_mul(u64::from(self.block_size))
            .ok_or_else(|| Ext2Error::Corruption {
                block: u64::from(block.0),
                detail: "block offset overflow".to_owned(),
            })?;
        let mut buf = vec![
            0_u8;
            usize::try_from(self.block_size).map_err(|_| {
                Ext2Error::InvalidArgument("block_size does not fit usize".to_owned())
            })?
        ];
        tracing::trace!(block = block.0, offset, "read_block");
        self.inner.read_exact_at(ByteOffset(offset), &mut buf)?;
        Ok(BlockBuf::new(buf))
    }

    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }
}

/// Read the ext2 superblock region (1024 bytes at offset 1024).
pub fn read_superblock_region(dev: &dyn ByteDevice) -> Result<[u8; EXT2_SUPERBLOCK_SIZE]> {
    let mut buf = [0_u8; EXT2_SUPERBLOCK_SIZE];
    let offset = u64::try_from(EXT2_SUPERBLOCK_OFFSET)
        .map_err(|_| Ext2Error::InvalidArgument("superblock offset overflow".to_owned()))?;
    dev.read_exact_at(ByteOffset(offset), &mut buf)?;
    Ok(buf)
}
