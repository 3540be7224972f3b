#![forbid(unsafe_code)]

//! Read-only ext2 accessor sessions.
//!
//! [`Ext2Fs`] bundles a validated superblock, pre-computed geometry, a
//! block device, and a group descriptor cache into one context. All
//! operations take `&self`; a session never mutates the image.
//!
//! The layering below this crate is strict: `rext2-ondisk` decodes bytes
//! it is handed and never performs I/O, `rext2-block` reads bytes and
//! never interprets them. This crate is where the two meet, and where
//! decode-time [`ParseError`]s are converted into runtime [`Ext2Error`]s.

use parking_lot::Mutex;
use rext2_block::{
    BlockBuf, BlockDevice, ByteBlockDevice, ByteDevice, FileByteDevice, MemoryByteDevice,
    read_superblock_region,
};
use rext2_error::{Ext2Error, Result};
use rext2_ondisk::{iter_dir_block, lookup_in_dir_block, parse_dir_block};
use rext2_types::{
    BlockNumber, ByteOffset, EXT2_GOOD_OLD_INODE_SIZE, GroupNumber, InodeNumber, ParseError,
    S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFREG, S_IFSOCK,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

mod walk;

pub use rext2_ondisk::{
    Ext2DirEntry, Ext2DirEntryRef, Ext2FileType, Ext2GroupDesc, Ext2Inode, Ext2Superblock,
};
pub use walk::{ChunkVisitor, FileChunk};

/// Options controlling how an image is opened.
///
/// Validation is on by default. Disable it only for diagnostic workflows
/// where reading a partially-corrupt image is intentional.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Skip mount-time geometry validation.
    pub skip_validation: bool,
}

/// Pre-computed geometry derived from the superblock.
///
/// Computed once at open time so downstream code does not re-derive these
/// values on every operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ext2Geometry {
    /// Block size in bytes (1024 to 65536).
    pub block_size: u32,
    /// Total number of blocks.
    pub blocks_count: u32,
    /// Total number of inodes.
    pub inodes_count: u32,
    /// Number of inodes per block group.
    pub inodes_per_group: u32,
    /// First non-reserved inode number.
    pub first_ino: u32,
    /// On-disk inode record size in bytes.
    pub inode_size: u16,
    /// Number of block groups.
    pub groups_count: u32,
    /// Block pointers per indirect block.
    pub pointers_per_block: u32,
}

/// An opened ext2 image, ready for read operations.
///
/// The constructor validates by default so callers cannot accidentally
/// operate on unvalidated metadata. Group descriptors are read lazily and
/// cached; the superblock and geometry are fixed for the session.
pub struct Ext2Fs {
    superblock: Ext2Superblock,
    geometry: Ext2Geometry,
    blocks: ByteBlockDevice<Box<dyn ByteDevice>>,
    gd_cache: Mutex<HashMap<u32, Ext2GroupDesc>>,
}

impl std::fmt::Debug for Ext2Fs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ext2Fs")
            .field("geometry", &self.geometry)
            .field("device_len", &self.blocks.inner().len_bytes())
            .finish()
    }
}

impl Ext2Fs {
    /// Open an ext2 image at `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, &OpenOptions::default())
    }

    /// Open an ext2 image at `path` with custom options.
    pub fn open_with_options(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
        let dev = FileByteDevice::open(path.as_ref())?;
        Self::from_device(Box::new(dev), options)
    }

    /// Open an in-memory image, used by fixtures and tests.
    pub fn from_memory(bytes: Vec<u8>) -> Result<Self> {
        Self::from_device(
            Box::new(MemoryByteDevice::new(bytes)),
            &OpenOptions::default(),
        )
    }

    /// Open an ext2 filesystem from an already-opened device.
    pub fn from_device(dev: Box<dyn ByteDevice>, options: &OpenOptions) -> Result<Self> {
        let region = read_superblock_region(&*dev)?;
        let superblock =
            Ext2Superblock::parse_superblock_region(&region).map_err(open_error)?;

        if !options.skip_validation {
            superblock.validate_geometry().map_err(open_error)?;
        }

        let geometry = Ext2Geometry {
            block_size: superblock.block_size,
            blocks_count: superblock.blocks_count,
            inodes_count: superblock.inodes_count,
            inodes_per_group: superblock.inodes_per_group,
            first_ino: superblock.first_ino,
            inode_size: superblock.inode_size,
            groups_count: superblock.groups_count(),
            pointers_per_block: superblock.block_size / 4,
        };

        let blocks = ByteBlockDevice::new(dev, superblock.block_size)?;
        if !options.skip_validation && u64::from(superblock.blocks_count) > blocks.block_count()
        {
            return Err(Ext2Error::InvalidFilesystem(format!(
                "superblock claims {} blocks but image holds {}",
                superblock.blocks_count,
                blocks.block_count()
            )));
        }

        tracing::debug!(
            block_size = geometry.block_size,
            blocks = geometry.blocks_count,
            inodes = geometry.inodes_count,
            groups = geometry.groups_count,
            "opened ext2 image"
        );

        Ok(Self {
            superblock,
            geometry,
            blocks,
            gd_cache: Mutex::new(HashMap::new()),
        })
    }

    /// The parsed superblock.
    #[must_use]
    pub fn superblock(&self) -> &Ext2Superblock {
        &self.superblock
    }

    /// Pre-computed geometry.
    #[must_use]
    pub fn geometry(&self) -> &Ext2Geometry {
        &self.geometry
    }

    /// The byte device backing this session.
    #[must_use]
    pub fn device(&self) -> &dyn ByteDevice {
        &**self.blocks.inner()
    }

    /// Block size in bytes.
    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.geometry.block_size
    }

    /// Read a full filesystem block.
    pub(crate) fn read_block(&self, block: BlockNumber) -> Result<BlockBuf> {
        self.blocks.read_block(block)
    }

    /// Reject block pointers that point outside the filesystem.
    pub(crate) fn check_block_pointer(&self, ptr: u32) -> Result<()> {
        if ptr >= self.geometry.blocks_count {
            return Err(Ext2Error::Corruption {
                block: u64::from(ptr),
                detail: format!(
                    "block pointer beyond filesystem end (blocks_count={})",
                    self.geometry.blocks_count
                ),
            });
        }
        Ok(())
    }

    // Metadata reads.

    /// Read a group descriptor, consulting the session cache first.
    pub fn read_group_desc(&self, group: GroupNumber) -> Result<Ext2GroupDesc> {
        if group.0 >= self.geometry.groups_count {
            return Err(Ext2Error::InvalidArgument(format!(
                "group {} out of range (groups_count={})",
                group.0, self.geometry.groups_count
            )));
        }
        if let Some(gd) = self.gd_cache.lock().get(&group.0) {
            return Ok(gd.clone());
        }

        let offset = self.superblock.group_desc_offset(group).ok_or_else(|| {
            Ext2Error::InvalidFilesystem("group descriptor offset overflow".to_owned())
        })?;
        let mut buf = [0_u8; rext2_types::EXT2_GROUP_DESC_SIZE];
        self.device().read_exact_at(ByteOffset(offset), &mut buf)?;
        let gd = Ext2GroupDesc::parse_from_bytes(&buf)
            .map_err(|e| corruption_at(offset / u64::from(self.geometry.block_size), &e))?;

        self.gd_cache.lock().insert(group.0, gd.clone());
        Ok(gd)
    }

    /// Read an inode by number.
    ///
    /// Only the 128-byte record prefix is read, regardless of the on-disk
    /// record size; the extra rev-1 fields carry nothing a read-only
    /// accessor needs. The record stride still honors `s_inode_size`.
    pub fn read_inode(&self, ino: InodeNumber) -> Result<Ext2Inode> {
        let loc = self.superblock.locate_inode(ino).map_err(|_| {
            Ext2Error::InvalidArgument(format!(
                "inode {} out of range (inodes_count={})",
                ino.0, self.geometry.inodes_count
            ))
        })?;
        let gd = self.read_group_desc(loc.group)?;
        self.check_block_pointer(gd.inode_table.0)?;
        let offset = self
            .superblock
            .inode_device_offset(&loc, gd.inode_table)
            .map_err(|e| corruption_at(u64::from(gd.inode_table.0), &e))?;

        let mut buf = [0_u8; EXT2_GOOD_OLD_INODE_SIZE as usize];
        self.device().read_exact_at(ByteOffset(offset), &mut buf)?;
        tracing::trace!(ino = ino.0, group = loc.group.0, offset, "read_inode");
        Ext2Inode::parse_from_bytes(&buf)
            .map_err(|e| corruption_at(u64::from(gd.inode_table.0), &e))
    }

    /// Read an inode and return its stat-style attributes.
    pub fn read_inode_attr(&self, ino: InodeNumber) -> Result<InodeAttr> {
        let inode = self.read_inode(ino)?;
        inode_to_attr(ino, &inode)
    }

    // Block mapping.

    /// Resolve a logical file block to a physical block number through the
    /// inode's block map, reading indirect blocks as needed.
    ///
    /// Returns `Ok(None)` when the logical block falls in a hole: either a
    /// zero slot in the inode itself or a zero pointer anywhere along the
    /// indirect chain.
    pub fn resolve_block(
        &self,
        inode: &Ext2Inode,
        logical_block: u32,
    ) -> Result<Option<BlockNumber>> {
        let (slot, path) = self.indirection_path(logical_block)?;

        let mut ptr = inode.block[slot];
        for index in path {
            if ptr == 0 {
                return Ok(None);
            }
            self.check_block_pointer(ptr)?;
            let buf = self.read_block(BlockNumber(ptr))?;
            ptr = pointer_at(buf.as_slice(), index)?;
        }

        if ptr == 0 {
            return Ok(None);
        }
        self.check_block_pointer(ptr)?;
        Ok(Some(BlockNumber(ptr)))
    }

    /// Map a logical block to its inode slot and the chain of indices to
    /// follow through indirect blocks. The path is empty for direct slots.
    fn indirection_path(&self, logical_block: u32) -> Result<(usize, Vec<u32>)> {
        let ppb = u64::from(self.geometry.pointers_per_block);
        let mut lb = u64::from(logical_block);

        let ndir = rext2_types::EXT2_NDIR_BLOCKS as u64;
        if lb < ndir {
            return Ok((usize::try_from(lb).unwrap_or(0), Vec::new()));
        }
        lb -= ndir;

        if lb < ppb {
            return Ok((rext2_types::EXT2_IND_BLOCK, vec![clip_index(lb)]));
        }
        lb -= ppb;

        if lb < ppb * ppb {
            return Ok((
                rext2_types::EXT2_DIND_BLOCK,
                vec![clip_index(lb / ppb), clip_index(lb % ppb)],
            ));
        }
        lb -= ppb * ppb;

        if lb < ppb * ppb * ppb {
            return Ok((
                rext2_types::EXT2_TIND_BLOCK,
                vec![
                    clip_index(lb / (ppb * ppb)),
                    clip_index((lb / ppb) % ppb),
                    clip_index(lb % ppb),
                ],
            ));
        }

        Err(Ext2Error::InvalidArgument(format!(
            "logical block {logical_block} beyond triple-indirect range"
        )))
    }

    // File reads.

    /// Read file data starting at `offset` into `buf`, resolving each
    /// logical block through the block map. Holes read as zeroes. Returns
    /// the number of bytes read, which is short only at end of file.
    pub fn read_file_data(
        &self,
        inode: &Ext2Inode,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        let file_size = inode.size;
        if offset >= file_size {
            return Ok(0);
        }

        let available = file_size - offset;
        let to_read = usize::try_from(available.min(buf.len() as u64)).unwrap_or(buf.len());

        let bs = u64::from(self.block_size());
        let bs_usize = self.block_size() as usize;
        let mut bytes_read = 0_usize;

        while bytes_read < to_read {
            let current_offset = offset + bytes_read as u64;
            let logical_block =
                u32::try_from(current_offset / bs).map_err(|_| Ext2Error::Corruption {
                    block: 0,
                    detail: "logical block number overflow".to_owned(),
                })?;
            let offset_in_block = (current_offset % bs) as usize;
            let remaining_in_block = bs_usize - offset_in_block;
            let chunk_size = remaining_in_block.min(to_read - bytes_read);

            match self.resolve_block(inode, logical_block)? {
                Some(phys) => {
                    let block = self.read_block(phys)?;
                    buf[bytes_read..bytes_read + chunk_size].copy_from_slice(
                        &block.as_slice()[offset_in_block..offset_in_block + chunk_size],
                    );
                }
                None => {
                    buf[bytes_read..bytes_read + chunk_size].fill(0);
                }
            }

            bytes_read += chunk_size;
        }

        Ok(bytes_read)
    }

    /// Read file data by inode number.
    ///
    /// Returns up to `size` bytes starting at `offset`, short only at end
    /// of file. Fails with [`Ext2Error::IsDirectory`] for directories.
    pub fn read_file(&self, ino: InodeNumber, offset: u64, size: u32) -> Result<Vec<u8>> {
        let inode = self.read_inode(ino)?;
        if inode.is_dir() {
            return Err(Ext2Error::IsDirectory);
        }
        if inode.is_special() {
            return Err(Ext2Error::Unsupported(
                "device, fifo, and socket inodes hold no data".to_owned(),
            ));
        }
        // A fast symlink's block slots hold target text, not pointers.
        if inode.is_fast_symlink() {
            return Err(Ext2Error::Unsupported(
                "fast symlink targets are read via read_symlink".to_owned(),
            ));
        }
        let mut buf = vec![0_u8; size as usize];
        let n = self.read_file_data(&inode, offset, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Stream a regular file's whole contents into `out`, zero-filling
    /// holes. Returns the number of bytes written, always the file size.
    pub fn copy_file_to(&self, ino: InodeNumber, out: &mut dyn std::io::Write) -> Result<u64> {
        let inode = self.read_inode(ino)?;
        if inode.is_dir() {
            return Err(Ext2Error::IsDirectory);
        }
        if !inode.is_regular() {
            return Err(Ext2Error::Unsupported(
                "can only stream regular files".to_owned(),
            ));
        }

        let zeroes = vec![0_u8; self.block_size() as usize];
        let mut written = 0_u64;
        self.walk_file_blocks(&inode, &mut |chunk: FileChunk<'_>| {
            match chunk {
                FileChunk::Data { data, .. } => {
                    out.write_all(data)?;
                    written += data.len() as u64;
                }
                FileChunk::Hole { mut len, .. } => {
                    while len > 0 {
                        let take = usize::try_from(len.min(zeroes.len() as u64)).unwrap_or(0);
                        out.write_all(&zeroes[..take])?;
                        len -= take as u64;
                        written += take as u64;
                    }
                }
            }
            Ok(())
        })?;
        Ok(written)
    }

    // Directory operations.

    /// Read all live entries of a directory inode, in block order.
    pub fn read_dir(&self, inode: &Ext2Inode) -> Result<Vec<Ext2DirEntry>> {
        if !inode.is_dir() {
            return Err(Ext2Error::NotDirectory);
        }

        let mut all_entries = Vec::new();
        self.for_each_dir_block(inode, |block_no, block| {
            let entries = parse_dir_block(block).map_err(|e| corruption_at(block_no, &e))?;
            all_entries.extend(entries);
            Ok(())
        })?;
        Ok(all_entries)
    }

    /// Invoke `visit` for every live entry of a directory inode without
    /// materializing the whole listing.
    pub fn for_each_entry(
        &self,
        inode: &Ext2Inode,
        mut visit: impl FnMut(Ext2DirEntryRef<'_>) -> Result<()>,
    ) -> Result<()> {
        if !inode.is_dir() {
            return Err(Ext2Error::NotDirectory);
        }
        self.for_each_dir_block(inode, |block_no, block| {
            for entry in iter_dir_block(block) {
                let entry = entry.map_err(|e| corruption_at(block_no, &e))?;
                visit(entry)?;
            }
            Ok(())
        })
    }

    /// Look up a single name in a directory inode.
    ///
    /// Returns `Ok(None)` when the directory is well-formed but does not
    /// contain the name.
    pub fn lookup_name(
        &self,
        dir_inode: &Ext2Inode,
        name: &[u8],
    ) -> Result<Option<Ext2DirEntry>> {
        if !dir_inode.is_dir() {
            return Err(Ext2Error::NotDirectory);
        }

        let mut found = None;
        self.for_each_dir_block(dir_inode, |block_no, block| {
            if found.is_none() {
                found = lookup_in_dir_block(block, name)
                    .map_err(|e| corruption_at(block_no, &e))?;
            }
            Ok(())
        })?;
        Ok(found)
    }

    /// Run `f` over each allocated data block of a directory. Hole blocks
    /// are skipped: a hole holds no records, and directories written by
    /// real ext2 implementations do not contain them anyway.
    fn for_each_dir_block(
        &self,
        inode: &Ext2Inode,
        mut f: impl FnMut(u64, &[u8]) -> Result<()>,
    ) -> Result<()> {
        let bs = u64::from(self.block_size());
        let num_blocks =
            u32::try_from(inode.size.div_ceil(bs)).map_err(|_| Ext2Error::Corruption {
                block: 0,
                detail: "directory block count overflow".to_owned(),
            })?;

        for lb in 0..num_blocks {
            if let Some(phys) = self.resolve_block(inode, lb)? {
                let block = self.read_block(phys)?;
                f(u64::from(phys.0), block.as_slice())?;
            }
        }
        Ok(())
    }

    // Path resolution.

    /// Resolve an absolute path to an inode number and parsed inode.
    ///
    /// Walks from the root directory (inode 2) one component at a time.
    /// `"/"` resolves to the root itself. Symlinks are not followed; a
    /// symlink component resolves to the symlink's own inode.
    pub fn resolve_path(&self, path: &str) -> Result<(InodeNumber, Ext2Inode)> {
        if !path.starts_with('/') {
            return Err(Ext2Error::InvalidArgument(format!(
                "path must be absolute: {path:?}"
            )));
        }

        let mut current_ino = InodeNumber::ROOT;
        let mut current_inode = self.read_inode(current_ino)?;

        for component in path.split('/').filter(|c| !c.is_empty()) {
            if !current_inode.is_dir() {
                return Err(Ext2Error::NotDirectory);
            }

            let entry = self
                .lookup_name(&current_inode, component.as_bytes())?
                .ok_or_else(|| Ext2Error::NotFound(component.to_owned()))?;

            current_ino = InodeNumber(entry.inode);
            current_inode = self.read_inode(current_ino)?;
        }

        Ok((current_ino, current_inode))
    }

    /// Resolve an absolute path to just the inode number.
    pub fn inode_number_by_path(&self, path: &str) -> Result<InodeNumber> {
        self.resolve_path(path).map(|(ino, _)| ino)
    }

    // Symlinks.

    /// Read the target of a symbolic link.
    ///
    /// Fast symlinks store the target inline in the inode's block slots;
    /// slow symlinks read it from data blocks.
    pub fn read_symlink(&self, inode: &Ext2Inode) -> Result<Vec<u8>> {
        if !inode.is_symlink() {
            return Err(Ext2Error::InvalidArgument("not a symlink".to_owned()));
        }
        let len = usize::try_from(inode.size).map_err(|_| Ext2Error::Corruption {
            block: 0,
            detail: "symlink size overflow".to_owned(),
        })?;

        if inode.is_fast_symlink() {
            let inline = inline_symlink_bytes(inode);
            if len > inline.len() {
                return Err(Ext2Error::Corruption {
                    block: 0,
                    detail: format!("fast symlink size {len} exceeds inline capacity"),
                });
            }
            return Ok(inline[..len].to_vec());
        }

        let mut buf = vec![0_u8; len];
        self.read_file_data(inode, 0, &mut buf)?;
        Ok(buf)
    }
}

/// Decode one little-endian pointer out of an indirect block.
fn pointer_at(block: &[u8], index: u32) -> Result<u32> {
    let start = usize::try_from(index)
        .ok()
        .and_then(|i| i.checked_mul(4))
        .ok_or_else(|| Ext2Error::InvalidArgument("pointer index overflow".to_owned()))?;
    let bytes: [u8; 4] = block
        .get(start..start + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Ext2Error::Corruption {
            block: 0,
            detail: format!("indirect pointer index {index} past block end"),
        })?;
    Ok(u32::from_le_bytes(bytes))
}

fn clip_index(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// The 60 bytes of `i_block`, reassembled in on-disk order for inline
/// symlink targets.
fn inline_symlink_bytes(inode: &Ext2Inode) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(inode.block.len() * 4);
    for slot in &inode.block {
        bytes.extend_from_slice(&slot.to_le_bytes());
    }
    bytes
}

/// Superblock problems at open time are filesystem-level, not corruption:
/// the image as a whole is not usable as ext2.
fn open_error(e: ParseError) -> Ext2Error {
    Ext2Error::InvalidFilesystem(e.to_string())
}

/// Decode failures below the superblock indicate damage localized to the
/// block being decoded.
fn corruption_at(block: u64, e: &ParseError) -> Ext2Error {
    Ext2Error::Corruption {
        block,
        detail: e.to_string(),
    }
}

// Stat-style attributes.

/// File type as reported by [`InodeAttr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    RegularFile,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

/// Inode attributes, analogous to POSIX `struct stat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InodeAttr {
    pub ino: InodeNumber,
    pub size: u64,
    /// Allocated space in 512-byte sectors.
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub kind: FileType,
    /// POSIX permission bits (lower 12 bits of mode).
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
}

fn inode_to_attr(ino: InodeNumber, inode: &Ext2Inode) -> Result<InodeAttr> {
    let kind = match inode.file_type_mode() {
        S_IFREG => FileType::RegularFile,
        S_IFDIR => FileType::Directory,
        S_IFLNK => FileType::Symlink,
        S_IFBLK => FileType::BlockDevice,
        S_IFCHR => FileType::CharDevice,
        S_IFIFO => FileType::Fifo,
        S_IFSOCK => FileType::Socket,
        other => {
            return Err(Ext2Error::Corruption {
                block: 0,
                detail: format!("inode {} has invalid mode type {other:#o}", ino.0),
            });
        }
    };

    Ok(InodeAttr {
        ino,
        size: inode.size,
        blocks: u64::from(inode.blocks_sectors),
        atime: epoch_time(inode.atime),
        mtime: epoch_time(inode.mtime),
        ctime: epoch_time(inode.ctime),
        kind,
        perm: inode.permission_bits(),
        nlink: u32::from(inode.links_count),
        uid: u32::from(inode.uid),
        gid: u32::from(inode.gid),
    })
}

fn epoch_time(secs: u32) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(u64::from(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rext2_harness::ImageBuilder;
    use rext2_types::{EXT2_DIND_BLOCK, EXT2_IND_BLOCK, EXT2_TIND_BLOCK};

    /// Minimal session over an empty image; 1 KiB blocks, 256-pointer
    /// fan-out.
    fn session() -> Ext2Fs {
        let mut builder = ImageBuilder::new(64).expect("builder");
        Ext2Fs::from_memory(builder.build().expect("build")).expect("open")
    }

    #[test]
    fn direct_blocks_have_empty_paths() {
        let fs = session();
        assert_eq!(fs.indirection_path(0).expect("path"), (0, vec![]));
        assert_eq!(fs.indirection_path(11).expect("path"), (11, vec![]));
    }

    #[test]
    fn single_indirect_path() {
        let fs = session();
        assert_eq!(
            fs.indirection_path(12).expect("path"),
            (EXT2_IND_BLOCK, vec![0])
        );
        assert_eq!(
            fs.indirection_path(12 + 255).expect("path"),
            (EXT2_IND_BLOCK, vec![255])
        );
    }

    #[test]
    fn double_indirect_path() {
        let fs = session();
        assert_eq!(
            fs.indirection_path(12 + 256).expect("path"),
            (EXT2_DIND_BLOCK, vec![0, 0])
        );
        assert_eq!(
            fs.indirection_path(12 + 256 + 256 * 200 + 7).expect("path"),
            (EXT2_DIND_BLOCK, vec![200, 7])
        );
    }

    #[test]
    fn triple_indirect_path_and_limit() {
        let fs = session();
        let base = 12 + 256 + 256 * 256;
        assert_eq!(
            fs.indirection_path(base).expect("path"),
            (EXT2_TIND_BLOCK, vec![0, 0, 0])
        );
        assert_eq!(
            fs.indirection_path(base + 256 * 256 * 2 + 256 * 3 + 4)
                .expect("path"),
            (EXT2_TIND_BLOCK, vec![2, 3, 4])
        );

        let beyond = base + 256 * 256 * 256;
        assert!(matches!(
            fs.indirection_path(beyond).unwrap_err(),
            Ext2Error::InvalidArgument(_)
        ));
    }

    #[test]
    fn pointer_at_reads_little_endian_slots() {
        let mut block = vec![0_u8; 1024];
        block[8..12].copy_from_slice(&0x0102_0304_u32.to_le_bytes());
        assert_eq!(pointer_at(&block, 2).expect("pointer"), 0x0102_0304);
        assert!(pointer_at(&block, 256).is_err());
    }
}
