#![forbid(unsafe_code)]
//! ext2 on-disk structure decoding.
//!
//! Pure byte-level parsers with no I/O: callers read the relevant region
//! from the image and hand it here. All multi-byte fields are little-endian.

mod dirent;
mod inode;
mod superblock;

pub use dirent::{
    DirBlockIter, EXT2_NAME_MAX, Ext2DirEntry, Ext2DirEntryRef, Ext2FileType, iter_dir_block,
    lookup_in_dir_block, parse_dir_block,
};
pub use inode::Ext2Inode;
pub use superblock::{Ext2GroupDesc, Ext2Superblock, InodeLocation};
