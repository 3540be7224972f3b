use rext2_types::{
    EXT2_GOOD_OLD_INODE_SIZE, EXT2_N_BLOCKS, ParseError, S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO,
    S_IFLNK, S_IFMT, S_IFREG, S_IFSOCK, read_le_u16, read_le_u32,
};
use serde::{Deserialize, Serialize};

/// Parsed ext2 inode.
///
/// Only the 128-byte prefix is decoded; larger on-disk records (rev 1 with
/// `s_inode_size > 128`) carry extra fields a read-only accessor does not
/// need, so callers may pass exactly 128 bytes regardless of record size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ext2Inode {
    pub mode: u16,
    pub uid: u16,
    pub gid: u16,
    pub links_count: u16,
    pub size: u64,
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub dtime: u32,
    /// Allocated space in 512-byte sectors, not filesystem blocks.
    pub blocks_sectors: u32,
    pub flags: u32,
    /// The block map: 12 direct pointers, then single, double, and triple
    /// indirect. A zero entry is a hole.
    pub block: [u32; EXT2_N_BLOCKS],
    pub generation: u32,
    pub file_acl: u32,
}

impl Ext2Inode {
    pub fn parse_from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let needed = usize::from(EXT2_GOOD_OLD_INODE_SIZE);
        if bytes.len() < needed {
            return Err(ParseError::InsufficientData {
                needed,
                offset: 0,
                actual: bytes.len(),
            });
        }

        let mode = read_le_u16(bytes, 0x00)?;
        let size_lo = read_le_u32(bytes, 0x04)?;
        let dir_acl = read_le_u32(bytes, 0x6C)?;

        // i_dir_acl doubles as the high 32 bits of the size, but only for
        // regular files. Directories never exceed 32 bits.
        let size = if mode & S_IFMT == S_IFREG {
            u64::from(dir_acl) << 32 | u64::from(size_lo)
        } else {
            u64::from(size_lo)
        };

        let mut block = [0_u32; EXT2_N_BLOCKS];
        for (i, slot) in block.iter_mut().enumerate() {
            *slot = read_le_u32(bytes, 0x28 + i * 4)?;
        }

        Ok(Self {
            mode,
            uid: read_le_u16(bytes, 0x02)?,
            gid: read_le_u16(bytes, 0x18)?,
            links_count: read_le_u16(bytes, 0x1A)?,
            size,
            atime: read_le_u32(bytes, 0x08)?,
            ctime: read_le_u32(bytes, 0x0C)?,
            mtime: read_le_u32(bytes, 0x10)?,
            dtime: read_le_u32(bytes, 0x14)?,
            blocks_sectors: read_le_u32(bytes, 0x1C)?,
            flags: read_le_u32(bytes, 0x20)?,
            block,
            generation: read_le_u32(bytes, 0x64)?,
            file_acl: read_le_u32(bytes, 0x68)?,
        })
    }

    #[must_use]
    pub fn file_type_mode(&self) -> u16 {
        self.mode & S_IFMT
    }

    #[must_use]
    pub fn permission_bits(&self) -> u16 {
        self.mode & 0o7777
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.file_type_mode() == S_IFDIR
    }

    #[must_use]
    pub fn is_regular(&self) -> bool {
        self.file_type_mode() == S_IFREG
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.file_type_mode() == S_IFLNK
    }

    /// True for types whose `i_block` holds device numbers or nothing at
    /// all rather than a block map.
    #[must_use]
    pub fn is_special(&self) -> bool {
        matches!(
            self.file_type_mode(),
            S_IFCHR | S_IFBLK | S_IFIFO | S_IFSOCK
        )
    }

    /// Fast symlinks store the target directly in `i_block`; the heuristic
    /// is a symlink with no allocated blocks.
    #[must_use]
    pub fn is_fast_symlink(&self) -> bool {
        self.is_symlink() && self.blocks_sectors == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_inode_bytes() -> Vec<u8> {
        let mut bytes = vec![0_u8; 128];
        bytes[0x00..0x02].copy_from_slice(&(S_IFREG | 0o644).to_le_bytes());
        bytes[0x02..0x04].copy_from_slice(&1000_u16.to_le_bytes()); // uid
        bytes[0x04..0x08].copy_from_slice(&5000_u32.to_le_bytes()); // size lo
        bytes[0x18..0x1A].copy_from_slice(&1000_u16.to_le_bytes()); // gid
        bytes[0x1A..0x1C].copy_from_slice(&1_u16.to_le_bytes()); // links
        bytes[0x1C..0x20].copy_from_slice(&10_u32.to_le_bytes()); // sectors
        for i in 0..EXT2_N_BLOCKS {
            let off = 0x28 + i * 4;
            bytes[off..off + 4].copy_from_slice(&(100 + i as u32).to_le_bytes());
        }
        bytes
    }

    #[test]
    fn parses_regular_file_inode() {
        let ino = Ext2Inode::parse_from_bytes(&sample_inode_bytes()).expect("parse");
        assert!(ino.is_regular());
        assert!(!ino.is_dir());
        assert_eq!(ino.permission_bits(), 0o644);
        assert_eq!(ino.size, 5000);
        assert_eq!(ino.uid, 1000);
        assert_eq!(ino.links_count, 1);
        assert_eq!(ino.block[0], 100);
        assert_eq!(ino.block[14], 114);
    }

    #[test]
    fn regular_file_size_uses_dir_acl_high_bits() {
        let mut bytes = sample_inode_bytes();
        bytes[0x6C..0x70].copy_from_slice(&1_u32.to_le_bytes());
        let ino = Ext2Inode::parse_from_bytes(&bytes).expect("parse");
        assert_eq!(ino.size, (1_u64 << 32) + 5000);
    }

    #[test]
    fn directory_size_ignores_dir_acl() {
        let mut bytes = sample_inode_bytes();
        bytes[0x00..0x02].copy_from_slice(&(S_IFDIR | 0o755).to_le_bytes());
        bytes[0x6C..0x70].copy_from_slice(&1_u32.to_le_bytes());
        let ino = Ext2Inode::parse_from_bytes(&bytes).expect("parse");
        assert!(ino.is_dir());
        assert_eq!(ino.size, 5000);
    }

    #[test]
    fn fast_symlink_detection() {
        let mut bytes = sample_inode_bytes();
        bytes[0x00..0x02].copy_from_slice(&(S_IFLNK | 0o777).to_le_bytes());
        bytes[0x1C..0x20].copy_from_slice(&0_u32.to_le_bytes());
        let ino = Ext2Inode::parse_from_bytes(&bytes).expect("parse");
        assert!(ino.is_fast_symlink());
    }

    #[test]
    fn rejects_short_record() {
        let err = Ext2Inode::parse_from_bytes(&[0_u8; 64]).unwrap_err();
        assert!(matches!(err, ParseError::InsufficientData { .. }));
    }
}
