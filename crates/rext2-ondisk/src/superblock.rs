use rext2_types::{
    BlockNumber, BlockSize, EXT2_GOOD_OLD_FIRST_INO, EXT2_GOOD_OLD_INODE_SIZE, EXT2_GOOD_OLD_REV,
    EXT2_GROUP_DESC_SIZE, EXT2_SUPER_MAGIC, EXT2_SUPERBLOCK_OFFSET, EXT2_SUPERBLOCK_SIZE,
    GroupNumber, InodeNumber, ParseError, ext2_block_size_from_log, inode_index_in_group,
    inode_to_group, read_fixed, read_le_u16, read_le_u32, trim_nul_padded,
};
use serde::{Deserialize, Serialize};

/// Parsed ext2 superblock.
///
/// Read once at session open and immutable thereafter; the session owns it
/// for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ext2Superblock {
    // Core geometry.
    pub inodes_count: u32,
    pub blocks_count: u32,
    pub free_blocks_count: u32,
    pub free_inodes_count: u32,
    pub first_data_block: u32,
    pub block_size: u32,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,

    // Revision-dependent inode layout.
    pub rev_level: u32,
    pub minor_rev_level: u16,
    pub first_ino: u32,
    pub inode_size: u16,

    // Identity and state.
    pub magic: u16,
    pub state: u16,
    pub errors: u16,
    pub mnt_count: u16,
    pub max_mnt_count: u16,
    pub creator_os: u32,
    pub uuid: [u8; 16],
    pub volume_name: String,
    pub last_mounted: String,

    // Timestamps.
    pub mtime: u32,
    pub wtime: u32,
    pub lastcheck: u32,

    // Feature flags, advisory for a read-only accessor.
    pub feature_compat: u32,
    pub feature_incompat: u32,
    pub feature_ro_compat: u32,
}

impl Ext2Superblock {
    /// Parse an ext2 superblock from a 1024-byte superblock region.
    pub fn parse_superblock_region(region: &[u8]) -> Result<Self, ParseError> {
        if region.len() < EXT2_SUPERBLOCK_SIZE {
            return Err(ParseError::InsufficientData {
                needed: EXT2_SUPERBLOCK_SIZE,
                offset: 0,
                actual: region.len(),
            });
        }

        let magic = read_le_u16(region, 0x38)?;
        if magic != EXT2_SUPER_MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: u64::from(EXT2_SUPER_MAGIC),
                actual: u64::from(magic),
            });
        }

        let log_block_size = read_le_u32(region, 0x18)?;
        let Some(block_size) = ext2_block_size_from_log(log_block_size) else {
            return Err(ParseError::InvalidField {
                field: "s_log_block_size",
                reason: "invalid shift",
            });
        };
        BlockSize::new(block_size)?;

        let rev_level = read_le_u32(region, 0x4C)?;
        // Revision 0 predates the dynamic fields at 0x54/0x58; the record
        // size and first inode are fixed by the format.
        let (first_ino, inode_size) = if rev_level == EXT2_GOOD_OLD_REV {
            (EXT2_GOOD_OLD_FIRST_INO, EXT2_GOOD_OLD_INODE_SIZE)
        } else {
            (read_le_u32(region, 0x54)?, read_le_u16(region, 0x58)?)
        };

        Ok(Self {
            inodes_count: read_le_u32(region, 0x00)?,
            blocks_count: read_le_u32(region, 0x04)?,
            free_blocks_count: read_le_u32(region, 0x0C)?,
            free_inodes_count: read_le_u32(region, 0x10)?,
            first_data_block: read_le_u32(region, 0x14)?,
            block_size,
            blocks_per_group: read_le_u32(region, 0x20)?,
            inodes_per_group: read_le_u32(region, 0x28)?,

            rev_level,
            minor_rev_level: read_le_u16(region, 0x3E)?,
            first_ino,
            inode_size,

            magic,
            state: read_le_u16(region, 0x3A)?,
            errors: read_le_u16(region, 0x3C)?,
            mnt_count: read_le_u16(region, 0x34)?,
            max_mnt_count: read_le_u16(region, 0x36)?,
            creator_os: read_le_u32(region, 0x48)?,
            uuid: read_fixed::<16>(region, 0x68)?,
            volume_name: trim_nul_padded(&read_fixed::<16>(region, 0x78)?),
            last_mounted: trim_nul_padded(&read_fixed::<64>(region, 0x88)?),

            mtime: read_le_u32(region, 0x2C)?,
            wtime: read_le_u32(region, 0x30)?,
            lastcheck: read_le_u32(region, 0x40)?,

            feature_compat: read_le_u32(region, 0x5C)?,
            feature_incompat: read_le_u32(region, 0x60)?,
            feature_ro_compat: read_le_u32(region, 0x64)?,
        })
    }

    /// Parse an ext2 superblock from a full disk image.
    pub fn parse_from_image(image: &[u8]) -> Result<Self, ParseError> {
        let end = EXT2_SUPERBLOCK_OFFSET
            .checked_add(EXT2_SUPERBLOCK_SIZE)
            .ok_or(ParseError::InvalidField {
                field: "superblock_offset",
                reason: "overflow",
            })?;

        if image.len() < end {
            return Err(ParseError::InsufficientData {
                needed: EXT2_SUPERBLOCK_SIZE,
                offset: EXT2_SUPERBLOCK_OFFSET,
                actual: image.len().saturating_sub(EXT2_SUPERBLOCK_OFFSET),
            });
        }

        Self::parse_superblock_region(&image[EXT2_SUPERBLOCK_OFFSET..end])
    }

    /// Validate the geometry an accessor session depends on.
    pub fn validate_geometry(&self) -> Result<(), ParseError> {
        if self.inodes_per_group == 0 {
            return Err(ParseError::InvalidField {
                field: "s_inodes_per_group",
                reason: "cannot be zero",
            });
        }
        if self.blocks_per_group == 0 {
            return Err(ParseError::InvalidField {
                field: "s_blocks_per_group",
                reason: "cannot be zero",
            });
        }
        if self.inode_size < EXT2_GOOD_OLD_INODE_SIZE {
            return Err(ParseError::InvalidField {
                field: "s_inode_size",
                reason: "inode record smaller than 128 bytes",
            });
        }
        if u32::from(self.inode_size) > self.block_size {
            return Err(ParseError::InvalidField {
                field: "s_inode_size",
                reason: "inode record larger than a block",
            });
        }
        // first_data_block is 1 for 1K blocks and 0 otherwise.
        let expected_first = u32::from(self.block_size == 1024);
        if self.first_data_block != expected_first {
            return Err(ParseError::InvalidField {
                field: "s_first_data_block",
                reason: "inconsistent with block size",
            });
        }
        Ok(())
    }

    /// Validated block size wrapper.
    pub fn block_size_checked(&self) -> Result<BlockSize, ParseError> {
        BlockSize::new(self.block_size)
    }

    /// Number of block groups in this filesystem.
    #[must_use]
    pub fn groups_count(&self) -> u32 {
        if self.blocks_per_group == 0 {
            return 0;
        }
        let data_blocks = self.blocks_count.saturating_sub(self.first_data_block);
        data_blocks.div_ceil(self.blocks_per_group)
    }

    /// First block of the group descriptor table: the block after the
    /// superblock. Block 1 when the block size exceeds 1024, else block 2.
    #[must_use]
    pub fn group_desc_table_block(&self) -> BlockNumber {
        if self.block_size > 1024 {
            BlockNumber(1)
        } else {
            BlockNumber(2)
        }
    }

    /// Byte offset of a group's descriptor record, `None` on overflow.
    #[must_use]
    pub fn group_desc_offset(&self, group: GroupNumber) -> Option<u64> {
        let table_start = u64::from(self.group_desc_table_block().0)
            .checked_mul(u64::from(self.block_size))?;
        let record_offset =
            u64::from(group.0).checked_mul(EXT2_GROUP_DESC_SIZE.try_into().ok()?)?;
        table_start.checked_add(record_offset)
    }

    /// Locate an inode: which group holds it and at which index in that
    /// group's inode table.
    pub fn locate_inode(&self, ino: InodeNumber) -> Result<InodeLocation, ParseError> {
        if ino.0 == 0 || ino.0 > self.inodes_count {
            return Err(ParseError::InvalidField {
                field: "inode_number",
                reason: "out of range",
            });
        }
        Ok(InodeLocation {
            group: inode_to_group(ino, self.inodes_per_group),
            index: inode_index_in_group(ino, self.inodes_per_group),
        })
    }

    /// Absolute byte offset of an inode record, given its location and the
    /// group's inode table start block.
    pub fn inode_device_offset(
        &self,
        loc: &InodeLocation,
        inode_table: BlockNumber,
    ) -> Result<u64, ParseError> {
        let table_start = u64::from(inode_table.0)
            .checked_mul(u64::from(self.block_size))
            .ok_or(ParseError::IntegerConversion {
                field: "inode_table_offset",
            })?;
        let record_offset = u64::from(loc.index)
            .checked_mul(u64::from(self.inode_size))
            .ok_or(ParseError::IntegerConversion {
                field: "inode_record_offset",
            })?;
        table_start
            .checked_add(record_offset)
            .ok_or(ParseError::IntegerConversion {
                field: "inode_device_offset",
            })
    }
}

/// Which group an inode lives in, and its index within that group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeLocation {
    pub group: GroupNumber,
    pub index: u32,
}

/// Parsed ext2 block group descriptor (32-byte on-disk record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ext2GroupDesc {
    pub block_bitmap: BlockNumber,
    pub inode_bitmap: BlockNumber,
    pub inode_table: BlockNumber,
    pub free_blocks_count: u16,
    pub free_inodes_count: u16,
    pub used_dirs_count: u16,
}

impl Ext2GroupDesc {
    pub fn parse_from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < EXT2_GROUP_DESC_SIZE {
            return Err(ParseError::InsufficientData {
                needed: EXT2_GROUP_DESC_SIZE,
                offset: 0,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            block_bitmap: BlockNumber(read_le_u32(bytes, 0x00)?),
            inode_bitmap: BlockNumber(read_le_u32(bytes, 0x04)?),
            inode_table: BlockNumber(read_le_u32(bytes, 0x08)?),
            free_blocks_count: read_le_u16(bytes, 0x0C)?,
            free_inodes_count: read_le_u16(bytes, 0x0E)?,
            used_dirs_count: read_le_u16(bytes, 0x10)?,
        })
    }
}
