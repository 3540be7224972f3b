use rext2_types::{ParseError, ensure_slice, read_le_u16, read_le_u32};
use serde::{Deserialize, Serialize};

/// Minimum directory record size: the 8-byte header with an empty name.
const DIR_ENTRY_HEADER_SIZE: usize = 8;

/// Longest permitted file name, per the on-disk u8 name length.
pub const EXT2_NAME_MAX: usize = 255;

/// File type tag carried in each directory entry.
///
/// The tag is a hint duplicated from the inode mode; an unrecognized value
/// decodes to `Unknown` rather than failing, since old rev-0 images wrote
/// zero here for every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ext2FileType {
    Unknown,
    Regular,
    Directory,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Symlink,
}

impl Ext2FileType {
    #[must_use]
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Regular,
            2 => Self::Directory,
            3 => Self::CharDevice,
            4 => Self::BlockDevice,
            5 => Self::Fifo,
            6 => Self::Socket,
            7 => Self::Symlink,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Regular => "file",
            Self::Directory => "dir",
            Self::CharDevice => "chardev",
            Self::BlockDevice => "blockdev",
            Self::Fifo => "fifo",
            Self::Socket => "socket",
            Self::Symlink => "symlink",
        }
    }
}

/// Borrowed view of one directory entry inside a directory block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ext2DirEntryRef<'a> {
    pub inode: u32,
    pub rec_len: u16,
    pub file_type: Ext2FileType,
    pub name: &'a [u8],
}

impl Ext2DirEntryRef<'_> {
    #[must_use]
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(self.name).into_owned()
    }

    #[must_use]
    pub fn to_owned_entry(&self) -> Ext2DirEntry {
        Ext2DirEntry {
            inode: self.inode,
            file_type: self.file_type,
            name: self.name_lossy(),
        }
    }
}

/// Owned directory entry, for callers that outlive the block buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ext2DirEntry {
    pub inode: u32,
    pub file_type: Ext2FileType,
    pub name: String,
}

/// Zero-copy iterator over the live entries of one directory block.
///
/// Records with `inode == 0` are deleted slots still holding their space in
/// the record chain; the iterator steps over them silently. Structural
/// damage (a record length below the header size, misaligned, or a name
/// running past its record) surfaces as an `Err` item and ends iteration.
pub struct DirBlockIter<'a> {
    block: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> DirBlockIter<'a> {
    #[must_use]
    pub fn new(block: &'a [u8]) -> Self {
        Self {
            block,
            offset: 0,
            failed: false,
        }
    }

    fn parse_at(&self, offset: usize) -> Result<(Ext2DirEntryRef<'a>, usize), ParseError> {
        let rec_len = usize::from(read_le_u16(self.block, offset + 4)?);
        if rec_len < DIR_ENTRY_HEADER_SIZE || rec_len % 4 != 0 {
            return Err(ParseError::InvalidField {
                field: "rec_len",
                reason: "below header size or misaligned",
            });
        }
        let Some(rec_end) = offset.checked_add(rec_len) else {
            return Err(ParseError::InvalidField {
                field: "rec_len",
                reason: "offset overflow",
            });
        };
        if rec_end > self.block.len() {
            return Err(ParseError::InvalidField {
                field: "rec_len",
                reason: "record runs past block end",
            });
        }

        let name_len = usize::from(self.block[offset + 6]);
        if DIR_ENTRY_HEADER_SIZE + name_len > rec_len {
            return Err(ParseError::InvalidField {
                field: "name_len",
                reason: "name runs past record end",
            });
        }

        let entry = Ext2DirEntryRef {
            inode: read_le_u32(self.block, offset)?,
            rec_len: rec_len as u16,
            file_type: Ext2FileType::from_raw(self.block[offset + 7]),
            name: ensure_slice(self.block, offset + DIR_ENTRY_HEADER_SIZE, name_len)?,
        };
        Ok((entry, rec_end))
    }
}

impl<'a> Iterator for DirBlockIter<'a> {
    type Item = Result<Ext2DirEntryRef<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while self.offset + DIR_ENTRY_HEADER_SIZE <= self.block.len() {
            match self.parse_at(self.offset) {
                Ok((entry, next_offset)) => {
                    self.offset = next_offset;
                    if entry.inode == 0 {
                        continue;
                    }
                    return Some(Ok(entry));
                }
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

/// Iterate the live entries of one directory block.
#[must_use]
pub fn iter_dir_block(block: &[u8]) -> DirBlockIter<'_> {
    DirBlockIter::new(block)
}

/// Decode every live entry of a directory block into owned entries.
pub fn parse_dir_block(block: &[u8]) -> Result<Vec<Ext2DirEntry>, ParseError> {
    iter_dir_block(block)
        .map(|entry| entry.map(|e| e.to_owned_entry()))
        .collect()
}

/// Look up `name` within one directory block. Returns `Ok(None)` when the
/// block is well-formed but does not contain the name.
pub fn lookup_in_dir_block(block: &[u8], name: &[u8]) -> Result<Option<Ext2DirEntry>, ParseError> {
    for entry in iter_dir_block(block) {
        let entry = entry?;
        if entry.name == name {
            return Ok(Some(entry.to_owned_entry()));
        }
    }
    Ok(None)
}
