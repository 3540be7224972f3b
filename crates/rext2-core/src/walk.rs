//! Sequential block-tree walk over an inode's data.
//!
//! The walk visits a file's contents in logical order, covering the 12
//! direct slots and then the single, double, and triple indirect trees.
//! Each visited chunk is either real data or a hole; holes are reported
//! without any I/O, and a zero pointer high in an indirect tree skips its
//! entire span in one step.

use crate::Ext2Fs;
use rext2_error::{Ext2Error, Result};
use rext2_ondisk::Ext2Inode;
use rext2_types::{
    BlockNumber, EXT2_DIND_BLOCK, EXT2_IND_BLOCK, EXT2_NDIR_BLOCKS, EXT2_TIND_BLOCK,
};

/// One contiguous span of a file's contents, in logical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChunk<'a> {
    /// Bytes backed by an allocated block. At most one block long, and
    /// shorter in the file's final block.
    Data { offset: u64, data: &'a [u8] },
    /// One logical block with no backing storage, reading as zeroes. At
    /// most one block long, like its data counterpart.
    Hole { offset: u64, len: u64 },
}

impl FileChunk<'_> {
    /// Logical file offset where this chunk starts.
    #[must_use]
    pub fn offset(&self) -> u64 {
        match self {
            Self::Data { offset, .. } | Self::Hole { offset, .. } => *offset,
        }
    }

    /// Chunk length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            Self::Data { data, .. } => data.len() as u64,
            Self::Hole { len, .. } => *len,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_hole(&self) -> bool {
        matches!(self, Self::Hole { .. })
    }
}

/// Receiver for the chunks of a block-tree walk.
///
/// An `Err` return aborts the walk and propagates to the caller.
pub trait ChunkVisitor {
    fn visit(&mut self, chunk: FileChunk<'_>) -> Result<()>;
}

impl<F> ChunkVisitor for F
where
    F: FnMut(FileChunk<'_>) -> Result<()>,
{
    fn visit(&mut self, chunk: FileChunk<'_>) -> Result<()> {
        self(chunk)
    }
}

/// Walk progress. `remaining` counts down from the file size; chunks are
/// clipped against it so the walk never reports past end of file.
struct WalkState<'v> {
    visitor: &'v mut dyn ChunkVisitor,
    offset: u64,
    remaining: u64,
}

impl Ext2Fs {
    /// Walk every logical block of `inode` in order, invoking `visitor`
    /// once per chunk. Returns the number of bytes covered, always the
    /// file size unless the visitor aborts.
    ///
    /// Recursion depth is bounded by the three indirect levels of the
    /// on-disk format; no walk descends further regardless of image
    /// contents.
    pub fn walk_file_blocks(
        &self,
        inode: &Ext2Inode,
        visitor: &mut dyn ChunkVisitor,
    ) -> Result<u64> {
        if inode.is_special() {
            return Err(Ext2Error::Unsupported(
                "device, fifo, and socket inodes hold no block map".to_owned(),
            ));
        }
        if inode.is_fast_symlink() {
            return Err(Ext2Error::Unsupported(
                "fast symlink stores its target inline, not in blocks".to_owned(),
            ));
        }

        let mut state = WalkState {
            visitor,
            offset: 0,
            remaining: inode.size,
        };

        for slot in &inode.block[..EXT2_NDIR_BLOCKS] {
            self.walk_pointer(*slot, 0, &mut state)?;
        }
        self.walk_pointer(inode.block[EXT2_IND_BLOCK], 1, &mut state)?;
        self.walk_pointer(inode.block[EXT2_DIND_BLOCK], 2, &mut state)?;
        self.walk_pointer(inode.block[EXT2_TIND_BLOCK], 3, &mut state)?;

        Ok(state.offset)
    }

    /// Visit the span covered by one block pointer at the given indirect
    /// level. Level 0 is a data block; higher levels are pointer blocks
    /// whose children sit one level lower.
    fn walk_pointer(&self, ptr: u32, level: u8, state: &mut WalkState<'_>) -> Result<()> {
        if state.remaining == 0 {
            return Ok(());
        }

        if ptr == 0 {
            // The whole subtree is unallocated: report its logical blocks
            // as holes, one chunk per block, with no I/O at all.
            let bs = u64::from(self.block_size());
            let mut span = self.subtree_span(level).min(state.remaining);
            while span > 0 {
                let len = bs.min(span);
                state.visitor.visit(FileChunk::Hole {
                    offset: state.offset,
                    len,
                })?;
                state.offset += len;
                state.remaining -= len;
                span -= len;
            }
            return Ok(());
        }

        self.check_block_pointer(ptr)?;
        let block = self.read_block(BlockNumber(ptr))?;

        if level == 0 {
            let take = u64::from(self.block_size()).min(state.remaining);
            let take_usize = usize::try_from(take).unwrap_or(block.as_slice().len());
            state.visitor.visit(FileChunk::Data {
                offset: state.offset,
                data: &block.as_slice()[..take_usize],
            })?;
            state.offset += take;
            state.remaining -= take;
            return Ok(());
        }

        for pointer_bytes in block.as_slice().chunks_exact(4) {
            if state.remaining == 0 {
                break;
            }
            let child = u32::from_le_bytes(
                pointer_bytes
                    .try_into()
                    .map_err(|_| Ext2Error::Corruption {
                        block: u64::from(ptr),
                        detail: "indirect block not pointer-aligned".to_owned(),
                    })?,
            );
            self.walk_pointer(child, level - 1, state)?;
        }
        Ok(())
    }

    /// Bytes a pointer at `level` covers when fully expanded: one block
    /// at level 0, multiplied by the pointer fan-out per indirect level.
    fn subtree_span(&self, level: u8) -> u64 {
        let fanout = u64::from(self.geometry().pointers_per_block);
        u64::from(self.block_size()) * fanout.pow(u32::from(level))
    }
}
