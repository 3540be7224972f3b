//! In-memory ext2 image builder.
//!
//! Builds a single-group filesystem with 1 KiB blocks: boot block, then
//! superblock (block 1), group descriptor table (block 2), block and
//! inode bitmaps (3, 4), inode table (5..), then data. Files may be
//! sparse; only the blocks a segment touches are allocated, with indirect
//! pointer blocks created on demand, so a walk over the result sees real
//! holes at every indirect level.

use anyhow::{Context, Result, bail, ensure};
use rext2_types::{
    EXT2_DIND_BLOCK, EXT2_IND_BLOCK, EXT2_N_BLOCKS, EXT2_NDIR_BLOCKS, EXT2_SUPER_MAGIC,
    EXT2_TIND_BLOCK, S_IFDIR, S_IFLNK, S_IFMT, S_IFREG,
};
use std::collections::BTreeMap;

const BLOCK_SIZE: u32 = 1024;
const INODE_SIZE: u32 = 128;
/// Pointer fan-out of a 1 KiB indirect block.
const PPB: u64 = 256;

const ROOT_INO: u32 = 2;
const FIRST_INO: u32 = 11;

const GROUP_DESC_BLOCK: u32 = 2;
const BLOCK_BITMAP_BLOCK: u32 = 3;
const INODE_BITMAP_BLOCK: u32 = 4;
const INODE_TABLE_BLOCK: u32 = 5;

/// One name in a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntrySpec {
    pub name: String,
    pub ino: u32,
    pub file_type: u8,
}

impl DirEntrySpec {
    #[must_use]
    pub fn file(name: &str, ino: u32) -> Self {
        Self {
            name: name.to_owned(),
            ino,
            file_type: 1,
        }
    }

    #[must_use]
    pub fn dir(name: &str, ino: u32) -> Self {
        Self {
            name: name.to_owned(),
            ino,
            file_type: 2,
        }
    }

    #[must_use]
    pub fn symlink(name: &str, ino: u32) -> Self {
        Self {
            name: name.to_owned(),
            ino,
            file_type: 7,
        }
    }
}

#[derive(Debug, Clone)]
struct InodeSpec {
    mode: u16,
    links_count: u16,
    size: u64,
    sectors: u32,
    block: [u32; EXT2_N_BLOCKS],
}

/// Builder for complete single-group ext2 images.
#[derive(Debug)]
pub struct ImageBuilder {
    blocks_count: u32,
    inodes_count: u32,
    volume_name: String,
    inodes: BTreeMap<u32, InodeSpec>,
    blocks: BTreeMap<u32, Vec<u8>>,
    root_entries: Vec<DirEntrySpec>,
    next_block: u32,
    next_ino: u32,
}

impl ImageBuilder {
    /// Start an image of `blocks_count` 1 KiB blocks with a 64-inode table.
    pub fn new(blocks_count: u32) -> Result<Self> {
        let inodes_count = 64;
        let table_blocks = inodes_count * INODE_SIZE / BLOCK_SIZE;
        let first_free = INODE_TABLE_BLOCK + table_blocks;
        ensure!(
            blocks_count > first_free,
            "blocks_count {blocks_count} leaves no data blocks (metadata ends at {first_free})"
        );

        Ok(Self {
            blocks_count,
            inodes_count,
            volume_name: "rext2-test".to_owned(),
            inodes: BTreeMap::new(),
            blocks: BTreeMap::new(),
            root_entries: Vec::new(),
            next_block: first_free,
            next_ino: FIRST_INO,
        })
    }

    pub fn set_volume_name(&mut self, name: &str) {
        self.volume_name = name.to_owned();
    }

    /// Add an entry to the root directory listing.
    pub fn root_entry(&mut self, entry: DirEntrySpec) {
        self.root_entries.push(entry);
    }

    /// Add a fully-allocated regular file.
    pub fn add_file(&mut self, data: &[u8]) -> Result<u32> {
        self.add_sparse_file(data.len() as u64, &[(0, data)])
    }

    /// Add a regular file of `size` bytes where only the given segments
    /// are backed by blocks; everything else is a hole.
    pub fn add_sparse_file(&mut self, size: u64, segments: &[(u64, &[u8])]) -> Result<u32> {
        let mut map = [0_u32; EXT2_N_BLOCKS];
        let mut sectors = 0_u32;

        for (offset, data) in segments {
            let end = offset
                .checked_add(data.len() as u64)
                .context("segment end overflow")?;
            ensure!(
                end <= size,
                "segment [{offset}, {end}) extends past declared size {size}"
            );

            let mut pos = *offset;
            let mut remaining: &[u8] = data;
            while !remaining.is_empty() {
                let lb = pos / u64::from(BLOCK_SIZE);
                let in_block = (pos % u64::from(BLOCK_SIZE)) as usize;
                let take = remaining.len().min(BLOCK_SIZE as usize - in_block);

                let phys = self.map_file_block(&mut map, &mut sectors, lb)?;
                let block = self
                    .blocks
                    .get_mut(&phys)
                    .context("allocated block missing from builder state")?;
                block[in_block..in_block + take].copy_from_slice(&remaining[..take]);

                pos += take as u64;
                remaining = &remaining[take..];
            }
        }

        self.insert_inode(InodeSpec {
            mode: S_IFREG | 0o644,
            links_count: 1,
            size,
            sectors,
            block: map,
        })
    }

    /// Add a symlink. Targets of 60 bytes or less become fast symlinks
    /// stored inline in the block slots.
    pub fn add_symlink(&mut self, target: &[u8]) -> Result<u32> {
        ensure!(!target.is_empty(), "symlink target cannot be empty");

        let mut map = [0_u32; EXT2_N_BLOCKS];
        let mut sectors = 0_u32;
        if target.len() <= 60 {
            let mut inline = [0_u8; 60];
            inline[..target.len()].copy_from_slice(target);
            for (slot, chunk) in map.iter_mut().zip(inline.chunks_exact(4)) {
                *slot = u32::from_le_bytes(chunk.try_into().context("chunk size")?);
            }
        } else {
            ensure!(
                target.len() <= BLOCK_SIZE as usize,
                "slow symlink target longer than one block is not supported"
            );
            let phys = self.alloc_block(&mut sectors)?;
            let block = self
                .blocks
                .get_mut(&phys)
                .context("allocated block missing from builder state")?;
            block[..target.len()].copy_from_slice(target);
            map[0] = phys;
        }

        self.insert_inode(InodeSpec {
            mode: S_IFLNK | 0o777,
            links_count: 1,
            size: target.len() as u64,
            sectors,
            block: map,
        })
    }

    /// Add a subdirectory of the root, with `.` and `..` generated.
    pub fn add_dir(&mut self, entries: &[DirEntrySpec]) -> Result<u32> {
        let ino = self.next_ino;
        ensure!(ino <= self.inodes_count, "inode table exhausted");
        self.next_ino += 1;

        let spec = self.dir_inode_spec(ino, ROOT_INO, entries)?;
        self.inodes.insert(ino, spec);
        Ok(ino)
    }

    /// Assemble the image. The root directory is generated last so that
    /// every added entry is included.
    pub fn build(&mut self) -> Result<Vec<u8>> {
        let root_entries = self.root_entries.clone();
        let root = self.dir_inode_spec(ROOT_INO, ROOT_INO, &root_entries)?;
        self.inodes.insert(ROOT_INO, root);

        let image_len = self.blocks_count as usize * BLOCK_SIZE as usize;
        let mut image = vec![0_u8; image_len];

        self.write_superblock(&mut image);
        self.write_group_desc(&mut image);
        self.write_inode_table(&mut image)?;

        for (&block, data) in &self.blocks {
            let start = block as usize * BLOCK_SIZE as usize;
            image[start..start + BLOCK_SIZE as usize].copy_from_slice(data);
        }

        Ok(image)
    }

    // Allocation.

    fn alloc_block(&mut self, sectors: &mut u32) -> Result<u32> {
        ensure!(
            self.next_block < self.blocks_count,
            "image out of data blocks ({} total)",
            self.blocks_count
        );
        let block = self.next_block;
        self.next_block += 1;
        self.blocks.insert(block, vec![0_u8; BLOCK_SIZE as usize]);
        *sectors += (BLOCK_SIZE / 512) as u32;
        Ok(block)
    }

    fn insert_inode(&mut self, spec: InodeSpec) -> Result<u32> {
        let ino = self.next_ino;
        ensure!(ino <= self.inodes_count, "inode table exhausted");
        self.next_ino += 1;
        self.inodes.insert(ino, spec);
        Ok(ino)
    }

    /// Physical block backing logical block `lb` of a file under
    /// construction, allocating data and indirect blocks as needed.
    fn map_file_block(
        &mut self,
        map: &mut [u32; EXT2_N_BLOCKS],
        sectors: &mut u32,
        lb: u64,
    ) -> Result<u32> {
        let ndir = EXT2_NDIR_BLOCKS as u64;
        if lb < ndir {
            let slot = lb as usize;
            if map[slot] == 0 {
                map[slot] = self.alloc_block(sectors)?;
            }
            return Ok(map[slot]);
        }

        let single_end = ndir + PPB;
        if lb < single_end {
            let ind = self.ensure_map_slot(map, EXT2_IND_BLOCK, sectors)?;
            return self.ensure_pointer(ind, (lb - ndir) as u32, sectors);
        }

        let double_end = single_end + PPB * PPB;
        if lb < double_end {
            let rel = lb - single_end;
            let l1 = self.ensure_map_slot(map, EXT2_DIND_BLOCK, sectors)?;
            let l2 = self.ensure_pointer(l1, (rel / PPB) as u32, sectors)?;
            return self.ensure_pointer(l2, (rel % PPB) as u32, sectors);
        }

        let triple_end = double_end + PPB * PPB * PPB;
        if lb < triple_end {
            let rel = lb - double_end;
            let l1 = self.ensure_map_slot(map, EXT2_TIND_BLOCK, sectors)?;
            let l2 = self.ensure_pointer(l1, (rel / (PPB * PPB)) as u32, sectors)?;
            let l3 = self.ensure_pointer(l2, ((rel / PPB) % PPB) as u32, sectors)?;
            return self.ensure_pointer(l3, (rel % PPB) as u32, sectors);
        }

        bail!("logical block {lb} beyond triple-indirect range")
    }

    fn ensure_map_slot(
        &mut self,
        map: &mut [u32; EXT2_N_BLOCKS],
        slot: usize,
        sectors: &mut u32,
    ) -> Result<u32> {
        if map[slot] == 0 {
            map[slot] = self.alloc_block(sectors)?;
        }
        Ok(map[slot])
    }

    fn ensure_pointer(&mut self, block: u32, index: u32, sectors: &mut u32) -> Result<u32> {
        let start = index as usize * 4;
        let existing = {
            let data = self
                .blocks
                .get(&block)
                .context("indirect block missing from builder state")?;
            u32::from_le_bytes(data[start..start + 4].try_into().context("pointer slice")?)
        };
        if existing != 0 {
            return Ok(existing);
        }

        let child = self.alloc_block(sectors)?;
        let data = self
            .blocks
            .get_mut(&block)
            .context("indirect block missing from builder state")?;
        data[start..start + 4].copy_from_slice(&child.to_le_bytes());
        Ok(child)
    }

    // Directory encoding.

    fn dir_inode_spec(
        &mut self,
        ino: u32,
        parent: u32,
        entries: &[DirEntrySpec],
    ) -> Result<InodeSpec> {
        let mut listing = vec![DirEntrySpec::dir(".", ino), DirEntrySpec::dir("..", parent)];
        listing.extend_from_slice(entries);

        let encoded = encode_dir_blocks(&listing)?;
        ensure!(
            encoded.len() <= EXT2_NDIR_BLOCKS,
            "directory listing needs {} blocks, only direct slots are supported",
            encoded.len()
        );

        let mut map = [0_u32; EXT2_N_BLOCKS];
        let mut sectors = 0_u32;
        let block_count = encoded.len();
        for (slot, content) in encoded.into_iter().enumerate() {
            let phys = self.alloc_block(&mut sectors)?;
            map[slot] = phys;
            self.blocks.insert(phys, content);
        }

        Ok(InodeSpec {
            mode: S_IFDIR | 0o755,
            links_count: 2,
            size: block_count as u64 * u64::from(BLOCK_SIZE),
            sectors,
            block: map,
        })
    }

    // Image assembly.

    fn write_superblock(&self, image: &mut [u8]) {
        let base = BLOCK_SIZE as usize;
        let free_blocks = self.blocks_count - self.next_block;
        let free_inodes = self.inodes_count - self.inodes.len() as u32;

        put_u32(image, base, self.inodes_count);
        put_u32(image, base + 0x04, self.blocks_count);
        put_u32(image, base + 0x0C, free_blocks);
        put_u32(image, base + 0x10, free_inodes);
        put_u32(image, base + 0x14, 1); // first_data_block
        put_u32(image, base + 0x18, 0); // log_block_size -> 1024
        put_u32(image, base + 0x20, self.blocks_count); // blocks_per_group
        put_u32(image, base + 0x28, self.inodes_count); // inodes_per_group
        put_u16(image, base + 0x36, 20); // max_mnt_count
        put_u16(image, base + 0x38, EXT2_SUPER_MAGIC);
        put_u16(image, base + 0x3A, 1); // state: clean
        put_u16(image, base + 0x3C, 1); // errors: continue
        put_u32(image, base + 0x4C, 1); // rev_level
        put_u32(image, base + 0x54, FIRST_INO);
        put_u16(image, base + 0x58, INODE_SIZE as u16);

        let name = self.volume_name.as_bytes();
        let len = name.len().min(16);
        image[base + 0x78..base + 0x78 + len].copy_from_slice(&name[..len]);
    }

    fn write_group_desc(&self, image: &mut [u8]) {
        let base = GROUP_DESC_BLOCK as usize * BLOCK_SIZE as usize;
        let used_dirs = self
            .inodes
            .values()
            .filter(|spec| spec.mode & S_IFMT == S_IFDIR)
            .count();

        put_u32(image, base, BLOCK_BITMAP_BLOCK);
        put_u32(image, base + 0x04, INODE_BITMAP_BLOCK);
        put_u32(image, base + 0x08, INODE_TABLE_BLOCK);
        put_u16(
            image,
            base + 0x0C,
            (self.blocks_count - self.next_block).min(u32::from(u16::MAX)) as u16,
        );
        put_u16(
            image,
            base + 0x0E,
            (self.inodes_count - self.inodes.len() as u32) as u16,
        );
        put_u16(image, base + 0x10, used_dirs as u16);
    }

    fn write_inode_table(&self, image: &mut [u8]) -> Result<()> {
        let table_base = INODE_TABLE_BLOCK as u64 * u64::from(BLOCK_SIZE);
        for (&ino, spec) in &self.inodes {
            let base = usize::try_from(table_base + u64::from(ino - 1) * u64::from(INODE_SIZE))
                .context("inode record offset overflow")?;

            put_u16(image, base, spec.mode);
            put_u32(image, base + 0x04, (spec.size & 0xFFFF_FFFF) as u32);
            put_u16(image, base + 0x1A, spec.links_count);
            put_u32(image, base + 0x1C, spec.sectors);
            for (i, slot) in spec.block.iter().enumerate() {
                put_u32(image, base + 0x28 + i * 4, *slot);
            }
            if spec.mode & S_IFMT == S_IFREG {
                put_u32(image, base + 0x6C, (spec.size >> 32) as u32);
            }
        }
        Ok(())
    }
}

fn put_u16(image: &mut [u8], offset: usize, value: u16) {
    image[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(image: &mut [u8], offset: usize, value: u32) {
    image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Pack a listing into directory blocks. The last record of every block
/// is stretched to the block end, as ext2 requires.
fn encode_dir_blocks(entries: &[DirEntrySpec]) -> Result<Vec<Vec<u8>>> {
    let bs = BLOCK_SIZE as usize;
    let mut blocks = Vec::new();
    let mut current = vec![0_u8; bs];
    let mut offset = 0_usize;
    let mut last_start: Option<usize> = None;

    for entry in entries {
        let name = entry.name.as_bytes();
        ensure!(!name.is_empty(), "directory entry name cannot be empty");
        ensure!(
            name.len() <= 255,
            "directory entry name {:?} exceeds 255 bytes",
            entry.name
        );

        let rec_len = (8 + name.len() + 3) & !3;
        if offset + rec_len > bs {
            let start = last_start.context("directory entry larger than a block")?;
            put_u16(&mut current, start + 4, (bs - start) as u16);
            blocks.push(std::mem::replace(&mut current, vec![0_u8; bs]));
            offset = 0;
            last_start = None;
        }

        put_u32(&mut current, offset, entry.ino);
        put_u16(&mut current, offset + 4, rec_len as u16);
        current[offset + 6] = name.len() as u8;
        current[offset + 7] = entry.file_type;
        current[offset + 8..offset + 8 + name.len()].copy_from_slice(name);

        last_start = Some(offset);
        offset += rec_len;
    }

    let start = last_start.context("directory listing cannot be empty")?;
    put_u16(&mut current, start + 4, (bs - start) as u16);
    blocks.push(current);
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rext2_ondisk::{Ext2Inode, Ext2Superblock, parse_dir_block};

    #[test]
    fn built_image_has_valid_superblock() {
        let mut builder = ImageBuilder::new(128).expect("builder");
        let ino = builder.add_file(b"hello world").expect("file");
        builder.root_entry(DirEntrySpec::file("hello.txt", ino));
        let image = builder.build().expect("build");

        let sb = Ext2Superblock::parse_from_image(&image).expect("superblock");
        assert_eq!(sb.block_size, 1024);
        assert_eq!(sb.blocks_count, 128);
        assert_eq!(sb.inodes_count, 64);
        assert_eq!(sb.first_ino, 11);
        assert_eq!(sb.volume_name, "rext2-test");
        sb.validate_geometry().expect("geometry");
    }

    #[test]
    fn root_directory_lists_added_entries() {
        let mut builder = ImageBuilder::new(128).expect("builder");
        let ino = builder.add_file(b"contents").expect("file");
        builder.root_entry(DirEntrySpec::file("a.txt", ino));
        let image = builder.build().expect("build");

        let root_record = &image[5 * 1024 + 128..5 * 1024 + 256];
        let root = Ext2Inode::parse_from_bytes(root_record).expect("root inode");
        assert!(root.is_dir());

        let block_start = root.block[0] as usize * 1024;
        let entries =
            parse_dir_block(&image[block_start..block_start + 1024]).expect("dir block");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, ".");
        assert_eq!(entries[1].name, "..");
        assert_eq!(entries[2].name, "a.txt");
        assert_eq!(entries[2].inode, ino);
    }

    #[test]
    fn sparse_file_allocates_only_touched_blocks() {
        let mut builder = ImageBuilder::new(128).expect("builder");
        let before = builder.next_block;
        let ino = builder
            .add_sparse_file(10 * 1024, &[(4 * 1024, b"mid")])
            .expect("sparse file");
        // One data block only; logical block 4 is a direct slot.
        assert_eq!(builder.next_block - before, 1);

        let record_start = 5 * 1024 + (ino as usize - 1) * 128;
        let image = builder.build().expect("build");
        let inode =
            Ext2Inode::parse_from_bytes(&image[record_start..record_start + 128]).expect("inode");
        assert_eq!(inode.size, 10 * 1024);
        assert_eq!(inode.block[0], 0);
        assert_ne!(inode.block[4], 0);
    }

    #[test]
    fn indirect_chain_is_wired_for_far_blocks() {
        let mut builder = ImageBuilder::new(128).expect("builder");
        // Logical block 12 is the first single-indirect block.
        let ino = builder
            .add_sparse_file(13 * 1024, &[(12 * 1024, b"deep")])
            .expect("sparse file");
        let record_start = 5 * 1024 + (ino as usize - 1) * 128;
        let image = builder.build().expect("build");

        let inode =
            Ext2Inode::parse_from_bytes(&image[record_start..record_start + 128]).expect("inode");
        let ind = inode.block[EXT2_IND_BLOCK] as usize;
        assert_ne!(ind, 0);
        let data_block = u32::from_le_bytes(
            image[ind * 1024..ind * 1024 + 4].try_into().expect("slice"),
        ) as usize;
        assert_ne!(data_block, 0);
        assert_eq!(&image[data_block * 1024..data_block * 1024 + 4], b"deep");
    }

    #[test]
    fn multi_block_directory_listing() {
        let mut builder = ImageBuilder::new(256).expect("builder");
        // 50 long names do not fit one 1 KiB block.
        for i in 0..50 {
            let ino = builder.add_file(b"x").expect("file");
            builder.root_entry(DirEntrySpec::file(
                &format!("a-rather-long-file-name-{i:02}"),
                ino,
            ));
        }
        let image = builder.build().expect("build");

        let root_record = &image[5 * 1024 + 128..5 * 1024 + 256];
        let root = Ext2Inode::parse_from_bytes(root_record).expect("root inode");
        assert!(root.size > 1024);

        let mut total = 0;
        for slot in &root.block[..EXT2_NDIR_BLOCKS] {
            if *slot == 0 {
                continue;
            }
            let start = *slot as usize * 1024;
            total += parse_dir_block(&image[start..start + 1024])
                .expect("dir block")
                .len();
        }
        assert_eq!(total, 52); // 50 files plus "." and ".."
    }

    #[test]
    fn fast_symlink_is_inline() {
        let mut builder = ImageBuilder::new(128).expect("builder");
        let before = builder.next_block;
        let ino = builder.add_symlink(b"target/path").expect("symlink");
        assert_eq!(builder.next_block, before); // no blocks allocated

        let record_start = 5 * 1024 + (ino as usize - 1) * 128;
        let image = builder.build().expect("build");
        let inode =
            Ext2Inode::parse_from_bytes(&image[record_start..record_start + 128]).expect("inode");
        assert!(inode.is_fast_symlink());
        assert_eq!(inode.size, 11);
    }
}
