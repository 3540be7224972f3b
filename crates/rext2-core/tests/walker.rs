#![forbid(unsafe_code)]

//! Block-tree walker behavior over generated images: chunk ordering,
//! clipping, hole accounting, and I/O discipline for sparse regions.

use rext2_block::{ByteDevice, MemoryByteDevice};
use rext2_core::{Ext2Fs, FileChunk, OpenOptions};
use rext2_error::Ext2Error;
use rext2_harness::ImageBuilder;
use rext2_types::{ByteOffset, InodeNumber};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const BS: u64 = 1024;

fn open(builder: &mut ImageBuilder) -> Ext2Fs {
    let image = builder.build().expect("build image");
    Ext2Fs::from_memory(image).expect("open image")
}

/// Summarized chunk: (offset, len, is_hole).
fn collect_chunks(fs: &Ext2Fs, ino: u32) -> Vec<(u64, u64, bool)> {
    let inode = fs.read_inode(InodeNumber(ino)).expect("inode");
    let mut chunks = Vec::new();
    fs.walk_file_blocks(&inode, &mut |chunk: FileChunk<'_>| {
        chunks.push((chunk.offset(), chunk.len(), chunk.is_hole()));
        Ok(())
    })
    .expect("walk");
    chunks
}

#[test]
fn three_block_file_clips_final_chunk() {
    let mut builder = ImageBuilder::new(128).expect("builder");
    let data: Vec<u8> = (0..2560_u32).map(|i| (i % 251) as u8).collect();
    let ino = builder.add_file(&data).expect("file");
    let fs = open(&mut builder);

    let chunks = collect_chunks(&fs, ino);
    assert_eq!(
        chunks,
        vec![(0, BS, false), (BS, BS, false), (2 * BS, 512, false)]
    );

    let total: u64 = chunks.iter().map(|(_, len, _)| len).sum();
    assert_eq!(total, 2560);
}

#[test]
fn walker_yields_data_bytes_in_order() {
    let mut builder = ImageBuilder::new(128).expect("builder");
    let data: Vec<u8> = (0..3000_u32).map(|i| (i % 241) as u8).collect();
    let ino = builder.add_file(&data).expect("file");
    let fs = open(&mut builder);

    let inode = fs.read_inode(InodeNumber(ino)).expect("inode");
    let mut recovered = Vec::new();
    fs.walk_file_blocks(&inode, &mut |chunk: FileChunk<'_>| {
        match chunk {
            FileChunk::Data { offset, data } => {
                assert_eq!(offset, recovered.len() as u64);
                recovered.extend_from_slice(data);
            }
            FileChunk::Hole { .. } => panic!("fully-backed file has no holes"),
        }
        Ok(())
    })
    .expect("walk");
    assert_eq!(recovered, data);
}

#[test]
fn all_zero_direct_pointers_yield_twelve_holes() {
    let mut builder = ImageBuilder::new(128).expect("builder");
    let ino = builder.add_sparse_file(12 * BS, &[]).expect("sparse file");
    let fs = open(&mut builder);

    let chunks = collect_chunks(&fs, ino);
    assert_eq!(chunks.len(), 12);
    for (i, (offset, len, is_hole)) in chunks.iter().enumerate() {
        assert_eq!(*offset, i as u64 * BS);
        assert_eq!(*len, BS);
        assert!(is_hole);
    }
}

#[test]
fn single_indirect_hole_in_slot_five() {
    let mut builder = ImageBuilder::new(128).expect("builder");

    // 20 logical blocks; all backed except logical block 17 (indirect
    // slot 5), which stays a hole inside an otherwise-populated indirect
    // block.
    let block: Vec<u8> = vec![0xAB; BS as usize];
    let mut segments = Vec::new();
    for lb in 0..20_u64 {
        if lb == 17 {
            continue;
        }
        segments.push((lb * BS, block.as_slice()));
    }
    let ino = builder
        .add_sparse_file(20 * BS, &segments)
        .expect("sparse file");
    let fs = open(&mut builder);

    let chunks = collect_chunks(&fs, ino);
    assert_eq!(chunks.len(), 20);
    for (i, (offset, len, is_hole)) in chunks.iter().enumerate() {
        assert_eq!(*offset, i as u64 * BS);
        assert_eq!(*len, BS);
        assert_eq!(*is_hole, i == 17, "chunk {i}");
    }
}

#[test]
fn chunk_lengths_sum_to_file_size() {
    let mut builder = ImageBuilder::new(512).expect("builder");
    // Deep into the double-indirect range, mostly holes, odd tail size.
    let size = 400 * BS + 300;
    let payload = vec![0x5A_u8; 700];
    let ino = builder
        .add_sparse_file(size, &[(0, b"head"), (350 * BS, &payload)])
        .expect("sparse file");
    let fs = open(&mut builder);

    let chunks = collect_chunks(&fs, ino);
    let total: u64 = chunks.iter().map(|(_, len, _)| len).sum();
    assert_eq!(total, size);

    let last = chunks.last().expect("chunks");
    assert_eq!(last.1, 300);
}

/// Byte device that counts every read issued to it.
#[derive(Debug)]
struct CountingDevice {
    inner: MemoryByteDevice,
    reads: Arc<AtomicU64>,
}

impl ByteDevice for CountingDevice {
    fn len_bytes(&self) -> u64 {
        self.inner.len_bytes()
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> rext2_error::Result<()> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.inner.read_exact_at(offset, buf)
    }
}

#[test]
fn fully_sparse_file_walks_without_io() {
    let mut builder = ImageBuilder::new(128).expect("builder");
    // Size reaches into the triple-indirect range with nothing allocated.
    let size = (12 + 256 + 256 * 256 + 10) * BS;
    let ino = builder.add_sparse_file(size, &[]).expect("sparse file");
    let image = builder.build().expect("build");

    let reads = Arc::new(AtomicU64::new(0));
    let dev = CountingDevice {
        inner: MemoryByteDevice::new(image),
        reads: Arc::clone(&reads),
    };
    let fs = Ext2Fs::from_device(Box::new(dev), &OpenOptions::default()).expect("open");
    let inode = fs.read_inode(InodeNumber(ino)).expect("inode");

    reads.store(0, Ordering::Relaxed);
    let mut total = 0_u64;
    let covered = fs
        .walk_file_blocks(&inode, &mut |chunk: FileChunk<'_>| {
            assert!(chunk.is_hole());
            total += chunk.len();
            Ok(())
        })
        .expect("walk");

    assert_eq!(covered, size);
    assert_eq!(total, size);
    assert_eq!(reads.load(Ordering::Relaxed), 0, "holes must not be read");
}

#[test]
fn copy_file_to_reproduces_sparse_contents() {
    let mut builder = ImageBuilder::new(256).expect("builder");
    let size = 40 * BS + 123;
    let a = vec![0x11_u8; 2000];
    let b = vec![0x22_u8; 600];
    let segments: Vec<(u64, &[u8])> = vec![(512, a.as_slice()), (30 * BS, b.as_slice())];
    let ino = builder.add_sparse_file(size, &segments).expect("sparse file");
    let fs = open(&mut builder);

    let mut expected = vec![0_u8; size as usize];
    expected[512..512 + 2000].copy_from_slice(&a);
    let start = 30 * BS as usize;
    expected[start..start + 600].copy_from_slice(&b);

    let mut out = Vec::new();
    let written = fs
        .copy_file_to(InodeNumber(ino), &mut out)
        .expect("copy");
    assert_eq!(written, size);
    assert_eq!(out, expected);
}

#[test]
fn windowed_reads_cross_blocks_and_holes() {
    let mut builder = ImageBuilder::new(128).expect("builder");
    let size = 6 * BS;
    let payload = vec![0x7E_u8; BS as usize];
    // Blocks 1 and 3 backed, the rest holes.
    let segments: Vec<(u64, &[u8])> =
        vec![(BS, payload.as_slice()), (3 * BS, payload.as_slice())];
    let ino = builder.add_sparse_file(size, &segments).expect("sparse file");
    let fs = open(&mut builder);

    // Window spanning hole, data, hole, with unaligned edges.
    let got = fs.read_file(InodeNumber(ino), 512, 3 * 1024).expect("read");
    let mut expected = vec![0_u8; 3 * 1024];
    // Window covers file bytes [512, 3584); blocks 1 and 3 are backed, so
    // file ranges [1024, 2048) and [3072, 3584) carry 0x7E.
    expected[512..1536].fill(0x7E);
    expected[2560..3072].fill(0x7E);
    assert_eq!(got, expected);

    // Reads past end of file come back short.
    let tail = fs.read_file(InodeNumber(ino), size - 100, 500).expect("read");
    assert_eq!(tail.len(), 100);

    let empty = fs.read_file(InodeNumber(ino), size + 1, 16).expect("read");
    assert!(empty.is_empty());
}

#[test]
fn visitor_error_aborts_walk() {
    let mut builder = ImageBuilder::new(128).expect("builder");
    let data = vec![0x33_u8; 4096];
    let ino = builder.add_file(&data).expect("file");
    let fs = open(&mut builder);

    let inode = fs.read_inode(InodeNumber(ino)).expect("inode");
    let mut seen = 0_u32;
    let err = fs
        .walk_file_blocks(&inode, &mut |_chunk: FileChunk<'_>| {
            seen += 1;
            if seen == 2 {
                return Err(Ext2Error::VisitorAborted("stop after two".to_owned()));
            }
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, Ext2Error::VisitorAborted(_)));
    assert_eq!(seen, 2);
}

#[test]
fn resolve_block_agrees_with_walker() {
    let mut builder = ImageBuilder::new(256).expect("builder");
    let size = 300 * BS;
    let payload = vec![0x44_u8; BS as usize];
    // One backed block in each region: direct, single, and double indirect.
    let segments: Vec<(u64, &[u8])> = vec![
        (3 * BS, payload.as_slice()),
        (100 * BS, payload.as_slice()),
        (290 * BS, payload.as_slice()),
    ];
    let ino = builder.add_sparse_file(size, &segments).expect("sparse file");
    let fs = open(&mut builder);
    let inode = fs.read_inode(InodeNumber(ino)).expect("inode");

    for lb in [3_u32, 100, 290] {
        assert!(fs.resolve_block(&inode, lb).expect("resolve").is_some());
    }
    for lb in [0_u32, 50, 200, 299] {
        assert!(fs.resolve_block(&inode, lb).expect("resolve").is_none());
    }
}
