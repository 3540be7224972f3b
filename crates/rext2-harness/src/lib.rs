#![forbid(unsafe_code)]

//! Test support for the rext2 workspace.
//!
//! [`ImageBuilder`] assembles complete single-group ext2 images in memory,
//! including indirect block trees and sparse files, so integration tests
//! never depend on loopback mounts or prebuilt binary blobs. Sparse
//! fixtures store such images as JSON with hex payloads at offsets,
//! keeping the zero-dominated regions out of the repository.

use anyhow::{Context, Result, bail};
use rext2_ondisk::{Ext2DirEntry, Ext2Inode, Ext2Superblock, parse_dir_block};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

mod builder;

pub use builder::{DirEntrySpec, ImageBuilder};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseFixture {
    pub size: usize,
    pub writes: Vec<FixtureWrite>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureWrite {
    pub offset: usize,
    pub hex: String,
}

impl SparseFixture {
    /// Expand the fixture into its full byte image.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![0_u8; self.size];
        for write in &self.writes {
            let payload = hex::decode(&write.hex)
                .with_context(|| format!("invalid hex at offset {}", write.offset))?;
            let end = write
                .offset
                .checked_add(payload.len())
                .context("fixture offset overflow")?;
            if end > bytes.len() {
                bail!(
                    "fixture write out of bounds: offset={} payload={} size={}",
                    write.offset,
                    payload.len(),
                    bytes.len()
                );
            }
            bytes[write.offset..end].copy_from_slice(&payload);
        }
        Ok(bytes)
    }

    /// Compress a byte image into a fixture, dropping zero runs.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut writes = Vec::new();
        let mut run_start = None;
        for (i, &b) in bytes.iter().enumerate() {
            match (run_start, b) {
                (None, 0) => {}
                (None, _) => run_start = Some(i),
                (Some(start), 0) => {
                    writes.push(FixtureWrite {
                        offset: start,
                        hex: hex::encode(&bytes[start..i]),
                    });
                    run_start = None;
                }
                (Some(_), _) => {}
            }
        }
        if let Some(start) = run_start {
            writes.push(FixtureWrite {
                offset: start,
                hex: hex::encode(&bytes[start..]),
            });
        }
        Self {
            size: bytes.len(),
            writes,
        }
    }
}

pub fn load_sparse_fixture(path: &Path) -> Result<Vec<u8>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    let fixture: SparseFixture = serde_json::from_str(&text)
        .with_context(|| format!("invalid fixture json {}", path.display()))?;
    fixture.to_bytes()
}

pub fn validate_superblock_fixture(path: &Path) -> Result<Ext2Superblock> {
    let data = load_sparse_fixture(path)?;
    Ext2Superblock::parse_from_image(&data)
        .with_context(|| format!("failed superblock parse for fixture {}", path.display()))
}

pub fn validate_inode_fixture(path: &Path) -> Result<Ext2Inode> {
    let data = load_sparse_fixture(path)?;
    Ext2Inode::parse_from_bytes(&data)
        .with_context(|| format!("failed inode parse for fixture {}", path.display()))
}

pub fn validate_dir_block_fixture(path: &Path) -> Result<Vec<Ext2DirEntry>> {
    let data = load_sparse_fixture(path)?;
    parse_dir_block(&data)
        .with_context(|| format!("failed dir block parse for fixture {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_round_trips_sparse_bytes() {
        let mut bytes = vec![0_u8; 4096];
        bytes[10..14].copy_from_slice(b"abcd");
        bytes[2048] = 0xFF;

        let fixture = SparseFixture::from_bytes(&bytes);
        assert_eq!(fixture.writes.len(), 2);
        assert_eq!(fixture.writes[0].offset, 10);
        assert_eq!(fixture.to_bytes().expect("expand"), bytes);
    }

    #[test]
    fn fixture_rejects_out_of_bounds_write() {
        let fixture = SparseFixture {
            size: 16,
            writes: vec![FixtureWrite {
                offset: 14,
                hex: "aabbcc".to_owned(),
            }],
        };
        assert!(fixture.to_bytes().is_err());
    }

    #[test]
    fn fixture_json_round_trips() {
        let fixture = SparseFixture::from_bytes(b"\x00\x00hello\x00");
        let json = serde_json::to_string(&fixture).expect("serialize");
        let back: SparseFixture = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.to_bytes().expect("expand"), b"\x00\x00hello\x00");
    }
}
