#![forbid(unsafe_code)]
//! Error types for rext2.
//!
//! Two-layer error model:
//!
//! | Layer | Type | Crate | Purpose |
//! |-------|------|-------|---------|
//! | Parsing | `ParseError` | `rext2-types` | On-disk format violations detected during byte parsing |
//! | Runtime | `Ext2Error` | `rext2-error` (this crate) | User-facing errors for CLI and API consumers |
//!
//! `rext2-error` is intentionally independent of `rext2-types` and
//! `rext2-ondisk` to avoid cyclic dependencies. The conversion from
//! `ParseError` to `Ext2Error` is implemented in `rext2-core`, which depends
//! on both crates. Mapping rules:
//!
//! | ParseError variant | Ext2Error variant |
//! |--------------------|-------------------|
//! | `InvalidMagic` | `InvalidFilesystem` |
//! | `InsufficientData` | `Corruption` |
//! | `InvalidField` (open-time) | `InvalidFilesystem` |
//! | `InvalidField` (live read) | `Corruption` |
//! | `IntegerConversion` | `Corruption` |
//!
//! Every variant maps to exactly one POSIX errno via [`Ext2Error::to_errno`]
//! so that file-serving layers can reply without their own translation table.
//! The mapping has no wildcard arm: adding a variant is a compile error until
//! its errno is assigned.

use thiserror::Error;

/// Unified error type for all rext2 operations.
///
/// Internal crate-specific errors (`ParseError` from `rext2-types`) are
/// converted into `Ext2Error` at crate boundaries. String payloads are owned
/// to avoid lifetime entanglement across consumer callbacks.
#[derive(Debug, Error)]
pub enum Ext2Error {
    /// Operating system I/O error (wraps `std::io::Error`).
    ///
    /// Covers failed and short positional reads; a short read of image
    /// metadata is indistinguishable from a truncated image and is reported
    /// at the point of occurrence.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image is not a valid ext2 filesystem (bad magic, corrupt or
    /// out-of-range superblock geometry discovered at open time).
    #[error("invalid ext2 filesystem: {0}")]
    InvalidFilesystem(String),

    /// On-disk metadata decoded from a live session is invalid at a known
    /// block (out-of-range pointer, malformed record).
    #[error("corrupt metadata at block {block}: {detail}")]
    Corruption { block: u64, detail: String },

    /// File, directory, or path component not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A path component is not a directory.
    #[error("not a directory")]
    NotDirectory,

    /// Attempted a file operation on a directory.
    #[error("is a directory")]
    IsDirectory,

    /// The image uses an on-disk construct this accessor does not decode
    /// (block-pointer slot beyond the 15-slot scheme, unknown feature).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A required input was empty or malformed (e.g. a relative path where
    /// an absolute one is required).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A consumer callback aborted the walk.
    #[error("visitor aborted: {0}")]
    VisitorAborted(String),
}

impl Ext2Error {
    /// Convert this error into a POSIX errno suitable for a file-serving
    /// layer's replies.
    ///
    /// The mapping is exhaustive; every variant has an explicit arm.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::Corruption { .. } => libc::EIO,
            Self::InvalidFilesystem(_) => libc::EINVAL,
            Self::NotFound(_) => libc::ENOENT,
            Self::NotDirectory => libc::ENOTDIR,
            Self::IsDirectory => libc::EISDIR,
            Self::Unsupported(_) => libc::EOPNOTSUPP,
            Self::InvalidArgument(_) => libc::EINVAL,
            Self::VisitorAborted(_) => libc::EINTR,
        }
    }
}

/// Result alias using `Ext2Error`.
pub type Result<T> = std::result::Result<T, Ext2Error>;
