//! Fatal error kinds of snapshot writing and restoring.
//!
//! Everything public returns `anyhow::Result`; these variants travel inside
//! `anyhow::Error` and are recovered with [`SnapshotError::of`].
//! Per-manga restore failures are not errors at this level, see
//! [`crate::restore::RestoreItemError`].

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// Neither favorites nor eligible read manga exist; nothing is written.
    #[error("no library manga to back up")]
    NoLibraryData,

    /// The encoder produced no bytes.
    #[error("snapshot encoding failed: {0}")]
    Encoding(String),

    /// Decompression or structural decoding failed.
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    /// Decoded fine but is not restorable (e.g. no manga).
    #[error("invalid snapshot: {0}")]
    Invalid(String),

    #[error("restore was cancelled")]
    Cancelled,
}

impl SnapshotError {
    /// Find a `SnapshotError` anywhere in the anyhow chain.
    pub fn of(err: &anyhow::Error) -> Option<&SnapshotError> {
        err.chain().find_map(|e| e.downcast_ref::<SnapshotError>())
    }

    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        SnapshotError::Corrupt(msg.into())
    }
}
