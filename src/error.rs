//! Crate-wide error taxonomy.
//!
//! Validation errors are returned synchronously from write/read calls;
//! submission errors are retried by the writer before surfacing here.

use thiserror::Error;

/// Why a transaction submission ultimately failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitFailure {
    /// The transaction's last-valid round passed before it was confirmed.
    Expired,
    /// The node returned a pool error (other than "already in ledger").
    PoolError(String),
    /// A network-level failure that exhausted its retry budget.
    TransientNetwork(String),
}

impl std::fmt::Display for SubmitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitFailure::Expired => write!(f, "transaction expired"),
            SubmitFailure::PoolError(msg) => write!(f, "pool error: {msg}"),
            SubmitFailure::TransientNetwork(msg) => write!(f, "transient network error: {msg}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("payload metadata would exceed {limit} bytes (got {actual})")]
    PayloadTooLarge { limit: usize, actual: usize },

    #[error("no sender account supplied")]
    MissingSender,

    #[error("encryption key required but not supplied")]
    MissingKey,

    #[error("password required but not supplied")]
    MissingPassword,

    #[error("revision_of targets a payload owned by a different sender")]
    RevisionOwnershipMismatch,

    #[error("bootstrap key does not match the funding transaction")]
    InvalidBootstrapKey,

    #[error("aes_key/password/encrypt_title may not be supplied when preparing a bootstrap transaction")]
    BootstrapEncryptionRejected,

    #[error("revision {requested} does not exist (payload has {available} revisions)")]
    InvalidRevisionNumber { requested: u32, available: u32 },

    #[error("submission failed: {0}")]
    SubmitFailed(SubmitFailure),

    #[error("decryption failed: authentication tag mismatch or malformed ciphertext")]
    DecryptError,

    #[error("decompression failed: {0}")]
    DecompressError(String),

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("background task panicked: {0}")]
    TaskJoin(String),
}

pub type Result<T> = std::result::Result<T, Error>;
