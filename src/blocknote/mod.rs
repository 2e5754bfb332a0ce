//! One-shot payload upload/download: a complete payload is known up front,
//! framed as a metadata transaction plus N data transactions.

pub mod reader;
pub mod writer;

use crate::codec::CompressionSelection;

/// The payload as handed to the writer: either raw bytes, or a UTF-8
/// string (only strings are eligible for the `lz-string` codec, which this
/// crate does not ship — kept to preserve the string/bytes distinction
/// codec auto-selection depends on).
#[derive(Debug, Clone)]
pub enum RawContent {
    Bytes(Vec<u8>),
    Text(String),
}

impl RawContent {
    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            RawContent::Bytes(b) => b.clone(),
            RawContent::Text(s) => s.as_bytes().to_vec(),
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, RawContent::Text(_))
    }
}

/// Recognized writer options; unrecognized keys have no Rust-side
/// representation and are simply not accepted by this struct.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub compression: CompressionSelection,
    pub mime: String,
    pub title: Option<String>,
    /// Defaults to `true` once a key/password is set.
    pub encrypt_title: Option<bool>,
    pub aes_key: Option<[u8; 32]>,
    pub password: Option<String>,
    pub revision_of: Option<String>,
    pub simulate: bool,
}

/// Recognized reader options.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub aes_key: Option<[u8; 32]>,
    pub password: Option<String>,
    /// 1-based revision index; `None` means "most recent".
    pub revision: Option<u32>,
    pub return_raw: bool,
}

/// Result of a completed blocknote read.
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub payload: crate::metadata::PayloadMetadata,
    pub content: Vec<u8>,
}
