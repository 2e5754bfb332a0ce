//! Incremental payload upload/download: the payload is produced a chunk at
//! a time by the caller, with no known final size up front, framed as one
//! metadata transaction followed by an open-ended run of data transactions
//! terminated by a self-sent `stop` transaction.

pub mod padding;
pub mod reader;
pub mod writer;

use crate::codec::CompressionSelection;

/// Recognized streamnote writer options; the codec is chosen once, from
/// the first bytes handed to [`writer::StreamnoteWriter::start`], and held
/// fixed for the rest of the session.
#[derive(Debug, Clone, Default)]
pub struct StreamWriteOptions {
    pub compression: CompressionSelection,
    pub mime: String,
    pub title: Option<String>,
    pub encrypt_title: Option<bool>,
    pub aes_key: Option<[u8; 32]>,
    pub password: Option<String>,
}

/// Recognized streamnote reader options.
#[derive(Debug, Clone, Default)]
pub struct StreamReadOptions {
    pub aes_key: Option<[u8; 32]>,
    pub password: Option<String>,
}
