//! Writer/reader progress events: a fixed set of variants delivered over a
//! `tokio::sync::mpsc` channel rather than arbitrary user-provided
//! closures, so execution of event handling can never block or panic
//! inside the writer/reader's own task.

use crate::metadata::PayloadMetadata;

/// Emitted by blocknote/streamnote writers.
#[derive(Debug, Clone)]
pub enum WriterEvent {
    /// A data transaction was submitted; `sent`/`total` are data-transaction
    /// counts (blocknote) or cumulative chunk counts (streamnote).
    Progress { sent: u32, total: Option<u32> },
    /// The payload/metadata transaction id, emitted as soon as it is known
    /// (before the rest of the upload completes).
    PayloadTxId(String),
    /// Free-form structured log line for the hot path (retry rounds,
    /// rebuilds, stall timeouts).
    Log(String),
    /// Terminal success.
    Finish(WriteResult),
    /// Terminal failure; the message is the originating `Error`'s display.
    Error(String),
}

/// Emitted by blocknote/streamnote readers.
#[derive(Debug, Clone)]
pub enum ReaderEvent {
    /// One contiguous, in-order chunk of payload bytes (streamnote only).
    Data(Vec<u8>),
    Log(String),
    Finish,
    Error(String),
}

/// Result of a completed blocknote write.
#[derive(Debug, Clone)]
pub struct WriteResult {
    /// `None` in simulation mode, which never exposes a payload id.
    pub payload_transaction_id: Option<String>,
    pub fees: u64,
    pub compression: String,
    pub duration: std::time::Duration,
    pub simulation: bool,
    pub payload: PayloadMetadata,
}
