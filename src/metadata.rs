//! Payload-metadata JSON record and the data-record counter framing shared
//! by both blocknote and streamnote writers/readers.

use serde::{Deserialize, Serialize};

use crate::crypto::process_secret::EncryptedEnvelope;
use crate::error::{Error, Result};

/// A note field that is either a plain UTF-8 string or, once encrypted, an
/// AEAD envelope. Covers the `title` field's two on-chain shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaybeEncrypted {
    Plain(String),
    Encrypted(EncryptedEnvelope),
}

impl Default for MaybeEncrypted {
    fn default() -> Self {
        MaybeEncrypted::Plain(String::new())
    }
}

/// The hard per-note size ceiling every record (metadata or data) must fit
/// under.
pub const MAX_NOTE_BYTES: usize = 1024;

/// Width of the little-endian counter prefixed to every data record.
pub const COUNTER_BYTES: usize = 4;

/// Maximum payload bytes a data record can carry once the counter prefix
/// is accounted for.
pub const MAX_CHUNK_PAYLOAD_BYTES: usize = MAX_NOTE_BYTES - COUNTER_BYTES;

/// Payload-metadata record, JSON-encoded into one transaction's note.
/// `size`/`txns` are blocknote-only; `kind` is only ever `Some("stream")`
/// for streamnote sessions.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PayloadMetadata {
    pub version: u32,
    pub title: MaybeEncrypted,
    pub mime: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub txns: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub addid: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub accid: Option<u32>,
}

impl PayloadMetadata {
    /// Serialize to the UTF-8 JSON bytes that go into a note, failing with
    /// [`Error::PayloadTooLarge`] if the result would not fit.
    pub fn to_note_bytes(&self) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_NOTE_BYTES {
            return Err(Error::PayloadTooLarge {
                limit: MAX_NOTE_BYTES,
                actual: bytes.len(),
            });
        }
        Ok(bytes)
    }

    pub fn from_note_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Split `payload` into dense, zero-indexed, counter-prefixed data records,
/// each at most [`MAX_NOTE_BYTES`] total. The counter is prepended *before*
/// slicing, so the first record carries only [`MAX_CHUNK_PAYLOAD_BYTES`]
/// payload bytes, same as every other record.
pub fn chunk_data_records(payload: &[u8]) -> Vec<Vec<u8>> {
    if payload.is_empty() {
        return vec![encode_data_record(0, &[])];
    }

    let mut records = Vec::new();
    let mut offset = 0;
    let mut counter: u32 = 0;
    while offset < payload.len() {
        let end = (offset + MAX_CHUNK_PAYLOAD_BYTES).min(payload.len());
        records.push(encode_data_record(counter, &payload[offset..end]));
        offset = end;
        counter += 1;
    }
    records
}

/// Prepend a 4-byte little-endian counter to `chunk`.
pub fn encode_data_record(counter: u32, chunk: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(COUNTER_BYTES + chunk.len());
    record.extend_from_slice(&counter.to_le_bytes());
    record.extend_from_slice(chunk);
    record
}

/// Split a data record's note bytes back into `(counter, chunk)`.
pub fn decode_data_record(note: &[u8]) -> Option<(u32, &[u8])> {
    if note.len() < COUNTER_BYTES {
        return None;
    }
    let mut counter_bytes = [0u8; COUNTER_BYTES];
    counter_bytes.copy_from_slice(&note[..COUNTER_BYTES]);
    Some((u32::from_le_bytes(counter_bytes), &note[COUNTER_BYTES..]))
}

/// Reassemble data records into one contiguous buffer, placing each
/// record's chunk at the byte offset implied by its counter. `records`
/// need not be sorted or contiguous on input; gaps are an error since
/// blocknote reassembly requires every counter in `0..txns`.
pub fn reassemble_by_counter(records: &[(u32, Vec<u8>)], expected_txns: u32) -> Result<Vec<u8>> {
    let mut ordered: Vec<Option<&[u8]>> = vec![None; expected_txns as usize];
    for (counter, chunk) in records {
        if *counter >= expected_txns {
            continue;
        }
        ordered[*counter as usize] = Some(chunk.as_slice());
    }

    let mut out = Vec::new();
    for (i, slot) in ordered.into_iter().enumerate() {
        match slot {
            Some(chunk) => out.extend_from_slice(chunk),
            None => {
                return Err(Error::Ledger(format!(
                    "missing data record for counter {i} (expected {expected_txns} total)"
                )))
            }
        }
    }
    Ok(out)
}

/// The revision-tag note shape: `{"revision": "<52-char payload id>"}`.
/// Valid only if the note is JSON-parseable, has exactly one key, and that
/// key's value is 52 characters long. Any other note shape is not a
/// revision tag, so an ordinary user payload can never be mistaken for one.
pub fn parse_revision_tag(note: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(note).ok()?;
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    let revision = obj.get("revision")?.as_str()?;
    if revision.len() != 52 {
        return None;
    }
    Some(revision.to_string())
}

/// Encode a revision-tag note for `new_payload_id`.
pub fn encode_revision_tag(new_payload_id: &str) -> Vec<u8> {
    serde_json::json!({ "revision": new_payload_id })
        .to_string()
        .into_bytes()
}

/// The literal stop-note payload: raw ASCII bytes, compared byte-wise
/// rather than as a decoded string.
pub const STOP_NOTE: &[u8] = b"stop";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_prefixes_dense_counters() {
        let payload = vec![7u8; MAX_CHUNK_PAYLOAD_BYTES * 2 + 10];
        let records = chunk_data_records(&payload);
        assert_eq!(records.len(), 3);
        for (i, record) in records.iter().enumerate() {
            let (counter, _) = decode_data_record(record).unwrap();
            assert_eq!(counter, i as u32);
            assert!(record.len() <= MAX_NOTE_BYTES);
        }
    }

    #[test]
    fn empty_payload_yields_one_empty_record() {
        let records = chunk_data_records(&[]);
        assert_eq!(records.len(), 1);
        let (counter, chunk) = decode_data_record(&records[0]).unwrap();
        assert_eq!(counter, 0);
        assert!(chunk.is_empty());
    }

    #[test]
    fn two_byte_payload_fits_in_one_record() {
        let records = chunk_data_records(b"hi");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], vec![0x00, 0x00, 0x00, 0x00, 0x68, 0x69]);
    }

    #[test]
    fn reassembly_round_trips_out_of_order_input() {
        let payload = vec![1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let records = chunk_data_records(&payload);
        let mut decoded: Vec<(u32, Vec<u8>)> = records
            .iter()
            .map(|r| {
                let (c, chunk) = decode_data_record(r).unwrap();
                (c, chunk.to_vec())
            })
            .collect();
        decoded.reverse();

        let reassembled = reassemble_by_counter(&decoded, decoded.len() as u32).unwrap();
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn missing_counter_is_an_error() {
        let result = reassemble_by_counter(&[(0, vec![1])], 2);
        assert!(result.is_err());
    }

    #[test]
    fn revision_tag_requires_exactly_one_key_and_52_chars() {
        let id = "a".repeat(52);
        let note = encode_revision_tag(&id);
        assert_eq!(parse_revision_tag(&note), Some(id));

        let wrong_length = serde_json::json!({ "revision": "short" }).to_string();
        assert_eq!(parse_revision_tag(wrong_length.as_bytes()), None);

        let extra_key = serde_json::json!({ "something": true, "revision": "a".repeat(52) }).to_string();
        assert_eq!(parse_revision_tag(extra_key.as_bytes()), None);
    }
}
