//! Adaptive padding state machine: instead of mutating fields on a
//! long-lived writer object, the processor threads a small state struct
//! explicitly through each tick.

use std::time::{Duration, Instant};

use crate::codec::Codec;
use crate::crypto::stream::encrypt_with_derivation;
use crate::error::Result;
use crate::metadata::{encode_data_record, MAX_NOTE_BYTES};

/// Optional per-chunk stream cipher: the shared key plus the session seed
/// (the PBKDF2 salt, or a random session IV when no password was given).
pub struct StreamCipher<'a> {
    pub key: &'a [u8; 32],
    pub seed: &'a [u8],
}

#[derive(Debug, Clone)]
pub struct PaddingState {
    pub padding: i32,
    pub last_hash: [u8; 32],
    pub ts_same_hash: Option<Instant>,
}

impl Default for PaddingState {
    fn default() -> Self {
        Self {
            padding: 0,
            last_hash: [0u8; 32],
            ts_same_hash: None,
        }
    }
}

pub const PADDING_STEP: i32 = 50;
pub const STALL_TIMEOUT: Duration = Duration::from_millis(15_000);
pub const PADDING_SEARCH_SLEEP: Duration = Duration::from_millis(10);

/// A chunk ready to enqueue: the fully-framed note bytes and how many raw
/// bytes were consumed from the front of the content buffer to produce it.
pub struct ProducedChunk {
    pub record: Vec<u8>,
    pub consumed: usize,
}

async fn candidate_at(
    content: &[u8],
    window: usize,
    counter: u32,
    codec: &dyn Codec,
    cipher: Option<&StreamCipher<'_>>,
) -> Result<Vec<u8>> {
    let window = window.min(content.len());
    let compressed = codec.compress(&content[..window]).await?;
    let chunk = match cipher {
        Some(c) => encrypt_with_derivation(c.key, &compressed, counter, c.seed),
        None => compressed,
    };
    Ok(encode_data_record(counter, &chunk))
}

/// One processor tick. Returns the updated padding state and, if a chunk
/// was ready to enqueue, the produced chunk.
pub async fn step(
    content: &[u8],
    counter: u32,
    codec: &dyn Codec,
    cipher: Option<&StreamCipher<'_>>,
    mut state: PaddingState,
    stop_requested: bool,
) -> Result<(PaddingState, Option<ProducedChunk>)> {
    if content.is_empty() {
        return Ok((state, None));
    }

    let window = (MAX_NOTE_BYTES as i32 + state.padding).max(0) as usize;
    let candidate = candidate_at(content, window, counter, codec, cipher).await?;
    let candidate_hash = crate::crypto::hash::sha256(&candidate);

    if candidate_hash == state.last_hash {
        if state.ts_same_hash.is_none() {
            state.ts_same_hash = Some(Instant::now());
        }
    } else {
        state.last_hash = candidate_hash;
        state.ts_same_hash = Some(Instant::now());
    }

    if stop_requested {
        let full = candidate_at(content, content.len(), counter, codec, cipher).await?;
        if full.len() <= MAX_NOTE_BYTES {
            return Ok((
                PaddingState::default(),
                Some(ProducedChunk {
                    record: full,
                    consumed: content.len(),
                }),
            ));
        }
    }

    if candidate.len() < MAX_NOTE_BYTES {
        state.padding += PADDING_STEP;
        let stalled = state
            .ts_same_hash
            .map(|ts| ts.elapsed() >= STALL_TIMEOUT)
            .unwrap_or(false);
        if stalled {
            let consumed = window.min(content.len());
            return Ok((
                PaddingState::default(),
                Some(ProducedChunk { record: candidate, consumed }),
            ));
        }
        return Ok((state, None));
    }

    if candidate.len() > MAX_NOTE_BYTES {
        let mut shrink_padding = state.padding;
        let mut shrunk = candidate;
        let mut consumed = window;
        loop {
            shrink_padding -= 1;
            let w = (MAX_NOTE_BYTES as i32 + shrink_padding).max(0) as usize;
            shrunk = candidate_at(content, w, counter, codec, cipher).await?;
            if shrunk.len() <= MAX_NOTE_BYTES {
                consumed = w.min(content.len());
                break;
            }
            tokio::time::sleep(PADDING_SEARCH_SLEEP).await;
        }
        return Ok((
            PaddingState::default(),
            Some(ProducedChunk { record: shrunk, consumed }),
        ));
    }

    // Exactly at the ceiling: it fits perfectly, flush it.
    Ok((
        PaddingState::default(),
        Some(ProducedChunk { record: candidate, consumed: window.min(content.len()) }),
    ))
}
