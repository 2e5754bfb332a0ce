//! Compression codec registry.
//!
//! Every codec exposes the same `compress`/`uncompress` contract; the
//! writer picks one explicitly, or lets the registry compress with every
//! registered codec and pick the smallest (`best`) or fastest (`fast`).

mod gzip;
mod lz4;
mod none;
mod zstd_codec;

use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use gzip::GzipCodec;
pub use lz4::Lz4Codec;
pub use none::NoneCodec;
pub use zstd_codec::ZstdCodec;

/// Tunable parameters a codec may accept.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CodecParams {
    /// 1-9 style compression level; codecs interpret their own range.
    pub compression_level: Option<i32>,
}

/// Uniform compression codec contract.
#[async_trait]
pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;
    async fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>>;
    async fn uncompress(&self, bytes: &[u8]) -> Result<Vec<u8>>;
    fn set_params(&mut self, params: CodecParams);
}

/// How the writer should pick a codec for a given payload.
#[derive(Debug, Clone)]
pub enum CompressionSelection {
    /// Use the named codec as-is.
    Explicit(String),
    /// Use the named codec with the given params.
    ExplicitWithParams(String, CodecParams),
    /// Compress with every codec, keep whichever produces the smallest output.
    Best,
    /// Compress with every codec, keep whichever finishes first.
    Fast,
}

impl Default for CompressionSelection {
    fn default() -> Self {
        CompressionSelection::Best
    }
}

/// The outcome of running codec selection: the chosen codec's name and
/// the compressed bytes.
pub struct SelectedCompression {
    pub codec_name: String,
    pub compressed: Vec<u8>,
}

/// Registry of available codecs, looked up by name.
pub struct CodecRegistry {
    codecs: Vec<Box<dyn Codec>>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CodecRegistry {
    /// The registry the reference implementation ships: `none` plus three
    /// real compressors. `lz-string` has no faithful Rust equivalent (it
    /// only accepts strings) and is intentionally not registered.
    pub fn with_defaults() -> Self {
        Self {
            codecs: vec![
                Box::new(NoneCodec::default()),
                Box::new(GzipCodec::default()),
                Box::new(ZstdCodec::default()),
                Box::new(Lz4Codec::default()),
            ],
        }
    }

    pub fn register(&mut self, codec: Box<dyn Codec>) {
        self.codecs.push(codec);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Codec> {
        self.codecs.iter().find(|c| c.name() == name).map(|c| c.as_ref())
    }

    /// Construct a fresh, unshared instance of the named codec, used by
    /// [`CompressionSelection::ExplicitWithParams`] so tuning its params
    /// never touches the registry's shared instance.
    fn new_instance(&self, name: &str) -> Option<Box<dyn Codec>> {
        match name {
            "none" => Some(Box::new(NoneCodec::default())),
            "gzip" => Some(Box::new(GzipCodec::default())),
            "zstd" => Some(Box::new(ZstdCodec::default())),
            "lz4" => Some(Box::new(Lz4Codec::default())),
            _ => None,
        }
    }

    /// Names of every registered codec except `none`, used for `best`/`fast`
    /// auto-selection.
    fn candidates(&self) -> impl Iterator<Item = &dyn Codec> {
        self.codecs.iter().map(|c| c.as_ref()).filter(|c| c.name() != "none")
    }

    /// Resolve a `CompressionSelection` against `bytes`, returning the
    /// chosen codec's name and the compressed output.
    pub async fn select(
        &self,
        selection: &CompressionSelection,
        bytes: &[u8],
        is_string_input: bool,
    ) -> Result<SelectedCompression> {
        match selection {
            CompressionSelection::Explicit(name) => {
                let codec = self
                    .get(name)
                    .ok_or_else(|| Error::DecompressError(format!("unknown codec: {name}")))?;
                let compressed = codec.compress(bytes).await?;
                Ok(SelectedCompression {
                    codec_name: codec.name().to_string(),
                    compressed,
                })
            }
            CompressionSelection::ExplicitWithParams(name, params) => {
                let mut codec = self
                    .new_instance(name)
                    .ok_or_else(|| Error::DecompressError(format!("unknown codec: {name}")))?;
                codec.set_params(*params);
                let compressed = codec.compress(bytes).await?;
                Ok(SelectedCompression {
                    codec_name: codec.name().to_string(),
                    compressed,
                })
            }
            CompressionSelection::Best => self.select_best(bytes, is_string_input).await,
            CompressionSelection::Fast => self.select_fast(bytes, is_string_input).await,
        }
    }

    async fn candidate_names(&self, is_string_input: bool) -> Vec<&dyn Codec> {
        self.candidates()
            .filter(|c| is_string_input || c.name() != "lz-string")
            .collect()
    }

    async fn select_best(&self, bytes: &[u8], is_string_input: bool) -> Result<SelectedCompression> {
        let candidates = self.candidate_names(is_string_input).await;
        if candidates.is_empty() {
            let none = self.get("none").expect("none codec always registered");
            return Ok(SelectedCompression {
                codec_name: none.name().to_string(),
                compressed: none.compress(bytes).await?,
            });
        }

        // Every candidate compresses concurrently; "best" only needs the
        // smallest output, not the fastest, so there's no reason to
        // serialize the work.
        let attempts = join_all(candidates.into_iter().map(|codec| async move {
            codec.compress(bytes).await.map(|compressed| SelectedCompression {
                codec_name: codec.name().to_string(),
                compressed,
            })
        }))
        .await;

        let mut best: Option<SelectedCompression> = None;
        for attempt in attempts {
            let candidate = attempt?;
            let is_smaller = best.as_ref().map(|b| candidate.compressed.len() < b.compressed.len()).unwrap_or(true);
            if is_smaller {
                best = Some(candidate);
            }
        }
        Ok(best.expect("at least one candidate compressed"))
    }

    async fn select_fast(&self, bytes: &[u8], is_string_input: bool) -> Result<SelectedCompression> {
        let candidates = self.candidate_names(is_string_input).await;
        if candidates.is_empty() {
            let none = self.get("none").expect("none codec always registered");
            return Ok(SelectedCompression {
                codec_name: none.name().to_string(),
                compressed: none.compress(bytes).await?,
            });
        }

        // Every candidate runs concurrently and is individually timed; "fast"
        // picks whichever reports the shortest wall-clock, not whichever the
        // scheduler happens to complete first, so every output is still
        // available for the comparison.
        let attempts = join_all(candidates.into_iter().map(|codec| async move {
            let start = Instant::now();
            let compressed = codec.compress(bytes).await?;
            let elapsed = start.elapsed();
            Ok::<_, Error>((
                SelectedCompression {
                    codec_name: codec.name().to_string(),
                    compressed,
                },
                elapsed,
            ))
        }))
        .await;

        let mut fastest: Option<(SelectedCompression, std::time::Duration)> = None;
        for attempt in attempts {
            let (candidate, elapsed) = attempt?;
            let is_faster = fastest.as_ref().map(|(_, d)| elapsed < *d).unwrap_or(true);
            if is_faster {
                fastest = Some((candidate, elapsed));
            }
        }
        Ok(fastest.expect("at least one candidate compressed").0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_codec_round_trips() {
        let registry = CodecRegistry::with_defaults();
        let payload = b"the quick brown fox jumps over the lazy dog, repeatedly, for padding";
        for name in ["none", "gzip", "zstd", "lz4"] {
            let codec = registry.get(name).unwrap();
            let compressed = codec.compress(payload).await.unwrap();
            let restored = codec.uncompress(&compressed).await.unwrap();
            assert_eq!(restored, payload, "codec {name} failed round trip");
        }
    }

    #[tokio::test]
    async fn best_picks_the_smallest_output() {
        let registry = CodecRegistry::with_defaults();
        let payload = vec![0u8; 4096];
        let selected = registry
            .select(&CompressionSelection::Best, &payload, false)
            .await
            .unwrap();
        assert!(selected.compressed.len() < payload.len());
    }

    #[tokio::test]
    async fn empty_payload_round_trips() {
        let registry = CodecRegistry::with_defaults();
        for name in ["none", "gzip", "zstd", "lz4"] {
            let codec = registry.get(name).unwrap();
            let compressed = codec.compress(&[]).await.unwrap();
            let restored = codec.uncompress(&compressed).await.unwrap();
            assert!(restored.is_empty());
        }
    }
}
