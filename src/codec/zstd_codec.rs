use async_trait::async_trait;

use super::{Codec, CodecParams};
use crate::error::{Error, Result};

pub struct ZstdCodec {
    level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 3 }
    }
}

#[async_trait]
impl Codec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    async fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        zstd::bulk::compress(bytes, self.level).map_err(|e| Error::DecompressError(e.to_string()))
    }

    async fn uncompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        // Data records are capped well under 1024 bytes, so the decompressed
        // chunk can never exceed a few hundred KB even for pathological
        // compression ratios; 64 MiB is a generous ceiling for whole-payload
        // decompression in blocknote mode.
        zstd::bulk::decompress(bytes, 64 * 1024 * 1024)
            .map_err(|e| Error::DecompressError(e.to_string()))
    }

    fn set_params(&mut self, params: CodecParams) {
        if let Some(level) = params.compression_level {
            self.level = level.clamp(1, 22);
        }
    }
}
