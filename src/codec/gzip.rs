use std::io::{Read, Write};

use async_trait::async_trait;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use super::{Codec, CodecParams};
use crate::error::{Error, Result};

pub struct GzipCodec {
    level: Compression,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

#[async_trait]
impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    async fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), self.level);
        encoder
            .write_all(bytes)
            .map_err(|e| Error::DecompressError(e.to_string()))?;
        encoder.finish().map_err(|e| Error::DecompressError(e.to_string()))
    }

    async fn uncompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::DecompressError(e.to_string()))?;
        Ok(out)
    }

    fn set_params(&mut self, params: CodecParams) {
        if let Some(level) = params.compression_level {
            self.level = Compression::new(level.clamp(0, 9) as u32);
        }
    }
}
