use async_trait::async_trait;

use super::{Codec, CodecParams};
use crate::error::{Error, Result};

/// LZ4 codec. Frame-prefixes the uncompressed length so `uncompress` needs
/// no external size hint (`lz4_flex::compress_prepend_size`).
#[derive(Default)]
pub struct Lz4Codec;

#[async_trait]
impl Codec for Lz4Codec {
    fn name(&self) -> &'static str {
        "lz4"
    }

    async fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(bytes))
    }

    async fn uncompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        lz4_flex::decompress_size_prepended(bytes)
            .map_err(|e| Error::DecompressError(e.to_string()))
    }

    fn set_params(&mut self, _params: CodecParams) {}
}
