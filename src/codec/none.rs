use async_trait::async_trait;

use super::{Codec, CodecParams};
use crate::error::Result;

/// Identity codec: passes byte buffers through unchanged.
#[derive(Default)]
pub struct NoneCodec;

#[async_trait]
impl Codec for NoneCodec {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    async fn uncompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn set_params(&mut self, _params: CodecParams) {}
}
