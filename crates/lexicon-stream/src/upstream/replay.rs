use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;

use super::{ByteStream, UpstreamSource};
use crate::errors::StreamFailure;
use crate::request::LookupRequest;

/// Serves a recorded capture, cut into fixed-size chunks.
///
/// Chunk boundaries ignore both line and code-point boundaries, which makes
/// this useful for exercising the decoders against real captures.
#[derive(Clone, Debug)]
pub struct ReplayUpstream {
    capture: Bytes,
    chunk_size: usize,
}

impl ReplayUpstream {
    /// `chunk_size` of zero is treated as one byte.
    pub fn new(capture: impl Into<Bytes>, chunk_size: usize) -> Self {
        Self {
            capture: capture.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    fn chunks(&self) -> Vec<Result<Bytes, StreamFailure>> {
        let mut out = Vec::with_capacity(self.capture.len() / self.chunk_size + 1);
        let mut start = 0;
        while start < self.capture.len() {
            let end = (start + self.chunk_size).min(self.capture.len());
            out.push(Ok(self.capture.slice(start..end)));
            start = end;
        }
        out
    }
}

#[async_trait]
impl UpstreamSource for ReplayUpstream {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn open(&self, _request: &LookupRequest) -> Result<ByteStream, StreamFailure> {
        Ok(Box::pin(stream::iter(self.chunks())))
    }
}
