//! Sources of raw upstream bytes.
//!
//! The pipeline is transport-agnostic: anything that can hand back an ordered
//! stream of byte chunks for a request can drive a lookup.

mod http;
pub mod prompt;
mod replay;

use std::pin::Pin;

use async_trait::async_trait;

use crate::errors::StreamFailure;
use crate::request::LookupRequest;

pub use http::HttpUpstream;
pub use replay::ReplayUpstream;

/// Ordered raw chunks with no alignment guarantees. Dropping it cancels the
/// underlying request.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, StreamFailure>> + Send + 'static>>;

#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Opens the upstream stream for `request`. `request.model` is always set
    /// by the time this is called.
    async fn open(&self, request: &LookupRequest) -> Result<ByteStream, StreamFailure>;
}
