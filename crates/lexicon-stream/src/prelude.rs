//! Common imports for starting and consuming lookups.
pub use crate::{
    AbortHandle, HttpUpstream, LookupError, LookupRequest, LookupStream, LookupStreamer,
    ReplayUpstream, StreamFailure, StreamItem, StreamOutcome, UpstreamSource,
};
