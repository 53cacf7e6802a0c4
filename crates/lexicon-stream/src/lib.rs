//! Streaming dictionary lookups.
//!
//! Upstream bytes go through three incremental stages (UTF-8 boundary
//! decoding, wire event parsing, vendor event dispatch) inside one task per
//! lookup. Text fragments reach the caller as they arrive; once the upstream
//! finishes, the accumulated transcript is checked for the completion marker
//! and handed to the persistence coordinator.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lexicon_core::store::{InMemorySearchService, InMemoryWordCache};
//! use lexicon_core::WordPersistenceCoordinator;
//! use lexicon_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = WordPersistenceCoordinator::new(
//!     Arc::new(InMemoryWordCache::new()),
//!     Arc::new(InMemorySearchService::new()),
//! );
//! let streamer = LookupStreamer::builder()
//!     .upstream(Arc::new(HttpUpstream::from_env()?))
//!     .coordinator(Arc::new(coordinator))
//!     .build()?;
//!
//! let mut stream = streamer.start(LookupRequest::new("serendipity")).await?;
//! while let Some(item) = stream.next_item().await {
//!     if let StreamItem::Text { text, .. } = item {
//!         print!("{text}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Stream failures and the public lookup error.
pub mod errors;
/// Session settlement and persistence trigger.
pub mod finalizer;
/// SSE rendering of caller items.
pub mod outbound;
/// Lookup task, caller handle, and cancellation.
pub mod pipeline;
/// Common imports for typical usage.
pub mod prelude;
/// Lookup request and its builder methods.
pub mod request;
/// Completion marker detection and filtering.
pub mod sentinel;
/// Per-lookup transcript accumulator.
pub mod session;
/// Line-oriented wire event parser.
pub mod sse;
/// Items delivered to the caller.
pub mod stream;
/// Upstream byte sources (HTTP and recorded captures).
pub mod upstream;
/// Code-point-safe decoding of arbitrarily split chunks.
pub mod utf8;
/// Vendor event registry and per-stream decoder.
pub mod vendor;

pub use errors::{LookupError, StreamFailure};
pub use finalizer::{StreamFinalizer, StreamOutcome};
pub use outbound::encode_sse;
pub use pipeline::{AbortHandle, LookupStream, LookupStreamer, LookupStreamerBuilder};
pub use request::LookupRequest;
pub use sentinel::{COMPLETION_MARKER, MarkerFilter, SentinelCheck};
pub use session::{SessionSummary, StreamingSession};
pub use sse::{WireEvent, WireEventParser};
pub use stream::{ControlFragment, ControlKind, StreamItem};
pub use upstream::{ByteStream, HttpUpstream, ReplayUpstream, UpstreamSource};
pub use utf8::{DecodeError, Utf8BoundaryDecoder};
pub use vendor::{EventKind, HandlerRegistry, VendorAction, VendorStreamDecoder};
