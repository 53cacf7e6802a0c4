use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use lexicon_core::config::{DEFAULT_MODEL, DEFAULT_STREAM_BUFFER};
use lexicon_core::{ConfigError, LexiconConfig, WordPersistenceCoordinator};

use crate::errors::{LookupError, StreamFailure};
use crate::finalizer::{StreamFinalizer, StreamOutcome};
use crate::request::LookupRequest;
use crate::sentinel::MarkerFilter;
use crate::session::StreamingSession;
use crate::sse::WireEventParser;
use crate::stream::StreamItem;
use crate::upstream::{ByteStream, UpstreamSource};
use crate::utf8::Utf8BoundaryDecoder;
use crate::vendor::{HandlerRegistry, VendorAction, VendorStreamDecoder};

/// Handle used to request cancellation of a running lookup.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// Best-effort: the stream ends with `StreamItem::Failed(Cancelled)` and
    /// nothing is persisted, unless the upstream had already finished.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

struct StreamerInner {
    upstream: Arc<dyn UpstreamSource>,
    finalizer: Arc<StreamFinalizer>,
    registry: Arc<HandlerRegistry>,
    default_model: String,
    stream_buffer_capacity: usize,
}

/// Starts streaming lookups against one upstream and one persistence backend.
#[derive(Clone)]
pub struct LookupStreamer {
    inner: Arc<StreamerInner>,
}

impl LookupStreamer {
    pub fn builder() -> LookupStreamerBuilder {
        LookupStreamerBuilder::default()
    }

    /// Validates `request` and spawns its stream task.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn start(&self, mut request: LookupRequest) -> Result<LookupStream, LookupError> {
        request.validate()?;
        let model = request
            .model
            .get_or_insert_with(|| self.inner.default_model.clone())
            .clone();

        let request_id = uuid::Uuid::new_v4();
        let session = StreamingSession::new(request_id, &request, model);
        let (tx, rx) = mpsc::channel(self.inner.stream_buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);

        info!(
            event = "lookup.started",
            domain = "stream",
            request_id = %request_id,
            upstream = self.inner.upstream.name(),
            term = request.term.as_str(),
            language = request.language.as_str(),
            flavor = request.flavor.as_str(),
            capture_history = request.capture_history
        );
        tokio::spawn(run_lookup(
            self.inner.clone(),
            request,
            session,
            tx,
            final_tx,
            abort_rx,
        ));

        Ok(LookupStream {
            request_id,
            rx,
            final_rx,
            abort_handle: AbortHandle { tx: abort_tx },
            saw_terminal: false,
        })
    }
}

/// Builder for [`LookupStreamer`].
pub struct LookupStreamerBuilder {
    upstream: Option<Arc<dyn UpstreamSource>>,
    coordinator: Option<Arc<WordPersistenceCoordinator>>,
    registry: Option<Arc<HandlerRegistry>>,
    default_model: String,
    stream_buffer_capacity: usize,
}

impl Default for LookupStreamerBuilder {
    fn default() -> Self {
        Self {
            upstream: None,
            coordinator: None,
            registry: None,
            default_model: DEFAULT_MODEL.to_string(),
            stream_buffer_capacity: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl LookupStreamerBuilder {
    pub fn upstream(mut self, upstream: Arc<dyn UpstreamSource>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn coordinator(mut self, coordinator: Arc<WordPersistenceCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Replaces the default chat-completions handlers.
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Model used when a request does not name one.
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    /// Takes the default model and buffer size from `config`.
    pub fn config(self, config: &LexiconConfig) -> Self {
        self.default_model(config.model.clone())
            .stream_buffer_capacity(config.stream_buffer_capacity)
    }

    pub fn build(self) -> Result<LookupStreamer, LookupError> {
        let upstream = self
            .upstream
            .ok_or(LookupError::Config(ConfigError::Missing("upstream source")))?;
        let coordinator = self
            .coordinator
            .ok_or(LookupError::Config(ConfigError::Missing("persistence coordinator")))?;
        if self.stream_buffer_capacity == 0 {
            return Err(LookupError::Validation(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        if self.default_model.trim().is_empty() {
            return Err(LookupError::Validation("default model must not be empty".into()));
        }
        Ok(LookupStreamer {
            inner: Arc::new(StreamerInner {
                upstream,
                finalizer: Arc::new(StreamFinalizer::new(coordinator)),
                registry: self.registry.unwrap_or_default(),
                default_model: self.default_model,
                stream_buffer_capacity: self.stream_buffer_capacity,
            }),
        })
    }
}

/// Caller side of one running lookup.
///
/// Read items with [`next_item`](Self::next_item); [`finish`](Self::finish)
/// drains whatever is left and returns the outcome. Dropping the stream
/// cancels the lookup.
pub struct LookupStream {
    request_id: uuid::Uuid,
    rx: mpsc::Receiver<StreamItem>,
    final_rx: oneshot::Receiver<StreamOutcome>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl LookupStream {
    pub fn request_id(&self) -> uuid::Uuid {
        self.request_id
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Next item, or `None` once the stream is closed.
    pub async fn next_item(&mut self) -> Option<StreamItem> {
        let item = self.rx.recv().await;
        if item.as_ref().is_some_and(StreamItem::is_terminal) {
            self.saw_terminal = true;
        }
        item
    }

    /// Drains remaining items and returns how the lookup was settled.
    ///
    /// A failed stream is reported as `LookupError::Failed`.
    pub async fn finish(mut self) -> Result<StreamOutcome, LookupError> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(item) if item.is_terminal() => self.saw_terminal = true,
                Some(_) => {}
                None => break,
            }
        }
        match self.final_rx.await {
            Ok(StreamOutcome::Errored(failure)) => Err(LookupError::Failed(failure)),
            Ok(outcome) => Ok(outcome),
            Err(_) => Err(LookupError::Protocol(format!(
                "lookup task {} ended without an outcome",
                self.request_id
            ))),
        }
    }
}

/// Why the drive loop stopped early.
enum Halt {
    Failed(StreamFailure),
    CallerGone,
}

async fn run_lookup(
    inner: Arc<StreamerInner>,
    request: LookupRequest,
    mut session: StreamingSession,
    tx: mpsc::Sender<StreamItem>,
    final_tx: oneshot::Sender<StreamOutcome>,
    mut abort_rx: watch::Receiver<bool>,
) {
    let driven = drive(&inner, &request, &mut session, &tx, &mut abort_rx).await;
    let caller_gone = matches!(driven, Err(Halt::CallerGone));
    match driven {
        Ok(()) => {}
        Err(Halt::Failed(failure)) => session.mark_error(failure),
        Err(Halt::CallerGone) => {
            debug!(
                event = "lookup.caller_gone",
                domain = "stream",
                request_id = %session.request_id()
            );
            session.mark_error(StreamFailure::Cancelled);
        }
    }

    let request_id = session.request_id();
    let outcome = inner.finalizer.finalize(session).await;
    let terminal = match &outcome {
        StreamOutcome::Persisted { version_id, .. } => Some(StreamItem::version(version_id)),
        StreamOutcome::Errored(failure) => Some(StreamItem::Failed(failure.clone())),
        StreamOutcome::NotPersisted { .. } | StreamOutcome::Incomplete => None,
    };
    if !caller_gone && let Some(item) = terminal {
        let _ = tx.send(item).await;
    }
    info!(
        event = "lookup.finished",
        domain = "stream",
        request_id = %request_id,
        outcome = outcome.label(),
        version_id = ?outcome.version_id()
    );
    let _ = final_tx.send(outcome);
}

async fn drive(
    inner: &StreamerInner,
    request: &LookupRequest,
    session: &mut StreamingSession,
    tx: &mpsc::Sender<StreamItem>,
    abort_rx: &mut watch::Receiver<bool>,
) -> Result<(), Halt> {
    let mut upstream: ByteStream = tokio::select! {
        _ = abort_requested(abort_rx) => return Err(Halt::Failed(StreamFailure::Cancelled)),
        _ = tx.closed() => return Err(Halt::CallerGone),
        opened = inner.upstream.open(request) => opened.map_err(Halt::Failed)?,
    };

    let mut decoder = Utf8BoundaryDecoder::new();
    let mut parser = WireEventParser::new();
    let mut vendor = VendorStreamDecoder::new(inner.registry.clone());
    let mut forwarder = Forwarder::new(tx, session.request_id());

    loop {
        let next = tokio::select! {
            _ = abort_requested(abort_rx) => return Err(Halt::Failed(StreamFailure::Cancelled)),
            _ = tx.closed() => return Err(Halt::CallerGone),
            next = upstream.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                // Text before a bad byte still counts; the failure comes after it.
                let mut text = String::new();
                let decoded = decoder.push_into(&chunk, &mut text);
                for event in parser.push(&text) {
                    match vendor.decode(&event) {
                        VendorAction::Emit(fragment) => {
                            session.append(&fragment);
                            forwarder.forward(&fragment).await?;
                        }
                        VendorAction::Skip => {}
                        VendorAction::Fail(message) => {
                            forwarder.flush().await?;
                            return Err(Halt::Failed(StreamFailure::upstream(message)));
                        }
                        VendorAction::Finish => {
                            debug!(
                                event = "lookup.upstream_end",
                                domain = "stream",
                                request_id = %session.request_id(),
                                chunks = session.chunk_count()
                            );
                            return settle(&mut forwarder, tx).await;
                        }
                    }
                }
                if let Err(err) = decoded {
                    forwarder.flush().await?;
                    return Err(Halt::Failed(err.into()));
                }
            }
            Some(Err(failure)) => {
                forwarder.flush().await?;
                return Err(Halt::Failed(failure));
            }
            None => {
                parser.finish();
                forwarder.flush().await?;
                decoder.finish().map_err(|e| Halt::Failed(e.into()))?;
                return settle(&mut forwarder, tx).await;
            }
        }
    }
}

/// Clean upstream completion. A caller that left before this point counts as
/// gone, so nothing is persisted on its behalf.
async fn settle(forwarder: &mut Forwarder<'_>, tx: &mpsc::Sender<StreamItem>) -> Result<(), Halt> {
    forwarder.flush().await?;
    if tx.is_closed() {
        return Err(Halt::CallerGone);
    }
    Ok(())
}

/// Sends caller-visible text with the terminal completion marker held back.
struct Forwarder<'a> {
    tx: &'a mpsc::Sender<StreamItem>,
    request_id: uuid::Uuid,
    filter: MarkerFilter,
    seq: u64,
}

impl<'a> Forwarder<'a> {
    fn new(tx: &'a mpsc::Sender<StreamItem>, request_id: uuid::Uuid) -> Self {
        Self {
            tx,
            request_id,
            filter: MarkerFilter::new(),
            seq: 0,
        }
    }

    async fn forward(&mut self, fragment: &str) -> Result<(), Halt> {
        let text = self.filter.push(fragment);
        self.send(text).await
    }

    async fn flush(&mut self) -> Result<(), Halt> {
        let text = self.filter.flush();
        self.send(text).await
    }

    async fn send(&mut self, text: String) -> Result<(), Halt> {
        if text.is_empty() {
            return Ok(());
        }
        debug!(
            event = "lookup.fragment",
            domain = "stream",
            request_id = %self.request_id,
            seq = self.seq,
            chars = text.chars().count() as u64
        );
        let item = StreamItem::Text {
            seq: self.seq,
            text,
        };
        self.seq = self.seq.saturating_add(1);
        self.tx.send(item).await.map_err(|_| Halt::CallerGone)
    }
}

/// Resolves once cancellation was requested. Never resolves if every abort
/// handle is dropped without aborting.
async fn abort_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::encode_sse;
    use crate::upstream::ReplayUpstream;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use lexicon_core::store::{InMemorySearchService, InMemoryWordCache, WordCache};
    use lexicon_core::{RecordId, StoreError, UserId, Word};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn delta(text: &str) -> String {
        format!(
            "event: message\ndata: {}\n\n",
            serde_json::json!({"choices":[{"delta":{"content":text}}]})
        )
    }

    fn end() -> String {
        "event: end\ndata: [DONE]\n\n".to_string()
    }

    /// Upstream that serves scripted chunks, optionally hanging afterwards,
    /// and reports when its byte stream is dropped.
    struct ScriptedUpstream {
        chunks: Vec<Result<Bytes, StreamFailure>>,
        hang: bool,
        dropped: Mutex<Option<oneshot::Sender<()>>>,
    }

    impl ScriptedUpstream {
        fn new(chunks: Vec<String>) -> Self {
            Self {
                chunks: chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect(),
                hang: false,
                dropped: Mutex::new(None),
            }
        }

        fn raw(chunks: Vec<Result<Bytes, StreamFailure>>) -> Self {
            Self {
                chunks,
                hang: false,
                dropped: Mutex::new(None),
            }
        }

        fn hanging(chunks: Vec<String>) -> (Self, oneshot::Receiver<()>) {
            let (tx, rx) = oneshot::channel();
            let mut upstream = Self::new(chunks);
            upstream.hang = true;
            upstream.dropped = Mutex::new(Some(tx));
            (upstream, rx)
        }
    }

    struct DropSignal(Option<oneshot::Sender<()>>);

    impl Drop for DropSignal {
        fn drop(&mut self) {
            if let Some(tx) = self.0.take() {
                let _ = tx.send(());
            }
        }
    }

    #[async_trait]
    impl UpstreamSource for ScriptedUpstream {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn open(&self, _request: &LookupRequest) -> Result<ByteStream, StreamFailure> {
            let signal = DropSignal(self.dropped.lock().expect("lock").take());
            let head = stream::iter(self.chunks.clone());
            let body: ByteStream = if self.hang {
                Box::pin(head.chain(stream::pending()))
            } else {
                Box::pin(head)
            };
            Ok(Box::pin(body.map(move |chunk| {
                let _keep = &signal;
                chunk
            })))
        }
    }

    /// Serves `head`, then holds `tail` back until the gate opens.
    struct GatedUpstream {
        head: String,
        tail: String,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl UpstreamSource for GatedUpstream {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn open(&self, _request: &LookupRequest) -> Result<ByteStream, StreamFailure> {
            let gate = self.gate.lock().expect("lock").take();
            let head = stream::iter([Ok(Bytes::from(self.head.clone()))]);
            let tail = Bytes::from(self.tail.clone());
            let late = stream::once(async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok::<_, StreamFailure>(tail)
            });
            Ok(Box::pin(head.chain(late)))
        }
    }

    struct FailingOpen;

    #[async_trait]
    impl UpstreamSource for FailingOpen {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn open(&self, _request: &LookupRequest) -> Result<ByteStream, StreamFailure> {
            Err(StreamFailure::Upstream {
                message: "unauthorized".into(),
                status_code: Some(401),
            })
        }
    }

    /// Word cache wrapper that counts lookups, to observe coordinator calls.
    #[derive(Default)]
    struct CountingWords {
        inner: InMemoryWordCache,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WordCache for CountingWords {
        async fn find_active_by_normalized_term(
            &self,
            normalized_term: &str,
            language: &str,
            flavor: &str,
        ) -> Result<Option<Word>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner
                .find_active_by_normalized_term(normalized_term, language, flavor)
                .await
        }

        async fn save(&self, word: Word) -> Result<Word, StoreError> {
            self.inner.save(word).await
        }
    }

    struct Fixture {
        words: Arc<CountingWords>,
        search: Arc<InMemorySearchService>,
        record_id: RecordId,
    }

    impl Fixture {
        fn new() -> Self {
            let search = Arc::new(InMemorySearchService::new());
            let record = search.create_record(UserId(1), "hello", "en", "standard");
            Self {
                words: Arc::new(CountingWords::default()),
                search,
                record_id: record.id,
            }
        }

        fn streamer(&self, upstream: impl UpstreamSource + 'static) -> LookupStreamer {
            let coordinator =
                WordPersistenceCoordinator::new(self.words.clone(), self.search.clone());
            LookupStreamer::builder()
                .upstream(Arc::new(upstream))
                .coordinator(Arc::new(coordinator))
                .stream_buffer_capacity(4)
                .build()
                .expect("build streamer")
        }

        fn request(&self) -> LookupRequest {
            LookupRequest::new("hello").history(UserId(1), self.record_id)
        }

        fn coordinator_calls(&self) -> usize {
            self.words.calls.load(Ordering::SeqCst)
        }
    }

    async fn collect(stream: &mut LookupStream) -> Vec<StreamItem> {
        let mut items = Vec::new();
        while let Some(item) = stream.next_item().await {
            items.push(item);
        }
        items
    }

    fn text(seq: u64, text: &str) -> StreamItem {
        StreamItem::Text {
            seq,
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn forwards_fragments_then_version_and_persists_once() {
        let fx = Fixture::new();
        let streamer = fx.streamer(ScriptedUpstream::new(vec![
            delta("Hel"),
            delta("lo <END>"),
            end(),
        ]));
        let mut stream = streamer.start(fx.request()).await.expect("start");
        let items = collect(&mut stream).await;

        let versions = fx.search.list_versions(fx.record_id);
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version_number, 1);
        assert_eq!(versions[0].content, "Hello ");
        assert_eq!(
            items,
            vec![
                text(0, "Hel"),
                text(1, "lo "),
                StreamItem::version(versions[0].id),
            ]
        );
        let outcome = stream.finish().await.expect("finish");
        assert_eq!(outcome.version_id(), Some(versions[0].id));
    }

    #[tokio::test]
    async fn malformed_delta_is_dropped_and_stream_completes() {
        let fx = Fixture::new();
        let streamer = fx.streamer(ScriptedUpstream::new(vec![
            delta("good "),
            "event: message\ndata: {\"choices\":[\n\n".to_string(),
            delta("still good"),
            end(),
        ]));
        let mut stream = streamer.start(fx.request()).await.expect("start");
        let items = collect(&mut stream).await;
        assert_eq!(items, vec![text(0, "good "), text(1, "still good")]);
        assert_eq!(stream.finish().await.expect("finish"), StreamOutcome::Incomplete);
    }

    #[tokio::test]
    async fn missing_marker_never_reaches_the_coordinator() {
        let fx = Fixture::new();
        let streamer = fx.streamer(ScriptedUpstream::new(vec![
            delta("# hello\n\n## Definitions\n1. A greeting.\n"),
        ]));
        let outcome = streamer
            .start(fx.request())
            .await
            .expect("start")
            .finish()
            .await
            .expect("finish");
        assert_eq!(outcome, StreamOutcome::Incomplete);
        assert_eq!(fx.coordinator_calls(), 0);
        assert!(fx.search.list_versions(fx.record_id).is_empty());
    }

    #[tokio::test]
    async fn vendor_error_fails_stream_after_delivered_fragments() {
        let fx = Fixture::new();
        let streamer = fx.streamer(ScriptedUpstream::new(vec![
            delta("Hel"),
            "event: error\ndata: {\"error\":{\"message\":\"rate limited\"}}\n\n".to_string(),
            delta("never <END>"),
        ]));
        let mut stream = streamer.start(fx.request()).await.expect("start");
        let items = collect(&mut stream).await;
        assert_eq!(
            items,
            vec![
                text(0, "Hel"),
                StreamItem::Failed(StreamFailure::upstream("rate limited")),
            ]
        );
        assert_eq!(
            stream.finish().await,
            Err(LookupError::Failed(StreamFailure::upstream("rate limited")))
        );
        assert_eq!(fx.coordinator_calls(), 0);
    }

    #[tokio::test]
    async fn truncated_utf8_at_eof_is_a_decode_failure() {
        let fx = Fixture::new();
        let mut tail = b"data: ".to_vec();
        tail.extend_from_slice(&"日".as_bytes()[..2]);
        let streamer = fx.streamer(ScriptedUpstream::raw(vec![
            Ok(Bytes::from(delta("ok <END>"))),
            Ok(Bytes::from(tail)),
        ]));
        let mut stream = streamer.start(fx.request()).await.expect("start");
        let items = collect(&mut stream).await;
        assert_eq!(items.first(), Some(&text(0, "ok ")));
        assert!(matches!(
            items.last(),
            Some(StreamItem::Failed(StreamFailure::Decode { .. }))
        ));
        assert!(matches!(
            stream.finish().await,
            Err(LookupError::Failed(StreamFailure::Decode { .. }))
        ));
        assert_eq!(fx.coordinator_calls(), 0);
    }

    #[tokio::test]
    async fn text_before_an_invalid_byte_reaches_the_caller() {
        let fx = Fixture::new();
        let mut chunk = delta("Hel").into_bytes();
        chunk.push(0xff);
        let streamer = fx.streamer(ReplayUpstream::new(chunk, 4096));
        let mut stream = streamer.start(fx.request()).await.expect("start");
        let items = collect(&mut stream).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], text(0, "Hel"));
        assert!(matches!(
            &items[1],
            StreamItem::Failed(StreamFailure::Decode { message }) if message.contains("0xff")
        ));
        assert_eq!(fx.coordinator_calls(), 0);
    }

    #[tokio::test]
    async fn caller_leaving_before_end_skips_persistence() {
        let fx = Fixture::new();
        let (release, gate) = oneshot::channel();
        let streamer = fx.streamer(GatedUpstream {
            head: delta("# hello\n<END>"),
            tail: end(),
            gate: Mutex::new(Some(gate)),
        });
        let mut stream = streamer.start(fx.request()).await.expect("start");
        assert_eq!(stream.next_item().await, Some(text(0, "# hello\n")));

        let LookupStream { rx, final_rx, .. } = stream;
        drop(rx);
        let _ = release.send(());
        let outcome = tokio::time::timeout(Duration::from_secs(5), final_rx)
            .await
            .expect("settled")
            .expect("outcome");
        assert_eq!(outcome, StreamOutcome::Errored(StreamFailure::Cancelled));
        assert_eq!(fx.coordinator_calls(), 0);
        assert!(fx.search.list_versions(fx.record_id).is_empty());
    }

    #[tokio::test]
    async fn transport_error_mid_stream_fails_without_persistence() {
        let fx = Fixture::new();
        let streamer = fx.streamer(ScriptedUpstream::raw(vec![
            Ok(Bytes::from(delta("partial <END>"))),
            Err(StreamFailure::transport("connection reset")),
        ]));
        let outcome = streamer.start(fx.request()).await.expect("start").finish().await;
        assert_eq!(
            outcome,
            Err(LookupError::Failed(StreamFailure::transport("connection reset")))
        );
        assert_eq!(fx.coordinator_calls(), 0);
    }

    #[tokio::test]
    async fn multibyte_text_survives_single_byte_chunks() {
        let fx = Fixture::new();
        let capture = [delta("日本"), delta("語 <END>\n"), end()].concat();
        let streamer = fx.streamer(ReplayUpstream::new(capture, 1));
        let mut stream = streamer.start(fx.request()).await.expect("start");
        let items = collect(&mut stream).await;
        let forwarded: String = items
            .iter()
            .filter_map(|item| match item {
                StreamItem::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(forwarded, "日本語 ");
        assert!(matches!(items.last(), Some(StreamItem::Control(_))));
        assert_eq!(fx.search.list_versions(fx.record_id)[0].content, "日本語 ");
    }

    #[tokio::test]
    async fn abort_cancels_without_persistence() {
        let fx = Fixture::new();
        let (upstream, dropped) = ScriptedUpstream::hanging(vec![delta("# hello\n<END>")]);
        let streamer = fx.streamer(upstream);
        let mut stream = streamer.start(fx.request()).await.expect("start");
        assert_eq!(stream.next_item().await, Some(text(0, "# hello\n")));

        stream.abort_handle().abort();
        assert_eq!(
            stream.next_item().await,
            Some(StreamItem::Failed(StreamFailure::Cancelled))
        );
        assert_eq!(
            stream.finish().await,
            Err(LookupError::Failed(StreamFailure::Cancelled))
        );
        tokio::time::timeout(Duration::from_secs(5), dropped)
            .await
            .expect("upstream dropped")
            .expect("signal");
        assert_eq!(fx.coordinator_calls(), 0);
    }

    #[tokio::test]
    async fn caller_drop_cancels_without_persistence() {
        let fx = Fixture::new();
        let (upstream, dropped) = ScriptedUpstream::hanging(vec![delta("# hello\n<END>")]);
        let streamer = fx.streamer(upstream);
        let mut stream = streamer.start(fx.request()).await.expect("start");
        assert!(stream.next_item().await.is_some());
        drop(stream);

        tokio::time::timeout(Duration::from_secs(5), dropped)
            .await
            .expect("upstream dropped")
            .expect("signal");
        assert_eq!(fx.coordinator_calls(), 0);
        assert!(fx.search.list_versions(fx.record_id).is_empty());
    }

    #[tokio::test]
    async fn upstream_open_failure_is_terminal_item() {
        let fx = Fixture::new();
        let streamer = fx.streamer(FailingOpen);
        let mut stream = streamer.start(fx.request()).await.expect("start");
        let items = collect(&mut stream).await;
        assert_eq!(
            items,
            vec![StreamItem::Failed(StreamFailure::Upstream {
                message: "unauthorized".into(),
                status_code: Some(401),
            })]
        );
    }

    #[tokio::test]
    async fn sequential_completions_number_versions_in_order() {
        let fx = Fixture::new();
        for _ in 0..3 {
            let streamer = fx.streamer(ScriptedUpstream::new(vec![
                delta("# hello\n\n## Definitions\n1. A greeting.\n<END>"),
                end(),
            ]));
            let outcome = streamer
                .start(fx.request())
                .await
                .expect("start")
                .finish()
                .await
                .expect("finish");
            assert!(matches!(outcome, StreamOutcome::Persisted { .. }));
        }
        let versions = fx.search.list_versions(fx.record_id);
        let numbers: Vec<u32> = versions.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(versions.windows(2).all(|w| w[0].created_at < w[1].created_at));
        assert_eq!(fx.words.inner.active_len(), 1);
    }

    #[tokio::test]
    async fn anonymous_lookup_streams_without_version_fragment() {
        let fx = Fixture::new();
        let streamer = fx.streamer(ScriptedUpstream::new(vec![delta("Hi <END>"), end()]));
        let mut stream = streamer
            .start(LookupRequest::new("hi"))
            .await
            .expect("start");
        let items = collect(&mut stream).await;
        assert_eq!(items, vec![text(0, "Hi ")]);
        assert!(matches!(
            stream.finish().await,
            Ok(StreamOutcome::NotPersisted { .. })
        ));
        assert_eq!(fx.coordinator_calls(), 1);
    }

    #[tokio::test]
    async fn encoded_items_form_a_valid_sse_stream() {
        let fx = Fixture::new();
        let streamer = fx.streamer(ScriptedUpstream::new(vec![delta("a\nb <END>"), end()]));
        let mut stream = streamer.start(fx.request()).await.expect("start");
        let wire: String = collect(&mut stream).await.iter().map(encode_sse).collect();
        assert!(wire.starts_with("event: message\nid: 0\ndata: a\ndata: b \n\n"));
        assert!(wire.contains("event: version\ndata: "));
    }

    #[test]
    fn builder_requires_upstream_and_positive_buffer() {
        let missing = LookupStreamer::builder().build();
        assert!(matches!(
            missing,
            Err(LookupError::Config(ConfigError::Missing("upstream source")))
        ));

        let fx = Fixture::new();
        let coordinator = WordPersistenceCoordinator::new(fx.words.clone(), fx.search.clone());
        let zero = LookupStreamer::builder()
            .upstream(Arc::new(FailingOpen))
            .coordinator(Arc::new(coordinator))
            .stream_buffer_capacity(0)
            .build();
        assert!(matches!(zero, Err(LookupError::Validation(msg)) if msg.contains("stream_buffer_capacity")));
    }

    #[tokio::test]
    async fn start_rejects_invalid_request() {
        let fx = Fixture::new();
        let streamer = fx.streamer(FailingOpen);
        assert!(matches!(
            streamer.start(LookupRequest::new("   ")).await,
            Err(LookupError::Validation(_))
        ));
    }
}
