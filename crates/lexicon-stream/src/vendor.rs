//! Vendor protocol decoding on top of wire events.
//!
//! Dispatch goes through an explicit [`HandlerRegistry`] keyed by
//! [`EventKind`]. Default behavior:
//!
//! - `message`: JSON envelope, content at `choices[0].delta.content`. A
//!   malformed envelope drops that fragment only. A bare `[DONE]` payload
//!   finishes the stream like `end`.
//! - `error`: fails the stream with the vendor's message, or a generic one when
//!   the payload cannot be read.
//! - `end`: finishes the stream; anything after it is ignored.
//!
//! Unknown event types are skipped.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::sse::WireEvent;

pub const GENERIC_UPSTREAM_ERROR: &str = "upstream reported an error";

/// Chat-completions terminator sent as a plain `data:` line.
pub const DONE_PAYLOAD: &str = "[DONE]";

/// Event types the decoder knows how to route.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventKind {
    Message,
    Error,
    End,
}

impl EventKind {
    pub fn from_wire(event_type: &str) -> Option<Self> {
        match event_type {
            "message" => Some(Self::Message),
            "error" => Some(Self::Error),
            "end" => Some(Self::End),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Error => "error",
            Self::End => "end",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the pipeline should do with one wire event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VendorAction {
    /// Forward a content fragment.
    Emit(String),
    /// Nothing to forward.
    Skip,
    /// Terminal failure with a human-readable message.
    Fail(String),
    /// Terminal success.
    Finish,
}

/// Handler invoked with an event's `data` payload.
pub type EventHandler = Box<dyn Fn(&str) -> VendorAction + Send + Sync>;

/// Event kind -> handler map, built once and shared between streams.
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, EventHandler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl HandlerRegistry {
    /// Registry with no handlers; every event is skipped.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with the chat-completions handlers for `message`, `error`, `end`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(EventKind::Message, message_delta);
        registry.register(EventKind::Error, error_message);
        registry.register(EventKind::End, |_| VendorAction::Finish);
        registry
    }

    /// Installs or replaces the handler for `kind`.
    pub fn register(
        &mut self,
        kind: EventKind,
        handler: impl Fn(&str) -> VendorAction + Send + Sync + 'static,
    ) {
        self.handlers.insert(kind, Box::new(handler));
    }

    pub fn dispatch(&self, event: &WireEvent) -> VendorAction {
        let Some(kind) = EventKind::from_wire(&event.event_type) else {
            debug!(
                event = "vendor.unknown_event",
                domain = "stream",
                event_type = event.event_type.as_str()
            );
            return VendorAction::Skip;
        };
        match self.handlers.get(&kind) {
            Some(handler) => handler(&event.data),
            None => VendorAction::Skip,
        }
    }
}

/// Extracts `choices[0].delta.content` from a chat-completions chunk.
pub fn message_delta(data: &str) -> VendorAction {
    if data.trim() == DONE_PAYLOAD {
        return VendorAction::Finish;
    }
    let value: serde_json::Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(err) => {
            warn!(
                event = "vendor.malformed_delta",
                domain = "stream",
                data_len = data.len() as u64,
                error = %err
            );
            return VendorAction::Skip;
        }
    };
    match value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
    {
        Some(text) if !text.is_empty() => VendorAction::Emit(text.to_string()),
        _ => VendorAction::Skip,
    }
}

/// Reads the vendor's error message; unreadable payloads still fail.
pub fn error_message(data: &str) -> VendorAction {
    let message = serde_json::from_str::<serde_json::Value>(data)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .or_else(|| value.get("message").and_then(|m| m.as_str()))
                .or_else(|| value.get("error").and_then(|m| m.as_str()))
                .map(|m| m.trim().to_string())
        })
        .filter(|m| !m.is_empty());
    VendorAction::Fail(message.unwrap_or_else(|| GENERIC_UPSTREAM_ERROR.to_string()))
}

/// Per-stream decoder. Once it has finished or failed, later events are skipped.
pub struct VendorStreamDecoder {
    registry: Arc<HandlerRegistry>,
    terminated: bool,
}

impl VendorStreamDecoder {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            terminated: false,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn decode(&mut self, event: &WireEvent) -> VendorAction {
        if self.terminated {
            return VendorAction::Skip;
        }
        let action = self.registry.dispatch(event);
        if matches!(action, VendorAction::Fail(_) | VendorAction::Finish) {
            self.terminated = true;
        }
        action
    }
}
