//! Line-oriented wire event parsing.
//!
//! Input is text that is already boundary-safe but may split lines anywhere.
//! Lines end in `\n` (a preceding `\r` is dropped). A blank line closes the
//! current block.

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_EVENT_TYPE: &str = "message";

/// One assembled protocol block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvent {
    pub event_type: String,
    pub data: String,
}

impl WireEvent {
    pub fn new(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: data.into(),
        }
    }
}

/// Incremental parser; feed text with [`push`](Self::push).
#[derive(Debug, Default)]
pub struct WireEventParser {
    partial_line: String,
    event: Option<String>,
    data_lines: Vec<String>,
}

fn field_value<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(prefix)?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

impl WireEventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes `text` and returns every block it completed.
    pub fn push(&mut self, text: &str) -> Vec<WireEvent> {
        let mut events = Vec::new();
        let buffered;
        let input: &str = if self.partial_line.is_empty() {
            text
        } else {
            self.partial_line.push_str(text);
            buffered = std::mem::take(&mut self.partial_line);
            &buffered
        };

        let mut rest = input;
        while let Some(idx) = rest.find('\n') {
            let line = &rest[..idx];
            let line = line.strip_suffix('\r').unwrap_or(line);
            self.process_line(line, &mut events);
            rest = &rest[idx + 1..];
        }
        self.partial_line.push_str(rest);
        events
    }

    /// Ends the input. An unterminated trailing block is dropped; returns
    /// whether anything was dropped.
    pub fn finish(&mut self) -> bool {
        let dropped = !self.partial_line.is_empty()
            || self.event.is_some()
            || !self.data_lines.is_empty();
        if dropped {
            debug!(
                event = "sse.unterminated_block_dropped",
                domain = "stream",
                partial_len = self.partial_line.len() as u64,
                data_lines = self.data_lines.len() as u64
            );
        }
        self.partial_line.clear();
        self.event = None;
        self.data_lines.clear();
        dropped
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<WireEvent>) {
        if line.is_empty() {
            if let Some(event) = self.take_block() {
                events.push(event);
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }
        if let Some(value) = field_value(line, "event:") {
            self.event = Some(value.to_string());
        } else if let Some(value) = field_value(line, "data:") {
            self.data_lines.push(value.to_string());
        }
    }

    fn take_block(&mut self) -> Option<WireEvent> {
        let event_type = self.event.take().unwrap_or_default();
        let data = std::mem::take(&mut self.data_lines).join("\n");
        if event_type.is_empty() && data.is_empty() {
            return None;
        }
        let event_type = if event_type.is_empty() {
            DEFAULT_EVENT_TYPE.to_string()
        } else {
            event_type
        };
        Some(WireEvent { event_type, data })
    }
}
