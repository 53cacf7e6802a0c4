//! Re-encodes caller items as SSE for HTTP clients.

use crate::stream::StreamItem;

/// Renders one item as a complete SSE block (ending in a blank line).
///
/// Text is split on `\n` into multiple `data:` lines, so a conforming
/// client reassembles it exactly. Failures carry the JSON-encoded
/// [`StreamFailure`](crate::errors::StreamFailure).
pub fn encode_sse(item: &StreamItem) -> String {
    match item {
        StreamItem::Text { seq, text } => block("message", Some(*seq), text),
        StreamItem::Control(control) => block(control.kind.as_str(), None, &control.value),
        StreamItem::Failed(failure) => {
            let data = serde_json::to_string(failure).unwrap_or_else(|_| failure.to_string());
            block("error", None, &data)
        }
    }
}

fn block(event: &str, id: Option<u64>, data: &str) -> String {
    let mut out = format!("event: {event}\n");
    if let Some(id) = id {
        out.push_str(&format!("id: {id}\n"));
    }
    for line in data.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}
