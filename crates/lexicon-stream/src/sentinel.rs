//! Completion marker detection on the accumulated transcript.

/// Literal the model appends when an entry is complete.
pub const COMPLETION_MARKER: &str = "<END>";

/// Result of checking a transcript for the completion marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentinelCheck {
    /// True when the last marker is followed only by line breaks.
    pub satisfied: bool,
    /// Transcript without the marker and trailing line breaks. Only
    /// meaningful when `satisfied` is true; otherwise the input unchanged.
    pub sanitized: String,
}

fn is_line_break(c: char) -> bool {
    c == '\n' || c == '\r'
}

/// Checks `transcript` for a terminal [`COMPLETION_MARKER`].
///
/// The last occurrence wins, since models sometimes quote the marker earlier
/// in their output.
pub fn detect(transcript: &str) -> SentinelCheck {
    detect_marker(transcript, COMPLETION_MARKER)
}

pub fn detect_marker(transcript: &str, marker: &str) -> SentinelCheck {
    let unsatisfied = || SentinelCheck {
        satisfied: false,
        sanitized: transcript.to_string(),
    };
    if marker.is_empty() {
        return unsatisfied();
    }
    let Some(idx) = transcript.rfind(marker) else {
        return unsatisfied();
    };
    if !transcript[idx + marker.len()..].chars().all(is_line_break) {
        return unsatisfied();
    }
    SentinelCheck {
        satisfied: true,
        sanitized: transcript[..idx].trim_end_matches(is_line_break).to_string(),
    }
}

/// Hides the terminal completion marker from fragments forwarded to a caller.
///
/// Only a marker that ends the stream (followed by nothing but line breaks)
/// is dropped, matching [`detect`]; a marker quoted mid-entry is forwarded
/// unchanged. A complete marker with only line breaks after it, or a trailing
/// partial marker, is held back until the next fragment or
/// [`flush`](Self::flush) settles it.
#[derive(Debug)]
pub struct MarkerFilter {
    marker: &'static str,
    held: String,
}

impl Default for MarkerFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerFilter {
    pub fn new() -> Self {
        Self::with_marker(COMPLETION_MARKER)
    }

    pub fn with_marker(marker: &'static str) -> Self {
        Self {
            marker,
            held: String::new(),
        }
    }

    /// Returns the part of `fragment` (plus anything held back) that is safe
    /// to forward now. May be empty.
    pub fn push(&mut self, fragment: &str) -> String {
        let mut text = std::mem::take(&mut self.held);
        text.push_str(fragment);
        if self.marker.is_empty() {
            return text;
        }
        let hold_from = self.hold_from(&text);
        self.held = text.split_off(hold_from);
        text
    }

    /// Releases held-back text once no more fragments will arrive. A held
    /// terminal marker and the line breaks after it are dropped.
    pub fn flush(&mut self) -> String {
        let held = std::mem::take(&mut self.held);
        if !self.marker.is_empty() && self.is_terminal(&held) {
            return String::new();
        }
        held
    }

    fn is_terminal(&self, text: &str) -> bool {
        text.strip_prefix(self.marker)
            .is_some_and(|rest| rest.chars().all(is_line_break))
    }

    /// Byte index where the undecided tail of `text` starts.
    fn hold_from(&self, text: &str) -> usize {
        if let Some(idx) = text.rfind(self.marker)
            && self.is_terminal(&text[idx..])
        {
            return idx;
        }
        text.len() - partial_marker_len(text, self.marker)
    }
}

/// Length of the longest proper marker prefix that `text` ends with.
fn partial_marker_len(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .filter(|&n| marker.is_char_boundary(n))
        .find(|&n| text.ends_with(&marker[..n]))
        .unwrap_or(0)
}
