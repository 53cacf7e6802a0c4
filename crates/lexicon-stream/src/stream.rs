use serde::{Deserialize, Serialize};

use crate::errors::StreamFailure;

/// Kind of out-of-band value appended after the text fragments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    /// Decimal id of the version snapshot written for this lookup.
    Version,
}

impl ControlKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Version => "version",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFragment {
    pub kind: ControlKind,
    pub value: String,
}

/// Items delivered to a lookup caller, in order.
///
/// Zero or more `Text` items, then at most one of `Control` or `Failed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamItem {
    /// Incremental entry text.
    Text { seq: u64, text: String },
    /// Terminal control value; only sent when persistence fully succeeded.
    Control(ControlFragment),
    /// Terminal failure.
    Failed(StreamFailure),
}

impl StreamItem {
    pub fn version(value: impl ToString) -> Self {
        Self::Control(ControlFragment {
            kind: ControlKind::Version,
            value: value.to_string(),
        })
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Text { .. })
    }
}
