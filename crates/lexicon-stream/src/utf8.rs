//! Chunk-boundary-safe UTF-8 decoding.
//!
//! Network chunks split anywhere, including inside a multi-byte code point.
//! [`Utf8BoundaryDecoder`] emits only text that ends on a complete code point
//! and carries the 0-3 leftover bytes into the next chunk. Invalid sequences
//! are errors; nothing is ever replaced with U+FFFD.

/// Strict decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Byte at `offset` (counted from the start of the stream) cannot appear there.
    #[error("invalid UTF-8 byte 0x{byte:02x} at offset {offset}")]
    InvalidByte { offset: u64, byte: u8 },
    /// Stream ended inside a multi-byte code point.
    #[error("stream ended mid code point at offset {offset} ({pending} dangling bytes)")]
    Truncated { offset: u64, pending: usize },
}

/// Expected sequence length for a lead byte, or 0 if `b` cannot start one.
fn sequence_width(b: u8) -> usize {
    match b {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

fn is_continuation(b: u8) -> bool {
    (0x80..=0xBF).contains(&b)
}

/// Length of the longest prefix of `bytes` that does not end inside a code
/// point. Malformed tails are left in the prefix so validation reports them.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for i in (len.saturating_sub(3)..len).rev() {
        let b = bytes[i];
        if is_continuation(b) {
            continue;
        }
        let width = sequence_width(b);
        if width > 1 && i + width > len {
            return i;
        }
        return len;
    }
    len
}

/// Incremental decoder holding at most three residual bytes.
///
/// After an error the decoder should be discarded.
#[derive(Debug, Default)]
pub struct Utf8BoundaryDecoder {
    residual: Vec<u8>,
    /// Absolute offset of the first residual byte.
    offset: u64,
}

impl Utf8BoundaryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back waiting for the rest of a code point.
    pub fn pending(&self) -> usize {
        self.residual.len()
    }

    /// Decodes `chunk`, returning the text that is complete so far (possibly empty).
    ///
    /// On error any text decoded before the bad byte is lost; use
    /// [`push_into`](Self::push_into) to keep it.
    pub fn push(&mut self, chunk: &[u8]) -> Result<String, DecodeError> {
        let mut out = String::new();
        self.push_into(chunk, &mut out)?;
        Ok(out)
    }

    /// Appends the decodable text of `chunk` to `out`.
    ///
    /// When the chunk holds an invalid sequence, everything before it is
    /// still appended before the error is returned.
    pub fn push_into(&mut self, chunk: &[u8], out: &mut String) -> Result<(), DecodeError> {
        let mut rest = chunk;

        if !self.residual.is_empty() {
            let width = sequence_width(self.residual[0]);
            while self.residual.len() < width {
                let Some((&b, tail)) = rest.split_first() else {
                    return Ok(());
                };
                if !is_continuation(b) {
                    return Err(DecodeError::InvalidByte {
                        offset: self.offset + self.residual.len() as u64,
                        byte: b,
                    });
                }
                self.residual.push(b);
                rest = tail;
            }
            validate_into(&self.residual, self.offset, out)?;
            self.offset += self.residual.len() as u64;
            self.residual.clear();
        }

        let split = complete_prefix_len(rest);
        validate_into(&rest[..split], self.offset, out)?;
        self.offset += split as u64;
        self.residual.extend_from_slice(&rest[split..]);
        Ok(())
    }

    /// Signals end of stream; fails if a partial code point is still held.
    pub fn finish(&mut self) -> Result<(), DecodeError> {
        if self.residual.is_empty() {
            return Ok(());
        }
        Err(DecodeError::Truncated {
            offset: self.offset,
            pending: self.residual.len(),
        })
    }
}

/// Appends the valid prefix of `bytes` to `out`, failing at the first bad byte.
fn validate_into(bytes: &[u8], base: u64, out: &mut String) -> Result<(), DecodeError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            out.push_str(text);
            Ok(())
        }
        Err(e) => {
            let at = e.valid_up_to();
            if let Ok(valid) = std::str::from_utf8(&bytes[..at]) {
                out.push_str(valid);
            }
            Err(DecodeError::InvalidByte {
                offset: base + at as u64,
                byte: bytes[at],
            })
        }
    }
}
