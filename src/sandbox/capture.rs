//! Bounded output capture.
//!
//! Each stream keeps at most a fixed number of characters. Anything past the
//! cap is read and discarded so the child never blocks on a full pipe, and the
//! captured text ends with [`TRUNCATION_MARKER`].

use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Appended to output that hit the cap. Callers must treat such output as
/// unparsable.
pub const TRUNCATION_MARKER: &str = "\n[apigraph: output truncated]";

const READ_CHUNK: usize = 8 * 1024;

/// Text captured from one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub text: String,
    pub truncated: bool,
}

/// Incremental UTF-8 decoder with a character budget.
struct BoundedText {
    text: String,
    chars: usize,
    max_chars: usize,
    truncated: bool,
    pending: Vec<u8>,
}

impl BoundedText {
    fn new(max_chars: usize) -> Self {
        Self {
            text: String::new(),
            chars: 0,
            max_chars,
            truncated: false,
            pending: Vec::new(),
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        if self.truncated {
            return;
        }

        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(bytes);
        let mut rest: &[u8] = &input;

        while !rest.is_empty() && !self.truncated {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    self.push_str(valid);
                    rest = &[];
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    self.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(len) => {
                            self.push_str("\u{FFFD}");
                            rest = &after[len..];
                        }
                        // Incomplete sequence at the end of this chunk
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        if !self.truncated {
            self.pending = rest.to_vec();
        }
    }

    fn push_str(&mut self, s: &str) {
        if self.truncated {
            return;
        }
        // Byte length bounds the char count from above.
        if self.chars + s.len() <= self.max_chars {
            self.text.push_str(s);
            self.chars += s.chars().count();
            return;
        }
        for c in s.chars() {
            if self.chars >= self.max_chars {
                self.truncated = true;
                return;
            }
            self.text.push(c);
            self.chars += 1;
        }
    }

    fn finish(mut self) -> Captured {
        if !self.pending.is_empty() && !self.truncated {
            self.push_str("\u{FFFD}");
        }
        if self.truncated {
            self.text.push_str(TRUNCATION_MARKER);
        }
        Captured {
            text: self.text,
            truncated: self.truncated,
        }
    }
}

/// Read `reader` to EOF, keeping at most `max_chars` characters.
pub(crate) fn capture<R: Read>(mut reader: R, max_chars: usize) -> Captured {
    let mut acc = BoundedText::new(max_chars);
    let mut buf = [0u8; READ_CHUNK];

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => acc.push_bytes(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!("Stream read ended with error: {}", e);
                break;
            }
        }
    }

    acc.finish()
}

/// A `Read` adapter that stops yielding data after `limit` bytes, drains the
/// rest of the stream, and records that it did so.
pub struct BoundedReader<R> {
    inner: R,
    remaining: usize,
    truncated: Arc<AtomicBool>,
}

impl<R: Read> BoundedReader<R> {
    pub(crate) fn new(inner: R, limit: usize, truncated: Arc<AtomicBool>) -> Self {
        Self {
            inner,
            remaining: limit,
            truncated,
        }
    }

    /// Whether the cap was hit.
    pub fn was_truncated(&self) -> bool {
        self.truncated.load(Ordering::SeqCst)
    }
}

impl<R: Read> Read for BoundedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            let mut peek = [0u8; 1];
            if self.inner.read(&mut peek)? > 0 {
                self.truncated.store(true, Ordering::SeqCst);
                io::copy(&mut self.inner, &mut io::sink())?;
            }
            return Ok(0);
        }

        let want = buf.len().min(self.remaining);
        let n = self.inner.read(&mut buf[..want])?;
        self.remaining -= n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_within_limit() {
        let captured = capture("héllo wörld".as_bytes(), 100);
        assert_eq!(captured.text, "héllo wörld");
        assert!(!captured.truncated);
    }

    #[test]
    fn test_capture_truncates_with_marker() {
        let input = "x".repeat(50);
        let captured = capture(input.as_bytes(), 10);
        assert!(captured.truncated);
        assert!(captured.text.starts_with(&"x".repeat(10)));
        assert!(captured.text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_split_multibyte_sequence() {
        // 'é' is split across two pushes
        let mut acc = BoundedText::new(10);
        acc.push_bytes(&[b'a', 0xC3]);
        acc.push_bytes(&[0xA9, b'b']);
        let captured = acc.finish();
        assert_eq!(captured.text, "aéb");
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        let captured = capture(&[b'o', 0xFF, b'k'][..], 10);
        assert_eq!(captured.text, "o\u{FFFD}k");
    }

    #[test]
    fn test_bounded_reader() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut reader = BoundedReader::new("abcdefgh".as_bytes(), 4, flag.clone());
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "abcd");
        assert!(reader.was_truncated());
    }
}
