//! Pattern matching over a growing output buffer.
//!
//! An [`OutputBuffer`] accumulates everything a session's child writes,
//! append-only, and is shared between the session's reader thread and the
//! caller blocked in an expect. Matching always starts at the consumption
//! offset handed in by the caller; a successful match reports the byte
//! range so the caller can advance its offset past it. Output consumed by
//! one successful expect is therefore never re-delivered to a later one.

use std::borrow::Cow;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Characters that make a pattern a regular expression rather than a
/// literal substring.
const REGEX_META: &[char] = &[
    '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$', '\\',
];

/// How many bytes of unmatched output to include in failure messages.
const TAIL_SNIPPET_BYTES: usize = 256;

/// A compiled expect pattern: a literal substring or a regular expression.
///
/// Plain text matches literally; anything containing regex metacharacters
/// is compiled as a regex. A malformed regex is an error, not a silent
/// fallback to literal matching.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    regex: regex::bytes::Regex,
    literal: bool,
}

impl Pattern {
    /// Compile a pattern argument.
    pub fn parse(raw: &str) -> Result<Self> {
        let literal = !raw.contains(REGEX_META);
        let source = if literal {
            Cow::Owned(regex::escape(raw))
        } else {
            Cow::Borrowed(raw)
        };
        let regex = regex::bytes::Regex::new(&source).map_err(|err| Error::Pattern {
            pattern: raw.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self {
            raw: raw.to_string(),
            regex,
            literal,
        })
    }

    /// The pattern as the caller wrote it.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern matches literally.
    pub fn is_literal(&self) -> bool {
        self.literal
    }

    /// Find the first match in `haystack`, returning its byte range.
    pub fn find_in(&self, haystack: &[u8]) -> Option<(usize, usize)> {
        self.regex.find(haystack).map(|m| (m.start(), m.end()))
    }
}

#[derive(Debug, Default)]
struct BufferState {
    data: Vec<u8>,
    eof: bool,
}

/// Shared, append-only output accumulator for one session.
///
/// The reader thread appends and signals; waiters block on the condvar
/// with a deadline, so an expect re-checks on new-data arrival rather
/// than on a fixed polling cadence.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<(Mutex<BufferState>, Condvar)>,
}

impl OutputBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes from the child's output stream and wake waiters.
    pub fn append(&self, bytes: &[u8]) {
        let (lock, signal) = &*self.inner;
        if let Ok(mut state) = lock.lock() {
            state.data.extend_from_slice(bytes);
        }
        signal.notify_all();
    }

    /// Record end-of-stream and wake waiters.
    pub fn mark_eof(&self) {
        let (lock, signal) = &*self.inner;
        if let Ok(mut state) = lock.lock() {
            state.eof = true;
        }
        signal.notify_all();
    }

    /// Whether the child's output stream has closed.
    pub fn is_eof(&self) -> bool {
        let (lock, _) = &*self.inner;
        lock.lock().map(|state| state.eof).unwrap_or(true)
    }

    /// Total bytes accumulated so far.
    pub fn len(&self) -> usize {
        let (lock, _) = &*self.inner;
        lock.lock().map(|state| state.data.len()).unwrap_or(0)
    }

    /// Whether nothing has been accumulated yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the bytes at `range` out of the buffer.
    pub fn slice(&self, start: usize, end: usize) -> Vec<u8> {
        let (lock, _) = &*self.inner;
        lock.lock()
            .ok()
            .and_then(|state| state.data.get(start..end).map(<[u8]>::to_vec))
            .unwrap_or_default()
    }

    /// Lossy UTF-8 snippet of the trailing unconsumed output, for failure
    /// messages.
    pub fn tail_snippet(&self, consumed: usize) -> String {
        let (lock, _) = &*self.inner;
        let Ok(state) = lock.lock() else {
            return String::new();
        };
        let unread = state.data.get(consumed..).unwrap_or_default();
        let start = unread.len().saturating_sub(TAIL_SNIPPET_BYTES);
        String::from_utf8_lossy(unread.get(start..).unwrap_or_default()).into_owned()
    }

    /// Block until the pattern matches at or after `consumed`, the stream
    /// closes, or `deadline` passes.
    ///
    /// The buffered bytes are scanned one final time after EOF so output
    /// that raced the stream close still counts as a match.
    pub fn wait_for_match(
        &self,
        pattern: &Pattern,
        consumed: usize,
        deadline: Instant,
    ) -> WaitOutcome {
        let (lock, signal) = &*self.inner;
        let Ok(mut state) = lock.lock() else {
            return WaitOutcome::StreamClosed;
        };
        loop {
            let unread = state.data.get(consumed..).unwrap_or_default();
            if let Some((start, end)) = pattern.find_in(unread) {
                return WaitOutcome::Matched {
                    start: consumed + start,
                    end: consumed + end,
                };
            }
            if state.eof {
                return WaitOutcome::StreamClosed;
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::TimedOut;
            }
            let wait = deadline.saturating_duration_since(now).min(Duration::from_millis(100));
            match signal.wait_timeout(state, wait) {
                Ok((next, _)) => state = next,
                Err(_) => return WaitOutcome::StreamClosed,
            }
        }
    }
}

/// Result of waiting for a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The pattern matched at the given absolute byte range.
    Matched {
        /// Absolute offset of the match start.
        start: usize,
        /// Absolute offset one past the match end.
        end: usize,
    },
    /// The deadline passed with the child still producing output.
    TimedOut,
    /// The output stream closed before a match.
    StreamClosed,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn plain_text_is_literal() {
        let pattern = Pattern::parse("hello world").unwrap();
        assert!(pattern.is_literal());
        assert!(pattern.find_in(b"say hello world now").is_some());
    }

    #[test]
    fn metacharacters_compile_as_regex() {
        let pattern = Pattern::parse(r"v\d+\.\d+").unwrap();
        assert!(!pattern.is_literal());
        assert_eq!(pattern.find_in(b"release v1.42 ready"), Some((8, 13)));
    }

    #[test]
    fn literal_dollar_free_text_does_not_anchor() {
        // "price 5" has no metacharacters; "price$" does and must compile.
        let pattern = Pattern::parse("price$").unwrap();
        assert!(!pattern.is_literal());
        assert!(pattern.find_in(b"total price").is_some());
    }

    #[test]
    fn malformed_regex_is_an_error() {
        let err = Pattern::parse("bad[").unwrap_err();
        assert!(matches!(err, Error::Pattern { .. }));
    }

    #[test]
    fn match_from_offset_skips_consumed_output() {
        let buffer = OutputBuffer::new();
        buffer.append(b"first marker then marker again");
        let pattern = Pattern::parse("marker").unwrap();

        let first = buffer.wait_for_match(&pattern, 0, Instant::now());
        let WaitOutcome::Matched { end, .. } = first else {
            panic!("expected a match, got {first:?}");
        };
        let second = buffer.wait_for_match(&pattern, end, Instant::now());
        assert!(matches!(second, WaitOutcome::Matched { start, .. } if start > end));
    }

    #[test]
    fn eof_wins_over_timeout() {
        let buffer = OutputBuffer::new();
        buffer.append(b"partial");
        buffer.mark_eof();
        let pattern = Pattern::parse("absent").unwrap();
        let outcome =
            buffer.wait_for_match(&pattern, 0, Instant::now() + Duration::from_secs(5));
        assert_eq!(outcome, WaitOutcome::StreamClosed);
    }

    #[test]
    fn final_bytes_before_eof_still_match() {
        let buffer = OutputBuffer::new();
        buffer.append(b"last words");
        buffer.mark_eof();
        let pattern = Pattern::parse("words").unwrap();
        let outcome =
            buffer.wait_for_match(&pattern, 0, Instant::now() + Duration::from_secs(1));
        assert!(matches!(outcome, WaitOutcome::Matched { .. }));
    }

    #[test]
    fn deadline_reports_timeout_on_open_stream() {
        let buffer = OutputBuffer::new();
        buffer.append(b"nothing useful");
        let pattern = Pattern::parse("absent").unwrap();
        let outcome =
            buffer.wait_for_match(&pattern, 0, Instant::now() + Duration::from_millis(20));
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn tail_snippet_reports_unconsumed_output() {
        let buffer = OutputBuffer::new();
        buffer.append(b"consumed|remaining output");
        assert_eq!(buffer.tail_snippet(9), "remaining output");
    }
}
