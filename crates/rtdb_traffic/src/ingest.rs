use std::io::ErrorKind;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::config::LineLimits;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum LineError {
    #[error("line {line_number}: I/O error while reading input ({kind:?})")]
    Io { line_number: usize, kind: ErrorKind },
    #[error("line {line_number}: invalid UTF-8")]
    InvalidUtf8 { line_number: usize },
    #[error("line {line_number}: too long (observed_bytes={observed_bytes}, max_line_bytes={max_line_bytes})")]
    TooLong {
        line_number: usize,
        observed_bytes: usize,
        max_line_bytes: usize,
    },
}

impl LineError {
    /// Whether the feed can keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, LineError::Io { .. })
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FeedLine {
    pub line_number: usize,
    pub text: String,
}

/// Bytes of the line being assembled. Once a line outgrows the limit its bytes are dropped and
/// only the length is tracked until the newline.
#[derive(Debug, Default)]
struct PendingLine {
    bytes: Vec<u8>,
    observed: usize,
    oversized: bool,
}

enum Step {
    /// Consumed this many bytes; the line continues in the next read.
    Partial(usize),
    /// Consumed this many bytes, newline included; the line is complete.
    Complete(usize),
    Eof,
    Failed(ErrorKind),
}

impl PendingLine {
    fn absorb(&mut self, chunk: &[u8], max_line_bytes: usize) -> Step {
        let (len, complete) = match chunk.iter().position(|b| *b == b'\n') {
            Some(idx) => (idx, true),
            None => (chunk.len(), false),
        };

        self.observed = self.observed.saturating_add(len);
        if self.observed > max_line_bytes {
            if !self.oversized {
                self.oversized = true;
                self.bytes = Vec::new();
            }
        } else {
            self.bytes.extend_from_slice(&chunk[..len]);
        }

        if complete {
            Step::Complete(len + 1)
        } else {
            Step::Partial(len)
        }
    }

    fn is_empty(&self) -> bool {
        self.observed == 0
    }
}

/// Turns a byte stream of debug output into text lines for [`crate::Collector::handle_line`].
///
/// Trailing `\r` is stripped and blank lines are skipped. Over-long and non-UTF-8 lines come
/// back as recoverable errors; an I/O error is the last item.
///
/// [`LineFeed::next_line`] is cancel safe: a partially read line is kept and completed by the
/// next call, so it can sit in a `tokio::select!` next to timers and signals.
pub struct LineFeed<R> {
    reader: R,
    limits: LineLimits,
    pending: PendingLine,
    line_number: usize,
    done: bool,
}

impl<R: AsyncBufRead + Unpin> LineFeed<R> {
    pub fn new(reader: R, limits: LineLimits) -> Self {
        Self {
            reader,
            limits,
            pending: PendingLine::default(),
            line_number: 0,
            done: false,
        }
    }

    /// Next non-blank line, or `None` once the input is exhausted or has failed.
    pub async fn next_line(&mut self) -> Option<Result<FeedLine, LineError>> {
        let max_line_bytes = self.limits.max_line_bytes;
        loop {
            if self.done {
                return None;
            }

            let step = match self.reader.fill_buf().await {
                Ok([]) => Step::Eof,
                Ok(chunk) => self.pending.absorb(chunk, max_line_bytes),
                Err(err) => Step::Failed(err.kind()),
            };

            match step {
                Step::Partial(consumed) => self.reader.consume(consumed),
                Step::Complete(consumed) => {
                    self.reader.consume(consumed);
                    if let Some(item) = self.finish_line() {
                        return Some(item);
                    }
                }
                Step::Eof => {
                    self.done = true;
                    if self.pending.is_empty() {
                        return None;
                    }
                    return self.finish_line();
                }
                Step::Failed(kind) => {
                    self.done = true;
                    self.line_number += 1;
                    return Some(Err(LineError::Io {
                        line_number: self.line_number,
                        kind,
                    }));
                }
            }
        }
    }

    /// Closes the pending line. Blank lines yield `None`.
    fn finish_line(&mut self) -> Option<Result<FeedLine, LineError>> {
        self.line_number += 1;
        let line_number = self.line_number;
        let line = std::mem::take(&mut self.pending);

        if line.oversized {
            return Some(Err(LineError::TooLong {
                line_number,
                observed_bytes: line.observed,
                max_line_bytes: self.limits.max_line_bytes,
            }));
        }

        let Ok(mut text) = String::from_utf8(line.bytes) else {
            return Some(Err(LineError::InvalidUtf8 { line_number }));
        };
        if text.ends_with('\r') {
            text.pop();
        }
        if text.chars().all(char::is_whitespace) {
            return None;
        }
        Some(Ok(FeedLine { line_number, text }))
    }
}
