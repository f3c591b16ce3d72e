//! Rejoining of wrapped diagnostic lines.
//!
//! Some toolchains wrap long diagnostics onto indented continuation lines.
//! A line-oriented parser expects one diagnostic per line, so the
//! aggregator concatenates continuations back onto the line they belong to
//! before forwarding.

use crate::runner::LineHandler;

/// Wraps another [`LineHandler`], joining indented continuation lines onto
/// the preceding logical line.
///
/// A line starting with at least two spaces is treated as a continuation of
/// the previous line and appended to it, separated by a single space. The
/// pending logical line is flushed when a non-continuation line arrives and
/// when the stream closes.
pub struct IndentAggregator<H: LineHandler> {
    inner: H,
    pending: Option<String>,
}

impl<H: LineHandler> IndentAggregator<H> {
    /// Wraps `inner` so it only sees complete logical lines.
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            pending: None,
        }
    }

    /// Unwraps the inner handler.
    pub fn into_inner(self) -> H {
        self.inner
    }

    fn flush(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.inner.line(&pending);
        }
    }
}

fn is_continuation(line: &str) -> bool {
    line.starts_with("  ")
}

impl<H: LineHandler> LineHandler for IndentAggregator<H> {
    fn started(&mut self, pid: u32) {
        self.inner.started(pid);
    }

    fn line(&mut self, line: &str) {
        if is_continuation(line) {
            if let Some(pending) = &mut self.pending {
                pending.push(' ');
                pending.push_str(line.trim_start());
                return;
            }
        }
        self.flush();
        self.pending = Some(line.to_string());
    }

    fn stream_closed(&mut self, error: Option<&std::io::Error>) {
        self.flush();
        self.inner.stream_closed(error);
    }
}
