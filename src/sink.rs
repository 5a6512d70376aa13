//! Console output with overwrite semantics.
//!
//! The renderer supplies all escape sequences; the sink only decides line
//! termination. Write failures are swallowed: losing a terminal write must
//! never disturb the pipeline.

use std::io::Write;

use chrono::{DateTime, Utc};

pub trait Sink: Send + Sync {
    /// Write the line without a trailing newline so the next live write can
    /// overwrite it.
    fn write_live(&self, line: &str);
    /// Append a timestamped persistent line, padded with blank lines so
    /// subsequent live overwrites don't collide with it.
    fn write_snapshot(&self, ts: DateTime<Utc>, line: &str);
    /// Plain newline, used before log-style output lands on a live line.
    fn newline(&self);
}

pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for ConsoleSink {
    fn write_live(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(line.as_bytes());
        let _ = out.flush();
    }

    fn write_snapshot(&self, ts: DateTime<Utc>, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "\n{} {}\n", ts.format("%Y-%m-%d %H:%M:%S"), line);
        let _ = out.flush();
    }

    fn newline(&self) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(b"\n");
        let _ = out.flush();
    }
}
