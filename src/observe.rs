//! Observer hooks for read diagnostics.
//!
//! There is no global logger; callers that want diagnostics attach a
//! [`ReadObserver`] via [`crate::reader::ReadOptions`]. All hooks have empty
//! defaults, so implementors only override what they care about.

use std::fmt;
use std::sync::Arc;

use crate::format::Format;

/// Observer interface for read-time events.
///
/// Implementors can record metrics, log, or collect diagnostics.
pub trait ReadObserver: Send + Sync {
    /// Called once after format detection.
    fn on_format(&self, _format: &Format) {}

    /// Called for each skipped invalid row, up to the configured message
    /// cap. `diagnostic` is truncated to a bounded length.
    fn on_invalid_row(&self, _line: u64, _diagnostic: &str) {}

    /// Called once when the message cap is reached; skipping continues to
    /// be counted silently afterwards.
    fn on_invalid_rows_suppressed(&self, _skipped_so_far: usize) {}

    /// Called per column that received a semantic type during autocasting.
    fn on_column_cast(&self, _name: &str, _semantic: &str) {}
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ReadObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn ReadObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl ReadObserver for CompositeObserver {
    fn on_format(&self, format: &Format) {
        for o in &self.observers {
            o.on_format(format);
        }
    }

    fn on_invalid_row(&self, line: u64, diagnostic: &str) {
        for o in &self.observers {
            o.on_invalid_row(line, diagnostic);
        }
    }

    fn on_invalid_rows_suppressed(&self, skipped_so_far: usize) {
        for o in &self.observers {
            o.on_invalid_rows_suppressed(skipped_so_far);
        }
    }

    fn on_column_cast(&self, name: &str, semantic: &str) {
        for o in &self.observers {
            o.on_column_cast(name, semantic);
        }
    }
}

/// Logs read events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl ReadObserver for StdErrObserver {
    fn on_format(&self, format: &Format) {
        eprintln!(
            "[read][format] encoding={} preamble={} footer={} delimiter={:?} columns={}",
            format.encoding,
            format.preamble,
            format.footer,
            format.dialect.delimiter,
            format.columns.len()
        );
    }

    fn on_invalid_row(&self, line: u64, diagnostic: &str) {
        eprintln!("[read][skip] line={line} {diagnostic}");
    }

    fn on_invalid_rows_suppressed(&self, skipped_so_far: usize) {
        eprintln!("[read][skip] further messages suppressed (skipped={skipped_so_far})");
    }

    fn on_column_cast(&self, name: &str, semantic: &str) {
        eprintln!("[read][cast] column={name} semantic={semantic}");
    }
}
