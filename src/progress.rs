//! Diagnostics sink for conversion events.
//!
//! The orchestrator and the batch runner report everything they decide to a
//! [`ConversionObserver`] passed down by the caller: every adapter attempt,
//! every skip, every finished file and the final report. Nothing in the
//! library logs through global state except via [`TracingObserver`].
//!
//! # Example
//!
//! ```rust
//! use edgequake_office2pdf::{ConversionEvent, ConversionObserver};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Default)]
//! struct CountFailures(AtomicUsize);
//!
//! impl ConversionObserver for CountFailures {
//!     fn record(&self, event: &ConversionEvent<'_>) {
//!         if let ConversionEvent::AttemptFailed { .. } = event {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//! }
//! ```

use crate::error::AttemptError;
use crate::output::{FileOutcome, RunReport};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One thing that happened during a run.
#[derive(Debug, Clone, Copy)]
pub enum ConversionEvent<'a> {
    /// Discovery finished; `total` files will be dispatched.
    BatchStarted { total: usize },
    /// `adapter` is about to be invoked for `source`.
    AttemptStarted { source: &'a Path, adapter: &'a str },
    /// `adapter` is not installed here and was passed over.
    AttemptUnavailable {
        source: &'a Path,
        adapter: &'a str,
        detail: &'a str,
    },
    /// `adapter` ran but did not produce a validated PDF.
    AttemptFailed {
        source: &'a Path,
        adapter: &'a str,
        error: &'a AttemptError,
    },
    /// `adapter` produced a validated PDF.
    AttemptSucceeded { source: &'a Path, adapter: &'a str },
    /// A file reached its final outcome (including skips and copies).
    FileFinished { file: &'a FileOutcome },
    /// The run is over.
    BatchFinished { report: &'a RunReport },
}

/// Receives [`ConversionEvent`]s.
///
/// Implementations must be `Send + Sync`: with concurrency above 1, events for
/// different files arrive from different tasks.
pub trait ConversionObserver: Send + Sync {
    fn record(&self, event: &ConversionEvent<'_>);

    /// Called once after `BatchFinished`.
    fn flush(&self) {}
}

/// Shared observer handle, as threaded through the runner.
pub type SharedObserver = Arc<dyn ConversionObserver>;

/// Discards everything.
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {
    fn record(&self, _event: &ConversionEvent<'_>) {}
}

/// Turns every event into a structured `tracing` record.
///
/// Attempt chatter goes to `debug`, unavailable backends and failed attempts
/// to `warn`, per-file outcomes and the summary to `info`.
pub struct TracingObserver;

impl ConversionObserver for TracingObserver {
    fn record(&self, event: &ConversionEvent<'_>) {
        match *event {
            ConversionEvent::BatchStarted { total } => {
                info!(total, "Starting batch");
            }
            ConversionEvent::AttemptStarted { source, adapter } => {
                debug!(source = %source.display(), adapter, "Trying backend");
            }
            ConversionEvent::AttemptUnavailable {
                source,
                adapter,
                detail,
            } => {
                debug!(source = %source.display(), adapter, detail, "Backend unavailable");
            }
            ConversionEvent::AttemptFailed {
                source,
                adapter,
                error,
            } => {
                warn!(source = %source.display(), adapter, error = %error, "Backend failed");
            }
            ConversionEvent::AttemptSucceeded { source, adapter } => {
                debug!(source = %source.display(), adapter, "Backend succeeded");
            }
            ConversionEvent::FileFinished { file } => match &file.outcome {
                crate::output::ConversionOutcome::Failed { reason, attempts } => {
                    warn!(
                        source = %file.source.display(),
                        reason = %reason,
                        attempts = attempts.len(),
                        "Conversion failed"
                    );
                }
                crate::output::ConversionOutcome::Converted { adapter, .. } => {
                    info!(
                        source = %file.source.display(),
                        destination = %file.destination.display(),
                        adapter = %adapter,
                        ms = file.duration_ms,
                        "Converted"
                    );
                }
                other => {
                    info!(
                        source = %file.source.display(),
                        status = other.label(),
                        "{}",
                        other.label()
                    );
                }
            },
            ConversionEvent::BatchFinished { report } => {
                let s = &report.stats;
                info!(
                    converted = s.converted,
                    copied = s.copied,
                    skipped = s.skipped,
                    duplicates = s.duplicates,
                    failed = s.failed,
                    not_started = s.not_started,
                    ms = s.total_duration_ms,
                    cancelled = report.cancelled,
                    "Batch complete"
                );
                for path in report.failed_paths() {
                    warn!(source = %path.display(), "Failed file");
                }
            }
        }
    }
}
