//! Error types for the edgequake-office2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Office2PdfError`] is **fatal**: the batch cannot run at all (missing
//!   source root, destination root not creatable, bad configuration). Returned
//!   as `Err(Office2PdfError)` from [`crate::batch::BatchRunner::run`] and
//!   friends.
//!
//! * [`AttemptError`] is **non-fatal**: one backend adapter could not convert
//!   one file. Stored in [`crate::output::AttemptRecord`] and never propagated;
//!   the orchestrator simply moves on to the next candidate adapter.
//!
//! A file whose every candidate failed is still not an `Err`: it becomes a
//! [`crate::output::ConversionOutcome::Failed`] in the run report, and the
//! batch keeps going.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-office2pdf library.
#[derive(Debug, Error)]
pub enum Office2PdfError {
    // ── Tree errors ───────────────────────────────────────────────────────
    /// Source root does not exist.
    #[error("Source directory not found: '{path}'\nCheck the path exists and is readable.")]
    SourceNotFound { path: PathBuf },

    /// Source root exists but is a file.
    #[error("Source '{path}' is not a directory")]
    SourceNotDirectory { path: PathBuf },

    /// Destination root could not be created.
    #[error("Failed to create destination directory '{path}': {source}")]
    DestinationCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An adapter was registered against a format it does not handle, or twice
    /// in the same chain.
    #[error("Invalid registry: {0}")]
    InvalidRegistry(String),

    // ── Outcome gate ──────────────────────────────────────────────────────
    /// Some files could not be converted.
    ///
    /// Returned by [`crate::output::RunReport::into_result`] when the caller
    /// wants to treat any per-file failure as an error.
    #[error("{failed}/{total} files failed to convert")]
    FilesFailed { failed: usize, total: usize },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error from a single adapter attempt.
///
/// The variant decides how the attempt is reported: `Unavailable` is
/// diagnostic only, everything else counts as a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptError {
    /// The backend is not installed on this host.
    #[error("backend unavailable: {detail}")]
    Unavailable { detail: String },

    /// The backend ran and reported an error (bad input, non-zero exit, crash).
    #[error("backend failed: {detail}")]
    InvocationFailed { detail: String },

    /// The attempt exceeded its time budget. External processes are killed
    /// along with everything they started.
    #[error("backend timed out after {}", format_budget(.budget_ms))]
    TimedOut { budget_ms: u64 },

    /// Backend claimed success but the destination is missing or empty.
    #[error("adapter reported success but produced empty/missing output: {detail}")]
    ValidationFailed { detail: String },
}

impl AttemptError {
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::Unavailable {
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self::InvocationFailed {
            detail: detail.into(),
        }
    }

    pub fn timed_out(budget: std::time::Duration) -> Self {
        Self::TimedOut {
            budget_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// `true` for `Unavailable`, which does not count as a failed attempt.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// `120s`, `1.5s` or `250ms`.
fn format_budget(ms: &u64) -> String {
    match *ms {
        ms if ms % 1000 == 0 => format!("{}s", ms / 1000),
        ms if ms >= 1000 => format!("{:.1}s", ms as f64 / 1000.0),
        ms => format!("{ms}ms"),
    }
}

impl From<std::io::Error> for AttemptError {
    fn from(e: std::io::Error) -> Self {
        Self::failed(format!("I/O error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_failed_display() {
        let e = Office2PdfError::FilesFailed {
            failed: 2,
            total: 10,
        };
        assert!(e.to_string().contains("2/10"), "got: {e}");
    }

    #[test]
    fn timed_out_display() {
        let e = AttemptError::timed_out(std::time::Duration::from_secs(120));
        assert_eq!(e, AttemptError::TimedOut { budget_ms: 120_000 });
        assert!(e.to_string().ends_with("after 120s"), "got: {e}");
        assert!(!e.is_unavailable());
    }

    #[test]
    fn sub_second_budget_is_not_rounded_to_zero() {
        let e = AttemptError::timed_out(std::time::Duration::from_millis(250));
        assert!(e.to_string().ends_with("after 250ms"), "got: {e}");
        let e = AttemptError::timed_out(std::time::Duration::from_millis(1500));
        assert!(e.to_string().ends_with("after 1.5s"), "got: {e}");
    }

    #[test]
    fn unavailable_is_not_a_failure() {
        assert!(AttemptError::unavailable("pandoc not found").is_unavailable());
        assert!(!AttemptError::failed("exit code 1").is_unavailable());
    }

    #[test]
    fn attempt_error_serialises_with_kind_tag() {
        let json = serde_json::to_string(&AttemptError::ValidationFailed {
            detail: "0 bytes".into(),
        })
        .unwrap();
        assert!(json.contains(r#""kind":"validation_failed""#), "got: {json}");
    }

    #[test]
    fn io_error_becomes_invocation_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let e: AttemptError = io.into();
        assert!(matches!(e, AttemptError::InvocationFailed { .. }));
        assert!(e.to_string().contains("disk full"));
    }
}
