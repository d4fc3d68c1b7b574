//! Result types: per-attempt records, per-file outcomes, and the run report.
//!
//! Everything here is `Serialize` so the CLI can print a run as JSON, and so
//! callers can persist reports and diff two runs over the same tree.

use crate::error::{AttemptError, Office2PdfError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One adapter attempt that did not produce a validated PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Adapter name, e.g. `"libreoffice"`.
    pub adapter: String,
    pub error: AttemptError,
}

/// What happened to one discovered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionOutcome {
    /// A validated PDF was produced by `adapter`.
    ///
    /// `prior_attempts` lists the earlier candidates that were unavailable or
    /// failed, in the order they were tried.
    Converted {
        adapter: String,
        prior_attempts: Vec<AttemptRecord>,
    },
    /// A source PDF was copied verbatim.
    Copied,
    /// The destination already held the finished result.
    SkippedAlreadyDone,
    /// Another source file earlier in traversal order maps to the same
    /// destination (e.g. `a.doc` next to `a.docx`).
    DuplicateDestination { claimed_by: PathBuf },
    /// No candidate produced a validated PDF, or the copy failed.
    ///
    /// `attempts` holds every candidate in declared order.
    Failed {
        reason: String,
        attempts: Vec<AttemptRecord>,
    },
}

impl ConversionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Short status word for logs and terminal output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Converted { .. } => "converted",
            Self::Copied => "copied",
            Self::SkippedAlreadyDone => "skipped",
            Self::DuplicateDestination { .. } => "duplicate",
            Self::Failed { .. } => "failed",
        }
    }

    /// Attempts that genuinely failed, leaving out unavailable backends.
    pub fn failed_attempts(&self) -> Vec<&AttemptRecord> {
        let records = match self {
            Self::Converted { prior_attempts, .. } => prior_attempts.as_slice(),
            Self::Failed { attempts, .. } => attempts.as_slice(),
            _ => &[],
        };
        records
            .iter()
            .filter(|r| !r.error.is_unavailable())
            .collect()
    }
}

/// Outcome of one file, with where it came from and where it went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub outcome: ConversionOutcome,
    /// Wall-clock time spent on this file.
    pub duration_ms: u64,
}

/// Aggregate counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Convertible files plus source PDFs selected for copying.
    pub discovered: usize,
    pub converted: usize,
    pub copied: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub failed: usize,
    /// Files never dispatched because the run was cancelled.
    pub not_started: usize,
    pub total_duration_ms: u64,
}

/// Summary of one batch run. Files appear in traversal order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub source_root: PathBuf,
    pub destination_root: PathBuf,
    pub files: Vec<FileOutcome>,
    pub stats: RunStats,
    /// `true` when dispatch stopped early on a cancel request.
    pub cancelled: bool,
}

impl RunReport {
    /// Tally `files` into a report.
    pub fn new(
        source_root: PathBuf,
        destination_root: PathBuf,
        discovered: usize,
        files: Vec<FileOutcome>,
        cancelled: bool,
        total_duration_ms: u64,
    ) -> Self {
        let mut stats = RunStats {
            discovered,
            not_started: discovered.saturating_sub(files.len()),
            total_duration_ms,
            ..RunStats::default()
        };
        for f in &files {
            match f.outcome {
                ConversionOutcome::Converted { .. } => stats.converted += 1,
                ConversionOutcome::Copied => stats.copied += 1,
                ConversionOutcome::SkippedAlreadyDone => stats.skipped += 1,
                ConversionOutcome::DuplicateDestination { .. } => stats.duplicates += 1,
                ConversionOutcome::Failed { .. } => stats.failed += 1,
            }
        }
        Self {
            source_root,
            destination_root,
            files,
            stats,
            cancelled,
        }
    }

    /// Source paths whose outcome is `Failed`, in traversal order.
    pub fn failed_paths(&self) -> Vec<&PathBuf> {
        self.files
            .iter()
            .filter(|f| f.outcome.is_failure())
            .map(|f| &f.source)
            .collect()
    }

    /// Treat any failed file as an error.
    pub fn into_result(self) -> Result<Self, Office2PdfError> {
        if self.stats.failed > 0 {
            return Err(Office2PdfError::FilesFailed {
                failed: self.stats.failed,
                total: self.files.len(),
            });
        }
        Ok(self)
    }
}

/// Progress of a tree, as reported by [`crate::batch::inspect`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStatus {
    /// Keyed by lowercase extension.
    pub by_extension: BTreeMap<String, ExtensionStatus>,
    /// PDFs present in the source tree.
    pub source_pdfs: usize,
    /// Of those, how many already have an exact-size copy at the destination.
    pub source_pdfs_copied: usize,
}

/// Counts for one source extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionStatus {
    pub total: usize,
    /// Mirrored destination exists and is non-empty.
    pub converted: usize,
}

impl TreeStatus {
    pub fn total(&self) -> usize {
        self.by_extension.values().map(|s| s.total).sum()
    }

    pub fn converted(&self) -> usize {
        self.by_extension.values().map(|s| s.converted).sum()
    }

    pub fn pending(&self) -> usize {
        self.total().saturating_sub(self.converted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, outcome: ConversionOutcome) -> FileOutcome {
        FileOutcome {
            source: PathBuf::from(format!("/in/{name}")),
            destination: PathBuf::from(format!("/out/{name}.pdf")),
            outcome,
            duration_ms: 1,
        }
    }

    #[test]
    fn report_tallies_each_outcome() {
        let files = vec![
            file(
                "a.docx",
                ConversionOutcome::Converted {
                    adapter: "docx-text".into(),
                    prior_attempts: vec![],
                },
            ),
            file("b.pdf", ConversionOutcome::Copied),
            file("c.xlsx", ConversionOutcome::SkippedAlreadyDone),
            file(
                "d.pptx",
                ConversionOutcome::Failed {
                    reason: "all backends exhausted".into(),
                    attempts: vec![],
                },
            ),
        ];
        let report = RunReport::new("/in".into(), "/out".into(), 5, files, true, 10);
        assert_eq!(report.stats.converted, 1);
        assert_eq!(report.stats.copied, 1);
        assert_eq!(report.stats.skipped, 1);
        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.stats.not_started, 1);
        assert_eq!(report.failed_paths(), vec![&PathBuf::from("/in/d.pptx")]);

        let err = report.into_result().unwrap_err();
        assert!(matches!(err, Office2PdfError::FilesFailed { failed: 1, total: 4 }));
    }

    #[test]
    fn failed_attempts_excludes_unavailable() {
        let outcome = ConversionOutcome::Failed {
            reason: "all backends exhausted".into(),
            attempts: vec![
                AttemptRecord {
                    adapter: "libreoffice".into(),
                    error: AttemptError::unavailable("not installed"),
                },
                AttemptRecord {
                    adapter: "spreadsheet-table".into(),
                    error: AttemptError::failed("corrupt workbook"),
                },
            ],
        };
        let failed = outcome.failed_attempts();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].adapter, "spreadsheet-table");
    }

    #[test]
    fn outcome_json_is_tagged() {
        let json = serde_json::to_string(&ConversionOutcome::SkippedAlreadyDone).unwrap();
        assert_eq!(json, r#"{"status":"skipped_already_done"}"#);
    }

    #[test]
    fn tree_status_pending() {
        let mut status = TreeStatus::default();
        status.by_extension.insert(
            "docx".into(),
            ExtensionStatus {
                total: 4,
                converted: 3,
            },
        );
        status.by_extension.insert(
            "png".into(),
            ExtensionStatus {
                total: 2,
                converted: 0,
            },
        );
        assert_eq!(status.total(), 6);
        assert_eq!(status.converted(), 3);
        assert_eq!(status.pending(), 3);
    }
}
