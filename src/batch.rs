//! Batch walker: discover files under a source root, decide per file whether
//! work is needed, and dispatch conversions and verbatim PDF copies.
//!
//! ## Resume predicates
//!
//! * Conversion: skipped when the mirrored destination exists and is
//!   non-empty. A source edited after conversion is not reconverted.
//! * PDF copy: skipped only when the destination exists with exactly the
//!   source's byte size.
//!
//! Running twice over an unchanged tree therefore does no work the second
//! time.
//!
//! ## Ordering and concurrency
//!
//! Files are discovered in sorted order. With `concurrency = 1` each file is
//! fully resolved before the next starts. Higher values run independent
//! files at once while the report keeps traversal order. A tripped
//! [`CancelFlag`] stops new dispatches; in-flight files finish normally.

use crate::backend::write_atomically;
use crate::config::BatchConfig;
use crate::convert::convert_task;
use crate::error::{AttemptError, Office2PdfError};
use crate::format::{classify, normalized_extension, SourceKind};
use crate::output::{ConversionOutcome, ExtensionStatus, FileOutcome, RunReport, TreeStatus};
use crate::progress::{ConversionEvent, SharedObserver, TracingObserver};
use crate::registry::ConverterRegistry;
use crate::task::{mirrored_destination, ConversionTask};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Shared stop signal for a running batch.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A discovered file and what to do with it.
#[derive(Debug, Clone)]
enum WorkItem {
    Convert(ConversionTask),
    Copy {
        source: PathBuf,
        destination: PathBuf,
    },
    Duplicate {
        source: PathBuf,
        destination: PathBuf,
        claimed_by: PathBuf,
    },
}

impl WorkItem {
    fn paths(&self) -> (&Path, &Path) {
        match self {
            WorkItem::Convert(task) => (&task.source, &task.destination),
            WorkItem::Copy {
                source,
                destination,
            }
            | WorkItem::Duplicate {
                source,
                destination,
                ..
            } => (source, destination),
        }
    }
}

/// Files and directories found under a source root.
struct Walk {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|n| n.starts_with('.') || n.starts_with("~$"))
            .unwrap_or(false)
}

/// Sorted walk of `source_root`, skipping the destination tree when it lives
/// inside the source tree.
fn walk(source_root: &Path, destination_root: &Path, include_hidden: bool) -> Walk {
    let destination = std::fs::canonicalize(destination_root).ok();
    let mut files = Vec::new();
    let mut dirs = Vec::new();

    let entries = WalkDir::new(source_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if !include_hidden && is_hidden(e) {
                return false;
            }
            if e.depth() > 0 && e.file_type().is_dir() {
                if let Some(dest) = &destination {
                    if std::fs::canonicalize(e.path()).ok().as_ref() == Some(dest) {
                        return false;
                    }
                }
            }
            true
        });

    for entry in entries {
        match entry {
            Ok(e) if e.file_type().is_file() => files.push(e.into_path()),
            Ok(e) if e.file_type().is_dir() && e.depth() > 0 => dirs.push(e.into_path()),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "Skipping unreadable entry"),
        }
    }
    Walk { files, dirs }
}

/// Turn walked files into work items, resolving destination collisions in
/// traversal order.
fn plan(
    files: Vec<PathBuf>,
    source_root: &Path,
    destination_root: &Path,
    config: &BatchConfig,
) -> Vec<WorkItem> {
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
    let mut items = Vec::new();
    for source in files {
        let kind = classify(&source);
        let wanted = match kind {
            SourceKind::Convertible(_) => true,
            SourceKind::Pdf => config.copy_existing_pdfs,
            SourceKind::Unsupported => false,
        };
        if !wanted {
            continue;
        }
        let Some(destination) = mirrored_destination(source_root, destination_root, &source) else {
            continue;
        };
        if let Some(first) = claimed.get(&destination) {
            items.push(WorkItem::Duplicate {
                source,
                destination,
                claimed_by: first.clone(),
            });
            continue;
        }
        claimed.insert(destination.clone(), source.clone());
        items.push(match kind {
            SourceKind::Convertible(format) => {
                WorkItem::Convert(ConversionTask::new(source, destination, format))
            }
            _ => WorkItem::Copy {
                source,
                destination,
            },
        });
    }
    items
}

/// Conversion resume predicate.
pub fn is_converted(destination: &Path) -> bool {
    std::fs::metadata(destination)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Copy resume predicate.
pub fn is_copied(source: &Path, destination: &Path) -> bool {
    match (std::fs::metadata(source), std::fs::metadata(destination)) {
        (Ok(s), Ok(d)) => d.is_file() && s.len() == d.len(),
        _ => false,
    }
}

fn check_source_root(source_root: &Path) -> Result<(), Office2PdfError> {
    match std::fs::metadata(source_root) {
        Ok(m) if m.is_dir() => Ok(()),
        Ok(_) => Err(Office2PdfError::SourceNotDirectory {
            path: source_root.to_path_buf(),
        }),
        Err(_) => Err(Office2PdfError::SourceNotFound {
            path: source_root.to_path_buf(),
        }),
    }
}

async fn copy_verbatim(source: &Path, destination: &Path) -> Result<(), AttemptError> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let source = source.to_path_buf();
    let destination = destination.to_path_buf();
    tokio::task::spawn_blocking(move || {
        write_atomically(&destination, |out| {
            let mut input = File::open(&source)?;
            std::io::copy(&mut input, out)?;
            Ok(())
        })
    })
    .await
    .map_err(|e| AttemptError::failed(format!("copy task panicked: {e}")))?
}

/// Runs a batch over one source tree.
///
/// # Example
///
/// ```rust,no_run
/// use edgequake_office2pdf::{BatchConfig, BatchRunner, ConverterRegistry};
/// use exe_locator::SystemLocator;
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), edgequake_office2pdf::Office2PdfError> {
/// let config = BatchConfig::default();
/// let registry = ConverterRegistry::standard(&config, Arc::new(SystemLocator::new()));
/// let report = BatchRunner::new(config, registry)
///     .run("./documents".as_ref(), "./pdfs".as_ref())
///     .await?;
/// println!("{} converted, {} failed", report.stats.converted, report.stats.failed);
/// # Ok(())
/// # }
/// ```
pub struct BatchRunner {
    config: BatchConfig,
    registry: Arc<ConverterRegistry>,
    observer: SharedObserver,
    cancel: CancelFlag,
}

impl BatchRunner {
    /// Runner that reports through [`TracingObserver`].
    pub fn new(config: BatchConfig, registry: ConverterRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            observer: Arc::new(TracingObserver),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Use an externally owned cancel flag (e.g. one tripped by Ctrl-C).
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    /// Convert every recognised file under `source_root` into the mirrored
    /// location under `destination_root`.
    ///
    /// Per-file failures are recorded in the report, never returned as `Err`.
    ///
    /// # Errors
    /// Only when the batch cannot start: missing source root, or a
    /// destination root that cannot be created.
    pub async fn run(
        &self,
        source_root: &Path,
        destination_root: &Path,
    ) -> Result<RunReport, Office2PdfError> {
        let started = Instant::now();

        // ── Step 1: Roots ────────────────────────────────────────────────
        check_source_root(source_root)?;
        tokio::fs::create_dir_all(destination_root)
            .await
            .map_err(|source| Office2PdfError::DestinationCreateFailed {
                path: destination_root.to_path_buf(),
                source,
            })?;

        // ── Step 2: Discovery ────────────────────────────────────────────
        let (src, dst, include_hidden) = (
            source_root.to_path_buf(),
            destination_root.to_path_buf(),
            self.config.include_hidden,
        );
        let walked = tokio::task::spawn_blocking(move || walk(&src, &dst, include_hidden))
            .await
            .map_err(|e| Office2PdfError::Internal(format!("discovery task failed: {e}")))?;
        let items = plan(walked.files, source_root, destination_root, &self.config);
        info!(
            source = %source_root.display(),
            destination = %destination_root.display(),
            files = items.len(),
            "Discovered files"
        );

        // ── Step 3: Mirror directory tree ────────────────────────────────
        if self.config.mirror_directories {
            for dir in &walked.dirs {
                let Ok(relative) = dir.strip_prefix(source_root) else {
                    continue;
                };
                let target = destination_root.join(relative);
                if let Err(e) = tokio::fs::create_dir_all(&target).await {
                    warn!(dir = %target.display(), error = %e, "Could not mirror directory");
                }
            }
        }

        // ── Step 4: Dispatch ─────────────────────────────────────────────
        let discovered = items.len();
        self.observer
            .record(&ConversionEvent::BatchStarted { total: discovered });
        let cancel = self.cancel.clone();
        let files: Vec<FileOutcome> = stream::iter(items)
            .take_while(move |_| futures::future::ready(!cancel.is_cancelled()))
            .map(|item| self.process(item))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        // ── Step 5: Report ───────────────────────────────────────────────
        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            warn!(
                dispatched = files.len(),
                discovered, "Batch cancelled; remaining files were not started"
            );
        }
        let report = RunReport::new(
            source_root.to_path_buf(),
            destination_root.to_path_buf(),
            discovered,
            files,
            cancelled,
            started.elapsed().as_millis() as u64,
        );
        self.observer
            .record(&ConversionEvent::BatchFinished { report: &report });
        self.observer.flush();
        Ok(report)
    }

    async fn process(&self, item: WorkItem) -> FileOutcome {
        let started = Instant::now();
        let (source, destination) = {
            let (s, d) = item.paths();
            (s.to_path_buf(), d.to_path_buf())
        };

        let outcome = match item {
            WorkItem::Convert(task) => {
                if is_converted(&task.destination) {
                    debug!(source = %task.source.display(), "Already converted");
                    ConversionOutcome::SkippedAlreadyDone
                } else {
                    convert_task(&task, &self.registry, self.observer.as_ref()).await
                }
            }
            WorkItem::Copy {
                source,
                destination,
            } => {
                if is_copied(&source, &destination) {
                    debug!(source = %source.display(), "Already copied");
                    ConversionOutcome::SkippedAlreadyDone
                } else {
                    match copy_verbatim(&source, &destination).await {
                        Ok(()) => ConversionOutcome::Copied,
                        Err(e) => ConversionOutcome::Failed {
                            reason: format!("copy failed: {e}"),
                            attempts: Vec::new(),
                        },
                    }
                }
            }
            WorkItem::Duplicate { claimed_by, .. } => {
                ConversionOutcome::DuplicateDestination { claimed_by }
            }
        };

        let file = FileOutcome {
            source,
            destination,
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        self.observer
            .record(&ConversionEvent::FileFinished { file: &file });
        file
    }
}

/// Report how far a destination tree is from complete, without converting
/// anything.
pub fn inspect(
    source_root: &Path,
    destination_root: &Path,
    config: &BatchConfig,
) -> Result<TreeStatus, Office2PdfError> {
    check_source_root(source_root)?;
    let walked = walk(source_root, destination_root, config.include_hidden);
    let mut status = TreeStatus::default();
    for source in walked.files {
        let Some(destination) = mirrored_destination(source_root, destination_root, &source) else {
            continue;
        };
        match classify(&source) {
            SourceKind::Convertible(_) => {
                let ext = normalized_extension(&source).unwrap_or_default();
                let entry: &mut ExtensionStatus = status.by_extension.entry(ext).or_default();
                entry.total += 1;
                if is_converted(&destination) {
                    entry.converted += 1;
                }
            }
            SourceKind::Pdf => {
                status.source_pdfs += 1;
                if is_copied(&source, &destination) {
                    status.source_pdfs_copied += 1;
                }
            }
            SourceKind::Unsupported => {}
        }
    }
    Ok(status)
}
