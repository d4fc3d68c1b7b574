//! Single-file orchestration: walk a format's fallback chain until one
//! adapter produces a PDF that passes validation.
//!
//! An adapter's own report of success is never enough. After every reported
//! success the destination must exist with a non-zero size, otherwise the
//! attempt is recorded as [`AttemptError::ValidationFailed`] and the next
//! candidate runs. Attempts for one task are strictly sequential, and each
//! one is bounded by [`ConverterRegistry::attempt_budget`].

use crate::error::AttemptError;
use crate::output::{AttemptRecord, ConversionOutcome};
use crate::progress::{ConversionEvent, ConversionObserver};
use crate::registry::ConverterRegistry;
use crate::task::ConversionTask;
use std::path::Path;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Convert one task, trying each candidate adapter in registry order.
///
/// Never returns an error: every failure mode ends up in the returned
/// [`ConversionOutcome`]. On `Failed`, no file is left at the destination.
pub async fn convert_task(
    task: &ConversionTask,
    registry: &ConverterRegistry,
    observer: &dyn ConversionObserver,
) -> ConversionOutcome {
    // ── Step 1: Candidates ───────────────────────────────────────────────
    let candidates = registry.candidates_for(task.format);
    if candidates.is_empty() {
        return ConversionOutcome::Failed {
            reason: "unsupported format".into(),
            attempts: Vec::new(),
        };
    }

    // ── Step 2: Destination directory, once per task ─────────────────────
    if let Some(parent) = task.destination.parent() {
        // create_dir_all tolerates concurrent creators and existing dirs.
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return ConversionOutcome::Failed {
                reason: format!("cannot create {}: {e}", parent.display()),
                attempts: Vec::new(),
            };
        }
    }

    // ── Step 3: Fallback chain ───────────────────────────────────────────
    let source = task.source.as_path();
    let budget = registry.attempt_budget();
    let mut attempts = Vec::with_capacity(candidates.len());
    // Set while a failed attempt's output could not be removed.
    let mut stale: Option<std::io::Error> = None;
    for adapter in candidates {
        let name = adapter.name();

        if let crate::backend::Availability::Unavailable(detail) = adapter.probe() {
            observer.record(&ConversionEvent::AttemptUnavailable {
                source,
                adapter: name,
                detail: &detail,
            });
            attempts.push(AttemptRecord {
                adapter: name.to_string(),
                error: AttemptError::Unavailable { detail },
            });
            continue;
        }

        observer.record(&ConversionEvent::AttemptStarted {
            source,
            adapter: name,
        });
        let result = match timeout(budget, adapter.invoke(source, &task.destination)).await {
            Ok(Ok(())) => validate(&task.destination).await,
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    adapter = name,
                    source = %source.display(),
                    budget_ms = budget.as_millis() as u64,
                    "Attempt exceeded its time budget"
                );
                Err(AttemptError::timed_out(budget))
            }
        };

        match result {
            Ok(()) => {
                observer.record(&ConversionEvent::AttemptSucceeded {
                    source,
                    adapter: name,
                });
                return ConversionOutcome::Converted {
                    adapter: name.to_string(),
                    prior_attempts: attempts,
                };
            }
            Err(error) => {
                stale = remove_partial(&task.destination).await.err();
                if let AttemptError::Unavailable { detail } = &error {
                    observer.record(&ConversionEvent::AttemptUnavailable {
                        source,
                        adapter: name,
                        detail,
                    });
                } else {
                    observer.record(&ConversionEvent::AttemptFailed {
                        source,
                        adapter: name,
                        error: &error,
                    });
                }
                attempts.push(AttemptRecord {
                    adapter: name.to_string(),
                    error,
                });
            }
        }
    }

    // ── Step 4: Exhausted ────────────────────────────────────────────────
    ConversionOutcome::Failed {
        reason: exhausted_reason(&attempts, &task.destination, stale.as_ref()),
        attempts,
    }
}

/// Reason for a task whose whole chain failed.
///
/// A leftover partial file is named, since the next run's resume check
/// would take it for a finished conversion.
fn exhausted_reason(
    attempts: &[AttemptRecord],
    destination: &Path,
    stale: Option<&std::io::Error>,
) -> String {
    let reason = if attempts.iter().all(|a| a.error.is_unavailable()) {
        "no backend available"
    } else {
        "all backends exhausted"
    };
    match stale {
        Some(e) => format!(
            "{reason}; partial output could not be removed from {}: {e}",
            destination.display()
        ),
        None => reason.to_string(),
    }
}

/// Destination must exist and be non-empty.
async fn validate(destination: &Path) -> Result<(), AttemptError> {
    match tokio::fs::metadata(destination).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(meta) if meta.is_file() => Err(AttemptError::ValidationFailed {
            detail: format!("{} is empty", destination.display()),
        }),
        Ok(_) => Err(AttemptError::ValidationFailed {
            detail: format!("{} is not a regular file", destination.display()),
        }),
        Err(_) => Err(AttemptError::ValidationFailed {
            detail: format!("{} was not created", destination.display()),
        }),
    }
}

async fn remove_partial(destination: &Path) -> std::io::Result<()> {
    match tokio::fs::metadata(destination).await {
        Ok(meta) if meta.is_file() => {
            debug!(path = %destination.display(), "Removing output of failed attempt");
            match tokio::fs::remove_file(destination).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    warn!(
                        path = %destination.display(),
                        error = %e,
                        "Could not remove output of failed attempt"
                    );
                    Err(e)
                }
                _ => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Availability, BackendAdapter};
    use crate::format::Format;
    use crate::progress::NoopObserver;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Behaviour {
        Unavailable,
        Fail,
        Empty,
        Succeed,
        Hang,
    }

    struct Scripted {
        name: &'static str,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                name,
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl BackendAdapter for Scripted {
        fn name(&self) -> &str {
            self.name
        }
        fn formats(&self) -> &[Format] {
            &[Format::WordDoc]
        }
        fn probe(&self) -> Availability {
            match self.behaviour {
                Behaviour::Unavailable => Availability::Unavailable("missing".into()),
                _ => Availability::Available,
            }
        }
        async fn invoke(&self, _source: &Path, destination: &Path) -> Result<(), AttemptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Unavailable => Err(AttemptError::unavailable("missing")),
                Behaviour::Fail => {
                    std::fs::write(destination, b"half")?;
                    Err(AttemptError::failed("crashed"))
                }
                Behaviour::Empty => {
                    std::fs::write(destination, b"")?;
                    Ok(())
                }
                Behaviour::Succeed => {
                    std::fs::write(destination, b"%PDF-1.5 ok")?;
                    Ok(())
                }
                Behaviour::Hang => {
                    std::fs::write(destination, b"%PDF-1.5 half")?;
                    tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                    Ok(())
                }
            }
        }
    }

    fn registry(chain: &[Arc<Scripted>]) -> ConverterRegistry {
        let mut reg = ConverterRegistry::new();
        for a in chain {
            reg.register(Format::WordDoc, a.clone()).unwrap();
        }
        reg
    }

    #[tokio::test]
    async fn creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ok = Scripted::new("ok", Behaviour::Succeed);
        let task = ConversionTask::new(
            dir.path().join("a.docx"),
            dir.path().join("x/y/a.pdf"),
            Format::WordDoc,
        );
        let outcome = convert_task(&task, &registry(&[ok]), &NoopObserver).await;
        assert!(matches!(outcome, ConversionOutcome::Converted { .. }));
        assert!(dir.path().join("x/y/a.pdf").exists());
    }

    #[tokio::test]
    async fn failed_attempt_output_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let bad = Scripted::new("bad", Behaviour::Fail);
        let task = ConversionTask::new(
            dir.path().join("a.docx"),
            dir.path().join("a.pdf"),
            Format::WordDoc,
        );
        let outcome = convert_task(&task, &registry(&[bad]), &NoopObserver).await;
        match outcome {
            ConversionOutcome::Failed { reason, attempts } => {
                assert_eq!(reason, "all backends exhausted");
                assert_eq!(attempts.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!dir.path().join("a.pdf").exists());
    }

    #[tokio::test]
    async fn empty_output_fails_validation_and_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let empty = Scripted::new("empty", Behaviour::Empty);
        let ok = Scripted::new("ok", Behaviour::Succeed);
        let task = ConversionTask::new(
            dir.path().join("a.docx"),
            dir.path().join("a.pdf"),
            Format::WordDoc,
        );
        let outcome = convert_task(&task, &registry(&[empty, ok]), &NoopObserver).await;
        match outcome {
            ConversionOutcome::Converted {
                adapter,
                prior_attempts,
            } => {
                assert_eq!(adapter, "ok");
                assert!(matches!(
                    prior_attempts[0].error,
                    AttemptError::ValidationFailed { .. }
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unavailable_adapters_are_probed_not_invoked() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Scripted::new("missing", Behaviour::Unavailable);
        let task = ConversionTask::new(
            dir.path().join("a.docx"),
            dir.path().join("a.pdf"),
            Format::WordDoc,
        );
        let outcome = convert_task(&task, &registry(&[missing.clone()]), &NoopObserver).await;
        assert_eq!(missing.calls.load(Ordering::SeqCst), 0);
        match outcome {
            ConversionOutcome::Failed { reason, attempts } => {
                assert_eq!(reason, "no backend available");
                assert!(attempts[0].error.is_unavailable());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_chain_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let task = ConversionTask::new(
            dir.path().join("a.png"),
            dir.path().join("a.pdf"),
            Format::RasterImage,
        );
        let outcome = convert_task(&task, &ConverterRegistry::new(), &NoopObserver).await;
        assert_eq!(
            outcome,
            ConversionOutcome::Failed {
                reason: "unsupported format".into(),
                attempts: vec![],
            }
        );
    }

    #[tokio::test]
    async fn hung_adapter_times_out_and_chain_continues() {
        let dir = tempfile::tempdir().unwrap();
        let hang = Scripted::new("hang", Behaviour::Hang);
        let ok = Scripted::new("ok", Behaviour::Succeed);
        let reg = registry(&[hang, ok]).with_attempt_budget(std::time::Duration::from_millis(200));
        let task = ConversionTask::new(
            dir.path().join("a.docx"),
            dir.path().join("a.pdf"),
            Format::WordDoc,
        );

        let started = std::time::Instant::now();
        let outcome = convert_task(&task, &reg, &NoopObserver).await;

        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        match outcome {
            ConversionOutcome::Converted {
                adapter,
                prior_attempts,
            } => {
                assert_eq!(adapter, "ok");
                assert_eq!(
                    prior_attempts[0].error,
                    AttemptError::TimedOut { budget_ms: 200 }
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn timed_out_attempt_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let hang = Scripted::new("hang", Behaviour::Hang);
        let reg = registry(&[hang]).with_attempt_budget(std::time::Duration::from_millis(100));
        let task = ConversionTask::new(
            dir.path().join("a.docx"),
            dir.path().join("a.pdf"),
            Format::WordDoc,
        );
        let outcome = convert_task(&task, &reg, &NoopObserver).await;
        assert!(matches!(
            outcome,
            ConversionOutcome::Failed { ref reason, .. } if reason == "all backends exhausted"
        ));
        assert!(!dir.path().join("a.pdf").exists());
    }

    #[test]
    fn leftover_partial_output_is_named_in_reason() {
        let attempts = vec![AttemptRecord {
            adapter: "bad".into(),
            error: AttemptError::failed("crashed"),
        }];
        let dest = Path::new("/out/a.pdf");
        assert_eq!(
            exhausted_reason(&attempts, dest, None),
            "all backends exhausted"
        );
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let reason = exhausted_reason(&attempts, dest, Some(&denied));
        assert!(reason.starts_with("all backends exhausted; "), "{reason}");
        assert!(reason.contains("/out/a.pdf"), "{reason}");
        assert!(reason.contains("read-only"), "{reason}");
    }

    #[tokio::test]
    async fn removing_missing_output_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove_partial(&dir.path().join("never.pdf")).await.is_ok());
        let written = dir.path().join("half.pdf");
        std::fs::write(&written, b"half").unwrap();
        assert!(remove_partial(&written).await.is_ok());
        assert!(!written.exists());
    }
}
