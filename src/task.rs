//! One unit of work for the orchestrator, and the mirrored-path rule.

use crate::format::Format;
use std::path::{Path, PathBuf};

/// Extension forced onto every destination file.
pub const PDF_EXTENSION: &str = "pdf";

/// A source file bound to its destination. Built once at discovery time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionTask {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub format: Format,
}

impl ConversionTask {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>, format: Format) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            format,
        }
    }
}

/// Map `source` (somewhere under `source_root`) to the same relative location
/// under `destination_root`, with the extension replaced by `.pdf`.
///
/// Returns `None` if `source` is not under `source_root`.
pub fn mirrored_destination(
    source_root: &Path,
    destination_root: &Path,
    source: &Path,
) -> Option<PathBuf> {
    let relative = source.strip_prefix(source_root).ok()?;
    relative.file_name()?;
    Some(destination_root.join(relative).with_extension(PDF_EXTENSION))
}
