//! Source format classification by file extension.
//!
//! Every extension maps to at most one [`Format`]. Anything else is either a
//! PDF (copied verbatim) or unsupported (left out of the batch entirely).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A convertible document family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    WordDoc,
    Spreadsheet,
    Presentation,
    RasterImage,
}

impl Format {
    /// All formats, in registry listing order.
    pub const ALL: [Format; 4] = [
        Format::WordDoc,
        Format::Spreadsheet,
        Format::Presentation,
        Format::RasterImage,
    ];

    /// Lowercase extensions (without the dot) recognised for this format.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Format::WordDoc => &["docx", "doc", "odt", "rtf"],
            Format::Spreadsheet => &["xlsx", "xlsm", "xls", "ods"],
            Format::Presentation => &["pptx", "ppt", "odp"],
            Format::RasterImage => &["png", "jpg", "jpeg"],
        }
    }

    /// Format for a bare extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Format> {
        let ext = ext.to_ascii_lowercase();
        Format::ALL
            .into_iter()
            .find(|f| f.extensions().contains(&ext.as_str()))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Format::WordDoc => "word-doc",
            Format::Spreadsheet => "spreadsheet",
            Format::Presentation => "presentation",
            Format::RasterImage => "raster-image",
        };
        f.write_str(s)
    }
}

/// What the batch walker does with a discovered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Run through the fallback chain for this format.
    Convertible(Format),
    /// Already a PDF: copied verbatim.
    Pdf,
    /// Not part of the batch.
    Unsupported,
}

/// Lowercased extension of `path`, if any.
pub fn normalized_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Classify `path` by its extension.
pub fn classify(path: &Path) -> SourceKind {
    match normalized_extension(path).as_deref() {
        Some("pdf") => SourceKind::Pdf,
        Some(ext) => Format::from_extension(ext)
            .map(SourceKind::Convertible)
            .unwrap_or(SourceKind::Unsupported),
        None => SourceKind::Unsupported,
    }
}
