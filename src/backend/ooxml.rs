//! Text extraction from Office Open XML packages (`.docx`, `.pptx`).
//!
//! The packages are zip archives of XML parts. Only text runs, paragraph
//! boundaries and table structure are recovered; everything else is ignored.

use crate::error::AttemptError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use zip::ZipArchive;

pub(crate) type Package = ZipArchive<BufReader<File>>;

/// Open `path` as a zip package.
pub(crate) fn open_package(path: &Path) -> Result<Package, AttemptError> {
    let file = File::open(path)?;
    ZipArchive::new(BufReader::new(file))
        .map_err(|e| AttemptError::failed(format!("not an OOXML package: {e}")))
}

/// Read one part of the package as UTF-8 text.
pub(crate) fn read_part(package: &mut Package, name: &str) -> Result<String, AttemptError> {
    let mut entry = package
        .by_name(name)
        .map_err(|e| AttemptError::failed(format!("missing part {name}: {e}")))?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Concatenated contents of every element matched by `text_run` (whose first
/// capture group is the raw text), unescaped.
pub(crate) fn run_text(xml: &str, text_run: &Regex) -> String {
    let mut out = String::new();
    for caps in text_run.captures_iter(xml) {
        if let Some(m) = caps.get(1) {
            out.push_str(&unescape(m.as_str()));
        }
    }
    out
}

static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(amp|lt|gt|quot|apos|#[0-9]+|#x[0-9A-Fa-f]+);").unwrap());

/// Resolve the predefined XML entities and character references.
pub(crate) fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let resolved = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ if name.starts_with("#x") => u32::from_str_radix(&name[2..], 16)
                    .ok()
                    .and_then(char::from_u32),
                _ => name[1..].parse::<u32>().ok().and_then(char::from_u32),
            };
            resolved.map(String::from).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Cut `text` to `max` characters, ending in `...` when shortened.
pub(crate) fn truncate_cell(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
