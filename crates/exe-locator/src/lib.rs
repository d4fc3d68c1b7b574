//! # exe-locator
//!
//! Resolve external converter executables (`libreoffice`, `soffice`, `pandoc`,
//! …) to absolute paths, so callers depend on one [`ExecutableLocator`]
//! capability instead of carrying their own hardcoded search lists.
//!
//! ## How it works
//!
//! [`SystemLocator::find`] checks, first match wins:
//!
//! 1. `<NAME>_PATH` environment override (e.g. `LIBREOFFICE_PATH`), when it
//!    points to an existing file.
//! 2. Every directory on `PATH`.
//! 3. Platform install locations that are often missing from `PATH`
//!    (`/opt/homebrew/bin`, `/usr/local/bin`, `~/.local/bin`, app bundles such as
//!    `/Applications/LibreOffice.app/Contents/MacOS/soffice`, `Program Files`).
//!
//! Each name is tried together with its known aliases (`libreoffice` ⇄
//! `soffice`). Results, hits and misses alike, are cached for the lifetime of
//! the locator.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use exe_locator::{ExecutableLocator, SystemLocator};
//!
//! let locator = SystemLocator::new();
//! match locator.find("libreoffice") {
//!     Some(path) => println!("using {}", path.display()),
//!     None => eprintln!("LibreOffice not installed"),
//! }
//! ```
//!
//! ## Environment variable overrides
//!
//! - `<NAME>_PATH`: uppercase executable name with `-` mapped to `_`, e.g.
//!   `LIBREOFFICE_PATH=/opt/libreoffice/program/soffice`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

// ── Capability ───────────────────────────────────────────────────────────────

/// Finds an executable by bare name.
///
/// Implementations must be cheap to call repeatedly; adapters query it once
/// and keep the answer.
pub trait ExecutableLocator: Send + Sync {
    /// Absolute path of `name`, or `None` if it is not installed.
    fn find(&self, name: &str) -> Option<PathBuf>;
}

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by [`SystemLocator::locate`].
#[derive(Error, Debug)]
pub enum LocateError {
    /// Nothing matched in any searched location.
    #[error("executable '{name}' not found (searched {} directories)", .searched.len())]
    NotFound { name: String, searched: Vec<PathBuf> },

    /// The override variable is set but names a file that does not exist.
    #[error("{var} points to '{}', which does not exist", .path.display())]
    OverrideMissing { var: String, path: PathBuf },
}

// ── Aliases and well-known locations ────────────────────────────────────────

/// Alternative names a converter is commonly installed under.
pub fn aliases(name: &str) -> &'static [&'static str] {
    match name {
        "libreoffice" => &["soffice"],
        "soffice" => &["libreoffice"],
        _ => &[],
    }
}

/// Name of the environment variable that overrides the lookup of `name`.
pub fn env_override_var(name: &str) -> String {
    let mut var: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    var.push_str("_PATH");
    var
}

/// Install directories that are searched after `PATH`.
pub fn well_known_dirs() -> Vec<PathBuf> {
    let mut dirs_out: Vec<PathBuf> = Vec::new();

    match std::env::consts::OS {
        "macos" => {
            dirs_out.push(PathBuf::from("/opt/homebrew/bin"));
            dirs_out.push(PathBuf::from("/usr/local/bin"));
            dirs_out.push(PathBuf::from("/Applications/LibreOffice.app/Contents/MacOS"));
            if let Some(home) = dirs::home_dir() {
                dirs_out.push(home.join("Applications/LibreOffice.app/Contents/MacOS"));
            }
        }
        "windows" => {
            for var in ["ProgramFiles", "ProgramFiles(x86)"] {
                if let Ok(base) = std::env::var(var) {
                    let base = PathBuf::from(base);
                    dirs_out.push(base.join("LibreOffice").join("program"));
                    dirs_out.push(base.join("Pandoc"));
                }
            }
            if let Some(local) = dirs::data_local_dir() {
                dirs_out.push(local.join("Pandoc"));
            }
        }
        _ => {
            dirs_out.push(PathBuf::from("/usr/local/bin"));
            dirs_out.push(PathBuf::from("/usr/bin"));
            dirs_out.push(PathBuf::from("/opt/libreoffice/program"));
            dirs_out.push(PathBuf::from("/snap/bin"));
        }
    }

    if let Some(home) = dirs::home_dir() {
        dirs_out.push(home.join(".local").join("bin"));
    }

    dirs_out
}

fn path_dirs() -> Vec<PathBuf> {
    std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect())
        .unwrap_or_default()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn candidate_file_names(name: &str) -> Vec<String> {
    std::iter::once(name)
        .chain(aliases(name).iter().copied())
        .map(|n| format!("{n}{}", std::env::consts::EXE_SUFFIX))
        .collect()
}

// ── System locator ───────────────────────────────────────────────────────────

/// Locator backed by the real environment (`PATH`, overrides, install dirs).
pub struct SystemLocator {
    search_dirs: Vec<PathBuf>,
    cache: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl Default for SystemLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SystemLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemLocator")
            .field("search_dirs", &self.search_dirs)
            .finish()
    }
}

impl SystemLocator {
    /// Search `PATH` followed by [`well_known_dirs`].
    pub fn new() -> Self {
        let mut search_dirs = path_dirs();
        for dir in well_known_dirs() {
            if !search_dirs.contains(&dir) {
                search_dirs.push(dir);
            }
        }
        Self::with_search_dirs(search_dirs)
    }

    /// Search exactly `dirs`, in order. Environment overrides still apply.
    pub fn with_search_dirs(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            search_dirs,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Directories searched, in order.
    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Resolve `name` without consulting the cache, explaining misses.
    pub fn locate(&self, name: &str) -> Result<PathBuf, LocateError> {
        let var = env_override_var(name);
        let override_path = std::env::var_os(&var).map(PathBuf::from);
        if let Some(ref p) = override_path {
            if p.is_file() {
                return Ok(p.clone());
            }
        }

        let file_names = candidate_file_names(name);
        for dir in &self.search_dirs {
            for file_name in &file_names {
                let candidate = dir.join(file_name);
                if is_executable(&candidate) {
                    return Ok(candidate);
                }
            }
        }

        match override_path {
            Some(path) => Err(LocateError::OverrideMissing { var, path }),
            None => Err(LocateError::NotFound {
                name: name.to_string(),
                searched: self.search_dirs.clone(),
            }),
        }
    }
}

impl ExecutableLocator for SystemLocator {
    fn find(&self, name: &str) -> Option<PathBuf> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(name) {
                return hit.clone();
            }
        }

        let resolved = self.locate(name).ok();

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(name.to_string(), resolved.clone());
        }
        resolved
    }
}

// ── Fixed locator ────────────────────────────────────────────────────────────

/// Locator with an explicit name → path table and no filesystem lookups.
///
/// Useful for pinning converters from configuration, and in tests.
#[derive(Debug, Clone, Default)]
pub struct FixedLocator {
    entries: HashMap<String, PathBuf>,
}

impl FixedLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `name` to `path`.
    pub fn with(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.entries.insert(name.into(), path.into());
        self
    }
}

impl ExecutableLocator for FixedLocator {
    fn find(&self, name: &str) -> Option<PathBuf> {
        self.entries.get(name).cloned()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_var_name() {
        assert_eq!(env_override_var("libreoffice"), "LIBREOFFICE_PATH");
        assert_eq!(env_override_var("my-conv"), "MY_CONV_PATH");
    }

    #[test]
    fn libreoffice_and_soffice_are_aliases() {
        assert!(aliases("libreoffice").contains(&"soffice"));
        assert!(aliases("soffice").contains(&"libreoffice"));
        assert!(aliases("pandoc").is_empty());
    }

    #[test]
    fn missing_executable_reports_searched_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let locator = SystemLocator::with_search_dirs(vec![dir.path().to_path_buf()]);
        match locator.locate("definitely-not-installed-xyz") {
            Err(LocateError::NotFound { searched, .. }) => {
                assert_eq!(searched, vec![dir.path().to_path_buf()]);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(locator.find("definitely-not-installed-xyz").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn finds_executable_and_alias_in_search_dir() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("soffice");
        std::fs::write(&exe, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let locator = SystemLocator::with_search_dirs(vec![dir.path().to_path_buf()]);
        assert_eq!(locator.find("soffice"), Some(exe.clone()));
        assert_eq!(locator.find("libreoffice"), Some(exe));
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pandoc"), "not a program").unwrap();
        let locator = SystemLocator::with_search_dirs(vec![dir.path().to_path_buf()]);
        assert!(locator.find("pandoc").is_none());
    }

    #[test]
    fn fixed_locator_returns_only_configured_entries() {
        let locator = FixedLocator::new().with("pandoc", "/opt/pandoc/bin/pandoc");
        assert_eq!(
            locator.find("pandoc"),
            Some(PathBuf::from("/opt/pandoc/bin/pandoc"))
        );
        assert!(locator.find("libreoffice").is_none());
    }

    #[test]
    fn well_known_dirs_nonempty() {
        assert!(!well_known_dirs().is_empty());
    }
}
