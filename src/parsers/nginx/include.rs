//! Include pattern expansion

use crate::inventory::FsFailure;
use glob::{glob_with, MatchOptions};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// nginx only globs patterns containing one of `*?[`
pub fn has_magic(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

const NGINX_GLOB: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Remove `.` and `..` components without touching the filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `pattern` against `base` and normalize it
pub fn absolutize(base: &Path, pattern: &str) -> PathBuf {
    let path = Path::new(pattern);
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}

/// Expand an already absolute pattern, ignoring unreadable directories
pub fn iglob(pattern: &Path) -> Vec<PathBuf> {
    let text = pattern.to_string_lossy();
    if !has_magic(&text) {
        return vec![pattern.to_path_buf()];
    }
    match glob_with(&text, NGINX_GLOB) {
        Ok(paths) => paths.filter_map(Result::ok).collect(),
        Err(e) => {
            debug!(pattern = %text, error = %e, "invalid glob pattern");
            Vec::new()
        }
    }
}

/// Expands include patterns relative to the main configuration file,
/// the way nginx itself does
#[derive(Debug, Clone)]
pub struct IncludeResolver {
    base_dir: PathBuf,
    broken_directories: BTreeMap<PathBuf, FsFailure>,
}

impl IncludeResolver {
    pub fn new(main_config: &Path) -> Self {
        let base_dir = main_config
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            base_dir,
            broken_directories: BTreeMap::new(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn absolutize(&self, pattern: &str) -> PathBuf {
        absolutize(&self.base_dir, pattern)
    }

    /// Concrete files `pattern` denotes.
    ///
    /// A pattern without wildcards yields itself even when the file does not
    /// exist. Wildcard patterns only yield existing regular files; directories
    /// that cannot be listed are recorded in [`Self::broken_directories`].
    pub fn expand(&mut self, pattern: &str) -> Vec<PathBuf> {
        let absolute = self.absolutize(pattern);
        if !has_magic(pattern) {
            return vec![absolute];
        }

        let text = absolute.to_string_lossy();
        let entries = match glob_with(&text, NGINX_GLOB) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(pattern = %text, error = %e, "invalid include pattern");
                return Vec::new();
            }
        };

        let mut files = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => {
                    let failure = FsFailure::from_io(e.error());
                    self.broken_directories.insert(e.path().to_path_buf(), failure);
                }
            }
        }
        debug!(pattern = %text, matched = files.len(), "expanded include");
        files
    }

    pub fn broken_directories(&self) -> &BTreeMap<PathBuf, FsFailure> {
        &self.broken_directories
    }

    pub fn take_broken_directories(&mut self) -> BTreeMap<PathBuf, FsFailure> {
        std::mem::take(&mut self.broken_directories)
    }
}
