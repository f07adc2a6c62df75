//! File and directory inventory
//!
//! Every file and directory touched while reading a configuration is
//! recorded with its size, mtime and permission bits. Paths that cannot be
//! read end up in the `broken_*` maps instead, never in both.

mod skim;

pub use skim::Skimmer;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

/// Filesystem facts about one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub size: u64,
    pub mtime: i64,
    /// Octal permission bits, e.g. `0644`
    pub permissions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<usize>,
}

/// Why a path could not be inventoried
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsFailure {
    pub exception_class: String,
    pub message: String,
}

impl FsFailure {
    pub fn from_io(err: &io::Error) -> Self {
        Self {
            exception_class: format!("{:?}", err.kind()),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for FsFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.exception_class, self.message)
    }
}

/// Stat a path
pub fn stat(path: &Path) -> Result<InventoryEntry, FsFailure> {
    let meta = fs::metadata(path).map_err(|e| FsFailure::from_io(&e))?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(InventoryEntry {
        size: meta.len(),
        mtime,
        permissions: permission_bits(&meta),
        lines: None,
    })
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:04o}", meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permission_bits(meta: &fs::Metadata) -> String {
    if meta.permissions().readonly() {
        "0444".to_string()
    } else {
        "0644".to_string()
    }
}

/// Whether the current process can open `path` for reading
pub fn is_readable(path: &Path) -> bool {
    fs::File::open(path).is_ok()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub files: BTreeMap<PathBuf, InventoryEntry>,
    pub directories: BTreeMap<PathBuf, InventoryEntry>,
    pub broken_files: BTreeMap<PathBuf, FsFailure>,
    pub broken_directories: BTreeMap<PathBuf, FsFailure>,
}

impl Inventory {
    /// Record a file (and its directory). Returns false if it is broken.
    pub fn add_file(&mut self, path: &Path, count_lines: bool) -> bool {
        if self.files.contains_key(path) {
            return true;
        }
        if self.broken_files.contains_key(path) {
            return false;
        }
        if let Some(dir) = path.parent() {
            self.add_directory(dir, true);
        }

        let entry = stat(path).and_then(|mut entry| {
            if count_lines {
                let text = fs::read(path).map_err(|e| FsFailure::from_io(&e))?;
                entry.lines = Some(text.iter().filter(|b| **b == b'\n').count());
            }
            Ok(entry)
        });
        match entry {
            Ok(entry) => {
                self.files.insert(path.to_path_buf(), entry);
                true
            }
            Err(failure) => {
                self.mark_broken_file(path, failure);
                false
            }
        }
    }

    /// Record a directory; with `check`, also verify it can be listed
    pub fn add_directory(&mut self, dir: &Path, check: bool) {
        if self.directories.contains_key(dir) || self.broken_directories.contains_key(dir) {
            return;
        }
        let listed = if check {
            fs::read_dir(dir).map(|_| ()).map_err(|e| FsFailure::from_io(&e))
        } else {
            Ok(())
        };
        match listed.and_then(|()| stat(dir)) {
            Ok(entry) => {
                self.directories.insert(dir.to_path_buf(), entry);
            }
            Err(failure) => self.mark_broken_directory(dir, failure),
        }
    }

    pub fn mark_broken_file(&mut self, path: &Path, failure: FsFailure) {
        info!(path = %path.display(), error = %failure, "failed to read file");
        self.files.remove(path);
        self.broken_files.insert(path.to_path_buf(), failure);
    }

    pub fn mark_broken_directory(&mut self, dir: &Path, failure: FsFailure) {
        debug!(path = %dir.display(), error = %failure, "failed to read directory");
        self.directories.remove(dir);
        self.broken_directories.insert(dir.to_path_buf(), failure);
    }

    /// Whether the tracked files differ between two inventories.
    /// Directory metadata is deliberately not compared.
    pub fn files_differ(&self, other: &Inventory) -> bool {
        self.files != other.files || self.broken_files.keys().ne(other.broken_files.keys())
    }

    /// Files and errors grouped by their directory
    pub fn directory_map(&self) -> BTreeMap<PathBuf, DirectoryListing> {
        let mut map: BTreeMap<PathBuf, DirectoryListing> = BTreeMap::new();

        for (dir, info) in &self.directories {
            map.entry(dir.clone()).or_default().info = Some(info.clone());
        }
        for (dir, error) in &self.broken_directories {
            map.entry(dir.clone()).or_default().error = Some(error.clone());
        }
        for (file, info) in &self.files {
            let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
            let listing = map.entry(dir).or_default();
            listing.files.entry(file.clone()).or_default().info = Some(info.clone());
        }
        for (file, error) in &self.broken_files {
            let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
            let listing = map.entry(dir).or_default();
            listing.files.entry(file.clone()).or_default().error = Some(error.clone());
        }

        map
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryListing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<InventoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FsFailure>,
    pub files: BTreeMap<PathBuf, FileListing>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<InventoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FsFailure>,
}
