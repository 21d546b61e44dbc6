//! Template sources
//!
//! A source enumerates the entries under its root and reads file contents.
//! The layout composer only talks to this trait, so a real directory, an
//! in-memory tree and a tree compiled into the binary are interchangeable.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use include_dir::{Dir, DirEntry};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::EngineError;

/// One entry reachable from a source root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Path of the entry, as understood by [`TemplateSource::read`]
    pub path: PathBuf,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

impl SourceEntry {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
        }
    }
}

/// Filesystem capability used by the layout composer
pub trait TemplateSource: Send + Sync {
    /// Root that entry paths are relative to
    fn root(&self) -> &Path;

    /// Recursively enumerate every entry under the root
    fn walk(&self) -> Result<Vec<SourceEntry>, EngineError>;

    /// Read the full contents of a file returned by [`walk`](Self::walk)
    fn read(&self, path: &Path) -> Result<Vec<u8>, EngineError>;
}

/// Templates stored in a directory on disk
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        debug!(?root, "DirSource::new: called");
        Self { root }
    }
}

impl TemplateSource for DirSource {
    fn root(&self) -> &Path {
        &self.root
    }

    fn walk(&self) -> Result<Vec<SourceEntry>, EngineError> {
        debug!(root = ?self.root, "DirSource::walk: called");
        let mut entries = Vec::new();

        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| EngineError::Walk {
                root: self.root.clone(),
                source: e.into(),
            })?;
            entries.push(SourceEntry {
                is_dir: entry.file_type().is_dir(),
                path: entry.into_path(),
            });
        }

        debug!(count = entries.len(), "DirSource::walk: complete");
        Ok(entries)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, EngineError> {
        std::fs::read(path).map_err(|source| EngineError::Read {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// In-memory virtual filesystem rooted at `/`
///
/// Clones share the same files, so a handle kept by the caller can edit
/// templates after the source has been handed to an engine.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: Arc<RwLock<BTreeMap<PathBuf, Vec<u8>>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    // Files are replaced whole, never partially written, so poisoning is ignored
    fn files(&self) -> RwLockReadGuard<'_, BTreeMap<PathBuf, Vec<u8>>> {
        self.files.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn files_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<PathBuf, Vec<u8>>> {
        self.files.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or replace a file; relative paths are placed under `/`
    pub fn insert(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        let path = Path::new("/").join(path.as_ref());
        debug!(?path, "MemorySource::insert: called");
        self.files_mut().insert(path, contents.into());
    }

    /// Remove a file, returning whether it existed
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        let path = Path::new("/").join(path.as_ref());
        self.files_mut().remove(&path).is_some()
    }
}

impl<P, C> FromIterator<(P, C)> for MemorySource
where
    P: AsRef<Path>,
    C: Into<Vec<u8>>,
{
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let source = Self::new();
        for (path, contents) in iter {
            source.insert(path, contents);
        }
        source
    }
}

impl TemplateSource for MemorySource {
    fn root(&self) -> &Path {
        Path::new("/")
    }

    fn walk(&self) -> Result<Vec<SourceEntry>, EngineError> {
        let files = self.files();

        let mut dirs = BTreeSet::new();
        for path in files.keys() {
            for ancestor in path.ancestors().skip(1) {
                dirs.insert(ancestor.to_path_buf());
            }
        }

        let mut entries: Vec<SourceEntry> = dirs.into_iter().map(SourceEntry::dir).collect();
        entries.extend(files.keys().cloned().map(SourceEntry::file));
        debug!(count = entries.len(), "MemorySource::walk: complete");
        Ok(entries)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, EngineError> {
        self.files().get(path).cloned().ok_or_else(|| EngineError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file in memory source"),
        })
    }
}

/// Templates compiled into the binary with `include_dir!`
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedSource {
    dir: &'static Dir<'static>,
}

impl EmbeddedSource {
    pub fn new(dir: &'static Dir<'static>) -> Self {
        Self { dir }
    }
}

fn collect_embedded(dir: &Dir<'_>, entries: &mut Vec<SourceEntry>) {
    for entry in dir.entries() {
        match entry {
            DirEntry::Dir(sub) => {
                entries.push(SourceEntry::dir(sub.path()));
                collect_embedded(sub, entries);
            }
            DirEntry::File(file) => entries.push(SourceEntry::file(file.path())),
        }
    }
}

impl TemplateSource for EmbeddedSource {
    fn root(&self) -> &Path {
        Path::new("")
    }

    fn walk(&self) -> Result<Vec<SourceEntry>, EngineError> {
        let mut entries = Vec::new();
        collect_embedded(self.dir, &mut entries);
        debug!(count = entries.len(), "EmbeddedSource::walk: complete");
        Ok(entries)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, EngineError> {
        self.dir
            .get_file(path)
            .map(|file| file.contents().to_vec())
            .ok_or_else(|| EngineError::Read {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such embedded file"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_dir_source_walk() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("layouts")).unwrap();
        fs::write(temp.path().join("index.html"), "index").unwrap();
        fs::write(temp.path().join("layouts/main.html"), "main").unwrap();

        let source = DirSource::new(temp.path());
        let entries = source.walk().unwrap();

        assert!(entries.contains(&SourceEntry::dir(temp.path().join("layouts"))));
        assert!(entries.contains(&SourceEntry::file(temp.path().join("index.html"))));
        assert!(entries.contains(&SourceEntry::file(temp.path().join("layouts/main.html"))));
    }

    #[test]
    fn test_dir_source_missing_root() {
        let temp = tempdir().unwrap();
        let source = DirSource::new(temp.path().join("nope"));

        let err = source.walk().unwrap_err();
        assert!(matches!(err, EngineError::Walk { .. }));
    }

    #[test]
    fn test_dir_source_read() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("index.html"), "<h1>hi</h1>").unwrap();

        let source = DirSource::new(temp.path());
        assert_eq!(source.read(&temp.path().join("index.html")).unwrap(), b"<h1>hi</h1>");
        assert!(matches!(
            source.read(&temp.path().join("missing.html")),
            Err(EngineError::Read { .. })
        ));
    }

    #[test]
    fn test_memory_source_lists_parent_dirs() {
        let source: MemorySource = [("layouts/main.html", "main"), ("index.html", "index")]
            .into_iter()
            .collect();

        let entries = source.walk().unwrap();

        assert!(entries.contains(&SourceEntry::dir("/")));
        assert!(entries.contains(&SourceEntry::dir("/layouts")));
        assert!(entries.contains(&SourceEntry::file("/layouts/main.html")));
        assert!(entries.contains(&SourceEntry::file("/index.html")));
        assert_eq!(entries.len(), 4);
    }

    #[test]
    fn test_memory_source_shared_between_clones() {
        let source = MemorySource::new();
        let handle = source.clone();
        handle.insert("/index.html", "v1");
        handle.insert("/index.html", "v2");

        assert_eq!(source.read(Path::new("/index.html")).unwrap(), b"v2");
        assert!(handle.remove("index.html"));
        assert!(source.read(Path::new("/index.html")).is_err());
    }

    #[test]
    fn test_memory_source_survives_poisoned_lock() {
        let source = MemorySource::new();
        source.insert("/index.html", "v1");

        let poisoner = source.clone();
        let result = std::thread::spawn(move || {
            let _guard = poisoner.files.write().unwrap();
            panic!("poison the lock");
        })
        .join();
        assert!(result.is_err());
        assert!(source.files.is_poisoned());

        source.insert("/index.html", "v2");
        assert_eq!(source.read(Path::new("/index.html")).unwrap(), b"v2");
        assert_eq!(source.walk().unwrap().len(), 2);
        assert!(source.remove("/index.html"));
    }
}
