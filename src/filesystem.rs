//! Abstracts manifest discovery over a filesystem so the discovery walk can be
//! exercised against an in-memory tree in tests instead of real directories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A minimal filesystem interface: read a file's contents and check for existence.
///
/// The discovery walk in [`crate::manifest::discover`] is written purely in terms of
/// this trait so it can be driven by [`MemoryFilesystem`] in tests.
pub trait Filesystem {
    /// reads the full contents of the file at `path`, if it exists and is a regular file
    fn read_to_string(&self, path: &Path) -> Option<String>;

    /// returns true if `path` names a regular file
    fn is_file(&self, path: &Path) -> bool;
}

/// A [`Filesystem`] backed by the real OS filesystem, via `fs_err` for descriptive I/O errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFilesystem;

impl Filesystem for RealFilesystem {
    fn read_to_string(&self, path: &Path) -> Option<String> {
        fs_err::read_to_string(path).ok()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// An in-memory [`Filesystem`] keyed by absolute path, for tests that need to inject a
/// virtual directory tree without touching disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilesystem {
    files: BTreeMap<PathBuf, String>,
}

impl MemoryFilesystem {
    /// creates an empty virtual filesystem
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// adds a file at `path` with the given contents
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }
}

impl Filesystem for MemoryFilesystem {
    fn read_to_string(&self, path: &Path) -> Option<String> {
        self.files.get(path).cloned()
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}
