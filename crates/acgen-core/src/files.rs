//! File-access capability.
//!
//! The compiler never touches the filesystem directly; every read and
//! write goes through a [`FileAccess`] implementation so runs can be
//! pointed at a project directory or at an in-memory tree.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::error::FileAccessError;

/// Trait for file-access backends.
pub trait FileAccess {
    /// Read a whole file.
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, FileAccessError>;

    /// Create or replace a file, creating parent directories as needed.
    fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), FileAccessError>;

    /// Names of the regular files directly inside `dir`, sorted.
    fn list_files(&self, dir: &Path) -> Result<Vec<String>, FileAccessError>;

    /// Names of the directories directly inside `dir`, sorted.
    fn list_directories(&self, dir: &Path) -> Result<Vec<String>, FileAccessError>;

    /// Append `text` to a file, creating it if needed.
    fn append_text(&self, path: &Path, text: &str) -> Result<(), FileAccessError>;

    fn copy_file(&self, src: &Path, dst: &Path) -> Result<(), FileAccessError>;

    fn read_to_string(&self, path: &Path) -> Result<String, FileAccessError> {
        let bytes = self.read_file(path)?;
        String::from_utf8(bytes).map_err(|_| FileAccessError::InvalidUtf8(path.to_path_buf()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.read_file(path).is_ok()
    }
}

/// Files under a project root on the local filesystem.
///
/// Relative paths are resolved against the root.
#[derive(Debug, Clone)]
pub struct LocalFiles {
    root: PathBuf,
}

impl LocalFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn ensure_parent(path: &Path) -> Result<(), FileAccessError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FileAccessError::io(parent, e))?;
        }
        Ok(())
    }

    fn list(&self, dir: &Path, want_dirs: bool) -> Result<Vec<String>, FileAccessError> {
        let full = self.resolve(dir);
        let entries = fs::read_dir(&full).map_err(|e| FileAccessError::io(&full, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FileAccessError::io(&full, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| FileAccessError::io(entry.path(), e))?;
            if file_type.is_dir() == want_dirs {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl FileAccess for LocalFiles {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, FileAccessError> {
        let full = self.resolve(path);
        fs::read(&full).map_err(|e| FileAccessError::io(full, e))
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), FileAccessError> {
        let full = self.resolve(path);
        Self::ensure_parent(&full)?;
        fs::write(&full, content).map_err(|e| FileAccessError::io(full, e))
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<String>, FileAccessError> {
        self.list(dir, false)
    }

    fn list_directories(&self, dir: &Path) -> Result<Vec<String>, FileAccessError> {
        self.list(dir, true)
    }

    fn append_text(&self, path: &Path, text: &str) -> Result<(), FileAccessError> {
        let full = self.resolve(path);
        Self::ensure_parent(&full)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .map_err(|e| FileAccessError::io(&full, e))?;
        file.write_all(text.as_bytes())
            .map_err(|e| FileAccessError::io(&full, e))
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> Result<(), FileAccessError> {
        let from = self.resolve(src);
        let to = self.resolve(dst);
        Self::ensure_parent(&to)?;
        fs::copy(&from, &to)
            .map(|_| ())
            .map_err(|e| FileAccessError::io(from, e))
    }
}

/// An in-memory file tree.
#[derive(Debug, Default)]
pub struct MemoryFiles {
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file; handy for building fixtures.
    pub fn with_file(self, path: impl AsRef<Path>, content: impl AsRef<[u8]>) -> Self {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize(path.as_ref()), content.as_ref().to_vec());
        self
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Paths under `dir`, relative to it, with their first component.
    fn children(&self, dir: &Path) -> Vec<(String, bool)> {
        let dir = normalize(dir);
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        files
            .keys()
            .filter_map(|path| path.strip_prefix(&dir).ok())
            .filter_map(|rest| {
                let mut components = rest.components();
                let first = components.next()?;
                let is_dir = components.next().is_some();
                Some((first.as_os_str().to_string_lossy().into_owned(), is_dir))
            })
            .collect()
    }
}

impl FileAccess for MemoryFiles {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, FileAccessError> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| FileAccessError::NotFound(path.to_path_buf()))
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), FileAccessError> {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize(path), content.to_vec());
        Ok(())
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<String>, FileAccessError> {
        let children = self.children(dir);
        if children.is_empty() {
            return Err(FileAccessError::NotFound(dir.to_path_buf()));
        }
        let names: BTreeSet<String> = children
            .into_iter()
            .filter(|(_, is_dir)| !is_dir)
            .map(|(name, _)| name)
            .collect();
        Ok(names.into_iter().collect())
    }

    fn list_directories(&self, dir: &Path) -> Result<Vec<String>, FileAccessError> {
        let children = self.children(dir);
        if children.is_empty() {
            return Err(FileAccessError::NotFound(dir.to_path_buf()));
        }
        let names: BTreeSet<String> = children
            .into_iter()
            .filter(|(_, is_dir)| *is_dir)
            .map(|(name, _)| name)
            .collect();
        Ok(names.into_iter().collect())
    }

    fn append_text(&self, path: &Path, text: &str) -> Result<(), FileAccessError> {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(normalize(path))
            .or_default()
            .extend_from_slice(text.as_bytes());
        Ok(())
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> Result<(), FileAccessError> {
        let content = self.read_file(src)?;
        self.write_file(dst, &content)
    }
}

/// Drop `.` components so `./a/b` and `a/b` address the same entry.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
