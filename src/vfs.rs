//! Virtual filesystem layer over the engine module's primitives.
//!
//! Owns the single process-wide resolution directory the native parser
//! resolves relative includes against.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::engine::{EngineModule, FsError};

/// A filesystem primitive failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("VFS operation '{operation}' failed on '{path}': {cause}")]
pub struct VfsError {
    pub operation: &'static str,
    pub path: String,
    pub cause: FsError,
}

impl VfsError {
    fn new(operation: &'static str, path: &str, cause: FsError) -> Self {
        Self {
            operation,
            path: path.to_string(),
            cause,
        }
    }
}

pub type Result<T> = std::result::Result<T, VfsError>;

/// Join an absolute directory and a relative path with single separators.
pub fn join_path(dir: &str, relative: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        return if dir.is_empty() { "/".to_string() } else { dir.to_string() };
    }
    format!("{}/{}", dir, relative)
}

/// Every proper prefix directory of `path`, shortest first, excluding `/`.
///
/// `/a/b/c` yields `/a`, `/a/b`, `/a/b/c`.
fn directory_chain(path: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = String::new();
    for component in path.split('/').filter(|c| !c.is_empty()) {
        current.push('/');
        current.push_str(component);
        chain.push(current.clone());
    }
    chain
}

pub(crate) fn parent_of(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    pub size: u64,
}

/// Filesystem manager for a single engine module.
pub struct Vfs {
    module: Arc<dyn EngineModule>,
    mount_point: String,
    default_directory: String,
    resolution_directory: Mutex<String>,
}

impl Vfs {
    pub fn new(module: Arc<dyn EngineModule>, mount_point: &str, default_directory: &str) -> Self {
        Self {
            module,
            mount_point: mount_point.trim_end_matches('/').to_string(),
            default_directory: default_directory.to_string(),
            resolution_directory: Mutex::new(default_directory.to_string()),
        }
    }

    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    pub fn default_directory(&self) -> &str {
        &self.default_directory
    }

    /// Absolute VFS path for a path relative to the mount point.
    pub fn mount_path(&self, relative: &str) -> String {
        join_path(&self.mount_point, relative)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.module.analyze_path(path).exists
    }

    /// Create `path` and any missing ancestors. No-op when it already exists.
    pub fn ensure_directory(&self, path: &str) -> Result<()> {
        if !path.starts_with('/') {
            return Err(VfsError::new("mkdir", path, FsError::InvalidPath));
        }

        for dir in directory_chain(path) {
            if self.module.analyze_path(&dir).exists {
                let stat = self
                    .module
                    .stat(&dir)
                    .map_err(|e| VfsError::new("stat", &dir, e))?;
                if !stat.is_directory {
                    return Err(VfsError::new("mkdir", &dir, FsError::NotADirectory));
                }
                continue;
            }

            match self.module.mkdir(&dir) {
                Ok(()) | Err(FsError::AlreadyExists) => {
                    log::debug!("Created VFS directory {}", dir);
                }
                Err(e) => return Err(VfsError::new("mkdir", &dir, e)),
            }
        }
        Ok(())
    }

    /// Write (or overwrite) a file, creating its ancestors first.
    pub fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let parent = parent_of(path).ok_or_else(|| VfsError::new("write", path, FsError::InvalidPath))?;
        self.ensure_directory(parent)?;
        self.module
            .write_file(path, bytes)
            .map_err(|e| VfsError::new("write", path, e))?;
        log::debug!("Staged {} ({} bytes)", path, bytes.len());
        Ok(())
    }

    /// Current resolution directory.
    pub fn resolution_directory(&self) -> String {
        self.cursor().clone()
    }

    pub fn set_resolution_directory(&self, path: &str) -> Result<()> {
        let mut cursor = self.cursor();
        self.module
            .chdir(path)
            .map_err(|e| VfsError::new("chdir", path, e))?;
        *cursor = path.to_string();
        Ok(())
    }

    pub fn reset_resolution_directory(&self) -> Result<()> {
        let default = self.default_directory.clone();
        self.set_resolution_directory(&default)
    }

    /// Point the resolution directory at `path` until the returned scope ends.
    ///
    /// The default directory is restored by [`ResolutionScope::finish`] or,
    /// failing that, when the scope is dropped.
    pub fn enter_resolution_directory(&self, path: &str) -> Result<ResolutionScope<'_>> {
        self.set_resolution_directory(path)?;
        Ok(ResolutionScope {
            vfs: self,
            active: true,
        })
    }

    /// Immediate children of `path`. Each call to [`DirListing::entries`] starts over.
    pub fn list_directory(&self, path: &str) -> DirListing<'_> {
        DirListing {
            vfs: self,
            path: path.to_string(),
        }
    }

    /// Every file below `path`, depth first. Used for diagnostics.
    pub fn tree(&self, path: &str) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let mut pending = vec![path.to_string()];
        while let Some(dir) = pending.pop() {
            for entry in self.list_directory(&dir).entries()? {
                let entry = entry?;
                if entry.is_directory {
                    pending.push(entry.path);
                } else {
                    files.push(entry.path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    fn cursor(&self) -> std::sync::MutexGuard<'_, String> {
        self.resolution_directory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds the resolution directory away from its default.
pub struct ResolutionScope<'a> {
    vfs: &'a Vfs,
    active: bool,
}

impl ResolutionScope<'_> {
    /// Restore the default directory, reporting failure to the caller.
    pub fn finish(mut self) -> Result<()> {
        self.active = false;
        self.vfs.reset_resolution_directory()
    }
}

impl Drop for ResolutionScope<'_> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Err(e) = self.vfs.reset_resolution_directory() {
            log::error!("Failed to restore resolution directory: {}", e);
        }
    }
}

/// Restartable listing of a directory's immediate children.
pub struct DirListing<'a> {
    vfs: &'a Vfs,
    path: String,
}

impl<'a> DirListing<'a> {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Read the directory and enumerate its children, skipping `.` and `..`.
    ///
    /// Entries are stat'ed one at a time as the iterator advances.
    pub fn entries(&self) -> Result<DirEntries<'a>> {
        let names = self
            .vfs
            .module
            .readdir(&self.path)
            .map_err(|e| VfsError::new("readdir", &self.path, e))?;
        Ok(DirEntries {
            vfs: self.vfs,
            dir: self.path.clone(),
            names: names.into_iter(),
        })
    }
}

pub struct DirEntries<'a> {
    vfs: &'a Vfs,
    dir: String,
    names: std::vec::IntoIter<String>,
}

impl Iterator for DirEntries<'_> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.names.by_ref().find(|n| n != "." && n != "..")?;
        let path = join_path(&self.dir, &name);
        Some(
            self.vfs
                .module
                .stat(&path)
                .map(|stat| DirEntry {
                    name,
                    is_directory: stat.is_directory,
                    size: stat.size,
                    path: path.clone(),
                })
                .map_err(|e| VfsError::new("stat", &path, e)),
        )
    }
}
