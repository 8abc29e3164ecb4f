//! Models stored as directories on local disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::model::path::RelativePath;
use crate::storage::{FetchError, StorageCollaborator};

/// Serves `<base>/<model_id>/**` as a model's files.
pub struct DirectoryStorage {
    base: PathBuf,
}

impl DirectoryStorage {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn model_dir(&self, model_id: &str) -> Result<PathBuf, FetchError> {
        let id = RelativePath::component(model_id)?;
        let dir = self.base.join(id.as_str());
        if !dir.is_dir() {
            return Err(FetchError::ModelNotFound(model_id.to_string()));
        }
        Ok(dir)
    }

    fn collect(root: &Path, dir: &Path, files: &mut Vec<String>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                Self::collect(root, &path, files)?;
            } else if file_type.is_file() {
                if let Ok(relative) = path.strip_prefix(root) {
                    let parts: Vec<_> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect();
                    files.push(parts.join("/"));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageCollaborator for DirectoryStorage {
    async fn list_files(&self, model_id: &str) -> Result<Vec<String>, FetchError> {
        let dir = self.model_dir(model_id)?;
        let mut files = Vec::new();
        Self::collect(&dir, &dir, &mut files)?;
        files.sort();
        log::debug!("Model '{}' has {} files on disk", model_id, files.len());
        Ok(files)
    }

    async fn get_file(&self, model_id: &str, relative_path: &str) -> Result<Vec<u8>, FetchError> {
        let dir = self.model_dir(model_id)?;
        let relative = RelativePath::parse(relative_path)?;
        let path = relative
            .components()
            .fold(dir, |acc, component| acc.join(component));

        if !path.is_file() {
            return Err(FetchError::NotFound {
                model_id: model_id.to_string(),
                path: relative.to_string(),
            });
        }
        Ok(std::fs::read(path)?)
    }
}
