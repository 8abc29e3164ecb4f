//! Dependency resolution and compilation.
//!
//! Stages a model's root file and every dependency into the VFS under the
//! model's own root (`<mount>/<model_id>`), preserving each file's relative
//! directory, then compiles the root with the resolution directory pointed
//! at the root's folder.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use thiserror::Error;

use crate::engine::singleton::{EngineInstance, EngineSingleton};
use crate::engine::{NativeModel, NativeState};
use crate::error::{Error, Result};
use crate::model::lifecycle::ModelHandle;
use crate::model::path::RelativePath;
use crate::storage::{AssetKind, FetchError, StorageCollaborator};
use crate::vfs::join_path;

/// The native parser (or state constructor) rejected a model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to compile model '{model_id}': {message}")]
pub struct CompileError {
    pub model_id: String,
    pub message: String,
}

/// A dependency that was skipped without failing the load.
#[derive(Debug)]
pub struct DependencyFailure {
    pub path: String,
    pub error: FetchError,
}

/// Summary of one successful load.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub model_id: String,
    /// Relative path of the compiled root file
    pub root_file: String,
    /// VFS directory every file of this model is staged under
    pub model_root: String,
    /// VFS directory the root was compiled in
    pub root_directory: String,
    /// Relative paths written to the VFS, in staging order
    pub staged: Vec<String>,
    pub failures: Vec<DependencyFailure>,
}

impl LoadReport {
    pub fn staged_by_kind(&self) -> HashMap<AssetKind, usize> {
        let mut counts = HashMap::new();
        for path in &self.staged {
            *counts.entry(AssetKind::from_path(path)).or_insert(0) += 1;
        }
        counts
    }
}

enum RootSource {
    Provided(Vec<u8>),
    Storage,
}

/// Loads models from a storage collaborator into the shared engine.
pub struct DependencyResolver {
    engine: Arc<EngineSingleton>,
    storage: Arc<dyn StorageCollaborator>,
}

impl DependencyResolver {
    pub fn new(engine: Arc<EngineSingleton>, storage: Arc<dyn StorageCollaborator>) -> Self {
        Self { engine, storage }
    }

    pub fn engine(&self) -> &Arc<EngineSingleton> {
        &self.engine
    }

    /// Load a model whose root file the caller already holds.
    pub async fn load_model(
        &self,
        model_id: &str,
        root_path: &str,
        root_bytes: Vec<u8>,
    ) -> Result<ModelHandle> {
        self.load(model_id, root_path, RootSource::Provided(root_bytes), true)
            .await
    }

    /// Load a model, fetching its root file from storage as well.
    pub async fn load_model_from_storage(
        &self,
        model_id: &str,
        root_path: &str,
    ) -> Result<ModelHandle> {
        self.load(model_id, root_path, RootSource::Storage, true)
            .await
    }

    /// Compile a standalone definition with no dependencies and no storage lookup.
    pub async fn load_definition(
        &self,
        model_id: &str,
        root_path: &str,
        bytes: Vec<u8>,
    ) -> Result<ModelHandle> {
        self.load(model_id, root_path, RootSource::Provided(bytes), false)
            .await
    }

    async fn load(
        &self,
        model_id: &str,
        root_path: &str,
        root: RootSource,
        with_dependencies: bool,
    ) -> Result<ModelHandle> {
        let model_dir = RelativePath::component(model_id)?;
        let root_path = RelativePath::parse(root_path)?;
        let instance = self.engine.acquire().await?;

        let mut report = LoadReport {
            model_id: model_id.to_string(),
            root_file: root_path.to_string(),
            model_root: instance.vfs().mount_path(model_dir.as_str()),
            ..Default::default()
        };

        let dependencies = if with_dependencies {
            let listed = self.storage.list_files(model_id).await?;
            plan_dependencies(&root_path, &listed, &mut report.failures)
        } else {
            Vec::new()
        };

        let root_bytes = match root {
            RootSource::Provided(bytes) => bytes,
            RootSource::Storage => self.storage.get_file(model_id, root_path.as_str()).await?,
        };

        let _loads = instance.lock_loads().await;
        let vfs = instance.vfs();

        let model_root = report.model_root.clone();
        vfs.write_file(&join_path(&model_root, root_path.as_str()), &root_bytes)?;
        report.staged.push(root_path.to_string());

        let concurrency = self.engine.config().fetch_concurrency.max(1);
        let fetched: Vec<(RelativePath, std::result::Result<Vec<u8>, FetchError>)> =
            stream::iter(dependencies)
                .map(|path| {
                    let storage = &self.storage;
                    async move {
                        let outcome = storage.get_file(model_id, path.as_str()).await;
                        (path, outcome)
                    }
                })
                .buffered(concurrency)
                .collect()
                .await;

        for (path, outcome) in fetched {
            match outcome {
                Ok(bytes) => {
                    vfs.write_file(&join_path(&model_root, path.as_str()), &bytes)?;
                    report.staged.push(path.to_string());
                }
                Err(error) => {
                    log::warn!(
                        "Skipping dependency '{}' of model '{}': {}",
                        path,
                        model_id,
                        error
                    );
                    report.failures.push(DependencyFailure {
                        path: path.to_string(),
                        error,
                    });
                }
            }
        }

        if log::log_enabled!(log::Level::Debug) {
            if let Ok(files) = vfs.tree(&model_root) {
                log::debug!("VFS after staging '{}': {:?}", model_id, files);
            }
        }

        report.root_directory = match root_path.parent() {
            Some(dir) => join_path(&model_root, dir),
            None => model_root,
        };

        let (model, state) = compile(
            &instance,
            model_id,
            &report.root_directory,
            root_path.file_name(),
        )
        .await?;

        log::info!(
            "Loaded model '{}' ({} files staged, {} skipped)",
            model_id,
            report.staged.len(),
            report.failures.len()
        );
        Ok(ModelHandle::new(report, model, state))
    }
}

/// Non-root dependencies in listing order, deduplicated.
///
/// Paths that would escape the model root are recorded as failures.
fn plan_dependencies(
    root: &RelativePath,
    listed: &[String],
    failures: &mut Vec<DependencyFailure>,
) -> Vec<RelativePath> {
    let mut seen = HashSet::new();
    let mut dependencies = Vec::new();

    for raw in listed {
        match RelativePath::parse(raw) {
            Ok(path) if &path == root => continue,
            Ok(path) => {
                if seen.insert(path.clone()) {
                    dependencies.push(path);
                }
            }
            Err(e) => {
                log::warn!("Rejecting dependency path '{}': {}", raw, e);
                failures.push(DependencyFailure {
                    path: raw.clone(),
                    error: FetchError::InvalidPath(e),
                });
            }
        }
    }
    dependencies
}

/// Compile `file_name` with the resolution directory set to `root_directory`.
///
/// The directory is restored before this returns, whatever the outcome.
async fn compile(
    instance: &EngineInstance,
    model_id: &str,
    root_directory: &str,
    file_name: &str,
) -> Result<(Box<dyn NativeModel>, Box<dyn NativeState>)> {
    let module = instance.module();

    let scope = instance.vfs().enter_resolution_directory(root_directory)?;
    let compiled = module.parse_model_from_file(file_name).await;
    let restored = scope.finish();

    let mut model = match (compiled, restored) {
        (Ok(model), Ok(())) => model,
        (Ok(mut model), Err(e)) => {
            model.release();
            return Err(e.into());
        }
        (Err(message), restored) => {
            if let Err(e) = restored {
                log::error!("Failed to restore resolution directory: {}", e);
            }
            return Err(Error::Compile(CompileError {
                model_id: model_id.to_string(),
                message,
            }));
        }
    };

    match module.create_state(model.as_ref()) {
        Ok(state) => Ok((model, state)),
        Err(message) => {
            model.release();
            Err(Error::Compile(CompileError {
                model_id: model_id.to_string(),
                message,
            }))
        }
    }
}
