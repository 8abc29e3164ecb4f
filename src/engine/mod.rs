//! Engine module management.
//!
//! This module provides:
//! - The capability surface the bridge needs from a native engine (`EngineModule`)
//! - Module byte fetching and caching (`fetch`)
//! - Bring-up strategies (`loader`)
//! - The process-wide, lazily initialized instance (`singleton`)

pub mod fetch;
pub mod loader;
pub mod singleton;

use std::any::Any;

use async_trait::async_trait;
use thiserror::Error;

pub use fetch::{ModuleFetchError, ModuleFetcher};
pub use loader::{FetchingLoader, Instantiate, ModuleLoader};
pub use singleton::{EngineInstance, EngineSingleton, InitError};

/// Failure reported by one of the module's filesystem primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("already exists")]
    AlreadyExists,

    #[error("no such file or directory")]
    NotFound,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("invalid path")]
    InvalidPath,

    #[error("{0}")]
    Other(String),
}

pub type FsResult<T> = std::result::Result<T, FsError>;

/// Result of probing a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathInfo {
    pub exists: bool,
}

/// File metadata as reported by the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub is_directory: bool,
    pub size: u64,
}

/// Outcome of asking a native object to free its memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// The object freed its native memory
    Released,
    /// The binding exposes no explicit teardown for this object
    Unsupported,
}

/// A compiled, immutable model living in engine memory.
pub trait NativeModel: Send + Sync {
    /// Free the native model. Only called once, after every state built from it is gone.
    fn release(&mut self) -> Teardown {
        Teardown::Unsupported
    }

    fn as_any(&self) -> &dyn Any;
}

/// Mutable simulation state built from a [`NativeModel`].
pub trait NativeState: Send + Sync {
    /// Free the native state. Only called once, before its model is released.
    fn release(&mut self) -> Teardown {
        Teardown::Unsupported
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Capability set a live engine module exposes to the bridge.
///
/// All paths are absolute VFS paths. The module holds a single current
/// directory (`chdir`) that `parse_model_from_file` resolves the filename
/// and every relative include against.
#[async_trait]
pub trait EngineModule: Send + Sync {
    /// Mount the in-memory filesystem at `path`. The default just creates the directory.
    fn mount(&self, path: &str) -> FsResult<()> {
        self.mkdir(path)
    }

    fn mkdir(&self, path: &str) -> FsResult<()>;

    fn write_file(&self, path: &str, bytes: &[u8]) -> FsResult<()>;

    fn analyze_path(&self, path: &str) -> PathInfo;

    fn readdir(&self, path: &str) -> FsResult<Vec<String>>;

    fn stat(&self, path: &str) -> FsResult<FileStat>;

    fn chdir(&self, path: &str) -> FsResult<()>;

    /// Compile the definition at `filename`, relative to the current directory.
    ///
    /// The error string is the parser's diagnostic text.
    async fn parse_model_from_file(
        &self,
        filename: &str,
    ) -> std::result::Result<Box<dyn NativeModel>, String>;

    fn create_state(
        &self,
        model: &dyn NativeModel,
    ) -> std::result::Result<Box<dyn NativeState>, String>;
}
