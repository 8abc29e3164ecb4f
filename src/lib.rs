//! sim-bridge - engine-module lifecycle and virtual-filesystem bridge for
//! loading simulation models into an embedded physics engine.

mod defaults;
pub mod error;

pub mod config;
pub mod engine;
pub mod model;
pub mod storage;
pub mod vfs;
pub mod viewer;

pub use error::{Error, Result};

pub use config::BridgeConfig;

pub use engine::fetch::ModuleFetcher;
pub use engine::loader::{FetchingLoader, Instantiate, ModuleLoader};
pub use engine::singleton::{EngineInstance, EngineSingleton, InitError};
pub use engine::{
    EngineModule, FileStat, FsError, FsResult, NativeModel, NativeState, PathInfo, Teardown,
};

pub use vfs::{DirEntry, DirListing, ResolutionScope, Vfs, VfsError};

pub use model::lifecycle::{release, ModelHandle};
pub use model::path::{PathError, RelativePath};
pub use model::resolver::{CompileError, DependencyFailure, DependencyResolver, LoadReport};

pub use storage::{AssetKind, DirectoryStorage, FetchError, HttpStorage, StorageCollaborator};

pub use viewer::{SceneViewer, DEFAULT_SCENE_XML};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
