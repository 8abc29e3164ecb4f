//! Model file storage.
//!
//! The resolver only sees the [`StorageCollaborator`] trait. Two backends
//! ship with the crate:
//! - `DirectoryStorage`: models as directories on local disk
//! - `HttpStorage`: the catalog HTTP API

pub mod directory;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::path::PathError;

pub use directory::DirectoryStorage;
pub use http::HttpStorage;

/// Errors that can occur while retrieving a model file.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("'{path}' not found for model '{model_id}'")]
    NotFound { model_id: String, path: String },

    #[error("Model '{0}' not found")]
    ModelNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("Invalid storage URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid listing: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Source of a model's files.
#[async_trait]
pub trait StorageCollaborator: Send + Sync {
    /// Every relative path belonging to the model, root file included.
    async fn list_files(&self, model_id: &str) -> Result<Vec<String>, FetchError>;

    /// Raw bytes of one file.
    async fn get_file(&self, model_id: &str, relative_path: &str) -> Result<Vec<u8>, FetchError>;
}

/// Coarse classification of a model file by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Definition,
    Mesh,
    Texture,
    Other,
}

impl AssetKind {
    pub fn from_path(path: &str) -> Self {
        match extension(path).as_deref() {
            Some("xml") | Some("mjcf") | Some("urdf") => Self::Definition,
            Some("stl") | Some("obj") | Some("dae") | Some("mesh") | Some("msh") => Self::Mesh,
            Some("png") | Some("jpg") | Some("jpeg") | Some("gif") | Some("webp") | Some("svg") => {
                Self::Texture
            }
            _ => Self::Other,
        }
    }

    /// Media type served for a file with this path.
    pub fn media_type(path: &str) -> &'static str {
        match extension(path).as_deref() {
            Some("xml") => "application/xml",
            Some("stl") => "model/stl",
            Some("obj") | Some("dae") | Some("mesh") => "model/mesh",
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("svg") => "image/svg+xml",
            _ => "application/octet-stream",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Definition => write!(f, "definition"),
            Self::Mesh => write!(f, "mesh"),
            Self::Texture => write!(f, "texture"),
            Self::Other => write!(f, "other"),
        }
    }
}

fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rsplit_once('.')
        .filter(|(stem, _)| !stem.is_empty())
        .map(|(_, ext)| ext.to_ascii_lowercase())
}
