//! Error types for sim-bridge.

use thiserror::Error;

/// sim-bridge error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Engine module bring-up failed; a later call retries
    #[error("Engine initialization error: {0}")]
    Init(#[from] crate::engine::singleton::InitError),

    /// A VFS directory or file operation failed
    #[error("Virtual filesystem error: {0}")]
    Vfs(#[from] crate::vfs::VfsError),

    /// The model listing or its root file could not be retrieved
    #[error("Fetch error: {0}")]
    Fetch(#[from] crate::storage::FetchError),

    /// The native parser rejected the staged files
    #[error("Compile error: {0}")]
    Compile(#[from] crate::model::resolver::CompileError),

    /// The root path cannot be staged under the model root
    #[error("Invalid model path: {0}")]
    InvalidPath(#[from] crate::model::path::PathError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Single human-readable message for the viewer to show.
    pub fn user_message(&self) -> String {
        match self {
            Self::Init(e) => format!("The simulation engine could not start ({}). Try again.", e),
            Self::Vfs(e) => format!("Model files could not be prepared: {}", e),
            Self::Fetch(e) => format!("Model files could not be downloaded: {}", e),
            Self::Compile(e) => format!("Model '{}' is invalid: {}", e.model_id, e.message),
            Self::InvalidPath(e) => format!("Model path is not allowed: {}", e),
            Self::Config(msg) => format!("Viewer is misconfigured: {}", msg),
        }
    }

    /// Whether repeating the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Init(_) => true,
            Self::Fetch(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for sim-bridge operations.
pub type Result<T> = std::result::Result<T, Error>;
