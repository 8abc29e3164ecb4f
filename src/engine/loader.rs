//! Engine bring-up strategies.

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::fetch::ModuleFetcher;
use crate::engine::singleton::InitError;
use crate::engine::EngineModule;

/// Produces a live engine module. Invoked by [`EngineSingleton`] at most once per attempt.
///
/// [`EngineSingleton`]: crate::engine::EngineSingleton
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn EngineModule>, InitError>;
}

/// Turns raw module bytes into a running engine (compile, instantiate, run init).
#[async_trait]
pub trait Instantiate: Send + Sync {
    async fn instantiate(&self, module_bytes: Vec<u8>) -> Result<Arc<dyn EngineModule>, String>;
}

/// Fetches the module with a [`ModuleFetcher`] and hands the bytes to an [`Instantiate`].
pub struct FetchingLoader<I> {
    fetcher: ModuleFetcher,
    instantiate: I,
}

impl<I: Instantiate> FetchingLoader<I> {
    pub fn new(fetcher: ModuleFetcher, instantiate: I) -> Self {
        Self {
            fetcher,
            instantiate,
        }
    }
}

#[async_trait]
impl<I: Instantiate> ModuleLoader for FetchingLoader<I> {
    async fn load(&self) -> Result<Arc<dyn EngineModule>, InitError> {
        let bytes = self
            .fetcher
            .fetch_module()
            .await
            .map_err(|e| InitError::Fetch(e.to_string()))?;

        log::info!("Instantiating engine module ({} bytes)", bytes.len());

        self.instantiate
            .instantiate(bytes)
            .await
            .map_err(InitError::Startup)
    }
}
