//! Process-wide engine module instance.
//!
//! Provides `EngineSingleton`, which manages:
//! - One-time asynchronous bring-up shared by every concurrent caller
//! - Retry from scratch after a failed bring-up
//! - Mounting the VFS root on first success
//! - The lock that serializes model loads against the shared VFS

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;

use crate::config::BridgeConfig;
use crate::engine::loader::ModuleLoader;
use crate::engine::{EngineModule, FsError};
use crate::vfs::{parent_of, Vfs};

/// Errors raised while bringing the engine module up.
///
/// Cloneable so every caller waiting on the same bring-up receives it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("Failed to fetch engine module: {0}")]
    Fetch(String),

    #[error("Engine module initialization failed: {0}")]
    Startup(String),

    #[error("Failed to mount VFS root '{path}': {cause}")]
    Mount { path: String, cause: FsError },

    #[error("Global engine already installed")]
    AlreadyInstalled,
}

pub type Result<T> = std::result::Result<T, InitError>;

type PendingInit = Shared<BoxFuture<'static, Result<Arc<EngineInstance>>>>;

enum Slot {
    Uninitialized,
    Initializing { generation: u64, pending: PendingInit },
    Ready(Arc<EngineInstance>),
}

/// A live engine module plus the state bound to it.
pub struct EngineInstance {
    module: Arc<dyn EngineModule>,
    vfs: Vfs,
    load_lock: tokio::sync::Mutex<()>,
}

impl EngineInstance {
    fn new(module: Arc<dyn EngineModule>, config: &BridgeConfig) -> Self {
        let vfs = Vfs::new(
            Arc::clone(&module),
            config.mount_root(),
            &config.default_directory,
        );
        Self {
            module,
            vfs,
            load_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn module(&self) -> &Arc<dyn EngineModule> {
        &self.module
    }

    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    /// Exclusive access to the VFS and resolution directory for one load.
    pub async fn lock_loads(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.load_lock.lock().await
    }

    fn mount(&self) -> Result<()> {
        let mount = self.vfs.mount_point().to_string();

        if self.module.analyze_path(&mount).exists {
            log::debug!("VFS root {} already mounted", mount);
        } else {
            if let Some(parent) = parent_of(&mount) {
                self.vfs.ensure_directory(parent).map_err(|e| InitError::Mount {
                    path: e.path,
                    cause: e.cause,
                })?;
            }
            match self.module.mount(&mount) {
                Ok(()) => log::info!("Mounted VFS root at {}", mount),
                Err(FsError::AlreadyExists) => {
                    log::warn!("VFS root {} reported as already mounted; reusing it", mount)
                }
                Err(cause) => return Err(InitError::Mount { path: mount, cause }),
            }
        }

        self.vfs
            .reset_resolution_directory()
            .map_err(|e| InitError::Startup(e.to_string()))
    }
}

/// Lazily initialized, shared engine module.
///
/// The first `acquire` starts bring-up. Callers arriving while it is in
/// flight await the same attempt. A failed attempt leaves the singleton
/// uninitialized so the next `acquire` starts over.
pub struct EngineSingleton {
    loader: Arc<dyn ModuleLoader>,
    config: Arc<BridgeConfig>,
    slot: Mutex<Slot>,
    generation: AtomicU64,
    attempts: AtomicU32,
}

static GLOBAL_ENGINE: OnceLock<Arc<EngineSingleton>> = OnceLock::new();

impl EngineSingleton {
    pub fn new(loader: Arc<dyn ModuleLoader>, config: BridgeConfig) -> Self {
        Self {
            loader,
            config: Arc::new(config),
            slot: Mutex::new(Slot::Uninitialized),
            generation: AtomicU64::new(0),
            attempts: AtomicU32::new(0),
        }
    }

    /// Install the process-wide engine. Only the first call succeeds.
    pub fn install_global(
        loader: Arc<dyn ModuleLoader>,
        config: BridgeConfig,
    ) -> Result<Arc<EngineSingleton>> {
        let mut installed = false;
        let engine = GLOBAL_ENGINE.get_or_init(|| {
            installed = true;
            Arc::new(Self::new(loader, config))
        });
        if installed {
            Ok(Arc::clone(engine))
        } else {
            Err(InitError::AlreadyInstalled)
        }
    }

    /// The process-wide engine, if one was installed.
    pub fn global() -> Option<Arc<EngineSingleton>> {
        GLOBAL_ENGINE.get().map(Arc::clone)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Number of bring-up attempts started so far.
    pub fn bring_up_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.lock_slot(), Slot::Ready(_))
    }

    /// Get the engine instance, bringing it up on first use.
    pub async fn acquire(&self) -> Result<Arc<EngineInstance>> {
        let (generation, pending) = {
            let mut slot = self.lock_slot();
            let in_flight = match &*slot {
                Slot::Ready(instance) => return Ok(Arc::clone(instance)),
                Slot::Initializing {
                    generation,
                    pending,
                } => Some((*generation, pending.clone())),
                Slot::Uninitialized => None,
            };

            match in_flight {
                Some(in_flight) => in_flight,
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    self.attempts.fetch_add(1, Ordering::SeqCst);
                    log::debug!("Starting engine bring-up (attempt {})", generation);

                    let pending = Self::bring_up(Arc::clone(&self.loader), Arc::clone(&self.config))
                        .boxed()
                        .shared();
                    *slot = Slot::Initializing {
                        generation,
                        pending: pending.clone(),
                    };
                    (generation, pending)
                }
            }
        };

        let outcome = pending.await;

        let mut slot = self.lock_slot();
        let settles_this_attempt =
            matches!(&*slot, Slot::Initializing { generation: current, .. } if *current == generation);
        if settles_this_attempt {
            *slot = match &outcome {
                Ok(instance) => Slot::Ready(Arc::clone(instance)),
                Err(e) => {
                    log::warn!("Engine bring-up failed, next acquire will retry: {}", e);
                    Slot::Uninitialized
                }
            };
        }

        outcome
    }

    async fn bring_up(
        loader: Arc<dyn ModuleLoader>,
        config: Arc<BridgeConfig>,
    ) -> Result<Arc<EngineInstance>> {
        let module = loader.load().await?;
        let instance = EngineInstance::new(module, &config);
        instance.mount()?;
        log::info!("Engine module ready");
        Ok(Arc::new(instance))
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
