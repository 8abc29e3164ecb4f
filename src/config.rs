//! Bridge configuration.
//!
//! Values come from serde (e.g. a host-provided JSON blob) or from
//! `SIM_BRIDGE_*` environment variables layered over the defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};

pub const ENV_MOUNT_POINT: &str = "SIM_BRIDGE_MOUNT_POINT";
pub const ENV_DEFAULT_DIR: &str = "SIM_BRIDGE_DEFAULT_DIR";
pub const ENV_MODULE_URL: &str = "SIM_BRIDGE_MODULE_URL";
pub const ENV_MODULE_SHA256: &str = "SIM_BRIDGE_MODULE_SHA256";
pub const ENV_CACHE_DIR: &str = "SIM_BRIDGE_CACHE_DIR";

/// Settings shared by the engine singleton, the VFS layer and the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Absolute VFS directory that model files are staged under
    #[serde(default = "defaults::mount_point")]
    pub mount_point: String,
    /// Resolution directory restored after every compile
    #[serde(default = "defaults::default_directory")]
    pub default_directory: String,
    /// Where to download the engine module from
    #[serde(default)]
    pub module_url: Option<String>,
    /// Expected SHA-256 of the downloaded module (hex)
    #[serde(default)]
    pub module_sha256: Option<String>,
    /// Local cache for downloaded module bytes
    #[serde(default = "defaults::module_cache_dir")]
    pub module_cache_dir: PathBuf,
    /// Maximum dependency fetches in flight per load
    #[serde(default = "defaults::fetch_concurrency")]
    pub fetch_concurrency: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mount_point: defaults::mount_point(),
            default_directory: defaults::default_directory(),
            module_url: None,
            module_sha256: None,
            module_cache_dir: defaults::module_cache_dir(),
            fetch_concurrency: defaults::FETCH_CONCURRENCY,
        }
    }
}

impl BridgeConfig {
    /// Defaults overlaid with any `SIM_BRIDGE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(mount) = lookup(ENV_MOUNT_POINT) {
            self.mount_point = mount;
        }
        if let Some(dir) = lookup(ENV_DEFAULT_DIR) {
            self.default_directory = dir;
        }
        if let Some(url) = lookup(ENV_MODULE_URL) {
            self.module_url = Some(url);
        }
        if let Some(sha) = lookup(ENV_MODULE_SHA256) {
            self.module_sha256 = Some(sha.to_lowercase());
        }
        if let Some(cache) = lookup(ENV_CACHE_DIR) {
            self.module_cache_dir = PathBuf::from(cache);
        }
    }

    /// Reject settings the VFS layer cannot work with.
    pub fn validate(&self) -> Result<()> {
        let mount = self.mount_point.trim_end_matches('/');
        if !self.mount_point.starts_with('/') || mount.is_empty() {
            return Err(Error::Config(format!(
                "mount point must be an absolute, non-root path: '{}'",
                self.mount_point
            )));
        }
        if mount.split('/').any(|c| c == "..") {
            return Err(Error::Config(format!(
                "mount point must not contain '..': '{}'",
                self.mount_point
            )));
        }
        if !self.default_directory.starts_with('/') {
            return Err(Error::Config(format!(
                "default directory must be absolute: '{}'",
                self.default_directory
            )));
        }
        if self.fetch_concurrency == 0 {
            return Err(Error::Config("fetch concurrency must be at least 1".into()));
        }
        Ok(())
    }

    /// Mount point without a trailing separator.
    pub fn mount_root(&self) -> &str {
        self.mount_point.trim_end_matches('/')
    }
}
