//! Default values for bridge configuration.

use std::path::PathBuf;

pub const MOUNT_POINT: &str = "/working";
pub const DEFAULT_DIRECTORY: &str = "/";
pub const FETCH_CONCURRENCY: usize = 8;
pub const CACHE_SUBDIR: &str = "sim-bridge";

pub fn mount_point() -> String { MOUNT_POINT.to_string() }
pub fn default_directory() -> String { DEFAULT_DIRECTORY.to_string() }
pub fn fetch_concurrency() -> usize { FETCH_CONCURRENCY }

pub fn module_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(CACHE_SUBDIR)
}
