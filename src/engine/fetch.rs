//! Engine module fetching and caching.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use fs4::fs_std::FileExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tar::Archive;
use thiserror::Error;

use crate::config::BridgeConfig;

/// Environment variable pointing at a locally built module, bypassing cache and download.
pub const ENV_LOCAL_MODULE: &str = "SIM_BRIDGE_LOCAL_MODULE";

const MODULE_EXTENSION: &str = "wasm";
const DOWNLOAD_TIMEOUT_SECS: u64 = 600;
const MAX_RETRIES: u32 = 3;

/// Errors that can occur while obtaining the module bytes.
#[derive(Error, Debug)]
pub enum ModuleFetchError {
    #[error("No module source configured and nothing cached")]
    NoSource,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Integrity check failed: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    #[error("Extraction failed: {0}")]
    Extract(String),

    #[error("Failed to lock module cache: {0}")]
    LockFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ModuleFetchError>;

/// Engine module fetcher.
///
/// Resolves the module bytes from a local override, the on-disk cache, or
/// a download (optionally a `.tar.gz` bundle), in that order.
pub struct ModuleFetcher {
    client: Client,
    cache_dir: PathBuf,
    url: Option<String>,
    sha256: Option<String>,
}

impl ModuleFetcher {
    /// Create a fetcher from the bridge configuration.
    pub fn new(config: &BridgeConfig) -> Self {
        Self::with_source(
            config.module_cache_dir.clone(),
            config.module_url.clone(),
            config.module_sha256.clone(),
        )
    }

    pub fn with_source(cache_dir: PathBuf, url: Option<String>, sha256: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            cache_dir,
            url,
            sha256: sha256.map(|s| s.to_lowercase()),
        }
    }

    /// Path the module is cached at. Keyed by checksum when one is configured.
    pub fn cached_module_path(&self) -> PathBuf {
        let name = match &self.sha256 {
            Some(sha) => {
                let prefix: String = sha.chars().take(16).collect();
                format!("engine-{}.{}", prefix, MODULE_EXTENSION)
            }
            None => format!("engine.{}", MODULE_EXTENSION),
        };
        self.cache_dir.join(name)
    }

    /// Get the module bytes, downloading if necessary.
    pub async fn fetch_module(&self) -> Result<Vec<u8>> {
        if let Ok(local_build) = std::env::var(ENV_LOCAL_MODULE) {
            let local_path = PathBuf::from(&local_build);
            if local_path.exists() {
                log::debug!("Using local engine module: {:?}", local_path);
                return Ok(std::fs::read(local_path)?);
            }
            log::warn!("{} points at missing file {:?}", ENV_LOCAL_MODULE, local_path);
        }

        if let Some(bytes) = self.read_cached()? {
            return Ok(bytes);
        }

        let url = self.url.as_deref().ok_or(ModuleFetchError::NoSource)?;

        log::info!("Downloading engine module from {}", url);
        let content = self.download_with_retry(url).await?;
        let module = if is_archive(url) {
            extract_module(&content)?
        } else {
            content
        };

        if let Some(expected) = &self.sha256 {
            verify_sha256(&module, expected)?;
        }

        self.store_in_cache(&module)?;
        Ok(module)
    }

    fn read_cached(&self) -> Result<Option<Vec<u8>>> {
        let path = self.cached_module_path();
        if !path.exists() {
            return Ok(None);
        }

        let bytes = std::fs::read(&path)?;
        if let Some(expected) = &self.sha256 {
            if let Err(e) = verify_sha256(&bytes, expected) {
                log::warn!("Discarding cached module {:?}: {}", path, e);
                return Ok(None);
            }
        }

        log::debug!("Using cached engine module {:?}", path);
        Ok(Some(bytes))
    }

    fn store_in_cache(&self, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)?;

        let lock_file = std::fs::File::create(self.cache_dir.join("module.lock"))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| ModuleFetchError::LockFailed(e.to_string()))?;

        let path = self.cached_module_path();
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, bytes)?;
        std::fs::rename(&tmp_path, &path)?;

        drop(lock_file);
        log::info!("Cached engine module at {:?}", path);
        Ok(())
    }

    async fn download_with_retry(&self, url: &str) -> Result<Vec<u8>> {
        for attempt in 0..MAX_RETRIES {
            match self.download_file(url).await {
                Ok(content) => return Ok(content),
                Err(e) => {
                    if attempt == MAX_RETRIES - 1 {
                        return Err(e);
                    }
                    log::warn!(
                        "Download attempt {} failed: {}, retrying...",
                        attempt + 1,
                        e
                    );
                }
            }
        }

        Err(ModuleFetchError::Network(
            "Download failed after maximum retries".into(),
        ))
    }

    async fn download_file(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ModuleFetchError::Network(format!("HTTP {}", response.status())));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

fn is_archive(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.ends_with(".tar.gz") || path.ends_with(".tgz")
}

fn verify_sha256(bytes: &[u8], expected: &str) -> Result<()> {
    let actual = hex::encode(Sha256::digest(bytes));
    if actual != expected {
        return Err(ModuleFetchError::Integrity {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Pull the `.wasm` member out of a gzip'd tarball.
fn extract_module(content: &[u8]) -> Result<Vec<u8>> {
    let decoder = GzDecoder::new(content);
    let mut archive = Archive::new(decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();

        let path_str = path.to_string_lossy();
        if path_str.starts_with('/') || path_str.contains("..") {
            return Err(ModuleFetchError::Extract(format!(
                "Unsafe path in archive: {}",
                path_str
            )));
        }

        if entry.header().entry_type().is_file() && has_module_extension(&path) {
            let mut module = Vec::new();
            entry.read_to_end(&mut module)?;
            return Ok(module);
        }
    }

    Err(ModuleFetchError::Extract(
        "Archive did not contain a .wasm module".into(),
    ))
}

fn has_module_extension(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(MODULE_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_is_archive() {
        assert!(is_archive("https://cdn.example.com/engine-3.2.tar.gz"));
        assert!(is_archive("https://cdn.example.com/engine.tgz?token=abc"));
        assert!(!is_archive("https://cdn.example.com/engine.wasm"));
    }

    #[test]
    fn test_verify_sha256() {
        let digest = hex::encode(Sha256::digest(b"module"));
        assert!(verify_sha256(b"module", &digest).is_ok());
        assert!(matches!(
            verify_sha256(b"tampered", &digest),
            Err(ModuleFetchError::Integrity { .. })
        ));
    }

    #[test]
    fn test_extract_module_from_bundle() {
        let bundle = tarball(&[
            ("dist/engine.js", &b"glue"[..]),
            ("dist/engine.wasm", &b"\0asm-bytes"[..]),
        ]);
        let module = extract_module(&bundle).unwrap();
        assert_eq!(module, b"\0asm-bytes");
    }

    #[test]
    fn test_extract_module_missing() {
        let bundle = tarball(&[("README", &b"no module here"[..])]);
        assert!(matches!(
            extract_module(&bundle),
            Err(ModuleFetchError::Extract(_))
        ));
    }

    #[test]
    fn test_cache_path_keyed_by_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let plain = ModuleFetcher::with_source(dir.path().to_path_buf(), None, None);
        assert!(plain.cached_module_path().ends_with("engine.wasm"));

        let pinned = ModuleFetcher::with_source(
            dir.path().to_path_buf(),
            None,
            Some("ABCDEF0123456789ABCDEF".into()),
        );
        assert!(pinned.cached_module_path().ends_with("engine-abcdef0123456789.wasm"));
    }

    #[tokio::test]
    async fn test_fetch_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let digest = hex::encode(Sha256::digest(b"cached module"));
        let fetcher = ModuleFetcher::with_source(dir.path().to_path_buf(), None, Some(digest));

        fetcher.store_in_cache(b"cached module").unwrap();
        let bytes = fetcher.fetch_module().await.unwrap();
        assert_eq!(bytes, b"cached module");
    }

    #[tokio::test]
    async fn test_corrupt_cache_without_source() {
        let dir = tempfile::tempdir().unwrap();
        let digest = hex::encode(Sha256::digest(b"expected"));
        let fetcher = ModuleFetcher::with_source(dir.path().to_path_buf(), None, Some(digest));

        std::fs::write(fetcher.cached_module_path(), b"corrupted").unwrap();
        assert!(matches!(
            fetcher.fetch_module().await,
            Err(ModuleFetchError::NoSource)
        ));
    }
}
