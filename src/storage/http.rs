//! Model files served by the catalog HTTP API.
//!
//! - `GET {base}/api/models/{id}/files` lists a model's files
//! - `GET {base}/api/models/{id}/files/{path}` returns one file's bytes

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use crate::model::path::RelativePath;
use crate::storage::{AssetKind, FetchError, StorageCollaborator};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListedFile {
    Path(String),
    Entry { path: String },
}

#[derive(Debug, Deserialize)]
struct FileListing {
    files: Vec<ListedFile>,
}

/// Storage backed by the catalog API.
pub struct HttpStorage {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpStorage {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(base_url, client)
    }

    /// Use a preconfigured client (proxy, TLS or timeout settings).
    pub fn with_client(base_url: &str, client: Client) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FetchError::InvalidUrl(format!("'{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::InvalidUrl(format!(
                "'{}' cannot carry a path",
                base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn files_url<'a>(&self, model_id: &str, path: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "models", model_id, "files"])
                .extend(path);
        }
        url
    }

    async fn get_with_retry(
        &self,
        url: &Url,
        accept: &str,
    ) -> Result<reqwest::Response, FetchError> {
        for attempt in 0..MAX_RETRIES {
            match self.get_once(url, accept).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt + 1 < MAX_RETRIES => {
                    log::warn!(
                        "Request to {} failed (attempt {}): {}, retrying...",
                        url,
                        attempt + 1,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(FetchError::Network(format!(
            "Request to {} failed after maximum retries",
            url
        )))
    }

    async fn get_once(&self, url: &Url, accept: &str) -> Result<reqwest::Response, FetchError> {
        let mut request = self.client.get(url.clone()).header(ACCEPT, accept);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(response);
        }
        Err(FetchError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl StorageCollaborator for HttpStorage {
    async fn list_files(&self, model_id: &str) -> Result<Vec<String>, FetchError> {
        let url = self.files_url(model_id, std::iter::empty());
        let response = self.get_with_retry(&url, "application/json").await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::ModelNotFound(model_id.to_string()));
        }

        let listing: FileListing = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(listing
            .files
            .into_iter()
            .map(|file| match file {
                ListedFile::Path(path) | ListedFile::Entry { path } => path,
            })
            .collect())
    }

    async fn get_file(&self, model_id: &str, relative_path: &str) -> Result<Vec<u8>, FetchError> {
        let relative = RelativePath::parse(relative_path)?;
        let url = self.files_url(model_id, relative.components());

        let response = self
            .get_with_retry(&url, AssetKind::media_type(relative.as_str()))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                model_id: model_id.to_string(),
                path: relative.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
