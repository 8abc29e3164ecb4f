#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sim_bridge::{FetchError, StorageCollaborator};

/// Storage holding model files in memory. A listed path with no bytes fails to fetch.
#[derive(Default)]
pub(crate) struct MemoryStorage {
    models: HashMap<String, Vec<(String, Option<Vec<u8>>)>>,
    fetched: Mutex<Vec<String>>,
}

impl MemoryStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_file(mut self, model_id: &str, path: &str, contents: &str) -> Self {
        self.models
            .entry(model_id.to_string())
            .or_default()
            .push((path.to_string(), Some(contents.as_bytes().to_vec())));
        self
    }

    /// List `path` for the model but fail every fetch of it.
    pub(crate) fn with_broken_file(mut self, model_id: &str, path: &str) -> Self {
        self.models
            .entry(model_id.to_string())
            .or_default()
            .push((path.to_string(), None));
        self
    }

    pub(crate) fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageCollaborator for MemoryStorage {
    async fn list_files(&self, model_id: &str) -> Result<Vec<String>, FetchError> {
        self.models
            .get(model_id)
            .map(|files| files.iter().map(|(path, _)| path.clone()).collect())
            .ok_or_else(|| FetchError::ModelNotFound(model_id.to_string()))
    }

    async fn get_file(&self, model_id: &str, relative_path: &str) -> Result<Vec<u8>, FetchError> {
        self.fetched
            .lock()
            .unwrap()
            .push(format!("{}:{}", model_id, relative_path));

        let not_found = || FetchError::NotFound {
            model_id: model_id.to_string(),
            path: relative_path.to_string(),
        };

        self.models
            .get(model_id)
            .and_then(|files| files.iter().find(|(path, _)| path == relative_path))
            .and_then(|(_, bytes)| bytes.clone())
            .ok_or_else(not_found)
    }
}
