//! Object-storage gateway
//!
//! Narrow client surface over the storage tier: existence checks and
//! object specs. Transport failures are retried with bounded attempts;
//! a 404-class response is a definitive "does not exist" and is never
//! retried.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};

/// Storage-side view of one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageObject {
    pub object_id: String,
    pub file_size: i64,
    pub file_md5sum: Option<String>,
}

/// Gateway to the object-storage service
#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn exists(&self, object_id: &str) -> RegistryResult<bool>;
    async fn download_spec(&self, object_id: &str) -> RegistryResult<StorageObject>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpecResponse {
    object_id: String,
    object_size: i64,
    #[serde(default)]
    object_md5: Option<String>,
}

/// HTTP storage gateway
pub struct HttpStorageGateway {
    client: reqwest::Client,
    base_url: String,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl HttpStorageGateway {
    pub fn new(base_url: String, retry_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_attempts,
            retry_delay,
        }
    }

    /// Issue one GET, retrying only transport-level failures
    async fn get_with_retry(&self, url: &str) -> RegistryResult<reqwest::Response> {
        let mut attempt = 0;
        loop {
            match self.client.get(url).send().await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retry_attempts {
                        return Err(RegistryError::StorageService(format!(
                            "request to {} failed after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    debug!(url = %url, attempt, "storage request failed, retrying");
                    sleep(self.retry_delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl StorageGateway for HttpStorageGateway {
    async fn exists(&self, object_id: &str) -> RegistryResult<bool> {
        let url = format!("{}/object/{}", self.base_url, object_id);
        let response = self.get_with_retry(&url).await?;

        if response.status().is_success() {
            return Ok(true);
        }
        if response.status().as_u16() == 404 {
            return Ok(false);
        }
        Err(RegistryError::StorageService(format!(
            "{} returned {}",
            url,
            response.status()
        )))
    }

    async fn download_spec(&self, object_id: &str) -> RegistryResult<StorageObject> {
        let url = format!("{}/object/{}", self.base_url, object_id);
        let response = self.get_with_retry(&url).await?;

        if !response.status().is_success() {
            return Err(RegistryError::StorageService(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let spec: SpecResponse = response.json().await.map_err(|e| {
            RegistryError::StorageService(format!("parse spec from {}: {}", url, e))
        })?;

        Ok(StorageObject {
            object_id: spec.object_id,
            file_size: spec.object_size,
            file_md5sum: spec.object_md5,
        })
    }
}

/// In-memory storage backend. Selected when no storage URL is configured,
/// so a zero-config instance starts without an external storage tier;
/// also the gateway used by tests.
#[derive(Default)]
pub struct InMemoryStorage {
    objects: Mutex<HashMap<String, StorageObject>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, object: StorageObject) {
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .insert(object.object_id.clone(), object);
    }

    pub fn remove(&self, object_id: &str) {
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .remove(object_id);
    }
}

#[async_trait]
impl StorageGateway for InMemoryStorage {
    async fn exists(&self, object_id: &str) -> RegistryResult<bool> {
        Ok(self
            .objects
            .lock()
            .expect("storage mutex poisoned")
            .contains_key(object_id))
    }

    async fn download_spec(&self, object_id: &str) -> RegistryResult<StorageObject> {
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .get(object_id)
            .cloned()
            .ok_or_else(|| {
                RegistryError::StorageService(format!("object {} has no spec", object_id))
            })
    }
}
