//! Object storage for product images.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex;

use crate::error::{RemoteError, RemoteResult};
use crate::postgrest::{check, classify};

// Images arrive pre-optimized, so uploads fit the same short budget as
// row calls; a timed-out upload re-runs next cycle under x-upsert.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// A bucket of publicly served objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload bytes to `path`, overwriting any existing object.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> RemoteResult<()>;

    /// Public URL serving the object at `path`.
    fn public_url(&self, path: &str) -> String;
}

/// Supabase-storage implementation of [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct StorageClient {
    http: Client,
    base_url: String,
    api_key: String,
    bucket: String,
}

impl StorageClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> RemoteResult<Self> {
        let http = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|err| RemoteError::Network(err.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            bucket: bucket.into(),
        })
    }
}

#[async_trait]
impl ObjectStore for StorageClient {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> RemoteResult<()> {
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, path
        );

        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Content-Type", content_type)
            // Re-running an interrupted image sync re-uploads the same
            // path; overwrite instead of failing on the duplicate.
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(classify)?;

        check(response).await?;
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }
}

/// In-memory [`ObjectStore`] for tests.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
    fail_next: Mutex<bool>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next upload with a network error.
    pub async fn fail_next_upload(&self) {
        *self.fail_next.lock().await = true;
    }

    /// Stored object at `path`, as `(content_type, bytes)`.
    pub async fn object(&self, path: &str) -> Option<(String, Vec<u8>)> {
        self.objects.lock().await.get(path).cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> RemoteResult<()> {
        let mut fail = self.fail_next.lock().await;
        if *fail {
            *fail = false;
            return Err(RemoteError::Network("injected upload failure".to_string()));
        }
        drop(fail);

        self.objects
            .lock()
            .await
            .insert(path.to_string(), (content_type.to_string(), bytes));
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://{path}")
    }
}
