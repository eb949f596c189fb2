use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Url};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::{endpoint, Error, Result};

/// Identifier returned by a content-addressed store. Never interpreted locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Stores `data` and returns the identifier derived from its content.
    async fn add_bytes(&self, data: Bytes) -> Result<ContentId>;
}

/// Client for the `add` endpoint of an IPFS node's HTTP API.
#[derive(Debug, Clone)]
pub struct IpfsStore {
    client: reqwest::Client,
    api: Url,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

impl IpfsStore {
    /// The API of a node running on this machine.
    pub fn local() -> Self {
        let api = Url::parse("http://127.0.0.1:5001").expect("static URL is known to be good");
        Self::new(api)
    }

    pub fn new(api: Url) -> Self {
        Self::with_client(reqwest::Client::new(), api)
    }

    pub fn with_client(client: reqwest::Client, api: Url) -> Self {
        IpfsStore { client, api }
    }

    fn add_url(&self) -> Url {
        endpoint(&self.api, &["api", "v0", "add"])
    }
}

#[async_trait::async_trait]
impl ContentStore for IpfsStore {
    #[tracing::instrument(skip(self, data), fields(size = data.len()))]
    async fn add_bytes(&self, data: Bytes) -> Result<ContentId> {
        tracing::info!("Publishing data to IPFS");

        let size = data.len() as u64;
        let part = Part::stream_with_length(Body::from(data), size).file_name("blob");
        let form = Form::new().part("file", part);
        let response = self
            .client
            .post(self.add_url())
            .multipart(form)
            .send()
            .await
            .map_err(Error::StorageUnreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::StorageRejected { status });
        }

        let body = response.bytes().await.map_err(Error::StorageUnreachable)?;
        let added: AddResponse = serde_json::from_slice(&body)?;

        tracing::info!(cid = %added.hash, "Published data");
        Ok(ContentId::new(added.hash))
    }
}

/// Content-addressed store kept in memory, keyed by the SHA-256 of each blob.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<ContentId, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn compute_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    pub async fn get(&self, id: &ContentId) -> Option<Bytes> {
        self.blobs.lock().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ContentStore for MemoryStore {
    #[tracing::instrument(skip(self, data), fields(size = data.len()))]
    async fn add_bytes(&self, data: Bytes) -> Result<ContentId> {
        let id = ContentId::new(Self::compute_hash(&data));
        let mut blobs = self.blobs.lock().await;
        if blobs.contains_key(&id) {
            tracing::debug!(cid = %id, "Blob already stored");
        } else {
            blobs.insert(id.clone(), data);
            tracing::info!(cid = %id, "Stored blob in memory");
        }
        Ok(id)
    }
}
