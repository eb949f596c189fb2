use std::time::Duration;

use reqwest::Url;

use crate::{Error, PublishPolicy, Result};

pub const DEFAULT_CONTROL_URL: &str = "http://10.5.5.9";
pub const DEFAULT_MEDIA_URL: &str = "http://10.5.5.9:8080";
pub const DEFAULT_IPFS_API_URL: &str = "http://127.0.0.1:5001";

/// Where published blobs go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Ipfs(Url),
    /// Kept in process memory, set with `IPFS_API_URL=memory`.
    Memory,
}

/// Runtime configuration, read from `GOPRO_*` and `IPFS_API_URL` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub control_url: Url,
    pub media_url: Url,
    pub store: StoreBackend,
    /// Applied to every HTTP request. Unset means requests may wait forever.
    pub http_timeout: Option<Duration>,
    pub publish_policy: PublishPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let url = |key: &str, default: &str| -> Result<Url> {
            let value = lookup(key).unwrap_or_else(|| default.to_string());
            let url =
                Url::parse(&value).map_err(|e| Error::Config(format!("{key}={value:?}: {e}")))?;
            if url.cannot_be_a_base() {
                return Err(Error::Config(format!("{key}={value:?}: not an HTTP base URL")));
            }
            Ok(url)
        };

        let control_url = url("GOPRO_CONTROL_URL", DEFAULT_CONTROL_URL)?;
        let media_url = url("GOPRO_MEDIA_URL", DEFAULT_MEDIA_URL)?;

        let store = match lookup("IPFS_API_URL").as_deref() {
            Some("memory") => StoreBackend::Memory,
            _ => StoreBackend::Ipfs(url("IPFS_API_URL", DEFAULT_IPFS_API_URL)?),
        };

        let http_timeout = lookup("GOPRO_HTTP_TIMEOUT_SECS")
            .map(|secs| match secs.parse::<u64>() {
                Ok(0) => Err(Error::Config(
                    "GOPRO_HTTP_TIMEOUT_SECS=\"0\": must be at least one second".to_string(),
                )),
                Ok(n) => Ok(Duration::from_secs(n)),
                Err(e) => Err(Error::Config(format!(
                    "GOPRO_HTTP_TIMEOUT_SECS={secs:?}: {e}"
                ))),
            })
            .transpose()?;

        let publish_policy = lookup("GOPRO_PUBLISH_POLICY")
            .map(|policy| policy.parse::<PublishPolicy>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            control_url,
            media_url,
            store,
            http_timeout,
            publish_policy,
        })
    }

    /// HTTP client shared by the camera and the IPFS store.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.http_timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))
    }
}
