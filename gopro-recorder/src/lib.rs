//! Bridges a GoPro's local HTTP API, an IPFS node and a message bus.
//!
//! A [`RecordingController`] answers `camera/record` service calls by toggling
//! the camera's recording setting. When recording stops it publishes the newest
//! asset on the camera to a [`ContentStore`] and announces the returned content
//! identifiers on the `camera/thumbnail` and `camera/video` topics.

mod bus;
mod config;
mod controller;
mod http;
mod media;
mod storage;

pub use bus::*;
pub use config::*;
pub use controller::*;
pub use http::*;
pub use media::*;
pub use storage::*;

use bytes::Bytes;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("camera is unreachable")]
    DeviceUnreachable(#[source] reqwest::Error),
    #[error("camera answered {url} with {status}")]
    DeviceRejected {
        url: reqwest::Url,
        status: reqwest::StatusCode,
    },
    #[error("malformed response")]
    MalformedResponse(#[from] serde_json::Error),
    #[error("camera has no media")]
    NoMedia,
    #[error("content store is unreachable")]
    StorageUnreachable(#[source] reqwest::Error),
    #[error("content store rejected the upload with {status}")]
    StorageRejected { status: reqwest::StatusCode },
    #[error("channel {0} is closed")]
    ChannelClosed(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Appends `segments` to the path of `base`, keeping any prefix it already has.
pub(crate) fn endpoint(base: &reqwest::Url, segments: &[&str]) -> reqwest::Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Operations a camera has to support for the recorder.
#[async_trait::async_trait]
pub trait CameraControl: Send + Sync {
    /// Starts (`true`) or stops (`false`) recording. The camera's answer is ignored.
    async fn set_shutter(&self, on: bool) -> Result<()>;

    /// Fetches the camera's media index.
    async fn list_media(&self) -> Result<MediaList>;

    async fn thumbnail(&self, media: &MediaRef) -> Result<Bytes>;

    async fn video(&self, media: &MediaRef) -> Result<Bytes>;
}
