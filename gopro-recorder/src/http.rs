use bytes::Bytes;
use reqwest::Url;

use crate::{endpoint, CameraControl, Error, MediaList, MediaRef, Result};

/// A camera driven through the Open GoPro HTTP API.
#[derive(Debug, Clone)]
pub struct HttpCamera {
    client: reqwest::Client,
    control: Url,
    media: Url,
}

impl HttpCamera {
    pub fn new_wifi() -> Self {
        // Settings are served on port 80, the media endpoints on 8080.
        let control =
            Url::parse("http://10.5.5.9").expect("static URL is known to be good");
        let media =
            Url::parse("http://10.5.5.9:8080").expect("static URL is known to be good");
        Self::with_client(reqwest::Client::new(), control, media)
    }

    /// Talks to a single host for both settings and media.
    pub fn new_custom_address(base: Url) -> Self {
        Self::with_client(reqwest::Client::new(), base.clone(), base)
    }

    pub fn with_client(client: reqwest::Client, control: Url, media: Url) -> Self {
        HttpCamera {
            client,
            control,
            media,
        }
    }

    fn shutter_url(&self, on: bool) -> Url {
        let value = if on { "1" } else { "0" };
        endpoint(&self.control, &["gp", "gpControl", "setting", "10", value])
    }

    fn media_list_url(&self) -> Url {
        endpoint(&self.media, &["gp", "gpMediaList"])
    }

    fn thumbnail_url(&self, media: &MediaRef) -> Url {
        let mut url = endpoint(&self.media, &["gp", "gpMediaMetadata"]);
        url.set_query(Some(&format!("p={media}")));
        url
    }

    fn video_url(&self, media: &MediaRef) -> Url {
        endpoint(
            &self.media,
            &["videos", "DCIM", media.directory.as_str(), media.filename.as_str()],
        )
    }

    async fn get(&self, url: Url) -> Result<Bytes> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(Error::DeviceUnreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::DeviceRejected { url, status });
        }

        response.bytes().await.map_err(Error::DeviceUnreachable)
    }
}

#[async_trait::async_trait]
impl CameraControl for HttpCamera {
    #[tracing::instrument(skip(self))]
    async fn set_shutter(&self, on: bool) -> Result<()> {
        tracing::info!(on, "Setting video recording");
        self.get(self.shutter_url(on)).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list_media(&self) -> Result<MediaList> {
        let body = self.get(self.media_list_url()).await?;
        MediaList::parse(&body)
    }

    #[tracing::instrument(skip(self, media), fields(media = %media))]
    async fn thumbnail(&self, media: &MediaRef) -> Result<Bytes> {
        tracing::info!("Getting thumbnail");
        let data = self.get(self.thumbnail_url(media)).await?;
        tracing::debug!(size = data.len(), "Fetched thumbnail");
        Ok(data)
    }

    #[tracing::instrument(skip(self, media), fields(media = %media))]
    async fn video(&self, media: &MediaRef) -> Result<Bytes> {
        tracing::info!("Getting video");
        let data = self.get(self.video_url(media)).await?;
        tracing::debug!(size = data.len(), "Fetched video");
        Ok(data)
    }
}
