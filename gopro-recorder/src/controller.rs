use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::{
    CameraControl, ContentId, ContentStore, Error, MediaRef, Publish, RecordAck, Result,
    ServiceServer,
};

pub const RECORD_SERVICE: &str = "camera/record";
pub const THUMBNAIL_TOPIC: &str = "camera/thumbnail";
pub const VIDEO_TOPIC: &str = "camera/video";

const START_FAILED: &str = "Unable to start recording";
const STOP_FAILED: &str = "Unable to stop recording";

/// What happens when recording stops while an earlier publish is still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PublishPolicy {
    /// Skip the new publish.
    #[default]
    SingleFlight,
    /// Start another publish next to the running one.
    Overlap,
}

impl FromStr for PublishPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single-flight" => Ok(PublishPolicy::SingleFlight),
            "overlap" => Ok(PublishPolicy::Overlap),
            other => Err(Error::Config(format!("unknown publish policy {other:?}"))),
        }
    }
}

/// Identifiers announced for one published asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMedia {
    pub media: MediaRef,
    pub thumbnail: ContentId,
    pub video: ContentId,
}

/// Toggles recording and publishes the newest asset once recording stops.
#[derive(Clone)]
pub struct RecordingController {
    camera: Arc<dyn CameraControl>,
    store: Arc<dyn ContentStore>,
    thumbnail: Arc<dyn Publish>,
    video: Arc<dyn Publish>,
    policy: PublishPolicy,
    in_flight: Arc<Semaphore>,
    tasks: TaskTracker,
}

impl RecordingController {
    pub fn new(
        camera: Arc<dyn CameraControl>,
        store: Arc<dyn ContentStore>,
        thumbnail: Arc<dyn Publish>,
        video: Arc<dyn Publish>,
    ) -> Self {
        Self {
            camera,
            store,
            thumbnail,
            video,
            policy: PublishPolicy::default(),
            in_flight: Arc::new(Semaphore::new(1)),
            tasks: TaskTracker::new(),
        }
    }

    pub fn with_policy(mut self, policy: PublishPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sends one recording toggle to the camera.
    ///
    /// Failures are reported through the returned ack only. Stopping also
    /// starts a background publish of the newest asset whose outcome is logged.
    #[tracing::instrument(skip(self))]
    pub async fn set_recording(&self, enable: bool) -> RecordAck {
        if let Err(error) = self.camera.set_shutter(enable).await {
            tracing::warn!(%error, enable, "Recording toggle failed");
            return RecordAck::failed(if enable { START_FAILED } else { STOP_FAILED });
        }

        if !enable {
            self.spawn_publish();
        }
        RecordAck::ok()
    }

    fn spawn_publish(&self) {
        let permit = match self.policy {
            PublishPolicy::SingleFlight => match self.in_flight.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!("Media publish already running, skipping");
                    return;
                }
            },
            PublishPolicy::Overlap => None,
        };

        let controller = self.clone();
        self.tasks.spawn(
            async move {
                let _permit = permit;
                match controller.publish_latest_media().await {
                    Ok(published) => tracing::info!(
                        media = %published.media,
                        thumbnail = %published.thumbnail,
                        video = %published.video,
                        "Published latest media"
                    ),
                    Err(error) => tracing::error!(%error, "Publishing latest media failed"),
                }
            }
            .instrument(tracing::Span::current()),
        );
    }

    /// Waits for every publish started so far.
    pub async fn shutdown(&self) {
        self.tasks.close();
        if !self.tasks.is_empty() {
            tracing::info!(running = self.tasks.len(), "Waiting for media publishes");
        }
        self.tasks.wait().await;
    }

    /// Enumerates the camera's media in the order it reports them.
    pub async fn list_media(&self) -> Result<impl Iterator<Item = MediaRef>> {
        Ok(self.camera.list_media().await?.into_refs())
    }

    /// Stores and announces the thumbnail, then the video, of the newest asset.
    ///
    /// A failure after the thumbnail announcement leaves it in place.
    #[tracing::instrument(skip(self))]
    pub async fn publish_latest_media(&self) -> Result<PublishedMedia> {
        let media = self
            .camera
            .list_media()
            .await?
            .latest()
            .ok_or(Error::NoMedia)?;
        tracing::info!(%media, "Selected latest media");

        let thumbnail = self.store.add_bytes(self.camera.thumbnail(&media).await?).await?;
        announce(self.thumbnail.as_ref(), &thumbnail).await?;

        let video = self.store.add_bytes(self.camera.video(&media).await?).await?;
        announce(self.video.as_ref(), &video).await?;

        Ok(PublishedMedia {
            media,
            thumbnail,
            video,
        })
    }

    /// Answers calls one at a time until every caller handle is gone.
    pub async fn serve(&self, mut server: ServiceServer) {
        tracing::info!(service = server.name(), "Serving recording requests");
        while let Some(call) = server.next().await {
            let ack = self.set_recording(call.request()).await;
            call.respond(ack);
        }
        tracing::info!(service = server.name(), "Service closed");
    }
}

async fn announce(channel: &dyn Publish, id: &ContentId) -> Result<()> {
    channel.publish(id.to_string()).await?;
    tracing::info!(topic = channel.topic(), cid = %id, "Announced content id");
    Ok(())
}
