//! End-to-end tests against a fake camera and a fake IPFS node served by axum.
//!
//! Run: `cargo test -p gopro-recorder --test recording`

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use gopro_recorder::{
    CameraControl, ContentId, ContentStore, Error, HttpCamera, IpfsStore, LocalBus, MediaRef,
    MemoryStore, PublishPolicy, RecordAck, RecordingController, RECORD_SERVICE, THUMBNAIL_TOPIC,
    VIDEO_TOPIC,
};
use reqwest::Url;

const INDEX: &str = r#"{"media":[{"d":"100GOPRO","fs":["A.JPG","B.MP4"]}]}"#;
const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct FakeCamera {
    index: &'static str,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeCamera {
    fn new(index: &'static str) -> Self {
        Self {
            index,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn log(&self, request: String) {
        self.requests.lock().unwrap().push(request);
    }
}

async fn setting(State(camera): State<FakeCamera>, Path(value): Path<String>) -> &'static str {
    camera.log(format!("setting/10/{value}"));
    "{}"
}

async fn media_list(State(camera): State<FakeCamera>) -> &'static str {
    camera.log("gpMediaList".to_string());
    camera.index
}

async fn metadata(
    State(camera): State<FakeCamera>,
    Query(query): Query<HashMap<String, String>>,
) -> Vec<u8> {
    let path = query.get("p").cloned().unwrap_or_default();
    camera.log(format!("gpMediaMetadata {path}"));
    format!("thumbnail of {path}").into_bytes()
}

async fn video(
    State(camera): State<FakeCamera>,
    Path((dir, file)): Path<(String, String)>,
) -> Vec<u8> {
    camera.log(format!("videos {dir}/{file}"));
    format!("video of {dir}/{file}").into_bytes()
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    addr
}

async fn spawn_camera(camera: FakeCamera) -> Url {
    let router = Router::new()
        .route("/gp/gpControl/setting/10/{value}", get(setting))
        .route("/gp/gpMediaList", get(media_list))
        .route("/gp/gpMediaMetadata", get(metadata))
        .route("/videos/DCIM/{dir}/{file}", get(video))
        .with_state(camera);
    let addr = serve(router).await;
    Url::parse(&format!("http://{addr}")).unwrap()
}

/// An address nothing listens on.
async fn closed_port() -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}")).unwrap()
}

struct Harness {
    controller: RecordingController,
    store: Arc<MemoryStore>,
    bus: LocalBus,
}

async fn harness(base: Url) -> Harness {
    let bus = LocalBus::new();
    let store = Arc::new(MemoryStore::new());
    let controller = RecordingController::new(
        Arc::new(HttpCamera::new_custom_address(base)),
        store.clone(),
        Arc::new(bus.publisher(THUMBNAIL_TOPIC).await),
        Arc::new(bus.publisher(VIDEO_TOPIC).await),
    );
    Harness {
        controller,
        store,
        bus,
    }
}

async fn next_announcement(rx: &mut tokio::sync::broadcast::Receiver<String>) -> ContentId {
    let payload = tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("announcement in time")
        .unwrap();
    ContentId::new(payload)
}

#[tokio::test]
async fn start_hits_only_the_enable_url() {
    let camera = FakeCamera::new(INDEX);
    let h = harness(spawn_camera(camera.clone()).await).await;
    let mut thumbnails = h.bus.subscribe(THUMBNAIL_TOPIC).await;

    assert_eq!(h.controller.set_recording(true).await, RecordAck::ok());

    let nothing = tokio::time::timeout(Duration::from_millis(200), thumbnails.recv()).await;
    assert!(nothing.is_err());
    assert_eq!(camera.requests(), ["setting/10/1"]);
}

#[tokio::test]
async fn stop_publishes_newest_asset_to_both_topics() {
    let camera = FakeCamera::new(INDEX);
    let h = harness(spawn_camera(camera.clone()).await).await;
    let mut thumbnails = h.bus.subscribe(THUMBNAIL_TOPIC).await;
    let mut videos = h.bus.subscribe(VIDEO_TOPIC).await;

    assert_eq!(h.controller.set_recording(false).await, RecordAck::ok());

    let thumbnail = next_announcement(&mut thumbnails).await;
    let video = next_announcement(&mut videos).await;

    assert_eq!(
        h.store.get(&thumbnail).await.unwrap(),
        Bytes::from_static(b"thumbnail of 100GOPRO/B.MP4")
    );
    assert_eq!(
        h.store.get(&video).await.unwrap(),
        Bytes::from_static(b"video of 100GOPRO/B.MP4")
    );
    assert_eq!(
        camera.requests(),
        [
            "setting/10/0",
            "gpMediaList",
            "gpMediaMetadata 100GOPRO/B.MP4",
            "videos 100GOPRO/B.MP4"
        ]
    );
}

#[tokio::test]
async fn unreachable_camera_yields_failed_acks() {
    let h = harness(closed_port().await).await;

    assert_eq!(
        h.controller.set_recording(true).await,
        RecordAck::failed("Unable to start recording")
    );
    assert_eq!(
        h.controller.set_recording(false).await,
        RecordAck::failed("Unable to stop recording")
    );
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn camera_errors_are_typed() {
    let router = Router::new().route(
        "/gp/gpMediaList",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "busy") }),
    );
    let base = Url::parse(&format!("http://{}", serve(router).await)).unwrap();
    let camera = HttpCamera::new_custom_address(base);

    let err = camera.list_media().await.unwrap_err();
    assert!(matches!(
        err,
        Error::DeviceRejected { status, .. } if status.as_u16() == 500
    ));

    let offline = HttpCamera::new_custom_address(closed_port().await);
    let err = offline.set_shutter(true).await.unwrap_err();
    assert!(matches!(err, Error::DeviceUnreachable(_)));
}

#[tokio::test]
async fn list_media_follows_device_order() {
    let camera = FakeCamera::new(
        r#"{"media":[{"d":"101GOPRO","fs":["C.MP4"]},{"d":"100GOPRO","fs":["A.JPG","B.MP4"]}]}"#,
    );
    let h = harness(spawn_camera(camera).await).await;

    let refs: Vec<MediaRef> = h.controller.list_media().await.unwrap().collect();
    assert_eq!(
        refs,
        [
            MediaRef::new("101GOPRO", "C.MP4"),
            MediaRef::new("100GOPRO", "A.JPG"),
            MediaRef::new("100GOPRO", "B.MP4"),
        ]
    );

    let published = h.controller.publish_latest_media().await.unwrap();
    assert_eq!(published.media, MediaRef::new("100GOPRO", "B.MP4"));
}

#[tokio::test]
async fn empty_camera_publishes_nothing() {
    let camera = FakeCamera::new(r#"{"media":[]}"#);
    let h = harness(spawn_camera(camera.clone()).await).await;

    let err = h.controller.publish_latest_media().await.unwrap_err();

    assert!(matches!(err, Error::NoMedia));
    assert!(h.store.is_empty().await);
    assert_eq!(camera.requests(), ["gpMediaList"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn overlapping_stops_may_each_publish() {
    let camera = FakeCamera::new(INDEX);
    let h = harness(spawn_camera(camera.clone()).await).await;
    let controller = h.controller.with_policy(PublishPolicy::Overlap);
    let mut videos = h.bus.subscribe(VIDEO_TOPIC).await;

    assert!(controller.set_recording(false).await.success);
    assert!(controller.set_recording(false).await.success);

    // Either order is fine, both land on the same content.
    let first = next_announcement(&mut videos).await;
    let second = next_announcement(&mut videos).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn record_service_round_trip() {
    let camera = FakeCamera::new(INDEX);
    let h = harness(spawn_camera(camera.clone()).await).await;
    let mut videos = h.bus.subscribe(VIDEO_TOPIC).await;

    let server = h.bus.advertise(RECORD_SERVICE).await;
    let controller = h.controller.clone();
    tokio::spawn(async move { controller.serve(server).await });

    assert_eq!(h.bus.call(RECORD_SERVICE, true).await.unwrap(), RecordAck::ok());
    assert_eq!(h.bus.call(RECORD_SERVICE, false).await.unwrap(), RecordAck::ok());

    let video = next_announcement(&mut videos).await;
    assert!(h.store.get(&video).await.is_some());
    assert_eq!(&camera.requests()[..2], ["setting/10/1", "setting/10/0"]);
}

#[tokio::test]
async fn ipfs_store_returns_the_node_hash() {
    let uploads = Arc::new(Mutex::new(Vec::<usize>::new()));
    let seen = uploads.clone();
    let router = Router::new().route(
        "/api/v0/add",
        post(move |body: Bytes| async move {
            seen.lock().unwrap().push(body.len());
            r#"{"Name":"blob","Hash":"QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG","Size":"13"}"#
        }),
    );
    let api = Url::parse(&format!("http://{}", serve(router).await)).unwrap();
    let store = IpfsStore::new(api);

    let id = store
        .add_bytes(Bytes::from_static(b"hello, gopro!"))
        .await
        .unwrap();

    assert_eq!(id.as_str(), "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG");
    // Multipart framing wraps the payload.
    assert!(uploads.lock().unwrap()[0] > 13);
}

#[tokio::test]
async fn ipfs_store_errors_are_typed() {
    let router = Router::new().route(
        "/api/v0/add",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "daemon starting") }),
    );
    let api = Url::parse(&format!("http://{}", serve(router).await)).unwrap();

    let err = IpfsStore::new(api)
        .add_bytes(Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StorageRejected { .. }));

    let err = IpfsStore::new(closed_port().await)
        .add_bytes(Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StorageUnreachable(_)));
}
