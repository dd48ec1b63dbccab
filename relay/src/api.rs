use crate::channel::AlertChannel;
use crate::config::{AlertConfig, Config};
use crate::errors::RelayError;
use crate::metrics_defs::{ALERTS_RECEIVED, ALERTS_REJECTED, REQUEST_DURATION};
use crate::photo::{self, StagingArea};
use crate::report::normalize;
use crate::response::{RelayResponse, compose};
use crate::text::send_alert;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Instant;

pub const LIVENESS_MESSAGE: &str = "✅ Beacon alert relay running";

/// Read-only state shared by every request
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    channel: Box<dyn AlertChannel>,
    chat_id: String,
    alert: AlertConfig,
    staging: StagingArea,
}

impl AppState {
    pub fn new(config: &Config, channel: Box<dyn AlertChannel>) -> Self {
        Self {
            inner: Arc::new(Inner {
                channel,
                chat_id: config.channel.chat_id.clone().unwrap_or_default(),
                alert: config.alert.clone(),
                staging: StagingArea::new(config.upload.staging_dir.clone()),
            }),
        }
    }
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/send_data", post(send_data))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

async fn root() -> &'static str {
    LIVENESS_MESSAGE
}

async fn send_data(State(state): State<AppState>, request: Request) -> Response {
    let started = Instant::now();
    let response = match relay_alert(&state, request).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            metrics::counter!(ALERTS_REJECTED.name, "status" => e.status().as_str().to_owned())
                .increment(1);
            e.into_response()
        }
    };

    metrics::histogram!(REQUEST_DURATION.name, "status" => response.status().as_str().to_owned())
        .record(started.elapsed().as_secs_f64());
    response
}

/// Normalizes the request, then runs the text and photo stages in order.
///
/// Only normalization can fail the request. Each stage's failure is kept in
/// its own outcome.
async fn relay_alert(state: &AppState, request: Request) -> Result<RelayResponse, RelayError> {
    let inner = &state.inner;
    let (encoding, mut report) = normalize(request, &inner.staging).await?;

    metrics::counter!(ALERTS_RECEIVED.name, "encoding" => encoding.as_str()).increment(1);
    tracing::info!(
        encoding = encoding.as_str(),
        latitude = %report.latitude,
        longitude = %report.longitude,
        label = report.label_or_default(),
        "Relaying alert"
    );

    let text = send_alert(
        inner.channel.as_ref(),
        &inner.chat_id,
        &inner.alert,
        &report,
    )
    .await;
    let photo = photo::relay(inner.channel.as_ref(), &inner.chat_id, &mut report).await;

    Ok(compose(&text, &photo))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{ChannelCall, MULTIPART_BOUNDARY, MultipartBody, RecordingChannel};
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::http::header::CONTENT_TYPE;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    /// Forwards to a shared `RecordingChannel` so tests can inspect calls.
    struct SharedChannel(Arc<RecordingChannel>);

    #[async_trait::async_trait]
    impl AlertChannel for SharedChannel {
        async fn send_message(
            &self,
            chat_id: &str,
            text: &str,
        ) -> Result<Value, crate::errors::DeliveryError> {
            self.0.send_message(chat_id, text).await
        }

        async fn send_photo(
            &self,
            chat_id: &str,
            attachment: crate::channel::Attachment,
            caption: &str,
        ) -> Result<Value, crate::errors::DeliveryError> {
            self.0.send_photo(chat_id, attachment, caption).await
        }
    }

    struct TestApp {
        router: Router,
        channel: Arc<RecordingChannel>,
        staging_dir: tempfile::TempDir,
    }

    impl TestApp {
        fn new(channel: RecordingChannel) -> Self {
            Self::with_limit(channel, 1024 * 1024)
        }

        fn with_limit(channel: RecordingChannel, max_body_bytes: usize) -> Self {
            Self::build(channel, max_body_bytes, |dir| dir.to_path_buf())
        }

        /// Stages uploads into a directory that does not exist.
        fn with_missing_staging_dir(channel: RecordingChannel) -> Self {
            Self::build(channel, 1024 * 1024, |dir| dir.join("missing"))
        }

        fn build(
            channel: RecordingChannel,
            max_body_bytes: usize,
            staging_path: impl FnOnce(&std::path::Path) -> std::path::PathBuf,
        ) -> Self {
            let staging_dir = tempfile::tempdir().unwrap();
            let mut config = Config::default();
            config.channel.chat_id = Some("-100".into());
            config.upload.staging_dir = Some(staging_path(staging_dir.path()));

            let channel = Arc::new(channel);
            let state = AppState::new(&config, Box::new(SharedChannel(channel.clone())));
            Self {
                router: router(state, max_body_bytes),
                channel,
                staging_dir,
            }
        }

        async fn send(&self, request: Request) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            (status, serde_json::from_slice(&body).unwrap())
        }

        async fn send_json(&self, body: Value) -> (StatusCode, Value) {
            let request = axum::http::Request::builder()
                .method("POST")
                .uri("/send_data")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            self.send(request).await
        }

        async fn send_multipart(&self, body: MultipartBody) -> (StatusCode, Value) {
            let request = axum::http::Request::builder()
                .method("POST")
                .uri("/send_data")
                .header(
                    CONTENT_TYPE,
                    format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
                )
                .body(Body::from(body.finish()))
                .unwrap();
            self.send(request).await
        }

        fn staged_files(&self) -> usize {
            std::fs::read_dir(self.staging_dir.path()).unwrap().count()
        }
    }

    #[tokio::test]
    async fn test_root_liveness() {
        let app = TestApp::new(RecordingChannel::default());
        let request = axum::http::Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.as_ref(), LIVENESS_MESSAGE.as_bytes());
    }

    #[tokio::test]
    async fn test_json_without_photo() {
        let app = TestApp::new(RecordingChannel::default());
        let (status, body) = app.send_json(json!({"lat": 12.97, "lon": 77.59})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["msg_status"]["result"]["message_id"], 1);
        assert_eq!(body["photo_status"], Value::Null);

        let calls = app.channel.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], ChannelCall::Message { chat_id, .. } if chat_id == "-100"));
    }

    #[tokio::test]
    async fn test_json_with_data_url_photo() {
        let app = TestApp::new(RecordingChannel::default());
        let (status, body) = app
            .send_json(json!({
                "lat": 12.97,
                "lon": 77.59,
                "photo": "data:image/jpeg;base64,/9j/4AAQ",
            }))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["photo_status"]["result"]["message_id"], 2);

        let calls = app.channel.calls();
        assert_eq!(calls.len(), 2);
        let ChannelCall::Message { text, .. } = &calls[0] else {
            panic!("text must be sent first");
        };
        assert!(text.contains("https://www.google.com/maps?q=12.97,77.59"));

        let ChannelCall::Photo {
            mime,
            filename,
            bytes,
            ..
        } = &calls[1]
        else {
            panic!("expected a photo call");
        };
        assert_eq!(*mime, "image/jpeg");
        assert_eq!(*filename, "photo.jpg");
        assert_eq!(bytes, &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10]);
    }

    #[tokio::test]
    async fn test_missing_coordinates_rejected() {
        let app = TestApp::new(RecordingChannel::default());
        let (status, body) = app
            .send_json(json!({"photo": "data:image/jpeg;base64,/9j/4AAQ"}))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"ok": false, "error": "missing coordinates"}));
        assert!(app.channel.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_json_rejected() {
        let app = TestApp::new(RecordingChannel::default());
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/send_data")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{\"lat\": "))
            .unwrap();
        let (status, body) = app.send(request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
        assert!(app.channel.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_base64_still_sends_text() {
        let app = TestApp::new(RecordingChannel::default());
        let (status, body) = app
            .send_json(json!({"lat": 1, "lon": 2, "photo": "data:image/jpeg;base64,not*base64"}))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["msg_status"]["ok"], true);
        assert_eq!(body["photo_status"]["ok"], false);

        let calls = app.channel.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], ChannelCall::Message { .. }));
    }

    #[tokio::test]
    async fn test_non_string_photo_still_sends_text() {
        let app = TestApp::new(RecordingChannel::default());
        let (status, body) = app
            .send_json(json!({"lat": 1, "lon": 2, "photo": 123, "label": false}))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["msg_status"]["ok"], true);
        assert_eq!(body["photo_status"]["ok"], false);
        assert_eq!(body["photo_status"]["error"], "photo payload is not a string");

        let calls = app.channel.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], ChannelCall::Message { .. }));
    }

    #[tokio::test]
    async fn test_photo_failure_keeps_text_status() {
        let app = TestApp::new(RecordingChannel::failing_photos());
        let (status, body) = app
            .send_json(json!({"lat": 1, "lon": 2, "photo": "aGVsbG8="}))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["msg_status"]["ok"], true);
        assert_eq!(body["photo_status"]["ok"], false);
        assert_eq!(body["photo_status"]["error_code"], 400);
        assert_eq!(app.channel.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_text_failure_does_not_block_photo() {
        let app = TestApp::new(RecordingChannel::failing_messages());
        let (status, body) = app
            .send_json(json!({"lat": 1, "lon": 2, "photo": "aGVsbG8="}))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["msg_status"]["ok"], false);
        assert_eq!(body["photo_status"]["ok"], true);
        assert_eq!(app.channel.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_multipart_with_photo() {
        let app = TestApp::new(RecordingChannel::default());
        let (status, body) = app
            .send_multipart(
                MultipartBody::new()
                    .text("latitude", "12.97")
                    .text("longitude", "77.59")
                    .text("label", "porch")
                    .file("photo", "capture.jpg", b"\xff\xd8uploaded"),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);

        let calls = app.channel.calls();
        assert_eq!(calls.len(), 2);
        let ChannelCall::Message { text, .. } = &calls[0] else {
            panic!("text must be sent first");
        };
        assert!(text.contains("Camera: porch"));

        let ChannelCall::Photo {
            bytes,
            caption,
            staged_path,
            ..
        } = &calls[1]
        else {
            panic!("expected a photo call");
        };
        assert_eq!(bytes, b"\xff\xd8uploaded");
        assert!(caption.contains("porch"));
        assert!(!staged_path.as_ref().unwrap().exists());
        assert_eq!(app.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_multipart_photo_failure_releases_staging() {
        let app = TestApp::new(RecordingChannel::failing_photos());
        let (status, body) = app
            .send_multipart(
                MultipartBody::new()
                    .text("lat", "1")
                    .text("lon", "2")
                    .file("photo", "capture.jpg", b"uploaded"),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["photo_status"]["ok"], false);
        assert_eq!(app.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_staging_failure_is_server_error() {
        let app = TestApp::with_missing_staging_dir(RecordingChannel::default());
        let (status, body) = app
            .send_multipart(
                MultipartBody::new()
                    .text("lat", "1")
                    .text("lon", "2")
                    .file("photo", "capture.jpg", b"uploaded"),
            )
            .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "failed to stage photo upload");
        assert!(app.channel.calls().is_empty());
        assert_eq!(app.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_multipart_missing_coordinates() {
        let app = TestApp::new(RecordingChannel::default());
        let (status, body) = app
            .send_multipart(MultipartBody::new().file("photo", "capture.jpg", b"uploaded"))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing coordinates");
        assert!(app.channel.calls().is_empty());
        assert_eq!(app.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_resubmission_sends_again() {
        let app = TestApp::new(RecordingChannel::default());
        for _ in 0..2 {
            let (status, _) = app.send_json(json!({"lat": 1, "lon": 2})).await;
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(app.channel.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_content_type() {
        let app = TestApp::new(RecordingChannel::default());
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/send_data")
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::from("lat=1"))
            .unwrap();
        let (status, body) = app.send(request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("text/plain"));
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let app = TestApp::with_limit(RecordingChannel::default(), 64);
        let photo = "A".repeat(256);
        let (status, body) = app
            .send_json(json!({"lat": 1, "lon": 2, "photo": photo}))
            .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["ok"], false);
        assert!(app.channel.calls().is_empty());
    }
}
