/// Integration tests for the STT service routes
///
/// The router runs against in-process transcribers, so no native library is
/// needed.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use futures::stream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stt_bridge::{BridgeError, Status, Transcript, Word};
use stt_service::{create_router, AppState, EngineFactory, EngineInfo, ReplyCode, Transcriber, TranscriptReply};
use tower::ServiceExt;

#[derive(Default)]
struct Observed {
    created: AtomicUsize,
    released: AtomicUsize,
    uploads: Mutex<Vec<(PathBuf, Vec<u8>)>>,
}

/// Transcriber that echoes the uploaded bytes back as the transcript.
struct EchoTranscriber {
    observed: Arc<Observed>,
}

impl Transcriber for EchoTranscriber {
    fn transcribe_file(&mut self, audio_path: &Path) -> Result<Transcript, BridgeError> {
        let bytes = std::fs::read(audio_path).map_err(|e| BridgeError::Io(e.to_string()))?;

        let extension = audio_path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        if extension == "xyz" {
            return Err(BridgeError::InvalidArgument("unsupported audio format 'xyz'".to_string()));
        }

        self.observed
            .uploads
            .lock()
            .unwrap()
            .push((audio_path.to_path_buf(), bytes.clone()));

        Ok(Transcript {
            transcript: String::from_utf8_lossy(&bytes).into_owned(),
            words: vec![Word {
                word: "echo".to_string(),
                start_sec: 0.0,
                end_sec: 0.3,
                confidence: 0.9,
                speaker_tag: -1,
            }],
        })
    }

    fn version(&self) -> Result<String, BridgeError> {
        Ok("echo-1.0".to_string())
    }

    fn sample_rate(&self) -> Result<u32, BridgeError> {
        Ok(16000)
    }
}

impl Drop for EchoTranscriber {
    fn drop(&mut self) {
        self.observed.released.fetch_add(1, Ordering::SeqCst);
    }
}

fn echo_factory(observed: Arc<Observed>) -> EngineFactory {
    Arc::new(move || -> Result<Box<dyn Transcriber>, BridgeError> {
        observed.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(EchoTranscriber {
            observed: Arc::clone(&observed),
        }) as Box<dyn Transcriber>)
    })
}

fn failing_factory() -> EngineFactory {
    Arc::new(|| -> Result<Box<dyn Transcriber>, BridgeError> {
        Err(BridgeError::Native {
            status: Status::ActivationRefused,
            message: "Initialization failed".to_string(),
            message_stack: vec!["AccessKey refused".to_string()],
        })
    })
}

fn chunked_upload(uri: &str, parts: &[&'static str]) -> Request<Body> {
    let chunks: Vec<Result<Bytes, std::io::Error>> =
        parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::from_stream(stream::iter(chunks)))
        .unwrap()
}

async fn reply(response: axum::response::Response) -> TranscriptReply {
    let body = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_streamed_upload_is_transcribed_in_order() {
    let observed = Arc::new(Observed::default());
    let app = create_router(AppState::new(echo_factory(Arc::clone(&observed)), 1024));

    let response = app
        .oneshot(chunked_upload(
            "/v1/transcriptions?extension=wav",
            &["first ", "second ", "third"],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let reply = reply(response).await;
    assert_eq!(reply.code, ReplyCode::Ok);
    assert_eq!(reply.transcript, "first second third");
    assert_eq!(reply.words.len(), 1);

    let uploads = observed.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0.extension().unwrap(), "wav");
    assert!(!uploads[0].0.exists(), "temporary upload should be removed");
}

#[tokio::test]
async fn test_engine_created_and_released_per_request() {
    let observed = Arc::new(Observed::default());
    let app = create_router(AppState::new(echo_factory(Arc::clone(&observed)), 1024));

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(chunked_upload("/v1/transcriptions?extension=flac", &["audio"]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(observed.created.load(Ordering::SeqCst), 3);
    assert_eq!(observed.released.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_missing_extension_is_rejected() {
    let observed = Arc::new(Observed::default());
    let app = create_router(AppState::new(echo_factory(Arc::clone(&observed)), 1024));

    let response = app
        .oneshot(chunked_upload("/v1/transcriptions", &["audio"]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(reply(response).await.code, ReplyCode::Failed);
    assert_eq!(observed.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_engine_rejection_replies_failed() {
    let observed = Arc::new(Observed::default());
    let app = create_router(AppState::new(echo_factory(Arc::clone(&observed)), 1024));

    let response = app
        .oneshot(chunked_upload("/v1/transcriptions?extension=xyz", &["audio"]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let reply = reply(response).await;
    assert_eq!(reply.code, ReplyCode::Failed);
    assert!(reply.transcript.is_empty());
    assert!(reply.error.unwrap().contains("xyz"));
    assert_eq!(observed.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let observed = Arc::new(Observed::default());
    let app = create_router(AppState::new(echo_factory(Arc::clone(&observed)), 8));

    let response = app
        .oneshot(chunked_upload("/v1/transcriptions?extension=wav", &["12345", "67890"]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(observed.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_activation_failure_is_service_unavailable() {
    let app = create_router(AppState::new(failing_factory(), 1024));

    let response = app
        .oneshot(chunked_upload("/v1/transcriptions?extension=wav", &["audio"]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let reply = reply(response).await;
    assert_eq!(reply.code, ReplyCode::Failed);
    assert!(reply.error.unwrap().contains("AccessKey refused"));
}

async fn health(app: &axum::Router) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 10_000).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_reports_engine() {
    let observed = Arc::new(Observed::default());
    let app = create_router(AppState::new(echo_factory(Arc::clone(&observed)), 1024));

    let (status, json) = health(&app).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], "echo-1.0");
    assert_eq!(json["sample_rate"], 16000);
}

#[tokio::test]
async fn test_health_probes_engine_once() {
    let observed = Arc::new(Observed::default());
    let app = create_router(AppState::new(echo_factory(Arc::clone(&observed)), 1024));

    for _ in 0..3 {
        let (status, _) = health(&app).await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(observed.created.load(Ordering::SeqCst), 1);
    assert_eq!(observed.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_health_uses_startup_engine_info() {
    let observed = Arc::new(Observed::default());
    let state = AppState::new(echo_factory(Arc::clone(&observed)), 1024).with_engine_info(EngineInfo {
        version: "2.0.1".to_string(),
        sample_rate: 16000,
    });
    let app = create_router(state);

    let (status, json) = health(&app).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["version"], "2.0.1");
    assert_eq!(observed.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_health_unavailable_when_engine_fails() {
    let app = create_router(AppState::new(failing_factory(), 1024));

    let (status, json) = health(&app).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json["error"].as_str().unwrap().contains("AccessKey refused"));
}
