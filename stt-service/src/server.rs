//! HTTP transcription service
//!
//! Clients stream an audio file as the request body. The chunks are written to
//! a temporary file in arrival order, a fresh engine transcribes it on the
//! blocking pool, and the engine is released before the single reply goes out.

use crate::error::ServiceError;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use stt_bridge::{BridgeError, Engine, SpeechBackend, Transcript};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// What the service needs from an engine.
pub trait Transcriber: Send {
    fn transcribe_file(&mut self, audio_path: &Path) -> Result<Transcript, BridgeError>;

    fn version(&self) -> Result<String, BridgeError>;

    fn sample_rate(&self) -> Result<u32, BridgeError>;
}

impl<B: SpeechBackend> Transcriber for Engine<B> {
    fn transcribe_file(&mut self, audio_path: &Path) -> Result<Transcript, BridgeError> {
        self.process_file(audio_path)
    }

    fn version(&self) -> Result<String, BridgeError> {
        Engine::version(self).map(str::to_string)
    }

    fn sample_rate(&self) -> Result<u32, BridgeError> {
        Engine::sample_rate(self)
    }
}

/// Creates one initialized engine per request.
pub type EngineFactory = Arc<dyn Fn() -> Result<Box<dyn Transcriber>, BridgeError> + Send + Sync>;

/// Engine details reported by `/health`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    pub version: String,
    pub sample_rate: u32,
}

impl EngineInfo {
    pub fn probe(engine: &dyn Transcriber) -> Result<Self, BridgeError> {
        Ok(Self {
            version: engine.version()?,
            sample_rate: engine.sample_rate()?,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    factory: EngineFactory,
    max_upload_bytes: usize,
    // Filled once; health checks never re-run native activation after that.
    engine_info: Arc<OnceCell<EngineInfo>>,
}

impl AppState {
    pub fn new(factory: EngineFactory, max_upload_bytes: usize) -> Self {
        Self {
            factory,
            max_upload_bytes,
            engine_info: Arc::new(OnceCell::new()),
        }
    }

    /// Report `info` from `/health` instead of probing an engine.
    pub fn with_engine_info(mut self, info: EngineInfo) -> Self {
        self.engine_info = Arc::new(OnceCell::new_with(Some(info)));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplyCode {
    Ok,
    Failed,
}

/// Single reply to a transcription upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptReply {
    pub transcript: String,
    pub code: ReplyCode,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<stt_bridge::Word>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranscriptReply {
    pub fn ok(transcript: Transcript) -> Self {
        Self {
            transcript: transcript.transcript,
            code: ReplyCode::Ok,
            words: transcript.words,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            transcript: String::new(),
            code: ReplyCode::Failed,
            words: Vec::new(),
            error: Some(error.into()),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(TranscriptReply::failed(self.to_string()))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct TranscribeParams {
    /// Container extension of the uploaded audio, e.g. `wav`
    pub extension: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthReply {
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Create the service router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/transcriptions", post(transcribe_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn transcribe_handler(
    State(state): State<AppState>,
    Query(params): Query<TranscribeParams>,
    body: Body,
) -> Result<Json<TranscriptReply>, ServiceError> {
    let extension = validate_extension(params.extension.as_deref())?;

    let upload = reassemble(body.into_data_stream(), &extension, state.max_upload_bytes).await?;

    let factory = Arc::clone(&state.factory);
    let transcript = tokio::task::spawn_blocking(move || -> Result<Transcript, BridgeError> {
        let mut engine = factory()?;
        let transcript = engine.transcribe_file(upload.path());
        // Engine is released before the temporary file goes away.
        drop(engine);
        drop(upload);
        transcript
    })
    .await
    .map_err(|e| ServiceError::Task(e.to_string()))?
    .map_err(|e| {
        error!("Transcription failed: {}", e);
        ServiceError::from(e)
    })?;

    info!("Transcribed upload ({} words)", transcript.words.len());
    Ok(Json(TranscriptReply::ok(transcript)))
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthReply>) {
    let factory = Arc::clone(&state.factory);
    let info = state
        .engine_info
        .get_or_try_init(|| async move {
            let probe = tokio::task::spawn_blocking(move || -> Result<EngineInfo, BridgeError> {
                let engine = factory()?;
                EngineInfo::probe(engine.as_ref())
            })
            .await;
            match probe {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            }
        })
        .await;

    match info {
        Ok(info) => (
            StatusCode::OK,
            Json(HealthReply {
                status: "ok".to_string(),
                version: Some(info.version.clone()),
                sample_rate: Some(info.sample_rate),
                error: None,
            }),
        ),
        Err(e) => unavailable(e),
    }
}

fn unavailable(error: String) -> (StatusCode, Json<HealthReply>) {
    warn!("Health probe failed: {}", error);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(HealthReply {
            status: "unavailable".to_string(),
            version: None,
            sample_rate: None,
            error: Some(error),
        }),
    )
}

fn validate_extension(extension: Option<&str>) -> Result<String, ServiceError> {
    let extension = extension
        .map(|ext| ext.trim().trim_start_matches('.'))
        .filter(|ext| !ext.is_empty())
        .ok_or_else(|| ServiceError::InvalidRequest("missing `extension` query parameter".to_string()))?;

    if !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ServiceError::InvalidRequest(format!(
            "malformed extension '{}'",
            extension
        )));
    }
    Ok(extension.to_string())
}

/// Write a stream of chunks to a temporary file ending in `.{extension}`.
///
/// Chunks are appended in arrival order. The upload is rejected as soon as it
/// grows past `max_bytes`.
pub async fn reassemble<S, E>(mut chunks: S, extension: &str, max_bytes: usize) -> Result<NamedTempFile, ServiceError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let upload = tempfile::Builder::new()
        .prefix("stt-upload-")
        .suffix(&format!(".{}", extension))
        .tempfile()?;
    let mut file = tokio::fs::File::from_std(upload.reopen()?);

    let mut received = 0usize;
    let mut count = 0usize;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| ServiceError::Upload(e.to_string()))?;
        received += chunk.len();
        if received > max_bytes {
            warn!("Rejecting upload larger than {} bytes", max_bytes);
            return Err(ServiceError::PayloadTooLarge { limit: max_bytes });
        }
        file.write_all(&chunk).await?;
        count += 1;
    }
    file.flush().await?;
    file.sync_all().await?;

    if received == 0 {
        return Err(ServiceError::InvalidRequest("empty upload".to_string()));
    }

    debug!("Reassembled {} chunks ({} bytes) into {}", count, received, upload.path().display());
    Ok(upload)
}
