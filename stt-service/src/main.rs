/// STT Service binary
///
/// Speech-to-text service: accepts streamed audio uploads over HTTP and
/// replies with the transcript.

use stt_service::{create_router, init_logging, native_engine_factory, AppState, EngineInfo, ServiceSettings};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    init_logging();

    info!("Starting STT service v{}", stt_bridge::VERSION);

    let settings = match ServiceSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load service configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Configuration: {:?}", settings);

    // Fail fast on a wrong platform, a broken bundle or a rejected key.
    let probe = match settings.engine_builder().init() {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to initialize speech engine: {}", e);
            std::process::exit(1);
        }
    };
    let engine_info = match EngineInfo::probe(&probe) {
        Ok(info) => info,
        Err(e) => {
            error!("Failed to query speech engine: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Native engine ready (version {}, {} Hz)",
        engine_info.version, engine_info.sample_rate
    );
    drop(probe);

    let state = AppState::new(native_engine_factory(&settings), settings.max_upload_bytes)
        .with_engine_info(engine_info);
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(settings.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", settings.bind_addr, e);
            std::process::exit(1);
        }
    };

    info!("Listening on http://{}", settings.bind_addr);
    info!("  POST /v1/transcriptions?extension=<ext>  - Transcribe a streamed audio file");
    info!("  GET  /health                              - Engine status");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Shutting down STT service");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }
}
