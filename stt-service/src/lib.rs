/// STT Service library
///
/// HTTP transcription service and shared pieces of the `stt-file` CLI, built
/// on the native engine bridge.

pub mod error;
pub mod server;
pub mod settings;

pub use error::ServiceError;
pub use server::{create_router, AppState, EngineFactory, EngineInfo, ReplyCode, Transcriber, TranscriptReply};
pub use settings::ServiceSettings;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "stt_service=info,stt_bridge=info";

/// Initialize logging
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Factory that initializes a native engine from `settings` on every call.
pub fn native_engine_factory(settings: &ServiceSettings) -> EngineFactory {
    let builder = settings.engine_builder();
    Arc::new(move || -> Result<Box<dyn Transcriber>, stt_bridge::BridgeError> {
        let engine = builder.init()?;
        Ok(Box::new(engine) as Box<dyn Transcriber>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_filter_parses() {
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }
}
