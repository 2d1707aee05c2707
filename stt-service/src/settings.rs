/// Service settings
///
/// Loaded from environment variables. Lookups go through a closure so tests
/// can supply their own environment.

use crate::error::ServiceError;
use std::net::SocketAddr;
use std::path::PathBuf;
use stt_bridge::{model_asset_path, EngineBuilder, DEFAULT_LANGUAGE};

pub const ACCESS_KEY_ENV: &str = "STT_ACCESS_KEY";
pub const BIND_ADDR_ENV: &str = "STT_BIND_ADDR";
pub const LANGUAGE_ENV: &str = "STT_LANGUAGE";
pub const MODEL_PATH_ENV: &str = "STT_MODEL_PATH";
pub const LIBRARY_PATH_ENV: &str = "STT_LIBRARY_PATH";
pub const PUNCTUATION_ENV: &str = "STT_ENABLE_PUNCTUATION";
pub const DIARIZATION_ENV: &str = "STT_ENABLE_DIARIZATION";
pub const MAX_UPLOAD_ENV: &str = "STT_MAX_UPLOAD_BYTES";

/// Transcription service configuration
#[derive(Clone, PartialEq)]
pub struct ServiceSettings {
    pub access_key: String,

    /// Address the HTTP server listens on
    pub bind_addr: SocketAddr,

    /// Bundled model language, used when no model path is given
    pub language: String,

    pub model_path: Option<PathBuf>,
    pub library_path: Option<PathBuf>,
    pub enable_automatic_punctuation: bool,
    pub enable_diarization: bool,

    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5050)),
            language: DEFAULT_LANGUAGE.to_string(),
            model_path: None,
            library_path: None,
            enable_automatic_punctuation: true,
            enable_diarization: false,
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

impl ServiceSettings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServiceError> {
        let defaults = Self::default();

        let settings = Self {
            access_key: lookup(ACCESS_KEY_ENV).unwrap_or_default(),
            bind_addr: parse_var(&lookup, BIND_ADDR_ENV)?.unwrap_or(defaults.bind_addr),
            language: lookup(LANGUAGE_ENV).unwrap_or(defaults.language),
            model_path: lookup(MODEL_PATH_ENV).map(PathBuf::from),
            library_path: lookup(LIBRARY_PATH_ENV).map(PathBuf::from),
            enable_automatic_punctuation: parse_var(&lookup, PUNCTUATION_ENV)?
                .unwrap_or(defaults.enable_automatic_punctuation),
            enable_diarization: parse_var(&lookup, DIARIZATION_ENV)?.unwrap_or(defaults.enable_diarization),
            max_upload_bytes: parse_var(&lookup, MAX_UPLOAD_ENV)?.unwrap_or(defaults.max_upload_bytes),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.access_key.trim().is_empty() {
            return Err(ServiceError::Config(format!("{} must be set", ACCESS_KEY_ENV)));
        }

        if self.model_path.is_none() {
            model_asset_path(&self.language).map_err(|e| ServiceError::Config(e.to_string()))?;
        }

        if self.max_upload_bytes == 0 {
            return Err(ServiceError::Config(format!("{} must be > 0", MAX_UPLOAD_ENV)));
        }

        Ok(())
    }

    /// Engine builder carrying these settings.
    pub fn engine_builder(&self) -> EngineBuilder {
        let mut builder = EngineBuilder::new(self.access_key.clone());
        builder
            .language(self.language.clone())
            .enable_automatic_punctuation(self.enable_automatic_punctuation)
            .enable_diarization(self.enable_diarization);

        if let Some(model_path) = &self.model_path {
            builder.model_path(model_path);
        }
        if let Some(library_path) = &self.library_path {
            builder.library_path(library_path);
        }
        builder
    }
}

impl std::fmt::Debug for ServiceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceSettings")
            .field("access_key", &"<redacted>")
            .field("bind_addr", &self.bind_addr)
            .field("language", &self.language)
            .field("model_path", &self.model_path)
            .field("library_path", &self.library_path)
            .field("enable_automatic_punctuation", &self.enable_automatic_punctuation)
            .field("enable_diarization", &self.enable_diarization)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, ServiceError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|e| ServiceError::Config(format!("{}={:?}: {}", name, value, e)))
        })
        .transpose()
}
