//! Engine handle lifecycle
//!
//! An [`Engine`] owns at most one native handle and moves through
//! `Unconfigured -> Initialized -> Deleted`. Every operation checks the state
//! before anything reaches the backend, and a handle still alive when the
//! engine is dropped is deleted then.

use crate::backend::{RawHandle, SpeechBackend};
use crate::error::BridgeError;
use crate::marshal::NativeBackend;
use crate::resources::ResourceLocator;
use crate::transcript::Transcript;
use std::fmt;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Audio container extensions the native file decoder accepts.
pub const VALID_EXTENSIONS: &[&str] = &["3gp", "flac", "m4a", "mp3", "mp4", "ogg", "opus", "vorbis", "wav", "webm"];

pub const DEFAULT_LANGUAGE: &str = "en";

/// Engine configuration, fixed once passed to [`Engine::init`].
#[derive(Clone, PartialEq)]
pub struct EngineConfig {
    /// Credential checked by the native side
    pub access_key: String,

    /// Model parameter file
    pub model_path: PathBuf,

    /// Native shared library; must be the one the backend was loaded from
    pub library_path: PathBuf,

    pub enable_automatic_punctuation: bool,

    /// Tag each word with a speaker
    pub enable_diarization: bool,
}

impl EngineConfig {
    pub fn new(
        access_key: impl Into<String>,
        model_path: impl Into<PathBuf>,
        library_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            model_path: model_path.into(),
            library_path: library_path.into(),
            enable_automatic_punctuation: false,
            enable_diarization: false,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.access_key.trim().is_empty() {
            return Err(BridgeError::InvalidArgument("access key must not be empty".to_string()));
        }

        if !self.model_path.exists() {
            return Err(BridgeError::Io(format!(
                "model file not found: {}",
                self.model_path.display()
            )));
        }

        if !self.library_path.exists() {
            return Err(BridgeError::Io(format!(
                "native library not found: {}",
                self.library_path.display()
            )));
        }

        Ok(())
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("access_key", &"<redacted>")
            .field("model_path", &self.model_path)
            .field("library_path", &self.library_path)
            .field("enable_automatic_punctuation", &self.enable_automatic_punctuation)
            .field("enable_diarization", &self.enable_diarization)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unconfigured,
    Initialized,
    Deleted,
}

enum Slot {
    Unconfigured,
    Initialized {
        handle: RawHandle,
        config: EngineConfig,
        sample_rate: u32,
        version: String,
    },
    Deleted,
}

/// Speech-to-text engine bound to one native handle.
///
/// `Send` but not `Sync`: operations take `&mut self`, so a handle is never
/// used by two threads at once. Independent engines may run in parallel.
pub struct Engine<B: SpeechBackend = NativeBackend> {
    backend: B,
    slot: Slot,
}

impl<B: SpeechBackend> Engine<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            slot: Slot::Unconfigured,
        }
    }

    pub fn state(&self) -> EngineState {
        match self.slot {
            Slot::Unconfigured => EngineState::Unconfigured,
            Slot::Initialized { .. } => EngineState::Initialized,
            Slot::Deleted => EngineState::Deleted,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Configuration the engine was initialized with.
    pub fn config(&self) -> Option<&EngineConfig> {
        match &self.slot {
            Slot::Initialized { config, .. } => Some(config),
            _ => None,
        }
    }

    /// Create the native handle.
    ///
    /// On failure the engine stays unconfigured and `init` may be retried.
    pub fn init(&mut self, config: EngineConfig) -> Result<(), BridgeError> {
        match self.state() {
            EngineState::Unconfigured => {}
            EngineState::Initialized => {
                return Err(BridgeError::InvalidState("engine is already initialized".to_string()))
            }
            EngineState::Deleted => {
                return Err(BridgeError::InvalidState("engine has been deleted".to_string()))
            }
        }

        config.validate()?;
        if let Some(bound) = self.backend.library_path() {
            if !same_file(bound, &config.library_path) {
                return Err(BridgeError::InvalidArgument(format!(
                    "engine is bound to {} but the configuration names {}",
                    bound.display(),
                    config.library_path.display()
                )));
            }
        }
        debug!("Initializing engine with {:?}", config);

        let handle = self.backend.init(&config)?;

        let probe = self
            .backend
            .sample_rate()
            .and_then(|rate| self.backend.version().map(|version| (rate, version)));
        let (sample_rate, version) = match probe {
            Ok(probe) => probe,
            Err(e) => {
                self.backend.delete(handle);
                return Err(e);
            }
        };

        info!("Engine initialized (version {}, {} Hz)", version, sample_rate);
        self.slot = Slot::Initialized {
            handle,
            config,
            sample_rate,
            version,
        };
        Ok(())
    }

    /// Transcribe a frame of 16-bit mono PCM.
    ///
    /// Samples must already be at [`sample_rate`](Self::sample_rate); nothing
    /// is resampled.
    pub fn process(&mut self, pcm: &[i16]) -> Result<Transcript, BridgeError> {
        let handle = self.handle("process")?;
        if pcm.is_empty() {
            return Err(BridgeError::InvalidArgument("audio frame is empty".to_string()));
        }
        self.backend.process(handle, pcm)
    }

    /// Transcribe an audio file in one of the [`VALID_EXTENSIONS`] formats.
    pub fn process_file(&mut self, audio_path: impl AsRef<Path>) -> Result<Transcript, BridgeError> {
        let audio_path = audio_path.as_ref();
        let handle = self.handle("process_file")?;

        if !audio_path.is_file() {
            return Err(BridgeError::Io(format!(
                "audio file not found: {}",
                audio_path.display()
            )));
        }
        check_extension(audio_path)?;

        self.backend.process_file(handle, audio_path)
    }

    /// Release the native handle. The engine cannot be used afterwards.
    pub fn delete(&mut self) -> Result<(), BridgeError> {
        match mem::replace(&mut self.slot, Slot::Deleted) {
            Slot::Initialized { handle, .. } => {
                self.backend.delete(handle);
                info!("Engine deleted");
                Ok(())
            }
            Slot::Unconfigured => {
                self.slot = Slot::Unconfigured;
                Err(BridgeError::InvalidState("delete called before init".to_string()))
            }
            Slot::Deleted => Err(BridgeError::InvalidState("engine has already been deleted".to_string())),
        }
    }

    /// Sample rate expected by [`process`](Self::process).
    pub fn sample_rate(&self) -> Result<u32, BridgeError> {
        match &self.slot {
            Slot::Initialized { sample_rate, .. } => Ok(*sample_rate),
            _ => Err(self.invalid_state("sample_rate")),
        }
    }

    pub fn version(&self) -> Result<&str, BridgeError> {
        match &self.slot {
            Slot::Initialized { version, .. } => Ok(version),
            _ => Err(self.invalid_state("version")),
        }
    }

    fn handle(&self, operation: &str) -> Result<&RawHandle, BridgeError> {
        match &self.slot {
            Slot::Initialized { handle, .. } => Ok(handle),
            _ => Err(self.invalid_state(operation)),
        }
    }

    fn invalid_state(&self, operation: &str) -> BridgeError {
        let reason = match self.slot {
            Slot::Deleted => "engine has been deleted",
            _ => "engine is not initialized",
        };
        BridgeError::InvalidState(format!("{}: {}", operation, reason))
    }
}

impl<B: SpeechBackend> Drop for Engine<B> {
    fn drop(&mut self) {
        if let Slot::Initialized { handle, .. } = mem::replace(&mut self.slot, Slot::Deleted) {
            debug!("Deleting engine on drop");
            self.backend.delete(handle);
        }
    }
}

impl<B: SpeechBackend> fmt::Debug for Engine<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state())
            .field("config", &self.config())
            .finish()
    }
}

fn check_extension(audio_path: &Path) -> Result<(), BridgeError> {
    let extension = audio_path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .ok_or_else(|| {
            BridgeError::InvalidArgument(format!(
                "audio file has no extension: {} (supported: {})",
                audio_path.display(),
                VALID_EXTENSIONS.join(", ")
            ))
        })?;

    if VALID_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        warn!("Rejecting unsupported audio format: {}", extension);
        Err(BridgeError::InvalidArgument(format!(
            "unsupported audio format '{}' (supported: {})",
            extension,
            VALID_EXTENSIONS.join(", ")
        )))
    }
}

/// Builds an [`EngineConfig`] and a native [`Engine`] in one call.
///
/// Model and library default to the bundled resources for the running
/// platform, extracted through the process-wide [`ResourceLocator`].
#[derive(Clone)]
pub struct EngineBuilder {
    access_key: String,
    model_path: Option<PathBuf>,
    library_path: Option<PathBuf>,
    language: String,
    enable_automatic_punctuation: bool,
    enable_diarization: bool,
    resources: Option<Arc<ResourceLocator>>,
}

impl EngineBuilder {
    pub fn new(access_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            model_path: None,
            library_path: None,
            language: DEFAULT_LANGUAGE.to_string(),
            enable_automatic_punctuation: false,
            enable_diarization: false,
            resources: None,
        }
    }

    pub fn access_key(&mut self, access_key: impl Into<String>) -> &mut Self {
        self.access_key = access_key.into();
        self
    }

    pub fn model_path(&mut self, model_path: impl Into<PathBuf>) -> &mut Self {
        self.model_path = Some(model_path.into());
        self
    }

    pub fn library_path(&mut self, library_path: impl Into<PathBuf>) -> &mut Self {
        self.library_path = Some(library_path.into());
        self
    }

    /// Language of the bundled model used when no model path is set.
    pub fn language(&mut self, language: impl Into<String>) -> &mut Self {
        self.language = language.into();
        self
    }

    pub fn enable_automatic_punctuation(&mut self, enable: bool) -> &mut Self {
        self.enable_automatic_punctuation = enable;
        self
    }

    pub fn enable_diarization(&mut self, enable: bool) -> &mut Self {
        self.enable_diarization = enable;
        self
    }

    /// Use `resources` instead of the process default locator.
    pub fn resources(&mut self, resources: Arc<ResourceLocator>) -> &mut Self {
        self.resources = Some(resources);
        self
    }

    /// Resolve defaults and validate.
    pub fn build_config(&self) -> Result<EngineConfig, BridgeError> {
        let mut cached = self.resources.clone();
        let mut locator = || -> Result<Arc<ResourceLocator>, BridgeError> {
            if let Some(locator) = &cached {
                return Ok(Arc::clone(locator));
            }
            let resolved = ResourceLocator::process_default()?;
            cached = Some(Arc::clone(&resolved));
            Ok(resolved)
        };

        let model_path = match &self.model_path {
            Some(path) => path.clone(),
            None => locator()?.model_path(&self.language)?,
        };
        let library_path = match &self.library_path {
            Some(path) => path.clone(),
            None => locator()?.library_path()?,
        };

        let config = EngineConfig {
            access_key: self.access_key.clone(),
            model_path,
            library_path,
            enable_automatic_punctuation: self.enable_automatic_punctuation,
            enable_diarization: self.enable_diarization,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load the native library and create an initialized engine.
    pub fn init(&self) -> Result<Engine, BridgeError> {
        let config = self.build_config()?;
        let backend = NativeBackend::load(&config.library_path)?;

        let mut engine = Engine::new(backend);
        engine.init(config)?;
        Ok(engine)
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("model_path", &self.model_path)
            .field("library_path", &self.library_path)
            .field("language", &self.language)
            .field("enable_automatic_punctuation", &self.enable_automatic_punctuation)
            .field("enable_diarization", &self.enable_diarization)
            .finish()
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
