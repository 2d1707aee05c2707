/// STT Bridge library
///
/// Host-side bridge to a prebuilt native speech-to-text engine. Resolves the
/// artifact for the running platform, extracts bundled resources, loads the
/// shared library, and exposes a safe engine lifecycle over the C ABI.

pub mod assets;
pub mod backend;
pub mod engine;
pub mod error;
pub mod error_stack;
pub mod extract;
pub mod ffi;
pub mod loader;
pub mod marshal;
pub mod platform;
pub mod resources;
pub mod transcript;

#[cfg(test)]
mod fake;

// Re-export main types
pub use assets::AssetBundle;
pub use backend::{RawHandle, SpeechBackend};
pub use engine::{Engine, EngineBuilder, EngineConfig, EngineState, DEFAULT_LANGUAGE, VALID_EXTENSIONS};
pub use error::{BridgeError, Status};
pub use extract::{content_digest, ExtractError, Extractor};
pub use loader::{load_shared, NativeLibrary};
pub use marshal::NativeBackend;
pub use platform::{CpuFamily, PlatformDescriptor, PlatformError, TargetId, TargetOs};
pub use resources::{model_asset_path, ResourceLocator, SUPPORTED_LANGUAGES};
pub use transcript::{Transcript, TranscriptIssue, Word, SPEAKER_TAG_DISABLED, SPEAKER_TAG_UNKNOWN};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
