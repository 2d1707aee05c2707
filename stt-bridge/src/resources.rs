/// Bundled resource location
///
/// Maps the running target and a language onto bundled assets, and extracts
/// them to disk on first use so the loader and the native engine get real
/// file paths.

use crate::assets::AssetBundle;
use crate::error::BridgeError;
use crate::extract::Extractor;
use crate::platform::TargetId;
use once_cell::sync::OnceCell;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Languages with a bundled model.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "de", "es", "fr", "it", "ja", "ko", "pt"];

/// Root directory of the on-disk asset bundle.
pub const RESOURCE_DIR_ENV: &str = "STT_BRIDGE_RESOURCE_DIR";

/// Directory assets are extracted into.
pub const EXTRACT_DIR_ENV: &str = "STT_BRIDGE_EXTRACT_DIR";

static PROCESS_DEFAULT: OnceCell<Arc<ResourceLocator>> = OnceCell::new();

/// Logical path of the model for `language`.
pub fn model_asset_path(language: &str) -> Result<String, BridgeError> {
    let language = language.trim().to_lowercase();
    if !SUPPORTED_LANGUAGES.contains(&language.as_str()) {
        return Err(BridgeError::InvalidArgument(format!(
            "unsupported language '{}' (supported: {})",
            language,
            SUPPORTED_LANGUAGES.join(", ")
        )));
    }

    Ok(if language == "en" {
        "lib/common/leopard_params.pv".to_string()
    } else {
        format!("lib/common/leopard_params_{}.pv", language)
    })
}

/// Finds and extracts the default library and models for one target.
#[derive(Debug)]
pub struct ResourceLocator {
    bundle: AssetBundle,
    extractor: Extractor,
    target: TargetId,
}

impl ResourceLocator {
    pub fn new(bundle: AssetBundle, extractor: Extractor, target: TargetId) -> Self {
        Self {
            bundle,
            extractor,
            target,
        }
    }

    /// Locator for the running target, configured from the environment.
    pub fn from_env() -> Result<Self, BridgeError> {
        let resource_dir = env::var_os(RESOURCE_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("resources"));
        let extract_dir = env::var_os(EXTRACT_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("stt-bridge"));
        let target = TargetId::current()?;

        info!(
            "Resources from {} extracted to {} (target {})",
            resource_dir.display(),
            extract_dir.display(),
            target
        );

        Ok(Self::new(
            AssetBundle::from_dir(resource_dir),
            Extractor::new(extract_dir),
            target,
        ))
    }

    /// Process-wide locator, built from the environment on first use.
    pub fn process_default() -> Result<Arc<Self>, BridgeError> {
        PROCESS_DEFAULT
            .get_or_try_init(|| Self::from_env().map(Arc::new))
            .cloned()
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    pub fn bundle(&self) -> &AssetBundle {
        &self.bundle
    }

    /// Extracted model file for `language`.
    pub fn model_path(&self, language: &str) -> Result<PathBuf, BridgeError> {
        let logical = model_asset_path(language)?;
        self.extract(&logical)
    }

    /// Extracted shared library for the target.
    pub fn library_path(&self) -> Result<PathBuf, BridgeError> {
        let logical = self.target.library_asset_path();
        self.extract(&logical)
    }

    fn extract(&self, logical: &str) -> Result<PathBuf, BridgeError> {
        debug!("Locating bundled asset {}", logical);
        let bytes = self.bundle.read(logical)?;
        Ok(self.extractor.extract(logical, &bytes)?)
    }
}
