//! Content-addressed extraction of bundled assets
//!
//! Assets land at `dest_dir/<sha256-hex>/<logical name>`. Because the path is
//! derived from the bytes, re-extraction across runs is a no-op and concurrent
//! extractors of identical content agree on the destination. Bytes are written
//! to a temporary sibling and renamed into place, so the final name only ever
//! refers to a complete file.

use crate::error::Status;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Mode of extracted files; the extraction directory may be shared between users.
#[cfg(unix)]
pub const EXTRACTED_FILE_MODE: u32 = 0o644;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Asset not found in bundle: {0}")]
    MissingAsset(String),

    #[error("Invalid asset name `{0}`: must be a relative path without `..`")]
    InvalidAssetName(String),

    #[error("Failed to extract {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read asset {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl ExtractError {
    pub fn status(&self) -> Status {
        match self {
            ExtractError::MissingAsset(_) => Status::KeyError,
            ExtractError::InvalidAssetName(_) => Status::InvalidArgument,
            ExtractError::Write { .. } | ExtractError::Read { .. } => Status::IoError,
        }
    }
}

/// Hex-encoded SHA-256 digest of `bytes`.
pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Materializes asset bytes under a destination directory.
#[derive(Debug)]
pub struct Extractor {
    dest_dir: PathBuf,
    writes: AtomicUsize,
}

impl Extractor {
    pub fn new(dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Number of files this extractor has written (existing files excluded).
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Path that `bytes` extract to under `logical_name`.
    pub fn target_path(&self, logical_name: &str, bytes: &[u8]) -> Result<PathBuf, ExtractError> {
        let relative = validate_name(logical_name)?;
        Ok(self.dest_dir.join(content_digest(bytes)).join(relative))
    }

    /// Extract `bytes` and return the resulting path.
    ///
    /// An existing file at the target path is returned as-is.
    pub fn extract(&self, logical_name: &str, bytes: &[u8]) -> Result<PathBuf, ExtractError> {
        let target = self.target_path(logical_name, bytes)?;

        if target.is_file() {
            debug!("Asset already extracted: {}", target.display());
            return Ok(target);
        }

        let parent = target
            .parent()
            .ok_or_else(|| ExtractError::InvalidAssetName(logical_name.to_string()))?;
        fs::create_dir_all(parent).map_err(|source| ExtractError::Write {
            path: parent.to_path_buf(),
            source,
        })?;

        let write_err = |source| ExtractError::Write {
            path: target.clone(),
            source,
        };

        let mut staged = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
        staged.write_all(bytes).map_err(write_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            staged
                .as_file()
                .set_permissions(fs::Permissions::from_mode(EXTRACTED_FILE_MODE))
                .map_err(write_err)?;
        }
        staged.as_file().sync_all().map_err(write_err)?;

        match staged.persist_noclobber(&target) {
            Ok(_) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                info!("Extracted {} ({} bytes) to {}", logical_name, bytes.len(), target.display());
            }
            Err(e) if target.is_file() => {
                // Another extractor renamed identical content into place first.
                warn!("Lost extraction race for {}: {}", target.display(), e.error);
            }
            Err(e) => return Err(write_err(e.error)),
        }

        Ok(target)
    }
}

fn validate_name(logical_name: &str) -> Result<&Path, ExtractError> {
    let path = Path::new(logical_name);
    let well_formed = !logical_name.is_empty()
        && path.components().all(|c| matches!(c, Component::Normal(_)));

    if well_formed {
        Ok(path)
    } else {
        Err(ExtractError::InvalidAssetName(logical_name.to_string()))
    }
}
