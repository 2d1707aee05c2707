//! Read-only asset bundle: logical path -> bytes.
//!
//! Holds one model-parameter file per supported language and one shared
//! library per supported target.

use crate::extract::ExtractError;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
enum Source {
    Static(BTreeMap<&'static str, &'static [u8]>),
    Directory(PathBuf),
}

/// Bundle of assets addressed by logical path (`lib/common/...`).
#[derive(Debug, Clone)]
pub struct AssetBundle {
    source: Source,
}

impl AssetBundle {
    /// Bundle compiled into the binary, e.g. built from `include_bytes!`.
    pub fn from_static(entries: &[(&'static str, &'static [u8])]) -> Self {
        Self {
            source: Source::Static(entries.iter().copied().collect()),
        }
    }

    /// Bundle laid out on disk under `root`.
    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Directory(root.into()),
        }
    }

    pub fn contains(&self, logical_path: &str) -> bool {
        match &self.source {
            Source::Static(entries) => entries.contains_key(logical_path),
            Source::Directory(root) => root.join(logical_path).is_file(),
        }
    }

    /// Bytes of one asset.
    pub fn read(&self, logical_path: &str) -> Result<Cow<'static, [u8]>, ExtractError> {
        match &self.source {
            Source::Static(entries) => entries
                .get(logical_path)
                .map(|bytes| Cow::Borrowed(*bytes))
                .ok_or_else(|| ExtractError::MissingAsset(logical_path.to_string())),
            Source::Directory(root) => read_file(root, logical_path).map(Cow::Owned),
        }
    }
}

fn read_file(root: &Path, logical_path: &str) -> Result<Vec<u8>, ExtractError> {
    fs::read(root.join(logical_path)).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ExtractError::MissingAsset(logical_path.to_string()),
        _ => ExtractError::Read {
            name: logical_path.to_string(),
            source,
        },
    })
}
