//! Dynamic library loading and symbol resolution
//!
//! Every entry point is resolved when the library is opened. A library missing
//! any of them is rejected outright, so no call site can ever reach a null
//! function pointer. Loaded libraries are cached per canonical path for the
//! lifetime of the process.

use crate::error::BridgeError;
use crate::ffi::{NativeFns, SDK_NAME};
use libloading::{Library, Symbol};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

static LOADED: Lazy<Mutex<HashMap<PathBuf, Arc<NativeLibrary>>>> = Lazy::new(Default::default);

/// A loaded native library together with its resolved function table.
pub struct NativeLibrary {
    fns: NativeFns,
    path: Option<PathBuf>,
    // Keeps the shared object mapped for as long as `fns` is reachable.
    _library: Option<Library>,
}

impl NativeLibrary {
    /// Open the shared library at `path` and resolve every entry point.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        info!("Loading native library: {}", path.display());

        // SAFETY: loading runs the library's initializers; the artifact is the
        // vendor build selected for this target.
        let library = unsafe { Library::new(path) }.map_err(|e| BridgeError::LibraryLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        // SAFETY: the signatures in `ffi` match the native header, and the
        // pointers are stored next to the `Library` that owns them.
        let fns = unsafe { resolve_all(&library)? };
        // SAFETY: `fns` was just resolved from `library`, which moves in with it.
        let native = unsafe { Self::bind(fns, Some(path.to_path_buf()), Some(library)) };

        info!("Native library ready: {}", path.display());
        Ok(native)
    }

    /// Pair a resolved table with its owner and tag the SDK.
    ///
    /// # Safety
    ///
    /// `fns` must stay valid for as long as `library` (or the process, when
    /// there is no library) is alive.
    unsafe fn bind(fns: NativeFns, path: Option<PathBuf>, library: Option<Library>) -> Self {
        let native = Self {
            fns,
            path,
            _library: library,
        };
        native.tag_sdk();
        native
    }

    /// Wrap a function table that lives in this process.
    ///
    /// # Safety
    ///
    /// Every pointer in `fns` must honor the native contract and stay valid
    /// for the lifetime of the returned value.
    pub unsafe fn from_fns(fns: NativeFns) -> Self {
        Self {
            fns,
            path: None,
            _library: None,
        }
    }

    #[cfg(test)]
    pub(crate) unsafe fn from_fns_at(fns: NativeFns, path: PathBuf) -> Self {
        Self {
            fns,
            path: Some(path),
            _library: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn fns(&self) -> &NativeFns {
        &self.fns
    }

    fn tag_sdk(&self) {
        match CString::new(SDK_NAME) {
            // SAFETY: `sdk` is a valid NUL-terminated string for the call.
            Ok(sdk) => unsafe { (self.fns.set_sdk)(sdk.as_ptr()) },
            Err(e) => warn!("Skipping SDK tagging: {}", e),
        }
    }
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary").field("path", &self.path).finish()
    }
}

/// Load `path` once per process and share the resolved table.
pub fn load_shared(path: impl AsRef<Path>) -> Result<Arc<NativeLibrary>, BridgeError> {
    load_cached(&LOADED, path.as_ref(), |key: &Path| NativeLibrary::load(key))
}

fn load_cached(
    cache: &Mutex<HashMap<PathBuf, Arc<NativeLibrary>>>,
    path: &Path,
    open: impl FnOnce(&Path) -> Result<NativeLibrary, BridgeError>,
) -> Result<Arc<NativeLibrary>, BridgeError> {
    let key = path.canonicalize().map_err(|e| BridgeError::LibraryLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut loaded = cache.lock();
    if let Some(library) = loaded.get(&key) {
        debug!("Reusing loaded native library: {}", key.display());
        return Ok(Arc::clone(library));
    }

    let library = Arc::new(open(&key)?);
    loaded.insert(key, Arc::clone(&library));
    Ok(library)
}

unsafe fn resolve<T: Copy>(library: &Library, name: &str) -> Result<T, BridgeError> {
    let symbol: Symbol<T> = library.get(name.as_bytes()).map_err(|e| BridgeError::MissingSymbol {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    debug!("Resolved symbol {}", name);
    Ok(*symbol)
}

unsafe fn resolve_all(library: &Library) -> Result<NativeFns, BridgeError> {
    Ok(NativeFns {
        version: resolve(library, "pv_leopard_version")?,
        sample_rate: resolve(library, "pv_sample_rate")?,
        init: resolve(library, "pv_leopard_init")?,
        process: resolve(library, "pv_leopard_process")?,
        process_file: resolve(library, "pv_leopard_process_file")?,
        delete: resolve(library, "pv_leopard_delete")?,
        transcript_delete: resolve(library, "pv_leopard_transcript_delete")?,
        words_delete: resolve(library, "pv_leopard_words_delete")?,
        get_error_stack: resolve(library, "pv_get_error_stack")?,
        free_error_stack: resolve(library, "pv_free_error_stack")?,
        set_sdk: resolve(library, "pv_set_sdk")?,
    })
}
