//! The seam between the engine lifecycle and whatever executes the calls.
//!
//! [`NativeBackend`](crate::NativeBackend) drives the real library; tests plug
//! in doubles that count calls.

use crate::engine::EngineConfig;
use crate::error::BridgeError;
use crate::transcript::Transcript;
use libc::c_void;
use std::fmt;
use std::path::Path;
use std::ptr::NonNull;

/// Opaque engine handle owned by exactly one [`Engine`](crate::Engine).
///
/// Neither `Clone` nor `Copy`: the only ways to use it are passing it to a
/// backend call by reference and giving it up to [`SpeechBackend::delete`].
pub struct RawHandle(NonNull<c_void>);

// SAFETY: the handle is only ever used by its single owner; moving that owner
// across threads is allowed by the native contract.
unsafe impl Send for RawHandle {}

impl RawHandle {
    /// Wrap a handle produced by a backend's `init`.
    ///
    /// # Safety
    ///
    /// `ptr` must identify a live native engine that nothing else owns.
    pub unsafe fn from_raw(ptr: NonNull<c_void>) -> Self {
        Self(ptr)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle({:p})", self.0)
    }
}

/// Calls an [`Engine`](crate::Engine) makes against the speech engine.
///
/// Implementations may assume the engine already validated its inputs and
/// state: calls arrive only with a live handle, non-empty audio and existing
/// files.
pub trait SpeechBackend: Send {
    fn init(&self, config: &EngineConfig) -> Result<RawHandle, BridgeError>;

    fn process(&self, handle: &RawHandle, pcm: &[i16]) -> Result<Transcript, BridgeError>;

    fn process_file(&self, handle: &RawHandle, audio_path: &Path) -> Result<Transcript, BridgeError>;

    /// Release everything associated with `handle`.
    fn delete(&self, handle: RawHandle);

    fn sample_rate(&self) -> Result<u32, BridgeError>;

    fn version(&self) -> Result<String, BridgeError>;

    /// Shared library this backend is bound to, if it was loaded from disk.
    fn library_path(&self) -> Option<&Path> {
        None
    }
}
