//! ABI marshalling for the native engine
//!
//! Converts host values into the forms the native calls expect and copies
//! native output back into owned [`Transcript`]s. Natively allocated output is
//! wrapped in release guards the moment a call reports success, so each buffer
//! is handed back to its paired release function exactly once.

use crate::backend::{RawHandle, SpeechBackend};
use crate::engine::EngineConfig;
use crate::error::{BridgeError, Status};
use crate::error_stack::native_failure;
use crate::ffi::{CEngine, CWord, NativeFns, TranscriptDeleteFn, WordsDeleteFn};
use crate::loader::{load_shared, NativeLibrary};
use crate::transcript::{Transcript, Word};
use libc::c_char;
use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::Arc;
use tracing::{debug, info};

struct TranscriptGuard {
    ptr: *mut c_char,
    release: TranscriptDeleteFn,
}

impl Drop for TranscriptGuard {
    fn drop(&mut self) {
        // SAFETY: `ptr` was returned by a successful process call and is
        // released here only.
        unsafe { (self.release)(self.ptr) }
    }
}

struct WordsGuard {
    ptr: *mut CWord,
    release: WordsDeleteFn,
}

impl Drop for WordsGuard {
    fn drop(&mut self) {
        // SAFETY: as for `TranscriptGuard`.
        unsafe { (self.release)(self.ptr) }
    }
}

/// [`SpeechBackend`] that drives a loaded native library.
#[derive(Debug, Clone)]
pub struct NativeBackend {
    library: Arc<NativeLibrary>,
}

impl NativeBackend {
    pub fn new(library: Arc<NativeLibrary>) -> Self {
        Self { library }
    }

    /// Load (or reuse) the library at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        Ok(Self::new(load_shared(path)?))
    }

    pub fn library(&self) -> &Arc<NativeLibrary> {
        &self.library
    }

    fn fns(&self) -> &NativeFns {
        self.library.fns()
    }
}

impl SpeechBackend for NativeBackend {
    fn init(&self, config: &EngineConfig) -> Result<RawHandle, BridgeError> {
        let fns = self.fns();
        let access_key = to_cstring("access key", &config.access_key)?;
        let model_path = path_to_cstring(&config.model_path)?;

        let mut object: *mut CEngine = ptr::null_mut();
        // SAFETY: the strings outlive the call and `object` is a valid
        // out-pointer.
        let status = Status::from_raw(unsafe {
            (fns.init)(
                access_key.as_ptr(),
                model_path.as_ptr(),
                config.enable_automatic_punctuation,
                config.enable_diarization,
                &mut object,
            )
        });

        if !status.is_success() {
            return Err(native_failure(fns, status, "Initialization failed"));
        }

        let handle = NonNull::new(object.cast()).ok_or_else(|| {
            BridgeError::Runtime("initialization reported success but returned no engine".to_string())
        })?;

        info!("Native engine initialized (model: {})", config.model_path.display());
        // SAFETY: the native side just created this engine for us alone.
        Ok(unsafe { RawHandle::from_raw(handle) })
    }

    fn process(&self, handle: &RawHandle, pcm: &[i16]) -> Result<Transcript, BridgeError> {
        if pcm.is_empty() {
            return Err(BridgeError::InvalidArgument("audio frame is empty".to_string()));
        }
        let num_samples = i32::try_from(pcm.len()).map_err(|_| {
            BridgeError::InvalidArgument(format!(
                "audio frame of {} samples exceeds the native limit of {}",
                pcm.len(),
                i32::MAX
            ))
        })?;

        let fns = self.fns();
        let mut transcript: *mut c_char = ptr::null_mut();
        let mut num_words: i32 = 0;
        let mut words: *mut CWord = ptr::null_mut();

        debug!("Processing {} samples", num_samples);
        // SAFETY: `pcm` is borrowed for the call only; the out-pointers are valid.
        let status = Status::from_raw(unsafe {
            (fns.process)(
                handle.as_ptr().cast(),
                pcm.as_ptr(),
                num_samples,
                &mut transcript,
                &mut num_words,
                &mut words,
            )
        });

        if !status.is_success() {
            return Err(native_failure(fns, status, "Process failed"));
        }

        // SAFETY: the call succeeded, so the outputs are ours to copy and release.
        unsafe { take_output(fns, transcript, num_words, words) }
    }

    fn process_file(&self, handle: &RawHandle, audio_path: &Path) -> Result<Transcript, BridgeError> {
        let path = path_to_cstring(audio_path)?;

        let fns = self.fns();
        let mut transcript: *mut c_char = ptr::null_mut();
        let mut num_words: i32 = 0;
        let mut words: *mut CWord = ptr::null_mut();

        debug!("Processing file {}", audio_path.display());
        // SAFETY: `path` outlives the call; the out-pointers are valid.
        let status = Status::from_raw(unsafe {
            (fns.process_file)(
                handle.as_ptr().cast(),
                path.as_ptr(),
                &mut transcript,
                &mut num_words,
                &mut words,
            )
        });

        if !status.is_success() {
            return Err(native_failure(fns, status, "Process file failed"));
        }

        // SAFETY: as in `process`.
        unsafe { take_output(fns, transcript, num_words, words) }
    }

    fn delete(&self, handle: RawHandle) {
        debug!("Deleting native engine {:?}", handle);
        // SAFETY: `handle` is consumed, so the engine cannot be reached again.
        unsafe { (self.fns().delete)(handle.as_ptr().cast()) }
    }

    fn sample_rate(&self) -> Result<u32, BridgeError> {
        // SAFETY: no arguments, no ownership.
        let rate = unsafe { (self.fns().sample_rate)() };
        u32::try_from(rate)
            .ok()
            .filter(|&rate| rate > 0)
            .ok_or_else(|| BridgeError::Runtime(format!("native sample rate is invalid: {}", rate)))
    }

    fn version(&self) -> Result<String, BridgeError> {
        // SAFETY: the native side returns a static string it keeps ownership of.
        let version = unsafe { (self.fns().version)() };
        if version.is_null() {
            return Err(BridgeError::Runtime("native version string is missing".to_string()));
        }
        // SAFETY: non-null, NUL-terminated, never freed by us.
        Ok(unsafe { CStr::from_ptr(version) }.to_string_lossy().into_owned())
    }

    fn library_path(&self) -> Option<&Path> {
        self.library.path()
    }
}

/// Copy native output into host memory, releasing both buffers on every path.
///
/// # Safety
///
/// The pointers must come from a process call that returned success.
unsafe fn take_output(
    fns: &NativeFns,
    transcript: *mut c_char,
    num_words: i32,
    words: *mut CWord,
) -> Result<Transcript, BridgeError> {
    let _words_guard = (!words.is_null()).then(|| WordsGuard {
        ptr: words,
        release: fns.words_delete,
    });
    let _transcript_guard = (!transcript.is_null()).then(|| TranscriptGuard {
        ptr: transcript,
        release: fns.transcript_delete,
    });

    if transcript.is_null() {
        return Err(BridgeError::Runtime(
            "process reported success but returned no transcript".to_string(),
        ));
    }
    if num_words < 0 {
        return Err(BridgeError::Runtime(format!("native word count is negative: {}", num_words)));
    }
    if num_words > 0 && words.is_null() {
        return Err(BridgeError::Runtime(format!(
            "native reported {} words but returned no word list",
            num_words
        )));
    }

    let text = CStr::from_ptr(transcript).to_string_lossy().into_owned();

    let records: &[CWord] = if num_words == 0 {
        &[]
    } else {
        slice::from_raw_parts(words, num_words as usize)
    };

    let words = records
        .iter()
        .map(|record| {
            let word = if record.word.is_null() {
                String::new()
            } else {
                CStr::from_ptr(record.word).to_string_lossy().into_owned()
            };
            Word {
                word,
                start_sec: record.start_sec,
                end_sec: record.end_sec,
                confidence: record.confidence,
                speaker_tag: record.speaker_tag,
            }
        })
        .collect::<Vec<_>>();

    debug!("Native returned {} words", words.len());
    Ok(Transcript { transcript: text, words })
}

fn to_cstring(what: &str, value: &str) -> Result<CString, BridgeError> {
    CString::new(value).map_err(|_| BridgeError::InvalidArgument(format!("{} contains a NUL byte", what)))
}

#[cfg(unix)]
fn path_to_cstring(path: &Path) -> Result<CString, BridgeError> {
    use std::os::unix::ffi::OsStrExt;

    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| BridgeError::InvalidArgument(format!("path contains a NUL byte: {}", path.display())))
}

#[cfg(not(unix))]
fn path_to_cstring(path: &Path) -> Result<CString, BridgeError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| BridgeError::InvalidArgument(format!("path is not valid UTF-8: {}", path.display())))?;
    to_cstring("path", path_str)
}
