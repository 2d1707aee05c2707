//! Raw C surface of the native engine.
//!
//! Signatures mirror the native header. Status codes cross the boundary as
//! plain `i32` and are decoded with [`Status::from_raw`](crate::Status::from_raw),
//! so an out-of-range value from a newer build is never undefined behavior.

use libc::c_char;

/// Opaque native engine object.
#[repr(C)]
pub struct CEngine {
    _private: [u8; 0],
}

/// Word record as laid out by the native library.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CWord {
    pub word: *const c_char,
    pub start_sec: f32,
    pub end_sec: f32,
    pub confidence: f32,
    pub speaker_tag: i32,
}

pub type PvStatusRaw = i32;

pub type VersionFn = unsafe extern "C" fn() -> *const c_char;
pub type SampleRateFn = unsafe extern "C" fn() -> i32;
pub type InitFn = unsafe extern "C" fn(
    access_key: *const c_char,
    model_path: *const c_char,
    enable_automatic_punctuation: bool,
    enable_diarization: bool,
    object: *mut *mut CEngine,
) -> PvStatusRaw;
pub type ProcessFn = unsafe extern "C" fn(
    object: *mut CEngine,
    pcm: *const i16,
    num_samples: i32,
    transcript: *mut *mut c_char,
    num_words: *mut i32,
    words: *mut *mut CWord,
) -> PvStatusRaw;
pub type ProcessFileFn = unsafe extern "C" fn(
    object: *mut CEngine,
    audio_path: *const c_char,
    transcript: *mut *mut c_char,
    num_words: *mut i32,
    words: *mut *mut CWord,
) -> PvStatusRaw;
pub type DeleteFn = unsafe extern "C" fn(object: *mut CEngine);
pub type TranscriptDeleteFn = unsafe extern "C" fn(transcript: *mut c_char);
pub type WordsDeleteFn = unsafe extern "C" fn(words: *mut CWord);
pub type GetErrorStackFn =
    unsafe extern "C" fn(message_stack: *mut *mut *mut c_char, message_stack_depth: *mut i32) -> PvStatusRaw;
pub type FreeErrorStackFn = unsafe extern "C" fn(message_stack: *mut *mut c_char);
pub type SetSdkFn = unsafe extern "C" fn(sdk: *const c_char);

/// Resolved entry points of one loaded library.
#[derive(Clone, Copy)]
pub struct NativeFns {
    pub version: VersionFn,
    pub sample_rate: SampleRateFn,
    pub init: InitFn,
    pub process: ProcessFn,
    pub process_file: ProcessFileFn,
    pub delete: DeleteFn,
    pub transcript_delete: TranscriptDeleteFn,
    pub words_delete: WordsDeleteFn,
    pub get_error_stack: GetErrorStackFn,
    pub free_error_stack: FreeErrorStackFn,
    pub set_sdk: SetSdkFn,
}

/// SDK identifier reported to the native side for telemetry tagging.
pub const SDK_NAME: &str = "rust";
