//! In-process stand-in for the native library, used by unit tests.
//!
//! The functions allocate and free exactly like a real build would, and count
//! every call. State is thread-local: the bridge calls synchronously on the
//! caller's thread, so each test sees only its own traffic.

use crate::ffi::{CEngine, CWord, NativeFns};
use crate::loader::NativeLibrary;
use libc::c_char;
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::ptr;

pub const FAKE_VERSION: &[u8] = b"2.0.1\0";
pub const FAKE_SAMPLE_RATE: i32 = 16000;

static ENGINE_TOKEN: u8 = 0;

#[derive(Default)]
pub struct FakeState {
    // behavior
    pub init_status: i32,
    pub process_status: i32,
    pub error_stack_status: i32,
    pub error_frames: Vec<String>,
    pub transcript: Vec<u8>,
    pub words: Vec<(String, f32, f32, f32, i32)>,
    pub null_handle: bool,
    pub null_transcript: bool,
    pub null_error_stack: bool,
    pub num_words_override: Option<i32>,

    // observations
    pub init_calls: usize,
    pub process_calls: usize,
    pub process_file_calls: usize,
    pub delete_calls: usize,
    pub transcript_deletes: usize,
    pub words_deletes: usize,
    pub error_stack_calls: usize,
    pub error_stack_frees: usize,
    pub sdk_tags: Vec<String>,
    pub last_access_key: String,
    pub last_model_path: String,
    pub last_audio_path: String,
    pub last_flags: (bool, bool),
    pub last_num_samples: i32,

    outstanding_words: usize,
    outstanding_frames: usize,
}

thread_local! {
    static STATE: RefCell<FakeState> = RefCell::new(FakeState::default());
}

pub fn reset() {
    STATE.with(|s| *s.borrow_mut() = FakeState::default());
}

pub fn with_state<R>(f: impl FnOnce(&mut FakeState) -> R) -> R {
    STATE.with(|s| f(&mut s.borrow_mut()))
}

pub fn fns() -> NativeFns {
    NativeFns {
        version: fake_version,
        sample_rate: fake_sample_rate,
        init: fake_init,
        process: fake_process,
        process_file: fake_process_file,
        delete: fake_delete,
        transcript_delete: fake_transcript_delete,
        words_delete: fake_words_delete,
        get_error_stack: fake_get_error_stack,
        free_error_stack: fake_free_error_stack,
        set_sdk: fake_set_sdk,
    }
}

/// Fake library that reports `path` as its origin.
pub fn library_at(path: impl Into<std::path::PathBuf>) -> NativeLibrary {
    // SAFETY: the fake functions are plain Rust statics.
    unsafe { NativeLibrary::from_fns_at(fns(), path.into()) }
}

pub fn library() -> NativeLibrary {
    // SAFETY: the fake functions are plain Rust statics.
    unsafe { NativeLibrary::from_fns(fns()) }
}

unsafe fn read_str(ptr: *const c_char) -> String {
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

unsafe extern "C" fn fake_version() -> *const c_char {
    FAKE_VERSION.as_ptr().cast()
}

unsafe extern "C" fn fake_sample_rate() -> i32 {
    FAKE_SAMPLE_RATE
}

unsafe extern "C" fn fake_init(
    access_key: *const c_char,
    model_path: *const c_char,
    enable_automatic_punctuation: bool,
    enable_diarization: bool,
    object: *mut *mut CEngine,
) -> i32 {
    let access_key = read_str(access_key);
    let model_path = read_str(model_path);

    with_state(|s| {
        s.init_calls += 1;
        s.last_access_key = access_key;
        s.last_model_path = model_path;
        s.last_flags = (enable_automatic_punctuation, enable_diarization);

        if s.init_status == 0 && !s.null_handle {
            *object = &ENGINE_TOKEN as *const u8 as *mut CEngine;
        }
        s.init_status
    })
}

unsafe fn emit_output(
    s: &mut FakeState,
    transcript: *mut *mut c_char,
    num_words: *mut i32,
    words: *mut *mut CWord,
) -> i32 {
    if s.process_status != 0 {
        return s.process_status;
    }

    *transcript = if s.null_transcript {
        ptr::null_mut()
    } else {
        CString::new(s.transcript.clone()).unwrap().into_raw()
    };

    let records: Vec<CWord> = s
        .words
        .iter()
        .map(|(word, start_sec, end_sec, confidence, speaker_tag)| CWord {
            word: CString::new(word.as_str()).unwrap().into_raw(),
            start_sec: *start_sec,
            end_sec: *end_sec,
            confidence: *confidence,
            speaker_tag: *speaker_tag,
        })
        .collect();
    s.outstanding_words = records.len();
    *num_words = s.num_words_override.unwrap_or(records.len() as i32);
    *words = Box::into_raw(records.into_boxed_slice()) as *mut CWord;

    0
}

unsafe extern "C" fn fake_process(
    _object: *mut CEngine,
    _pcm: *const i16,
    num_samples: i32,
    transcript: *mut *mut c_char,
    num_words: *mut i32,
    words: *mut *mut CWord,
) -> i32 {
    with_state(|s| {
        s.process_calls += 1;
        s.last_num_samples = num_samples;
        emit_output(s, transcript, num_words, words)
    })
}

unsafe extern "C" fn fake_process_file(
    _object: *mut CEngine,
    audio_path: *const c_char,
    transcript: *mut *mut c_char,
    num_words: *mut i32,
    words: *mut *mut CWord,
) -> i32 {
    let audio_path = read_str(audio_path);
    with_state(|s| {
        s.process_file_calls += 1;
        s.last_audio_path = audio_path;
        emit_output(s, transcript, num_words, words)
    })
}

unsafe extern "C" fn fake_delete(_object: *mut CEngine) {
    with_state(|s| s.delete_calls += 1);
}

unsafe extern "C" fn fake_transcript_delete(transcript: *mut c_char) {
    with_state(|s| s.transcript_deletes += 1);
    if !transcript.is_null() {
        drop(CString::from_raw(transcript));
    }
}

unsafe extern "C" fn fake_words_delete(words: *mut CWord) {
    let len = with_state(|s| {
        s.words_deletes += 1;
        std::mem::take(&mut s.outstanding_words)
    });
    if words.is_null() {
        return;
    }
    let records = Box::from_raw(ptr::slice_from_raw_parts_mut(words, len));
    for record in records.iter() {
        drop(CString::from_raw(record.word as *mut c_char));
    }
}

unsafe extern "C" fn fake_get_error_stack(message_stack: *mut *mut *mut c_char, depth: *mut i32) -> i32 {
    with_state(|s| {
        s.error_stack_calls += 1;
        if s.error_stack_status != 0 {
            return s.error_stack_status;
        }
        if s.null_error_stack {
            *message_stack = ptr::null_mut();
            *depth = 0;
            return 0;
        }

        let frames: Vec<*mut c_char> = s
            .error_frames
            .iter()
            .map(|frame| CString::new(frame.as_str()).unwrap().into_raw())
            .collect();
        s.outstanding_frames = frames.len();
        *depth = frames.len() as i32;
        *message_stack = Box::into_raw(frames.into_boxed_slice()) as *mut *mut c_char;
        0
    })
}

unsafe extern "C" fn fake_free_error_stack(message_stack: *mut *mut c_char) {
    let len = with_state(|s| {
        s.error_stack_frees += 1;
        std::mem::take(&mut s.outstanding_frames)
    });
    if message_stack.is_null() {
        return;
    }
    let frames = Box::from_raw(ptr::slice_from_raw_parts_mut(message_stack, len));
    for &frame in frames.iter() {
        drop(CString::from_raw(frame));
    }
}

unsafe extern "C" fn fake_set_sdk(sdk: *const c_char) {
    let sdk = read_str(sdk);
    with_state(|s| s.sdk_tags.push(sdk));
}
