//! Native error stack translation
//!
//! After a failed call the native side holds an ordered list of diagnostic
//! messages. They are copied into host strings and the native list is freed
//! exactly once, whatever happens while copying.

use crate::error::{BridgeError, Status};
use crate::ffi::{FreeErrorStackFn, NativeFns};
use libc::c_char;
use std::ffi::CStr;
use std::ptr;
use std::slice;
use tracing::{debug, warn};

struct ErrorStackGuard {
    stack: *mut *mut c_char,
    free: FreeErrorStackFn,
}

impl Drop for ErrorStackGuard {
    fn drop(&mut self) {
        // SAFETY: `stack` came from a successful `pv_get_error_stack` call and
        // is released here and nowhere else.
        unsafe { (self.free)(self.stack) }
    }
}

/// Copy the current native error stack, preserving native order.
pub fn message_stack(fns: &NativeFns) -> Result<Vec<String>, BridgeError> {
    let mut stack: *mut *mut c_char = ptr::null_mut();
    let mut depth: i32 = 0;

    // SAFETY: both out-pointers are valid for the duration of the call.
    let status = Status::from_raw(unsafe { (fns.get_error_stack)(&mut stack, &mut depth) });
    if !status.is_success() {
        warn!("Unable to read native error stack: {}", status);
        return Err(BridgeError::ErrorStackUnavailable { status });
    }

    if stack.is_null() {
        return Ok(Vec::new());
    }
    let guard = ErrorStackGuard {
        stack,
        free: fns.free_error_stack,
    };

    if depth <= 0 {
        return Ok(Vec::new());
    }

    // SAFETY: the native side reported `depth` entries at `stack`.
    let frames = unsafe { slice::from_raw_parts(guard.stack, depth as usize) }
        .iter()
        .map(|&frame| {
            if frame.is_null() {
                String::new()
            } else {
                // SAFETY: each non-null entry is a NUL-terminated string.
                unsafe { CStr::from_ptr(frame) }.to_string_lossy().into_owned()
            }
        })
        .collect::<Vec<_>>();

    debug!("Native error stack depth {}", frames.len());
    Ok(frames)
}

/// Error for a native call that returned `status`, enriched with the native
/// message stack. If the stack itself is unavailable, that failure wins.
pub fn native_failure(fns: &NativeFns, status: Status, message: &str) -> BridgeError {
    match message_stack(fns) {
        Ok(message_stack) => BridgeError::Native {
            status,
            message: message.to_string(),
            message_stack,
        },
        Err(unavailable) => unavailable,
    }
}
