//! Error taxonomy shared by every layer of the bridge.
//!
//! Native failures carry the status code returned across the boundary plus the
//! diagnostic frames pulled from the native error stack. Host-side validation
//! failures use the same [`Status`] classes but never touch the native side.

use crate::extract::ExtractError;
use crate::platform::PlatformError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Status codes returned by the native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    Success,
    OutOfMemory,
    IoError,
    InvalidArgument,
    StopIteration,
    KeyError,
    InvalidState,
    RuntimeError,
    ActivationError,
    ActivationLimitReached,
    ActivationThrottled,
    ActivationRefused,
    /// A code outside the known enumeration (newer native build).
    Unknown(i32),
}

impl Status {
    /// Decode a raw status value returned by a native call.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Status::Success,
            1 => Status::OutOfMemory,
            2 => Status::IoError,
            3 => Status::InvalidArgument,
            4 => Status::StopIteration,
            5 => Status::KeyError,
            6 => Status::InvalidState,
            7 => Status::RuntimeError,
            8 => Status::ActivationError,
            9 => Status::ActivationLimitReached,
            10 => Status::ActivationThrottled,
            11 => Status::ActivationRefused,
            other => Status::Unknown(other),
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Status::Success => 0,
            Status::OutOfMemory => 1,
            Status::IoError => 2,
            Status::InvalidArgument => 3,
            Status::StopIteration => 4,
            Status::KeyError => 5,
            Status::InvalidState => 6,
            Status::RuntimeError => 7,
            Status::ActivationError => 8,
            Status::ActivationLimitReached => 9,
            Status::ActivationThrottled => 10,
            Status::ActivationRefused => 11,
            Status::Unknown(raw) => raw,
        }
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    /// Credential and licensing failures reported by the native side.
    pub fn is_activation_error(self) -> bool {
        matches!(
            self,
            Status::ActivationError
                | Status::ActivationLimitReached
                | Status::ActivationThrottled
                | Status::ActivationRefused
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::OutOfMemory => "OUT_OF_MEMORY",
            Status::IoError => "IO_ERROR",
            Status::InvalidArgument => "INVALID_ARGUMENT",
            Status::StopIteration => "STOP_ITERATION",
            Status::KeyError => "KEY_ERROR",
            Status::InvalidState => "INVALID_STATE",
            Status::RuntimeError => "RUNTIME_ERROR",
            Status::ActivationError => "ACTIVATION_ERROR",
            Status::ActivationLimitReached => "ACTIVATION_LIMIT_REACHED",
            Status::ActivationThrottled => "ACTIVATION_THROTTLED",
            Status::ActivationRefused => "ACTIVATION_REFUSED",
            Status::Unknown(_) => "UNKNOWN_STATUS",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Unknown(raw) => write!(f, "UNKNOWN_STATUS({})", raw),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Errors surfaced by the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// Malformed output from a native call that reported success.
    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("{}", render_native(.status, .message, .message_stack))]
    Native {
        status: Status,
        message: String,
        message_stack: Vec<String>,
    },

    /// The native error stack could not be read after a failed call.
    #[error("{status}: could not retrieve diagnostic detail")]
    ErrorStackUnavailable { status: Status },

    #[error("Failed to load native library at {}: {reason}", .path.display())]
    LibraryLoad { path: PathBuf, reason: String },

    #[error("Native library is missing entry point `{name}`: {reason}")]
    MissingSymbol { name: String, reason: String },

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl BridgeError {
    /// Status class of this error within the native taxonomy.
    pub fn status(&self) -> Status {
        match self {
            BridgeError::InvalidArgument(_) => Status::InvalidArgument,
            BridgeError::InvalidState(_) => Status::InvalidState,
            BridgeError::Io(_) => Status::IoError,
            BridgeError::Runtime(_) => Status::RuntimeError,
            BridgeError::Native { status, .. } => *status,
            BridgeError::ErrorStackUnavailable { status } => *status,
            BridgeError::LibraryLoad { .. } => Status::IoError,
            BridgeError::MissingSymbol { .. } => Status::RuntimeError,
            BridgeError::Platform(_) => Status::RuntimeError,
            BridgeError::Extract(e) => e.status(),
        }
    }

    /// Diagnostic frames from the native error stack, in native order.
    pub fn message_stack(&self) -> &[String] {
        match self {
            BridgeError::Native { message_stack, .. } => message_stack,
            _ => &[],
        }
    }

    /// Integration failures with no path forward (wrong platform, broken
    /// artifact, mismatched binding version).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::MissingSymbol { .. }
                | BridgeError::LibraryLoad { .. }
                | BridgeError::Platform(_)
                | BridgeError::Extract(_)
        )
    }
}

fn render_native(status: &Status, message: &str, stack: &[String]) -> String {
    let mut out = format!("{} ({})", message, status);
    if !stack.is_empty() {
        out.push(':');
        for (i, frame) in stack.iter().enumerate() {
            out.push_str(&format!("\n  [{}] {}", i, frame));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_raw_values() {
        for raw in 0..12 {
            assert_eq!(Status::from_raw(raw).as_raw(), raw);
        }
        assert_eq!(Status::from_raw(3), Status::InvalidArgument);
        assert_eq!(Status::from_raw(42), Status::Unknown(42));
        assert_eq!(Status::from_raw(42).as_raw(), 42);
    }

    #[test]
    fn test_activation_statuses() {
        assert!(Status::ActivationRefused.is_activation_error());
        assert!(Status::ActivationThrottled.is_activation_error());
        assert!(!Status::IoError.is_activation_error());
    }

    #[test]
    fn test_native_error_display_lists_frames() {
        let err = BridgeError::Native {
            status: Status::ActivationError,
            message: "Initialization failed".to_string(),
            message_stack: vec!["key rejected".to_string(), "activation failed".to_string()],
        };

        let text = err.to_string();
        assert!(text.starts_with("Initialization failed (ACTIVATION_ERROR):"));
        assert!(text.contains("\n  [0] key rejected"));
        assert!(text.contains("\n  [1] activation failed"));
        assert_eq!(err.message_stack().len(), 2);
        assert_eq!(err.status(), Status::ActivationError);
    }

    #[test]
    fn test_native_error_without_frames() {
        let err = BridgeError::Native {
            status: Status::RuntimeError,
            message: "Process failed".to_string(),
            message_stack: Vec::new(),
        };
        assert_eq!(err.to_string(), "Process failed (RUNTIME_ERROR)");
    }

    #[test]
    fn test_stack_unavailable_is_labelled() {
        let err = BridgeError::ErrorStackUnavailable { status: Status::OutOfMemory };
        assert_eq!(err.status(), Status::OutOfMemory);
        assert!(err.to_string().contains("could not retrieve diagnostic detail"));
    }

    #[test]
    fn test_host_errors_map_to_taxonomy() {
        assert_eq!(BridgeError::InvalidArgument("x".into()).status(), Status::InvalidArgument);
        assert_eq!(BridgeError::InvalidState("x".into()).status(), Status::InvalidState);
        assert_eq!(BridgeError::Io("x".into()).status(), Status::IoError);
        assert!(!BridgeError::InvalidState("x".into()).is_fatal());
        assert!(BridgeError::MissingSymbol {
            name: "pv_sample_rate".into(),
            reason: "not found".into()
        }
        .is_fatal());
    }
}
