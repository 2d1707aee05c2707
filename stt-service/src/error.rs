/// Service errors
///
/// Everything a request or startup can fail with, mapped onto HTTP status
/// codes for the transcription route.

use axum::http::StatusCode;
use stt_bridge::{BridgeError, Status};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Upload interrupted: {0}")]
    Upload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("Transcription task failed: {0}")]
    Task(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::Upload(_) => StatusCode::BAD_REQUEST,
            ServiceError::Io(_) | ServiceError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Bridge(e) => match e.status() {
                Status::InvalidArgument => StatusCode::BAD_REQUEST,
                Status::ActivationError
                | Status::ActivationLimitReached
                | Status::ActivationThrottled
                | Status::ActivationRefused => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_status_codes() {
        let bad_format = ServiceError::from(BridgeError::InvalidArgument("unsupported audio format 'xyz'".into()));
        assert_eq!(bad_format.status_code(), StatusCode::BAD_REQUEST);

        let activation = ServiceError::from(BridgeError::Native {
            status: Status::ActivationThrottled,
            message: "Initialization failed".into(),
            message_stack: Vec::new(),
        });
        assert_eq!(activation.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        assert_eq!(
            ServiceError::PayloadTooLarge { limit: 10 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test_case(Status::ActivationError, StatusCode::SERVICE_UNAVAILABLE ; "activation_error")]
    #[test_case(Status::ActivationRefused, StatusCode::SERVICE_UNAVAILABLE ; "activation_refused")]
    #[test_case(Status::InvalidArgument, StatusCode::BAD_REQUEST ; "invalid_argument")]
    #[test_case(Status::OutOfMemory, StatusCode::INTERNAL_SERVER_ERROR ; "out_of_memory")]
    #[test_case(Status::RuntimeError, StatusCode::INTERNAL_SERVER_ERROR ; "runtime_error")]
    fn test_native_status_mapping(status: Status, expected: StatusCode) {
        let err = ServiceError::from(BridgeError::Native {
            status,
            message: "Process failed".into(),
            message_stack: vec!["frame".into()],
        });
        assert_eq!(err.status_code(), expected);
    }
}
