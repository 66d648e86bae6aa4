use crate::core::domain::{SubmissionKind, ValidationErrors};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("transport error: {msg}")]
    Transport { msg: String },
    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response: {msg}")]
    Decode { msg: String },
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode { msg: e.to_string() }
        } else {
            ApiError::Transport { msg: e.to_string() }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode { msg: e.to_string() }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LifecycleError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("submission failed: {0}")]
    Transport(#[from] ApiError),
    #[error("task expects a {expected} submission, got {got}")]
    MismatchedSubmission {
        expected: SubmissionKind,
        got: SubmissionKind,
    },
}
