// THEORY:
// Every failure a batch can hit is user-visible text, and each one is recorded
// against the filename that caused it. Because results are immutable values that
// outlive the call which produced them, the error types carry owned string
// payloads and are `Clone`, rather than wrapping non-cloneable library errors.
//
// Three families exist:
// 1.  **MissingCredential**: recognized locally before any network traffic. Its
//     display text is the exact notice shown to the operator.
// 2.  **Inference**: anything that went wrong talking to the hosted model.
// 3.  **Decode**: the uploaded bytes were not an image we can submit.
//
// `Processing` covers the blocking preprocessing task itself dying (a panic in the
// image codec, or the runtime shutting down) before it produced a request.

use thiserror::Error;

/// The literal notice produced in place of a verdict when no credential was supplied.
pub const MISSING_CREDENTIAL_NOTICE: &str = "No response due to missing API key.";

/// Top-level error for a single batch item.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("{}", MISSING_CREDENTIAL_NOTICE)]
    MissingCredential,

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("upload could not be processed: {0}")]
    Processing(String),
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            Error::Processing("image processing panicked".to_string())
        } else {
            Error::Processing(err.to_string())
        }
    }
}

/// Failures of the remote classification call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InferenceError {
    #[error("inference endpoint unreachable: {0}")]
    Transport(String),

    #[error("inference request timed out")]
    Timeout,

    #[error("credential rejected by inference service: {0}")]
    CredentialRejected(String),

    #[error("inference service returned HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("inference response could not be decoded as text: {0}")]
    MalformedResponse(String),

    #[error("inference request was blocked: {0}")]
    Blocked(String),
}

impl InferenceError {
    /// Whether a bounded retry has any chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            InferenceError::Transport(_) | InferenceError::Timeout => true,
            InferenceError::Rejected { status, .. } => *status == 429 || *status >= 500,
            InferenceError::CredentialRejected(_)
            | InferenceError::MalformedResponse(_)
            | InferenceError::Blocked(_) => false,
        }
    }
}

/// Failures turning uploaded bytes into a submittable image.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unsupported image type '{0}' (expected png, jpg or jpeg)")]
    UnsupportedFormat(String),

    #[error("uploaded file is empty")]
    Empty,

    #[error("image has zero width or height")]
    ZeroSized,

    #[error("not a valid image: {0}")]
    Invalid(String),

    #[error("could not encode resized image: {0}")]
    Encode(String),
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        DecodeError::Invalid(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
