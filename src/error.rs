use std::path::PathBuf;

use thiserror::Error;

/// Why a transport-level call did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFailure {
    Timeout,
    Connect,
}

/// Why downloading a generated image failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    Timeout,
    HttpStatus(u16),
    Transport,
}

/// Coarse classification of a [`GenerationError`], used by front-ends to pick
/// a message without matching on payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Network(NetworkFailure),
    Remote,
    MalformedResponse,
    Fetch(FetchFailure),
    Decode,
    Save,
    Config,
    Internal,
}

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Generation request timed out: {0}")]
    Timeout(String),

    #[error("Could not reach generation endpoint: {0}")]
    Connect(String),

    #[error("{}", remote_message(.status, .message))]
    Remote {
        status: Option<u16>,
        message: String,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Image download failed ({}): {message}", fetch_label(.failure))]
    Fetch {
        failure: FetchFailure,
        message: String,
    },

    #[error("Could not decode image: {0}")]
    Decode(String),

    #[error("Could not save image to {}: {message}", .path.display())]
    Save { path: PathBuf, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn remote_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("Endpoint rejected request (HTTP {}): {}", code, message),
        None => format!("Endpoint reported failure: {}", message),
    }
}

fn fetch_label(failure: &FetchFailure) -> String {
    match failure {
        FetchFailure::Timeout => "timeout".to_string(),
        FetchFailure::HttpStatus(code) => format!("HTTP {}", code),
        FetchFailure::Transport => "transport".to_string(),
    }
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::Validation(_) => ErrorKind::Validation,
            GenerationError::Timeout(_) => ErrorKind::Network(NetworkFailure::Timeout),
            GenerationError::Connect(_) => ErrorKind::Network(NetworkFailure::Connect),
            GenerationError::Remote { .. } => ErrorKind::Remote,
            GenerationError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            GenerationError::Fetch { failure, .. } => ErrorKind::Fetch(*failure),
            GenerationError::Decode(_) => ErrorKind::Decode,
            GenerationError::Save { .. } => ErrorKind::Save,
            GenerationError::Config(_) => ErrorKind::Config,
            GenerationError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True for both generation and download timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Network(NetworkFailure::Timeout) | ErrorKind::Fetch(FetchFailure::Timeout)
        )
    }

    /// Failures after which a size-less retry may still succeed.
    pub(crate) fn allows_size_fallback(&self) -> bool {
        matches!(
            self,
            GenerationError::Remote { .. }
                | GenerationError::Timeout(_)
                | GenerationError::Connect(_)
        )
    }

    /// Maps a transport error raised while talking to the generation endpoint.
    pub(crate) fn from_dispatch(err: reqwest::Error) -> Self {
        if err.is_builder() {
            GenerationError::Config(err.to_string())
        } else if err.is_timeout() {
            GenerationError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            GenerationError::Remote {
                status: Some(status.as_u16()),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            GenerationError::MalformedResponse(err.to_string())
        } else {
            GenerationError::Connect(err.to_string())
        }
    }

    /// Maps a transport error raised while downloading a generated image.
    pub(crate) fn from_fetch(err: reqwest::Error) -> Self {
        let failure = if err.is_timeout() {
            FetchFailure::Timeout
        } else if let Some(status) = err.status() {
            FetchFailure::HttpStatus(status.as_u16())
        } else {
            FetchFailure::Transport
        };
        GenerationError::Fetch {
            failure,
            message: err.to_string(),
        }
    }
}

impl From<image::ImageError> for GenerationError {
    fn from(err: image::ImageError) -> Self {
        GenerationError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
