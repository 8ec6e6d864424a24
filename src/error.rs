//! Error types for whisperd.
//!
//! Errors are split by blast radius: `ResolutionError` aborts startup and
//! never reaches a client, `SessionError` terminates a single connection,
//! and `BackendError` is scoped to one transcription request.

use thiserror::Error;

/// Startup-time backend resolution failures. Fatal to the process.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Unknown model '{model}' for backend '{backend}'")]
    UnknownModel { backend: String, model: String },

    #[error("Backend '{backend}' is not supported on this platform: {message}")]
    PlatformUnsupported { backend: String, message: String },

    #[error("Authentication error: {message}")]
    Auth { message: String },

    #[error("Backend construction failed: {message}")]
    Internal { message: String },
}

/// Connection-scoped session failures. Terminate one session only.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Audio format mismatch: expected {expected}, got {actual}")]
    FormatMismatch { expected: String, actual: String },

    #[error("Audio buffer overflow: {size} bytes exceeds limit of {limit} bytes")]
    BufferOverflow { size: usize, limit: usize },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Short stable identifier used in wire `error` events.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::FormatMismatch { .. } => "format-mismatch",
            SessionError::BufferOverflow { .. } => "buffer-overflow",
            SessionError::Protocol { .. } => "protocol",
            SessionError::Io(_) => "io",
        }
    }
}

/// Per-request transcription failures returned by backend adapters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Model not found: {message}")]
    ModelNotFound { message: String },

    #[error("Invalid audio: {message}")]
    InvalidAudio { message: String },

    #[error("Platform unsupported: {message}")]
    PlatformUnsupported { message: String },

    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Upstream service error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Internal backend error: {message}")]
    Internal { message: String },
}

impl BackendError {
    /// Short stable identifier used in wire `error` events.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::ModelNotFound { .. } => "model-not-found",
            BackendError::InvalidAudio { .. } => "invalid-audio",
            BackendError::PlatformUnsupported { .. } => "platform-unsupported",
            BackendError::Auth { .. } => "auth",
            BackendError::Network { .. } => "network",
            BackendError::Timeout { .. } => "timeout",
            BackendError::Upstream { .. } => "upstream",
            BackendError::Internal { .. } => "internal",
        }
    }

    /// Whether the session must be closed after this error.
    ///
    /// Recoverable errors are reported to the client and the session stays
    /// alive for the next utterance. `Internal` is classified recoverable
    /// here; the session applies its own consecutive-failure budget on top.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BackendError::Auth { .. }
                | BackendError::ModelNotFound { .. }
                | BackendError::PlatformUnsupported { .. }
        )
    }

    /// Whether a retry with the identical request can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::Network { .. } | BackendError::Timeout { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, BackendError>;
