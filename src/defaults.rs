//! Default configuration constants for whisperd.
//!
//! Shared constants used across configuration types to keep the CLI, the
//! config file, and the backends in agreement.

use std::time::Duration;

/// Audio sample rate the local engines accept, in Hz.
///
/// 16kHz is the standard for speech recognition; Whisper models are trained
/// on 16kHz mono input.
pub const SAMPLE_RATE: u32 = 16000;

/// Sample width in bytes (16-bit PCM).
pub const SAMPLE_WIDTH: u16 = 2;

/// Channel count the local engines accept (mono).
pub const CHANNELS: u16 = 1;

/// Default listen URI.
pub const LISTEN_URI: &str = "tcp://0.0.0.0:10300";

/// Model identifier that triggers per-backend default model selection.
pub const AUTO_MODEL: &str = "auto";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// Ceiling on buffered audio per session before the connection is closed
/// with a buffer-overflow error. 64 MiB is roughly 35 minutes of 16kHz
/// 16-bit mono audio.
pub const MAX_BUFFER_BYTES: usize = 64 * 1024 * 1024;

/// Default timeout for one remote transcription request.
///
/// Generous on purpose: transcription of long audio over the API can take
/// minutes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Total attempts for a transient remote failure (first try plus retries).
pub const TRANSIENT_ATTEMPTS: u32 = 2;

/// Consecutive internal backend errors tolerated before the session is
/// closed as fatal.
pub const INTERNAL_ERROR_BUDGET: u32 = 3;

/// Environment variable holding the remote API credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
