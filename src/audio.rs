//! Audio format description and the per-session sample buffer.
//!
//! The buffer accumulates raw PCM bytes for one utterance in arrival order
//! and is drained atomically when the utterance ends. Backpressure and
//! transport-level limits live outside; this layer only enforces a
//! configurable ceiling as a last-resort exit.

use crate::defaults;
use crate::error::SessionError;
use serde::{Deserialize, Serialize};

/// PCM format of one audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub rate: u32,
    /// Sample width in bytes
    pub width: u16,
    /// Number of channels
    pub channels: u16,
}

impl AudioFormat {
    /// The format local Whisper engines require: 16kHz, 16-bit, mono.
    pub fn whisper() -> Self {
        Self {
            rate: defaults::SAMPLE_RATE,
            width: defaults::SAMPLE_WIDTH,
            channels: defaults::CHANNELS,
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Hz/{}byte/{}ch", self.rate, self.width, self.channels)
    }
}

/// Accumulates streamed PCM bytes for one session.
///
/// Append-only between flushes. The first chunk (or an explicit start
/// event) establishes the session format; later chunks declaring a
/// different format are rejected.
#[derive(Debug)]
pub struct SessionBuffer {
    format: Option<AudioFormat>,
    data: Vec<u8>,
    max_bytes: usize,
}

impl SessionBuffer {
    /// Creates an empty buffer with the default size ceiling.
    pub fn new() -> Self {
        Self::with_limit(defaults::MAX_BUFFER_BYTES)
    }

    /// Creates an empty buffer with a custom size ceiling in bytes.
    pub fn with_limit(max_bytes: usize) -> Self {
        Self {
            format: None,
            data: Vec::new(),
            max_bytes,
        }
    }

    /// The format established for this utterance, if any audio arrived yet.
    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    /// Establish the session format without appending audio.
    ///
    /// Fails with `FormatMismatch` if a different format was already
    /// established for the current utterance.
    pub fn set_format(&mut self, format: AudioFormat) -> Result<(), SessionError> {
        match self.format {
            None => {
                self.format = Some(format);
                Ok(())
            }
            Some(existing) if existing == format => Ok(()),
            Some(existing) => Err(SessionError::FormatMismatch {
                expected: existing.to_string(),
                actual: format.to_string(),
            }),
        }
    }

    /// Appends one chunk of raw PCM bytes in arrival order.
    ///
    /// The chunk's declared format must match the established session
    /// format (the first chunk establishes it). Exceeding the ceiling
    /// fails with `BufferOverflow`.
    pub fn append(&mut self, format: AudioFormat, chunk: &[u8]) -> Result<(), SessionError> {
        self.set_format(format)?;

        let new_size = self.data.len() + chunk.len();
        if new_size > self.max_bytes {
            return Err(SessionError::BufferOverflow {
                size: new_size,
                limit: self.max_bytes,
            });
        }

        self.data.extend_from_slice(chunk);
        Ok(())
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if no audio has been buffered since the last drain.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Atomically returns the accumulated bytes and resets the buffer.
    ///
    /// Returns the established format alongside the samples; empty data is
    /// not an error. The format is cleared as well, so the next utterance
    /// establishes its own.
    pub fn drain_all(&mut self) -> (Option<AudioFormat>, Vec<u8>) {
        let format = self.format.take();
        let data = std::mem::take(&mut self.data);
        (format, data)
    }
}

impl Default for SessionBuffer {
    fn default() -> Self {
        Self::new()
    }
}
