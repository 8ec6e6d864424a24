//! CoreML-accelerated whisper.cpp engine for Apple Silicon.
//!
//! Same construction discipline as the local engine; the CoreML encoder is
//! compiled in via the `coreml` feature. Platform support is checked at
//! construction so misconfiguration surfaces at startup, before any client
//! connects.

use crate::backend::whisper::{whisper_attribution, WhisperEngine, WhisperEngineConfig};
use crate::backend::{SttBackend, TranscriptionRequest, TranscriptionResult};
use crate::error::{BackendError, ResolutionError};
use crate::protocol::Attribution;

/// Whether the accelerated engine can run in this process: Apple Silicon
/// macOS with the `coreml` feature compiled in. Fixed at build time, so
/// auto-selection is deterministic.
pub fn platform_supported() -> bool {
    cfg!(all(target_os = "macos", target_arch = "aarch64", feature = "coreml"))
}

/// CoreML-accelerated transcription engine.
#[derive(Debug)]
pub struct CoremlEngine {
    inner: WhisperEngine,
}

impl CoremlEngine {
    /// Build the engine, failing fast when the platform cannot run it.
    pub fn new(config: WhisperEngineConfig) -> Result<Self, ResolutionError> {
        if !platform_supported() {
            return Err(ResolutionError::PlatformUnsupported {
                backend: "coreml".to_string(),
                message: if cfg!(feature = "coreml") {
                    "requires Apple Silicon macOS".to_string()
                } else {
                    "binary was built without the coreml feature".to_string()
                },
            });
        }

        Ok(Self {
            inner: WhisperEngine::new(config)?,
        })
    }
}

impl SttBackend for CoremlEngine {
    fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<TranscriptionResult, BackendError> {
        self.inner.transcribe(request)
    }

    fn name(&self) -> &str {
        "whisper-coreml"
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn supported_languages(&self) -> Vec<String> {
        self.inner.supported_languages()
    }

    fn attribution(&self) -> Attribution {
        whisper_attribution()
    }
}
