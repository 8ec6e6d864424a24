//! Local whisper.cpp engine.
//!
//! Loads a ggml model once at construction into a reusable in-process
//! context; invocation is cheap and repeated. whisper.cpp inference is not
//! reentrant, so calls are serialized with a mutex around the context —
//! that is this adapter's responsibility, not the session's.
//!
//! # Feature Gate
//!
//! Requires the `whisper` feature (enabled by default, needs cmake). When
//! disabled, construction fails at startup so a misbuilt server never
//! accepts a connection.

use crate::audio::AudioFormat;
use crate::backend::{SttBackend, TranscriptionRequest, TranscriptionResult};
use crate::config::Device;
use crate::error::{BackendError, ResolutionError};
#[cfg(feature = "whisper")]
use crate::models;
use crate::protocol::Attribution;
use std::path::PathBuf;

#[cfg(feature = "whisper")]
use std::sync::{Mutex, Once};
#[cfg(feature = "whisper")]
use whisper_rs::{
    install_logging_hooks, FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Configuration for the local engine.
#[derive(Debug, Clone)]
pub struct WhisperEngineConfig {
    /// Model identifier (catalog name)
    pub model: String,
    /// Path to the ggml model file
    pub model_path: PathBuf,
    /// Device hint, resolved once at construction
    pub device: Device,
}

/// Resolve the device hint to a concrete device, fixed for the process
/// lifetime. `auto` picks gpu only when an accelerator backend was
/// compiled in; whisper.cpp cannot use a GPU otherwise.
pub fn resolve_device(device: Device) -> Device {
    match device {
        Device::Auto => {
            if cfg!(any(feature = "cuda", feature = "vulkan", feature = "hipblas")) {
                Device::Gpu
            } else {
                Device::Cpu
            }
        }
        fixed => fixed,
    }
}

/// Local whisper.cpp transcription engine.
#[cfg(feature = "whisper")]
pub struct WhisperEngine {
    context: Mutex<WhisperContext>,
    model: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("model", &self.model)
            .field("context", &"<WhisperContext>")
            .finish()
    }
}

#[cfg(feature = "whisper")]
impl WhisperEngine {
    /// Load the model and build a reusable engine. Expensive; happens once
    /// per process, never per request.
    pub fn new(config: WhisperEngineConfig) -> Result<Self, ResolutionError> {
        // Route whisper.cpp's own logging through our hooks (only once)
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        if !config.model_path.exists() {
            return Err(ResolutionError::Internal {
                message: format!(
                    "model file not found at {} (is the download directory correct?)",
                    config.model_path.display()
                ),
            });
        }

        let device = resolve_device(config.device);
        let mut context_params = WhisperContextParameters::default();
        context_params.use_gpu(device == Device::Gpu);

        let path = config
            .model_path
            .to_str()
            .ok_or_else(|| ResolutionError::Internal {
                message: "invalid UTF-8 in model path".to_string(),
            })?;
        let context = WhisperContext::new_with_params(path, context_params).map_err(|e| {
            ResolutionError::Internal {
                message: format!("failed to load Whisper model: {}", e),
            }
        })?;

        Ok(Self {
            context: Mutex::new(context),
            model: config.model,
        })
    }
}

#[cfg(feature = "whisper")]
impl SttBackend for WhisperEngine {
    fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<TranscriptionResult, BackendError> {
        check_format(request.format)?;

        let samples: Vec<f32> = request
            .samples_i16()
            .iter()
            .map(|&sample| sample as f32 / 32768.0)
            .collect();

        // whisper.cpp is not reentrant; serialize inference
        let context = self
            .context
            .lock()
            .map_err(|e| BackendError::Internal {
                message: format!("failed to acquire context lock: {}", e),
            })?;

        let mut state = context.create_state().map_err(|e| BackendError::Internal {
            message: format!("failed to create Whisper state: {}", e),
        })?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(request.language.as_deref());
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &samples)
            .map_err(|e| BackendError::Internal {
                message: format!("Whisper inference failed: {}", e),
            })?;

        let lang_id = state.full_lang_id_from_state();
        let language = whisper_rs::get_lang_str(lang_id).map(|s| s.to_string());

        let mut text = String::new();
        for segment in state.as_iter() {
            text.push_str(&segment.to_string());
        }

        Ok(TranscriptionResult {
            text: text.trim().to_string(),
            language,
        })
    }

    fn name(&self) -> &str {
        "whisper-local"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn supported_languages(&self) -> Vec<String> {
        models::supported_languages(&self.model)
    }

    fn attribution(&self) -> Attribution {
        whisper_attribution()
    }
}

/// Local engine placeholder for builds without the `whisper` feature.
///
/// Construction fails so misbuilt binaries abort at startup instead of
/// failing per request.
#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperEngine {
    model: String,
}

#[cfg(not(feature = "whisper"))]
impl WhisperEngine {
    pub fn new(_config: WhisperEngineConfig) -> Result<Self, ResolutionError> {
        Err(ResolutionError::Internal {
            message: concat!(
                "whisper feature not enabled; this binary was built without local inference. ",
                "Rebuild with --features whisper, or configure the openai backend"
            )
            .to_string(),
        })
    }
}

#[cfg(not(feature = "whisper"))]
impl SttBackend for WhisperEngine {
    fn transcribe(
        &self,
        _request: &TranscriptionRequest,
    ) -> Result<TranscriptionResult, BackendError> {
        Err(BackendError::Internal {
            message: "whisper feature not enabled".to_string(),
        })
    }

    fn name(&self) -> &str {
        "whisper-local"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn supported_languages(&self) -> Vec<String> {
        Vec::new()
    }

    fn attribution(&self) -> Attribution {
        whisper_attribution()
    }
}

/// The local engine only accepts 16kHz, 16-bit, mono PCM.
#[cfg_attr(not(feature = "whisper"), allow(dead_code))]
pub(crate) fn check_format(format: AudioFormat) -> Result<(), BackendError> {
    if format != AudioFormat::whisper() {
        return Err(BackendError::InvalidAudio {
            message: format!(
                "unsupported format {} (expected {})",
                format,
                AudioFormat::whisper()
            ),
        });
    }
    Ok(())
}

pub(crate) fn whisper_attribution() -> Attribution {
    Attribution {
        name: "whisper.cpp".to_string(),
        url: "https://github.com/ggml-org/whisper.cpp".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_device_fixed_hints_pass_through() {
        assert_eq!(resolve_device(Device::Cpu), Device::Cpu);
        assert_eq!(resolve_device(Device::Gpu), Device::Gpu);
    }

    #[test]
    fn test_resolve_device_auto_is_deterministic() {
        let first = resolve_device(Device::Auto);
        let second = resolve_device(Device::Auto);
        assert_eq!(first, second);
        assert_ne!(first, Device::Auto);
    }

    #[test]
    fn test_resolve_device_auto_without_accelerator_is_cpu() {
        if !cfg!(any(feature = "cuda", feature = "vulkan", feature = "hipblas")) {
            assert_eq!(resolve_device(Device::Auto), Device::Cpu);
        }
    }

    #[test]
    fn test_check_format_accepts_whisper_format() {
        assert!(check_format(AudioFormat::whisper()).is_ok());
    }

    #[test]
    fn test_check_format_rejects_wrong_rate() {
        let result = check_format(AudioFormat {
            rate: 44100,
            width: 2,
            channels: 1,
        });
        assert!(matches!(result, Err(BackendError::InvalidAudio { .. })));
    }

    #[test]
    fn test_check_format_rejects_stereo() {
        let result = check_format(AudioFormat {
            rate: 16000,
            width: 2,
            channels: 2,
        });
        assert!(matches!(result, Err(BackendError::InvalidAudio { .. })));
    }

    #[test]
    fn test_construction_fails_for_missing_model_file() {
        let result = WhisperEngine::new(WhisperEngineConfig {
            model: "base".to_string(),
            model_path: PathBuf::from("/nonexistent/ggml-base.bin"),
            device: Device::Cpu,
        });
        assert!(matches!(result, Err(ResolutionError::Internal { .. })));
    }
}
