//! Remote transcription over the OpenAI audio API.
//!
//! No local model: every `transcribe` call uploads the utterance as a WAV
//! file in a multipart request. Calls are independent network requests and
//! are never serialized; the session layer may retry transient failures.

use crate::backend::{SttBackend, TranscriptionRequest, TranscriptionResult};
use crate::error::{BackendError, ResolutionError};
use crate::models;
use crate::protocol::Attribution;
use serde::Deserialize;
use std::io::Cursor;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Configuration for the remote engine.
#[derive(Debug, Clone)]
pub struct OpenAiEngineConfig {
    /// Model identifier (e.g. "whisper-1")
    pub model: String,
    /// API credential
    pub api_key: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Endpoint override, used by tests
    pub endpoint: Option<String>,
}

/// OpenAI transcription API engine.
pub struct OpenAiEngine {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    endpoint: String,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAiEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEngine")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Success body of the transcriptions endpoint.
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

impl OpenAiEngine {
    /// Build the engine. The credential is required up front; a missing key
    /// is a startup failure, not a per-request one.
    pub fn new(config: OpenAiEngineConfig) -> Result<Self, ResolutionError> {
        let api_key = match config.api_key {
            Some(key) if !key.is_empty() => key,
            _ => {
                return Err(ResolutionError::Auth {
                    message: format!(
                        "OpenAI API key required; set the {} environment variable",
                        crate::defaults::API_KEY_ENV
                    ),
                });
            }
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ResolutionError::Internal {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: config.model,
            endpoint: config.endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            timeout: config.request_timeout,
        })
    }

    /// Encode the raw PCM request as a WAV file in memory.
    fn encode_wav(request: &TranscriptionRequest) -> Result<Vec<u8>, BackendError> {
        if request.format.width != 2 {
            return Err(BackendError::InvalidAudio {
                message: format!(
                    "unsupported sample width {} bytes (expected 2)",
                    request.format.width
                ),
            });
        }

        let spec = hound::WavSpec {
            channels: request.format.channels,
            sample_rate: request.format.rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(|e| {
                BackendError::Internal {
                    message: format!("failed to create WAV writer: {}", e),
                }
            })?;
            for sample in request.samples_i16() {
                writer
                    .write_sample(sample)
                    .map_err(|e| BackendError::Internal {
                        message: format!("failed to encode WAV: {}", e),
                    })?;
            }
            writer.finalize().map_err(|e| BackendError::Internal {
                message: format!("failed to finalize WAV: {}", e),
            })?;
        }
        Ok(cursor.into_inner())
    }

    fn map_send_error(&self, error: reqwest::Error) -> BackendError {
        if error.is_timeout() {
            BackendError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            BackendError::Network {
                message: error.to_string(),
            }
        }
    }
}

impl SttBackend for OpenAiEngine {
    fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<TranscriptionResult, BackendError> {
        let wav = Self::encode_wav(request)?;

        let file_part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| BackendError::Internal {
                message: format!("failed to build multipart body: {}", e),
            })?;

        let mut form = reqwest::blocking::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", file_part);
        if let Some(language) = &request.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(BackendError::Auth {
                message: format!("remote service rejected the credential ({})", status),
            });
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(BackendError::Upstream {
                status: status.as_u16(),
                message: truncate(&body, 512),
            });
        }

        let parsed: TranscriptionResponse =
            response.json().map_err(|e| BackendError::Upstream {
                status: status.as_u16(),
                message: format!("unparseable response body: {}", e),
            })?;

        Ok(TranscriptionResult {
            text: parsed.text.trim().to_string(),
            language: parsed.language,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn supported_languages(&self) -> Vec<String> {
        models::WHISPER_LANGUAGES
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn attribution(&self) -> Attribution {
        Attribution {
            name: "OpenAI".to_string(),
            url: "https://platform.openai.com/docs/guides/speech-to-text".to_string(),
        }
    }

    fn retryable(&self) -> bool {
        true
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFormat;

    fn config(api_key: Option<&str>) -> OpenAiEngineConfig {
        OpenAiEngineConfig {
            model: "whisper-1".to_string(),
            api_key: api_key.map(|s| s.to_string()),
            request_timeout: Duration::from_secs(300),
            endpoint: None,
        }
    }

    #[test]
    fn test_construction_requires_api_key() {
        let result = OpenAiEngine::new(config(None));
        assert!(matches!(result, Err(ResolutionError::Auth { .. })));

        let result = OpenAiEngine::new(config(Some("")));
        assert!(matches!(result, Err(ResolutionError::Auth { .. })));
    }

    #[test]
    fn test_construction_with_key_succeeds() {
        let engine = OpenAiEngine::new(config(Some("sk-test"))).unwrap();
        assert_eq!(engine.model_name(), "whisper-1");
        assert!(engine.retryable());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let engine = OpenAiEngine::new(config(Some("sk-secret"))).unwrap();
        let debug = format!("{:?}", engine);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_encode_wav_header_and_length() {
        let request = TranscriptionRequest {
            samples: vec![0x01, 0x00, 0x02, 0x00],
            format: AudioFormat::whisper(),
            language: None,
        };
        let wav = OpenAiEngine::encode_wav(&request).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44-byte canonical header plus two 16-bit samples
        assert_eq!(wav.len(), 44 + 4);
    }

    #[test]
    fn test_encode_wav_rejects_wrong_width() {
        let request = TranscriptionRequest {
            samples: vec![0, 1, 2, 3],
            format: AudioFormat {
                rate: 16000,
                width: 4,
                channels: 1,
            },
            language: None,
        };
        let result = OpenAiEngine::encode_wav(&request);
        assert!(matches!(result, Err(BackendError::InvalidAudio { .. })));
    }

    #[test]
    fn test_encode_wav_empty_samples_is_valid() {
        let request = TranscriptionRequest {
            samples: Vec::new(),
            format: AudioFormat::whisper(),
            language: None,
        };
        let wav = OpenAiEngine::encode_wav(&request).unwrap();
        assert_eq!(wav.len(), 44);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 512), "short");
        let long = "ä".repeat(600);
        let cut = truncate(&long, 512);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= 515);
    }
}
