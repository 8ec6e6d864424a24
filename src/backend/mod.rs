//! Backend adapter interface for speech-to-text engines.
//!
//! All engines expose one capability: turn a buffered utterance into text.
//! Whether that blocks on local inference or performs network I/O is hidden
//! behind the trait; the session runs every call on a blocking worker.

pub mod coreml;
pub mod openai;
pub mod whisper;

use crate::audio::AudioFormat;
use crate::error::BackendError;
use crate::protocol::Attribution;
use std::sync::Arc;

/// One utterance handed to a backend. Constructed once per flush and
/// consumed by exactly one `transcribe` call.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionRequest {
    /// Raw PCM bytes, little-endian, as accumulated by the session buffer
    pub samples: Vec<u8>,
    /// Format of the samples
    pub format: AudioFormat,
    /// Requested language, `None` for auto-detection
    pub language: Option<String>,
}

impl TranscriptionRequest {
    /// Interprets the sample bytes as 16-bit little-endian PCM.
    ///
    /// A trailing odd byte is dropped.
    pub fn samples_i16(&self) -> Vec<i16> {
        self.samples
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }
}

/// Result of one transcription request.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    /// Transcribed text; empty represents silence, not an error
    pub text: String,
    /// Language the backend reports it transcribed in, if known
    pub language: Option<String>,
}

/// Uniform contract implemented by every transcription engine.
///
/// Implementations must treat each call as independent and side-effect-free
/// on failure; engines that are not reentrant serialize internally.
pub trait SttBackend: Send + Sync {
    /// Transcribe one utterance. Synchronous from the caller's view.
    fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<TranscriptionResult, BackendError>;

    /// Stable backend name (e.g. "whisper-local").
    fn name(&self) -> &str;

    /// The model this backend was resolved with.
    fn model_name(&self) -> &str;

    /// Language codes the backend supports; empty means unrestricted.
    fn supported_languages(&self) -> Vec<String>;

    /// Credit for the underlying engine, reported via describe/info.
    fn attribution(&self) -> Attribution;

    /// Whether transient failures from this backend are worth retrying
    /// with the same request. Local inference is deterministic, so only
    /// the remote engine opts in.
    fn retryable(&self) -> bool {
        false
    }
}

/// Implement SttBackend for Arc<T> to allow sharing across sessions.
impl<T: SttBackend + ?Sized> SttBackend for Arc<T> {
    fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<TranscriptionResult, BackendError> {
        (**self).transcribe(request)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn supported_languages(&self) -> Vec<String> {
        (**self).supported_languages()
    }

    fn attribution(&self) -> Attribution {
        (**self).attribution()
    }

    fn retryable(&self) -> bool {
        (**self).retryable()
    }
}

/// Mock backend for testing.
///
/// Scripted responses are consumed in order; once the script is exhausted
/// the final entry repeats. Records every request it receives.
#[derive(Debug)]
pub struct MockBackend {
    model_name: String,
    script: std::sync::Mutex<Vec<Result<TranscriptionResult, BackendError>>>,
    requests: std::sync::Mutex<Vec<TranscriptionRequest>>,
    retryable: bool,
}

impl MockBackend {
    /// Create a mock that transcribes everything to the given text.
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            script: std::sync::Mutex::new(vec![Ok(TranscriptionResult {
                text: "mock transcription".to_string(),
                language: None,
            })]),
            requests: std::sync::Mutex::new(Vec::new()),
            retryable: false,
        }
    }

    /// Replace the scripted responses with a single fixed response.
    pub fn with_response(self, text: &str) -> Self {
        self.with_script(vec![Ok(TranscriptionResult {
            text: text.to_string(),
            language: None,
        })])
    }

    /// Replace the scripted responses with a single fixed error.
    pub fn with_failure(self, error: BackendError) -> Self {
        self.with_script(vec![Err(error)])
    }

    /// Script a sequence of responses, consumed one per call.
    pub fn with_script(self, script: Vec<Result<TranscriptionResult, BackendError>>) -> Self {
        assert!(!script.is_empty(), "mock script must not be empty");
        *self.script.lock().expect("mock script lock") = script;
        self
    }

    /// Mark this mock as retryable, like the remote engine.
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    /// All requests received so far, in order.
    pub fn requests(&self) -> Vec<TranscriptionRequest> {
        self.requests.lock().expect("mock requests lock").clone()
    }

    /// Number of `transcribe` calls received.
    pub fn call_count(&self) -> usize {
        self.requests.lock().expect("mock requests lock").len()
    }
}

impl SttBackend for MockBackend {
    fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<TranscriptionResult, BackendError> {
        self.requests
            .lock()
            .expect("mock requests lock")
            .push(request.clone());

        let mut script = self.script.lock().expect("mock script lock");
        if script.len() > 1 {
            script.remove(0)
        } else {
            script[0].clone()
        }
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn supported_languages(&self) -> Vec<String> {
        vec!["en".to_string()]
    }

    fn attribution(&self) -> Attribution {
        Attribution {
            name: "mock".to_string(),
            url: "https://example.invalid/mock".to_string(),
        }
    }

    fn retryable(&self) -> bool {
        self.retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(samples: &[u8]) -> TranscriptionRequest {
        TranscriptionRequest {
            samples: samples.to_vec(),
            format: AudioFormat::whisper(),
            language: None,
        }
    }

    #[test]
    fn test_mock_returns_configured_response() {
        let backend = MockBackend::new("test-model").with_response("hello world");
        let result = backend.transcribe(&request(&[0, 0])).unwrap();
        assert_eq!(result.text, "hello world");
    }

    #[test]
    fn test_mock_returns_configured_error() {
        let backend = MockBackend::new("test-model").with_failure(BackendError::Timeout {
            seconds: 1,
        });
        let result = backend.transcribe(&request(&[0, 0]));
        assert_eq!(result, Err(BackendError::Timeout { seconds: 1 }));
    }

    #[test]
    fn test_mock_script_consumed_in_order_then_repeats() {
        let backend = MockBackend::new("test-model").with_script(vec![
            Err(BackendError::Network {
                message: "reset".to_string(),
            }),
            Ok(TranscriptionResult {
                text: "second".to_string(),
                language: None,
            }),
        ]);

        assert!(backend.transcribe(&request(&[])).is_err());
        assert_eq!(backend.transcribe(&request(&[])).unwrap().text, "second");
        // Script exhausted; last entry repeats
        assert_eq!(backend.transcribe(&request(&[])).unwrap().text, "second");
        assert_eq!(backend.call_count(), 3);
    }

    #[test]
    fn test_mock_records_requests() {
        let backend = MockBackend::new("test-model");
        backend
            .transcribe(&TranscriptionRequest {
                samples: vec![1, 2, 3, 4],
                format: AudioFormat::whisper(),
                language: Some("en".to_string()),
            })
            .unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].samples, vec![1, 2, 3, 4]);
        assert_eq!(requests[0].language, Some("en".to_string()));
    }

    #[test]
    fn test_samples_i16_little_endian() {
        let request = TranscriptionRequest {
            samples: vec![0x00, 0x00, 0x01, 0x00, 0xff, 0xff],
            format: AudioFormat::whisper(),
            language: None,
        };
        assert_eq!(request.samples_i16(), vec![0, 1, -1]);
    }

    #[test]
    fn test_samples_i16_drops_trailing_odd_byte() {
        let request = TranscriptionRequest {
            samples: vec![0x01, 0x00, 0x42],
            format: AudioFormat::whisper(),
            language: None,
        };
        assert_eq!(request.samples_i16(), vec![1]);
    }

    #[test]
    fn test_trait_is_object_safe_and_arc_forwards() {
        let backend: Arc<dyn SttBackend> =
            Arc::new(MockBackend::new("test-model").with_response("boxed"));
        assert_eq!(backend.model_name(), "test-model");
        assert!(!backend.retryable());
        let result = backend.transcribe(&request(&[0, 0])).unwrap();
        assert_eq!(result.text, "boxed");
    }

    #[test]
    fn test_mock_retryable_flag() {
        let backend = MockBackend::new("m").retryable();
        assert!(SttBackend::retryable(&backend));
    }
}
