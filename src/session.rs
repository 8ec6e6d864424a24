//! Per-connection protocol session state machine.
//!
//! Drives one client connection: accumulates audio, flushes it into a
//! transcription request at end of utterance, emits result or error events,
//! and resets for the next utterance. The backend call runs on a blocking
//! worker so other sessions' event processing is never stalled.
//!
//! Audio arriving while a flush is in flight is queued, not rejected: the
//! connection task awaits the transcription before reading the next event,
//! so chunks wait in the transport buffer. Nothing is silently dropped.

use crate::backend::{SttBackend, TranscriptionRequest};
use crate::defaults;
use crate::error::{BackendError, SessionError};
use crate::protocol::Event;
use crate::registry;
use std::sync::Arc;
use tracing::{debug, warn};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Ready for the next utterance
    Idle,
    /// Accumulating audio
    Receiving,
    /// Flush in flight
    Transcribing,
    /// Terminal; the connection is closed
    Failed,
}

/// One client session.
pub struct Session {
    id: u64,
    backend: Arc<dyn SttBackend>,
    state: SessionState,
    buffer: crate::audio::SessionBuffer,
    /// Language for the next utterance; resets to the default after each flush
    language: Option<String>,
    default_language: Option<String>,
    /// Consecutive internal backend errors
    internal_errors: u32,
}

impl Session {
    /// Creates a session in `Idle` with an empty buffer.
    pub fn new(
        id: u64,
        backend: Arc<dyn SttBackend>,
        default_language: Option<String>,
        max_buffer_bytes: usize,
    ) -> Self {
        Self {
            id,
            backend,
            state: SessionState::Idle,
            buffer: crate::audio::SessionBuffer::with_limit(max_buffer_bytes),
            language: default_language.clone(),
            default_language,
            internal_errors: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True once a fatal error has closed this session.
    pub fn is_failed(&self) -> bool {
        self.state == SessionState::Failed
    }

    /// Process one client event, returning the events to send back.
    ///
    /// A returned `SessionError` terminates the connection; backend errors
    /// are reported as wire `error` events and classified recoverable or
    /// fatal here.
    pub async fn handle_event(&mut self, event: Event) -> Result<Vec<Event>, SessionError> {
        match event {
            Event::Describe => {
                debug!(session = self.id, "describe");
                Ok(vec![Event::Info(registry::server_info(
                    self.backend.as_ref(),
                ))])
            }
            Event::Transcribe { language } => {
                debug!(session = self.id, ?language, "language requested");
                self.language = language.or_else(|| self.default_language.clone());
                Ok(Vec::new())
            }
            Event::AudioStart(format) => {
                self.buffer.set_format(format)?;
                self.state = SessionState::Receiving;
                debug!(session = self.id, %format, "utterance started");
                Ok(Vec::new())
            }
            Event::AudioChunk { format, payload } => {
                // A chunk without a preceding start establishes the format
                self.buffer.append(format, &payload)?;
                self.state = SessionState::Receiving;
                Ok(Vec::new())
            }
            Event::AudioStop => self.flush().await,
            // Server-to-client events arriving from a client are a
            // protocol violation
            Event::Transcript { .. } | Event::Error { .. } | Event::Info(_) => {
                Err(SessionError::Protocol {
                    message: format!(
                        "unexpected '{}' event from client",
                        event.event_type()
                    ),
                })
            }
        }
    }

    /// End of utterance: drain the buffer, run one transcription request,
    /// and return to `Idle` (or `Failed` on a fatal error).
    async fn flush(&mut self) -> Result<Vec<Event>, SessionError> {
        let (format, samples) = self.buffer.drain_all();
        let language = std::mem::replace(&mut self.language, self.default_language.clone());

        let Some(format) = format else {
            // Stop without any audio: silence, not an error
            debug!(session = self.id, "stop with empty buffer");
            self.state = SessionState::Idle;
            return Ok(vec![Event::Transcript {
                text: String::new(),
            }]);
        };

        let request = TranscriptionRequest {
            samples,
            format,
            language,
        };
        debug!(
            session = self.id,
            bytes = request.samples.len(),
            "transcribing utterance"
        );

        self.state = SessionState::Transcribing;
        let outcome = self.transcribe_with_retry(request).await;
        Ok(self.settle(outcome))
    }

    /// Run the request on a blocking worker, retrying transient failures
    /// from retryable backends up to the attempt bound. Local failures are
    /// deterministic and never retried.
    async fn transcribe_with_retry(
        &self,
        request: TranscriptionRequest,
    ) -> Result<crate::backend::TranscriptionResult, BackendError> {
        let attempts = if self.backend.retryable() {
            defaults::TRANSIENT_ATTEMPTS
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let backend = Arc::clone(&self.backend);
            let req = request.clone();
            let result = match tokio::task::spawn_blocking(move || backend.transcribe(&req)).await
            {
                Ok(result) => result,
                // A panicking backend library must never cross the adapter
                // boundary as an unstructured fault
                Err(join_error) => Err(BackendError::Internal {
                    message: format!("backend task failed: {}", join_error),
                }),
            };

            match result {
                Err(error) if error.is_transient() && attempt < attempts => {
                    warn!(
                        session = self.id,
                        attempt,
                        error = %error,
                        "transient backend failure, retrying"
                    );
                }
                other => return other,
            }
        }
    }

    /// Classify the outcome of one flush and produce the reply events.
    fn settle(
        &mut self,
        outcome: Result<crate::backend::TranscriptionResult, BackendError>,
    ) -> Vec<Event> {
        match outcome {
            Ok(result) => {
                self.internal_errors = 0;
                self.state = SessionState::Idle;
                debug!(session = self.id, text = %result.text, "transcript");
                vec![Event::Transcript { text: result.text }]
            }
            Err(error) => {
                let fatal = match &error {
                    BackendError::Internal { .. } => {
                        self.internal_errors += 1;
                        self.internal_errors >= defaults::INTERNAL_ERROR_BUDGET
                    }
                    other => {
                        self.internal_errors = 0;
                        other.is_fatal()
                    }
                };

                if fatal {
                    warn!(session = self.id, error = %error, "fatal backend error, closing session");
                    self.state = SessionState::Failed;
                } else {
                    warn!(session = self.id, error = %error, "recoverable backend error");
                    self.state = SessionState::Idle;
                }

                vec![Event::Error {
                    kind: error.kind().to_string(),
                    message: error.to_string(),
                }]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFormat;
    use crate::backend::{MockBackend, TranscriptionResult};
    use crate::error::BackendError;

    fn fmt_16k() -> AudioFormat {
        AudioFormat {
            rate: 16000,
            width: 2,
            channels: 1,
        }
    }

    fn session_with(backend: MockBackend) -> (Session, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let session = Session::new(
            1,
            backend.clone() as Arc<dyn SttBackend>,
            None,
            defaults::MAX_BUFFER_BYTES,
        );
        (session, backend)
    }

    fn chunk(payload: &[u8]) -> Event {
        Event::AudioChunk {
            format: fmt_16k(),
            payload: payload.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_happy_path_start_chunks_stop() {
        let (mut session, backend) =
            session_with(MockBackend::new("base").with_response("hello world"));

        assert!(session
            .handle_event(Event::AudioStart(fmt_16k()))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(session.state(), SessionState::Receiving);

        let first = vec![0u8; 1600];
        let second = vec![1u8; 1600];
        session.handle_event(chunk(&first)).await.unwrap();
        session.handle_event(chunk(&second)).await.unwrap();

        let events = session.handle_event(Event::AudioStop).await.unwrap();
        assert_eq!(
            events,
            vec![Event::Transcript {
                text: "hello world".to_string()
            }]
        );
        assert_eq!(session.state(), SessionState::Idle);

        // The request saw the exact concatenation in arrival order
        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        let mut expected = first;
        expected.extend(second);
        assert_eq!(requests[0].samples, expected);
        assert_eq!(requests[0].format, fmt_16k());
    }

    #[tokio::test]
    async fn test_chunk_without_start_establishes_format() {
        let (mut session, backend) = session_with(MockBackend::new("base").with_response("ok"));

        session.handle_event(chunk(&[1, 2, 3, 4])).await.unwrap();
        assert_eq!(session.state(), SessionState::Receiving);

        let events = session.handle_event(Event::AudioStop).await.unwrap();
        assert_eq!(
            events,
            vec![Event::Transcript {
                text: "ok".to_string()
            }]
        );
        assert_eq!(backend.requests()[0].samples, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_stop_without_audio_emits_empty_transcript() {
        let (mut session, backend) = session_with(MockBackend::new("base"));

        let events = session.handle_event(Event::AudioStop).await.unwrap();
        assert_eq!(
            events,
            vec![Event::Transcript {
                text: String::new()
            }]
        );
        assert_eq!(session.state(), SessionState::Idle);
        // No backend call for silence
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_transcript_from_backend_is_valid() {
        let (mut session, _) = session_with(MockBackend::new("base").with_response(""));

        session.handle_event(chunk(&[0, 0])).await.unwrap();
        let events = session.handle_event(Event::AudioStop).await.unwrap();
        assert_eq!(
            events,
            vec![Event::Transcript {
                text: String::new()
            }]
        );
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_format_mismatch_terminates_session() {
        let (mut session, _) = session_with(MockBackend::new("base"));

        session
            .handle_event(Event::AudioStart(fmt_16k()))
            .await
            .unwrap();
        let result = session
            .handle_event(Event::AudioChunk {
                format: AudioFormat {
                    rate: 44100,
                    width: 2,
                    channels: 2,
                },
                payload: vec![0; 4],
            })
            .await;
        assert!(matches!(result, Err(SessionError::FormatMismatch { .. })));
    }

    #[tokio::test]
    async fn test_consecutive_utterances_are_independent() {
        let (mut session, backend) = session_with(MockBackend::new("base").with_script(vec![
            Ok(TranscriptionResult {
                text: "first".to_string(),
                language: None,
            }),
            Ok(TranscriptionResult {
                text: "second".to_string(),
                language: None,
            }),
        ]));

        session.handle_event(chunk(&[1, 1])).await.unwrap();
        let events = session.handle_event(Event::AudioStop).await.unwrap();
        assert_eq!(
            events,
            vec![Event::Transcript {
                text: "first".to_string()
            }]
        );

        session.handle_event(chunk(&[2, 2])).await.unwrap();
        let events = session.handle_event(Event::AudioStop).await.unwrap();
        assert_eq!(
            events,
            vec![Event::Transcript {
                text: "second".to_string()
            }]
        );

        // No audio from utterance N leaks into utterance N+1
        let requests = backend.requests();
        assert_eq!(requests[0].samples, vec![1, 1]);
        assert_eq!(requests[1].samples, vec![2, 2]);
    }

    #[tokio::test]
    async fn test_transient_error_retried_then_succeeds() {
        let (mut session, backend) = session_with(
            MockBackend::new("whisper-1")
                .with_script(vec![
                    Err(BackendError::Network {
                        message: "connection reset".to_string(),
                    }),
                    Ok(TranscriptionResult {
                        text: "recovered".to_string(),
                        language: None,
                    }),
                ])
                .retryable(),
        );

        session.handle_event(chunk(&[0, 0])).await.unwrap();
        let events = session.handle_event(Event::AudioStop).await.unwrap();
        assert_eq!(
            events,
            vec![Event::Transcript {
                text: "recovered".to_string()
            }]
        );
        // First attempt plus one retry
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_timeout_twice_surfaces_one_error_session_stays_usable() {
        let (mut session, backend) = session_with(
            MockBackend::new("whisper-1")
                .with_script(vec![
                    Err(BackendError::Timeout { seconds: 300 }),
                    Err(BackendError::Timeout { seconds: 300 }),
                    Ok(TranscriptionResult {
                        text: "next one".to_string(),
                        language: None,
                    }),
                ])
                .retryable(),
        );

        session.handle_event(chunk(&[0, 0])).await.unwrap();
        let events = session.handle_event(Event::AudioStop).await.unwrap();
        // Exactly one error event for both attempts
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            Event::Error { kind, .. } if kind == "timeout"
        ));
        assert_eq!(backend.call_count(), 2);
        assert_eq!(session.state(), SessionState::Idle);

        // Session remains usable for the next utterance
        session.handle_event(chunk(&[0, 0])).await.unwrap();
        let events = session.handle_event(Event::AudioStop).await.unwrap();
        assert_eq!(
            events,
            vec![Event::Transcript {
                text: "next one".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_local_backend_failures_are_not_retried() {
        let (mut session, backend) = session_with(
            // Not marked retryable, like the local engines
            MockBackend::new("base").with_failure(BackendError::Network {
                message: "reset".to_string(),
            }),
        );

        session.handle_event(chunk(&[0, 0])).await.unwrap();
        let events = session.handle_event(Event::AudioStop).await.unwrap();
        assert!(matches!(&events[0], Event::Error { .. }));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_auth_error_is_fatal() {
        let (mut session, _) = session_with(MockBackend::new("whisper-1").with_failure(
            BackendError::Auth {
                message: "invalid key".to_string(),
            },
        ));

        session.handle_event(chunk(&[0, 0])).await.unwrap();
        let events = session.handle_event(Event::AudioStop).await.unwrap();
        assert!(matches!(
            &events[0],
            Event::Error { kind, .. } if kind == "auth"
        ));
        assert!(session.is_failed());
    }

    #[tokio::test]
    async fn test_internal_errors_fatal_only_beyond_budget() {
        let (mut session, _) = session_with(MockBackend::new("base").with_failure(
            BackendError::Internal {
                message: "engine crashed".to_string(),
            },
        ));

        for round in 1..=defaults::INTERNAL_ERROR_BUDGET {
            session.handle_event(chunk(&[0, 0])).await.unwrap();
            let events = session.handle_event(Event::AudioStop).await.unwrap();
            assert!(matches!(&events[0], Event::Error { .. }));
            if round < defaults::INTERNAL_ERROR_BUDGET {
                assert_eq!(session.state(), SessionState::Idle, "round {}", round);
            }
        }
        assert!(session.is_failed());
    }

    #[tokio::test]
    async fn test_success_resets_internal_error_budget() {
        let (mut session, _) = session_with(MockBackend::new("base").with_script(vec![
            Err(BackendError::Internal {
                message: "x".to_string(),
            }),
            Err(BackendError::Internal {
                message: "x".to_string(),
            }),
            Ok(TranscriptionResult {
                text: "fine".to_string(),
                language: None,
            }),
            Err(BackendError::Internal {
                message: "x".to_string(),
            }),
        ]));

        for _ in 0..4 {
            session.handle_event(chunk(&[0, 0])).await.unwrap();
            session.handle_event(Event::AudioStop).await.unwrap();
        }
        // Two internal errors, a success, then one more internal error:
        // the budget restarted, so the session is still alive
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_language_applies_to_next_utterance_then_resets() {
        let backend = Arc::new(MockBackend::new("base").with_response("ok"));
        let mut session = Session::new(
            7,
            backend.clone() as Arc<dyn SttBackend>,
            Some("en".to_string()),
            defaults::MAX_BUFFER_BYTES,
        );

        session
            .handle_event(Event::Transcribe {
                language: Some("de".to_string()),
            })
            .await
            .unwrap();
        session.handle_event(chunk(&[0, 0])).await.unwrap();
        session.handle_event(Event::AudioStop).await.unwrap();

        session.handle_event(chunk(&[0, 0])).await.unwrap();
        session.handle_event(Event::AudioStop).await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests[0].language, Some("de".to_string()));
        // Reset to the configured default after the flush
        assert_eq!(requests[1].language, Some("en".to_string()));
    }

    #[tokio::test]
    async fn test_describe_answers_info() {
        let (mut session, _) = session_with(MockBackend::new("base"));
        let events = session.handle_event(Event::Describe).await.unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Info(info) => {
                assert_eq!(info.program, "mock");
                assert_eq!(info.model, "base");
            }
            other => panic!("expected info event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_events_from_client_are_protocol_errors() {
        let (mut session, _) = session_with(MockBackend::new("base"));
        let result = session
            .handle_event(Event::Transcript {
                text: "spoofed".to_string(),
            })
            .await;
        assert!(matches!(result, Err(SessionError::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_buffer_overflow_terminates_session() {
        let backend = Arc::new(MockBackend::new("base"));
        let mut session = Session::new(1, backend as Arc<dyn SttBackend>, None, 8);

        session.handle_event(chunk(&[0; 8])).await.unwrap();
        let result = session.handle_event(chunk(&[0; 1])).await;
        assert!(matches!(result, Err(SessionError::BufferOverflow { .. })));
    }
}
