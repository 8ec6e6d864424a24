//! Wire protocol for client sessions.
//!
//! Each event is one JSON header line followed by an optional binary
//! payload: `{"type": ..., "data": ..., "payload_length": N}\n` then N raw
//! bytes. Audio chunks carry their PCM bytes as payload; every other event
//! is header-only.

use crate::audio::AudioFormat;
use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single event payload. A chunk this large is a protocol
/// violation, not audio.
const MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Events exchanged with a client.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Start of an utterance; establishes the audio format.
    AudioStart(AudioFormat),
    /// One chunk of raw PCM audio.
    AudioChunk {
        format: AudioFormat,
        payload: Vec<u8>,
    },
    /// End of the utterance; triggers transcription.
    AudioStop,
    /// Requests a language for the next utterance.
    Transcribe { language: Option<String> },
    /// Transcription result (server to client). Empty text is valid.
    Transcript { text: String },
    /// Error report (server to client).
    Error { kind: String, message: String },
    /// Capability query (client to server).
    Describe,
    /// Capability answer (server to client).
    Info(ServerInfo),
}

/// Capability description sent in answer to `describe`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Backend program name (e.g. "whisper-local")
    pub program: String,
    /// Short human-readable description
    pub description: String,
    /// Active model identifier
    pub model: String,
    /// Supported language codes (empty means unrestricted)
    pub languages: Vec<String>,
    /// Upstream project credit
    pub attribution: Attribution,
    /// Server version
    pub version: String,
}

/// Credit for the engine behind a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub name: String,
    pub url: String,
}

/// On-wire event header, one JSON object per line.
#[derive(Debug, Serialize, Deserialize)]
struct Header {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload_length: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TranscribeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    language: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TranscriptData {
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorData {
    kind: String,
    message: String,
}

impl Event {
    /// Event type string as it appears on the wire.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::AudioStart(_) => "audio-start",
            Event::AudioChunk { .. } => "audio-chunk",
            Event::AudioStop => "audio-stop",
            Event::Transcribe { .. } => "transcribe",
            Event::Transcript { .. } => "transcript",
            Event::Error { .. } => "error",
            Event::Describe => "describe",
            Event::Info(_) => "info",
        }
    }

    fn to_header(&self) -> Result<(Header, Option<&[u8]>), serde_json::Error> {
        let (data, payload): (Option<Value>, Option<&[u8]>) = match self {
            Event::AudioStart(format) => (Some(serde_json::to_value(format)?), None),
            Event::AudioChunk { format, payload } => {
                (Some(serde_json::to_value(format)?), Some(payload))
            }
            Event::AudioStop | Event::Describe => (None, None),
            Event::Transcribe { language } => (
                Some(serde_json::to_value(TranscribeData {
                    language: language.clone(),
                })?),
                None,
            ),
            Event::Transcript { text } => (
                Some(serde_json::to_value(TranscriptData { text: text.clone() })?),
                None,
            ),
            Event::Error { kind, message } => (
                Some(serde_json::to_value(ErrorData {
                    kind: kind.clone(),
                    message: message.clone(),
                })?),
                None,
            ),
            Event::Info(info) => (Some(serde_json::to_value(info)?), None),
        };

        Ok((
            Header {
                event_type: self.event_type().to_string(),
                data,
                payload_length: payload.map(<[u8]>::len),
            },
            payload,
        ))
    }

    fn from_header(header: Header, payload: Vec<u8>) -> Result<Self, SessionError> {
        fn data<T: serde::de::DeserializeOwned>(
            event_type: &str,
            data: Option<Value>,
        ) -> Result<T, SessionError> {
            let value = data.ok_or_else(|| SessionError::Protocol {
                message: format!("'{}' event is missing its data object", event_type),
            })?;
            serde_json::from_value(value).map_err(|e| SessionError::Protocol {
                message: format!("malformed '{}' data: {}", event_type, e),
            })
        }

        match header.event_type.as_str() {
            "audio-start" => Ok(Event::AudioStart(data("audio-start", header.data)?)),
            "audio-chunk" => Ok(Event::AudioChunk {
                format: data("audio-chunk", header.data)?,
                payload,
            }),
            "audio-stop" => Ok(Event::AudioStop),
            "transcribe" => {
                let parsed: TranscribeData = match header.data {
                    Some(value) => {
                        serde_json::from_value(value).map_err(|e| SessionError::Protocol {
                            message: format!("malformed 'transcribe' data: {}", e),
                        })?
                    }
                    None => TranscribeData { language: None },
                };
                Ok(Event::Transcribe {
                    language: parsed.language,
                })
            }
            "transcript" => {
                let parsed: TranscriptData = data("transcript", header.data)?;
                Ok(Event::Transcript { text: parsed.text })
            }
            "error" => {
                let parsed: ErrorData = data("error", header.data)?;
                Ok(Event::Error {
                    kind: parsed.kind,
                    message: parsed.message,
                })
            }
            "describe" => Ok(Event::Describe),
            "info" => Ok(Event::Info(data("info", header.data)?)),
            other => Err(SessionError::Protocol {
                message: format!("unknown event type '{}'", other),
            }),
        }
    }
}

/// Reads one event from a buffered stream.
///
/// Returns `Ok(None)` on a clean end of stream (client disconnect).
pub async fn read_event<R>(reader: &mut R) -> Result<Option<Event>, SessionError>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }

    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(SessionError::Protocol {
            message: "empty event header line".to_string(),
        });
    }

    let header: Header = serde_json::from_str(trimmed).map_err(|e| SessionError::Protocol {
        message: format!("malformed event header: {}", e),
    })?;

    let payload = match header.payload_length {
        Some(length) if length > MAX_PAYLOAD_BYTES => {
            return Err(SessionError::Protocol {
                message: format!(
                    "payload of {} bytes exceeds per-event limit of {} bytes",
                    length, MAX_PAYLOAD_BYTES
                ),
            });
        }
        Some(length) => {
            let mut payload = vec![0u8; length];
            reader.read_exact(&mut payload).await?;
            payload
        }
        None => Vec::new(),
    };

    Event::from_header(header, payload).map(Some)
}

/// Writes one event to a stream, header line then payload bytes.
pub async fn write_event<W>(writer: &mut W, event: &Event) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    let (header, payload) = event.to_header().map_err(|e| SessionError::Protocol {
        message: format!("failed to serialize event: {}", e),
    })?;
    let mut line = serde_json::to_string(&header).map_err(|e| SessionError::Protocol {
        message: format!("failed to serialize event header: {}", e),
    })?;
    line.push('\n');

    writer.write_all(line.as_bytes()).await?;
    if let Some(payload) = payload {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;
    Ok(())
}
