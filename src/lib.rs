//! whisperd - speech-to-text protocol server
//!
//! Exposes interchangeable transcription engines (local whisper.cpp,
//! CoreML-accelerated whisper.cpp, the OpenAI API) behind one streaming
//! wire protocol. Clients send an audio session and receive transcript
//! events without knowing which backend produced them.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod backend;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod models;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

// Core trait and types
pub use backend::{MockBackend, SttBackend, TranscriptionRequest, TranscriptionResult};

// Protocol surface
pub use protocol::{Event, ServerInfo};

// Session machinery
pub use server::{handle_connection, parse_uri, ListenAddr, Server};
pub use session::{Session, SessionState};

// Error handling
pub use error::{BackendError, ResolutionError, SessionError};

// Config
pub use config::{BackendConfig, BackendKind, Config, Device};
