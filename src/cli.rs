//! Command-line interface for whisperd
//!
//! Provides argument parsing using clap derive macros. Flags override the
//! configuration file; everything is read once at startup.

use crate::config::{BackendKind, Config, Device};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Speech-to-text protocol server with interchangeable Whisper backends
#[derive(Parser, Debug)]
#[command(
    name = "whisperd",
    version,
    about = "Speech-to-text protocol server with interchangeable Whisper backends"
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Backend to use: auto, local, coreml, openai
    #[arg(long, value_name = "BACKEND")]
    pub backend: Option<BackendKind>,

    /// Model identifier, or "auto" for the backend default
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Listen URI: tcp://host:port or unix://path
    #[arg(long, value_name = "URI")]
    pub uri: Option<String>,

    /// Inference device for the local backend: cpu, gpu, auto
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<Device>,

    /// Default language code, or "auto" for detection. Examples: auto, en, de
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Directory holding downloaded model weights
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Remote request timeout (default: 5m). Examples: 90s, 5m, 1h
    #[arg(long, value_name = "DURATION", value_parser = parse_timeout)]
    pub request_timeout: Option<Duration>,

    /// Suppress output (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a timeout string into a duration.
///
/// Supports any format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`90s`, `5m`, `2h`), and compound (`1h30m`).
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

impl Cli {
    /// Apply CLI overrides on top of the loaded configuration file.
    pub fn apply(&self, config: &mut Config) {
        if let Some(uri) = &self.uri {
            config.server.uri = uri.clone();
        }
        if let Some(backend) = self.backend {
            config.backend.kind = backend;
        }
        if let Some(model) = &self.model {
            config.backend.model = model.clone();
        }
        if let Some(device) = self.device {
            config.backend.device = device;
        }
        if let Some(language) = &self.language {
            config.backend.language = language.clone();
        }
        if let Some(dir) = &self.download_dir {
            config.backend.download_dir = Some(dir.clone());
        }
        if let Some(timeout) = self.request_timeout {
            config.backend.request_timeout_secs = timeout.as_secs();
        }
    }
}
