//! Server and backend configuration.
//!
//! Settings come from an optional TOML file overridden by CLI flags; the
//! result is one immutable `BackendConfig` shared read-only across all
//! sessions for the process lifetime.

use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which transcription engine to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Pick the accelerated engine when the platform supports it, else local
    Auto,
    /// Local whisper.cpp inference (CPU or GPU)
    Local,
    /// CoreML-accelerated whisper.cpp (Apple Silicon only)
    Coreml,
    /// OpenAI transcription API
    Openai,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendKind::Auto => "auto",
            BackendKind::Local => "local",
            BackendKind::Coreml => "coreml",
            BackendKind::Openai => "openai",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(BackendKind::Auto),
            "local" => Ok(BackendKind::Local),
            "coreml" => Ok(BackendKind::Coreml),
            "openai" => Ok(BackendKind::Openai),
            other => Err(format!(
                "unknown backend '{}' (expected auto, local, coreml or openai)",
                other
            )),
        }
    }
}

/// Inference device hint for the local engine. Ignored by the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Device {
    Cpu,
    Gpu,
    /// gpu when a compatible accelerator was compiled in, else cpu
    Auto,
}

impl std::str::FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Device::Cpu),
            "gpu" => Ok(Device::Gpu),
            "auto" => Ok(Device::Auto),
            other => Err(format!(
                "unknown device '{}' (expected cpu, gpu or auto)",
                other
            )),
        }
    }
}

/// Root configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub backend: BackendSection,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSection {
    /// Listen URI: tcp://host:port or unix://path
    pub uri: String,
    /// Per-session audio buffer ceiling in bytes
    pub max_buffer_bytes: usize,
}

/// Backend selection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendSection {
    pub kind: BackendKind,
    /// Model identifier, or "auto" for the backend default
    pub model: String,
    pub device: Device,
    /// Default language, or "auto" for detection
    pub language: String,
    /// Directory holding downloaded model weights
    pub download_dir: Option<PathBuf>,
    /// Remote request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            uri: defaults::LISTEN_URI.to_string(),
            max_buffer_bytes: defaults::MAX_BUFFER_BYTES,
        }
    }
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            kind: BackendKind::Auto,
            model: defaults::AUTO_MODEL.to_string(),
            device: Device::Auto,
            language: defaults::AUTO_LANGUAGE.to_string(),
            download_dir: None,
            request_timeout_secs: defaults::REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields use default values; invalid TOML is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if it is missing.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                let not_found = e
                    .downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false);
                if not_found {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }
}

/// Immutable backend configuration resolved once at startup.
///
/// Owned by the process and shared read-only across sessions. The registry
/// turns this into a concrete adapter instance.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub model: String,
    pub device: Device,
    /// Default language for requests, `None` for auto-detection
    pub language: Option<String>,
    /// Remote API credential; opaque, required only for the remote backend
    pub api_key: Option<String>,
    /// Model weight cache directory, handed opaquely to engine construction
    pub download_dir: PathBuf,
    pub request_timeout: Duration,
}

impl BackendConfig {
    /// Build the backend configuration from the file config, with the API
    /// key taken from the environment.
    pub fn from_config(config: &Config) -> Self {
        let language = match config.backend.language.as_str() {
            defaults::AUTO_LANGUAGE | "" => None,
            lang => Some(lang.to_string()),
        };
        let download_dir = config
            .backend
            .download_dir
            .clone()
            .unwrap_or_else(default_download_dir);

        Self {
            kind: config.backend.kind,
            model: config.backend.model.clone(),
            device: config.backend.device,
            language,
            api_key: std::env::var(defaults::API_KEY_ENV).ok(),
            download_dir,
            request_timeout: Duration::from_secs(config.backend.request_timeout_secs),
        }
    }
}

/// Default model cache directory: `<data dir>/whisperd/models`.
pub fn default_download_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("whisperd")
        .join("models")
}
