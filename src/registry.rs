//! Backend resolution.
//!
//! Turns the immutable startup configuration into one ready-to-use adapter
//! instance, shared by every session. Resolution happens exactly once;
//! local engines are expensive to construct and auto decisions are never
//! re-evaluated at runtime.

use crate::backend::coreml::{platform_supported, CoremlEngine};
use crate::backend::openai::{OpenAiEngine, OpenAiEngineConfig};
use crate::backend::whisper::{WhisperEngine, WhisperEngineConfig};
use crate::backend::SttBackend;
use crate::config::{BackendConfig, BackendKind};
use crate::defaults;
use crate::error::ResolutionError;
use crate::models;
use crate::protocol::ServerInfo;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Resolve `auto` to a concrete backend kind. One-shot startup decision:
/// the accelerated engine when this platform can run it, else local.
pub fn select_kind(kind: BackendKind) -> BackendKind {
    match kind {
        BackendKind::Auto => {
            if platform_supported() {
                BackendKind::Coreml
            } else {
                BackendKind::Local
            }
        }
        concrete => concrete,
    }
}

/// Resolve the configuration into a constructed backend adapter.
///
/// Steps, in order: resolve `auto` kind, resolve `auto` model to the
/// backend default, validate the model identifier against the backend's
/// known set, then construct. Any failure aborts startup; nothing here is
/// retried or deferred to request time.
pub fn resolve(config: &BackendConfig) -> Result<Arc<dyn SttBackend>, ResolutionError> {
    let kind = select_kind(config.kind);
    if kind != config.kind {
        info!(backend = %kind, "auto-selected backend");
    }

    let model = if config.model == defaults::AUTO_MODEL {
        models::default_model(kind).to_string()
    } else {
        config.model.clone()
    };
    if model != config.model {
        info!(model = %model, "auto-selected model");
    }

    // The accelerated engine accepts arbitrary repo-path identifiers and
    // skips catalog validation for those.
    let arbitrary_path = kind == BackendKind::Coreml && model.contains('/');
    if !arbitrary_path && !models::is_known_model(kind, &model) {
        return Err(ResolutionError::UnknownModel {
            backend: kind.to_string(),
            model,
        });
    }

    let backend: Arc<dyn SttBackend> = match kind {
        BackendKind::Local => Arc::new(WhisperEngine::new(WhisperEngineConfig {
            model_path: config.download_dir.join(models::local_model_file(&model)),
            model,
            device: config.device,
        })?),
        BackendKind::Coreml => {
            let model_path = if arbitrary_path {
                PathBuf::from(&model)
            } else {
                config.download_dir.join(models::local_model_file(&model))
            };
            Arc::new(CoremlEngine::new(WhisperEngineConfig {
                model_path,
                model,
                device: config.device,
            })?)
        }
        BackendKind::Openai => Arc::new(OpenAiEngine::new(OpenAiEngineConfig {
            model,
            api_key: config.api_key.clone(),
            request_timeout: config.request_timeout,
            endpoint: None,
        })?),
        BackendKind::Auto => unreachable!("auto resolved by select_kind"),
    };

    info!(
        backend = backend.name(),
        model = backend.model_name(),
        "resolved backend"
    );
    Ok(backend)
}

/// Capability description for the resolved backend, answered to `describe`.
pub fn server_info(backend: &dyn SttBackend) -> ServerInfo {
    ServerInfo {
        program: backend.name().to_string(),
        description: format!("Whisper transcription using {}", backend.name()),
        model: backend.model_name().to_string(),
        languages: backend.supported_languages(),
        attribution: backend.attribution(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}
