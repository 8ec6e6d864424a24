//! Known-model catalog per backend.
//!
//! Each backend has a fixed set of model identifiers it accepts, plus a
//! default used when the configured model is "auto". The accelerated
//! backend additionally accepts arbitrary repo-path identifiers; that
//! policy lives in the registry, not here.

use crate::config::BackendKind;

/// Whisper.cpp ggml models servable by the local and accelerated engines.
pub const LOCAL_MODELS: &[&str] = &[
    "tiny.en", "tiny", "base.en", "base", "small.en", "small", "medium.en", "medium", "large-v2",
    "large-v3",
];

/// Models accepted by the OpenAI transcription API.
pub const OPENAI_MODELS: &[&str] = &["whisper-1", "gpt-4o-transcribe", "gpt-4o-mini-transcribe"];

/// Language codes the multilingual Whisper models understand.
pub const WHISPER_LANGUAGES: &[&str] = &[
    "af", "am", "ar", "as", "az", "ba", "be", "bg", "bn", "bo", "br", "bs", "ca", "cs", "cy", "da",
    "de", "el", "en", "es", "et", "eu", "fa", "fi", "fo", "fr", "gl", "gu", "ha", "haw", "he",
    "hi", "hr", "ht", "hu", "hy", "id", "is", "it", "ja", "jw", "ka", "kk", "km", "kn", "ko", "la",
    "lb", "ln", "lo", "lt", "lv", "mg", "mi", "mk", "ml", "mn", "mr", "ms", "mt", "my", "ne", "nl",
    "nn", "no", "oc", "pa", "pl", "ps", "pt", "ro", "ru", "sa", "sd", "si", "sk", "sl", "sn", "so",
    "sq", "sr", "su", "sv", "sw", "ta", "te", "tg", "th", "tk", "tl", "tr", "tt", "uk", "ur", "uz",
    "vi", "yi", "yo", "zh",
];

/// Supported languages for a model identifier: English-only variants
/// (`.en` suffix) speak English, everything else is multilingual.
pub fn supported_languages(model: &str) -> Vec<String> {
    if model.ends_with(".en") {
        vec!["en".to_string()]
    } else {
        WHISPER_LANGUAGES.iter().map(|s| s.to_string()).collect()
    }
}

/// Known model identifiers for a backend kind.
///
/// `Auto` has no list of its own; the registry resolves it to a concrete
/// kind before validation.
pub fn known_models(kind: BackendKind) -> &'static [&'static str] {
    match kind {
        BackendKind::Local | BackendKind::Coreml => LOCAL_MODELS,
        BackendKind::Openai => OPENAI_MODELS,
        BackendKind::Auto => &[],
    }
}

/// Whether a model identifier is in the backend's known set.
pub fn is_known_model(kind: BackendKind, model: &str) -> bool {
    known_models(kind).contains(&model)
}

/// Default model for a backend, used when the configured model is "auto".
pub fn default_model(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Local | BackendKind::Coreml | BackendKind::Auto => "base",
        BackendKind::Openai => "whisper-1",
    }
}

/// File name a local model identifier maps to under the download dir.
pub fn local_model_file(model: &str) -> String {
    format!("ggml-{}.bin", model)
}
