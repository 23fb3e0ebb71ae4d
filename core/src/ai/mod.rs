//! Ollama integration: connection probing, prompt construction and the
//! streaming `/api/generate` client.

pub mod client;
pub mod prompt;
pub mod stream;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use client::{OllamaChecker, OllamaClient, OllamaTimeouts};
pub use prompt::{build_prompt, moving_yao_description, InterpretationRequest};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1500;

/// User-facing AI configuration, persisted field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    pub enabled: bool,
    pub ollama_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

pub fn default_ai_settings() -> AiSettings {
    AiSettings::default()
}

/// Entry of the `/api/tags` model list. Unknown fields are kept as-is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OllamaModel {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OllamaStatus {
    pub connected: bool,
    #[serde(default)]
    pub models: Vec<OllamaModel>,
}

/// Canonical hexagram texts used as prompt input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Hexagram {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub guaci: String,
    pub tuanci: String,
    pub xiangci: String,
}
