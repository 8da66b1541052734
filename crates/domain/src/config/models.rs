//! Model-capability configuration — which concrete model backs each tier.

use serde::{Deserialize, Serialize};

use crate::model::ModelTier;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Base URL of an OpenAI-compatible chat completions endpoint.
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key. If unset at runtime the
    /// CLI falls back to the offline scripted provider.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    /// Request timeout for a single completion.
    #[serde(default = "d_request_timeout_s")]
    pub request_timeout_s: u64,
    #[serde(default = "d_small")]
    pub small: String,
    #[serde(default = "d_medium")]
    pub medium: String,
    #[serde(default = "d_large")]
    pub large: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            api_key_env: d_api_key_env(),
            request_timeout_s: d_request_timeout_s(),
            small: d_small(),
            medium: d_medium(),
            large: d_large(),
        }
    }
}

impl ModelsConfig {
    /// Concrete model id for a tier.
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Small => &self.small,
            ModelTier::Medium => &self.medium,
            ModelTier::Large => &self.large,
        }
    }
}

fn d_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}

fn d_api_key_env() -> String {
    "QUORUM_API_KEY".into()
}

fn d_request_timeout_s() -> u64 {
    60
}

fn d_small() -> String {
    "meta-llama/llama-3.1-8b-instruct".into()
}

fn d_medium() -> String {
    "meta-llama/llama-3.3-70b-instruct".into()
}

fn d_large() -> String {
    "deepseek/deepseek-chat".into()
}
