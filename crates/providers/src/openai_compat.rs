//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, and any other endpoint
//! that follows the OpenAI chat completions contract. Non-streaming:
//! the orchestrator consumes whole completions.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{json, Value};

use qm_domain::config::ModelsConfig;
use qm_domain::error::{Error, Result};
use qm_domain::model::Role;

use crate::traits::{CompletionRequest, CompletionResponse, ModelProvider};

/// A model adapter for any OpenAI-compatible chat completions API.
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: String,
    config: ModelsConfig,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Build the adapter from the `[models]` config section and the key
    /// read from the configured environment variable.
    pub fn new(config: ModelsConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_s))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            id: "openai-compat".into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            config,
            client,
        })
    }

    fn build_body(&self, req: &CompletionRequest, model: &str) -> Value {
        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({ "role": role, "content": m.content })
            })
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(t) = req.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = req.max_tokens {
            body["max_tokens"] = json!(m);
        }
        if req.json_output {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

// ── Wire response ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    reasoning_tokens: Option<u32>,
}

#[async_trait::async_trait]
impl ModelProvider for OpenAiCompatProvider {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse> {
        let model = self.config.model_for(req.tier).to_string();
        let body = self.build_body(&req, &model);
        let url = format!("{}/chat/completions", self.base_url);

        let started = Instant::now();
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("model call to {model}"))
                } else {
                    Error::Http(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Model {
                provider: self.id.clone(),
                message: format!("{status}: {}", truncate(&text, 300)),
            });
        }

        let wire: WireResponse = resp
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let content = wire
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| Error::Model {
                provider: self.id.clone(),
                message: "response had no choices".into(),
            })?;

        let usage = wire.usage.unwrap_or(WireUsage {
            prompt_tokens: 0,
            completion_tokens: 0,
            reasoning_tokens: None,
        });

        tracing::debug!(
            model = %model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            latency_ms,
            "model call completed"
        );

        Ok(CompletionResponse {
            content,
            model: wire.model.unwrap_or(model),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            reasoning_tokens: usage.reasoning_tokens,
            latency_ms,
        })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qm_domain::model::{ChatMessage, ModelTier};

    #[test]
    fn body_carries_json_mode_and_tier_model() {
        let cfg = ModelsConfig::default();
        let p = OpenAiCompatProvider::new(cfg.clone(), "key".into()).unwrap();
        let req = CompletionRequest::new(
            vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
            ModelTier::Small,
        )
        .json();
        let body = p.build_body(&req, cfg.model_for(ModelTier::Small));
        assert_eq!(body["model"], cfg.small.as_str());
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        let t = truncate(s, 3);
        assert!(t.starts_with('h'));
    }
}
