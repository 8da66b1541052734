use qm_domain::error::Result;
use qm_domain::model::{ChatMessage, ModelTier};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The conversation messages to send.
    pub messages: Vec<ChatMessage>,
    /// Size class to use; the provider maps it to a concrete model.
    pub tier: ModelTier,
    /// When `true`, ask the model to respond with valid JSON only.
    pub json_output: bool,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>, tier: ModelTier) -> Self {
        Self {
            messages,
            tier,
            json_output: false,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn json(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// A provider-agnostic completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Textual content of the response.
    pub content: String,
    /// The model that actually produced the response.
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// Reasoning tokens, when the model reports them.
    pub reasoning_tokens: Option<u32>,
    /// Wall-clock latency of the call.
    pub latency_ms: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every model adapter must implement.
///
/// The engine depends only on this boundary: sensors and critics never
/// call it, agents and voice always go through it, and tests substitute
/// the scripted implementation.
#[async_trait::async_trait]
pub trait ModelProvider: Send + Sync {
    /// Send a completion request and wait for the full response.
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
