//! Scripted provider — deterministic model stand-in for tests and
//! offline runs.

use std::collections::VecDeque;

use parking_lot::Mutex;

use qm_domain::error::Result;

use crate::traits::{CompletionRequest, CompletionResponse, ModelProvider};

type Handler = Box<dyn Fn(&CompletionRequest) -> Result<String> + Send + Sync>;

/// A provider that answers from a script instead of the network.
///
/// Resolution order per call: the handler (if set), then the FIFO queue,
/// then the built-in default (quiet JSON for `json_output` requests, a
/// short canned sentence otherwise).
pub struct ScriptedProvider {
    id: String,
    queue: Mutex<VecDeque<String>>,
    handler: Option<Handler>,
    calls: Mutex<u64>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            id: "scripted".into(),
            queue: Mutex::new(VecDeque::new()),
            handler: None,
            calls: Mutex::new(0),
        }
    }

    /// Route every request through `f`. Used by tests that key responses
    /// off the prompt content.
    pub fn with_handler<F>(f: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            id: "scripted".into(),
            queue: Mutex::new(VecDeque::new()),
            handler: Some(Box::new(f)),
            calls: Mutex::new(0),
        }
    }

    /// Queue a canned response, consumed in FIFO order.
    pub fn push(&self, response: impl Into<String>) {
        self.queue.lock().push_back(response.into());
    }

    /// Total completed calls.
    pub fn call_count(&self) -> u64 {
        *self.calls.lock()
    }

    fn default_response(req: &CompletionRequest) -> String {
        if req.json_output {
            r#"{"observation": "Quiet", "urgency": 0, "confidence": 0, "claims": []}"#.into()
        } else {
            "I'm here and listening.".into()
        }
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ModelProvider for ScriptedProvider {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse> {
        let content = if let Some(handler) = &self.handler {
            handler(&req)?
        } else if let Some(queued) = self.queue.lock().pop_front() {
            queued
        } else {
            Self::default_response(&req)
        };

        *self.calls.lock() += 1;

        let prompt_tokens: usize = req.messages.iter().map(|m| m.content.len() / 4).sum();
        Ok(CompletionResponse {
            completion_tokens: (content.len() / 4) as u32,
            prompt_tokens: prompt_tokens as u32,
            reasoning_tokens: None,
            latency_ms: 0,
            model: "scripted".into(),
            content,
        })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qm_domain::model::{ChatMessage, ModelTier};

    #[tokio::test]
    async fn queue_drains_before_default() {
        let p = ScriptedProvider::new();
        p.push("first");
        p.push("second");

        let req = CompletionRequest::new(vec![ChatMessage::user("x")], ModelTier::Small);
        assert_eq!(p.complete(req.clone()).await.unwrap().content, "first");
        assert_eq!(p.complete(req.clone()).await.unwrap().content, "second");
        assert_eq!(
            p.complete(req).await.unwrap().content,
            "I'm here and listening."
        );
        assert_eq!(p.call_count(), 3);
    }

    #[tokio::test]
    async fn json_requests_default_to_quiet() {
        let p = ScriptedProvider::new();
        let req =
            CompletionRequest::new(vec![ChatMessage::user("x")], ModelTier::Small).json();
        let resp = p.complete(req).await.unwrap();
        assert!(resp.content.contains("Quiet"));
    }

    #[tokio::test]
    async fn handler_overrides_queue() {
        let p = ScriptedProvider::with_handler(|req| {
            Ok(format!("echo: {}", req.messages.last().unwrap().content))
        });
        p.push("ignored");
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")], ModelTier::Medium);
        assert_eq!(p.complete(req).await.unwrap().content, "echo: hi");
    }
}
