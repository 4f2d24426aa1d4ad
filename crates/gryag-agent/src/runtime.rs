//! Central agent runtime — holds the LLM provider and the default model
//! name, shared across requests via `Arc` in the gateway's `AppState`.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::capability;
use crate::provider::{LlmProvider, ModelCapabilities};

pub struct AgentRuntime {
    provider: Arc<dyn LlmProvider>,
    default_model: RwLock<String>,
}

impl AgentRuntime {
    pub fn new(provider: impl Into<Arc<dyn LlmProvider>>, default_model: String) -> Self {
        Self { provider: provider.into(), default_model: RwLock::new(default_model) }
    }

    pub async fn model(&self) -> String {
        self.default_model.read().await.clone()
    }

    /// Swaps the default model, returning the previous value.
    pub async fn set_model(&self, model: String) -> String {
        let mut guard = self.default_model.write().await;
        std::mem::replace(&mut *guard, model)
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    /// A cloned handle to the provider for callers (the tool registry) that
    /// need to hold it beyond the runtime's own borrow.
    pub fn provider_arc(&self) -> Arc<dyn LlmProvider> {
        Arc::clone(&self.provider)
    }

    pub async fn capabilities(&self) -> ModelCapabilities {
        capability::probe(&self.model().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatRequest, Completion, FinishReason, FunctionCall, Usage};
    use async_trait::async_trait;

    struct StubProvider;

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        fn capabilities(&self) -> ModelCapabilities {
            ModelCapabilities::default()
        }
        async fn generate(&self, _request: &ChatRequest) -> crate::error::Result<Completion> {
            Ok(Completion {
                finish_reason: FinishReason::Stop,
                text: Some("ok".to_string()),
                tool_calls: Vec::<FunctionCall>::new(),
                safety_reason: None,
                usage: Usage::default(),
            })
        }
    }

    #[tokio::test]
    async fn set_model_returns_previous_value() {
        let runtime = AgentRuntime::new(Box::new(StubProvider) as Box<dyn LlmProvider>, "claude-sonnet-4-6".to_string());
        let previous = runtime.set_model("claude-haiku-4-6".to_string()).await;
        assert_eq!(previous, "claude-sonnet-4-6");
        assert_eq!(runtime.model().await, "claude-haiku-4-6");
    }

    #[tokio::test]
    async fn capabilities_reflect_current_model() {
        let runtime = AgentRuntime::new(Box::new(StubProvider) as Box<dyn LlmProvider>, "claude-sonnet-4-6".to_string());
        assert!(runtime.capabilities().await.function_calling);
    }
}
