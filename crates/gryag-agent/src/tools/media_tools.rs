//! `describe_media` / `transcribe_audio` (spec.md §4.4): both delegate to
//! the LLM client's own summarization path with
//! `GenerationMode::DeterministicRouting`, rather than a bespoke vision or
//! ASR backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::provider::{ChatRequest, FinishReason, GenerationMode, LlmProvider, Part, Role, Turn};

use super::{QuotaPolicy, Tool, ToolOutcome};

/// Resolves a stored media id to inline bytes + mime, or falls back to the
/// chat's current context image/audio when no id is given.
#[async_trait]
pub trait MediaLookup: Send + Sync {
    async fn resolve(&self, media_id: Option<&str>) -> Result<(Vec<u8>, String), String>;
}

/// Resolves against `media_cache`: a specific id when given, otherwise the
/// most recently cached entry. Reads `local_ref` from disk or fetches
/// `external_source_ref` over HTTP, whichever the row carries.
pub struct RepositoryMediaLookup {
    repository: Arc<gryag_persistence::Repository>,
    client: reqwest::Client,
}

impl RepositoryMediaLookup {
    pub fn new(repository: Arc<gryag_persistence::Repository>) -> Self {
        Self { repository, client: reqwest::Client::new() }
    }

    async fn fetch(&self, entry: &gryag_persistence::types::MediaCacheEntry) -> Result<(Vec<u8>, String), String> {
        if let Some(path) = &entry.local_ref {
            let bytes = tokio::fs::read(path).await.map_err(|e| e.to_string())?;
            return Ok((bytes, entry.mime.clone()));
        }
        if let Some(url) = &entry.external_source_ref {
            let bytes = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| e.to_string())?
                .bytes()
                .await
                .map_err(|e| e.to_string())?;
            return Ok((bytes.to_vec(), entry.mime.clone()));
        }
        Err(format!("media {} has no retrievable source", entry.media_id))
    }
}

#[async_trait]
impl MediaLookup for RepositoryMediaLookup {
    async fn resolve(&self, media_id: Option<&str>) -> Result<(Vec<u8>, String), String> {
        let entry = match media_id {
            Some(id) => self
                .repository
                .get_media(id)
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("unknown media id: {id}"))?,
            None => self
                .repository
                .recent_media(1)
                .map_err(|e| e.to_string())?
                .into_iter()
                .next()
                .ok_or_else(|| "no media available in this chat".to_string())?,
        };
        self.fetch(&entry).await
    }
}

#[async_trait]
impl super::image::EditSourceResolver for RepositoryMediaLookup {
    async fn resolve(&self, media_id: Option<&str>, use_context_image: bool) -> Result<(Vec<u8>, String), String> {
        if media_id.is_none() && !use_context_image {
            return Err("one of media_id or use_context_image must be given".to_string());
        }
        MediaLookup::resolve(self, media_id).await
    }
}

pub struct DescribeMediaTool {
    provider: Arc<dyn LlmProvider>,
    lookup: Arc<dyn MediaLookup>,
    model: String,
    quota_policy: QuotaPolicy,
}

impl DescribeMediaTool {
    pub fn new(provider: Arc<dyn LlmProvider>, lookup: Arc<dyn MediaLookup>, model: String, quota_policy: QuotaPolicy) -> Self {
        Self { provider, lookup, model, quota_policy }
    }
}

async fn summarize(provider: &dyn LlmProvider, model: &str, bytes: Vec<u8>, mime: String, instruction: &str) -> ToolOutcome {
    let request = ChatRequest {
        model: model.to_string(),
        system_instruction: instruction.to_string(),
        history: vec![Turn {
            role: Role::User,
            parts: vec![Part::InlineMedia { mime, bytes, caption: None }],
        }],
        tools: vec![],
        generation_mode: GenerationMode::DeterministicRouting,
        max_output_tokens: 512,
    };

    match provider.generate(&request).await {
        Ok(completion) if completion.finish_reason == FinishReason::Safety => ToolOutcome::Error {
            kind: "content_blocked".to_string(),
            message: completion.safety_reason.unwrap_or_else(|| "blocked by safety filter".to_string()),
        },
        Ok(completion) => ToolOutcome::Ok { result: json!({"summary": completion.text.unwrap_or_default()}) },
        Err(e) => ToolOutcome::Error { kind: "provider_error".to_string(), message: e.to_string() },
    }
}

#[async_trait]
impl Tool for DescribeMediaTool {
    fn name(&self) -> &str {
        "describe_media"
    }

    fn description(&self) -> &str {
        "Describe the contents of an image or video in plain text"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {"media_id": {"type": "string"}}})
    }

    fn quota_policy(&self) -> QuotaPolicy {
        self.quota_policy
    }

    async fn execute(&self, input: serde_json::Value) -> ToolOutcome {
        let media_id = input.get("media_id").and_then(|v| v.as_str());
        let (bytes, mime) = match self.lookup.resolve(media_id).await {
            Ok(pair) => pair,
            Err(message) => return ToolOutcome::Error { kind: "media_not_found".to_string(), message },
        };
        summarize(self.provider.as_ref(), &self.model, bytes, mime, "Describe this media factually in a few sentences.").await
    }
}

pub struct TranscribeAudioTool {
    provider: Arc<dyn LlmProvider>,
    lookup: Arc<dyn MediaLookup>,
    model: String,
    quota_policy: QuotaPolicy,
}

impl TranscribeAudioTool {
    pub fn new(provider: Arc<dyn LlmProvider>, lookup: Arc<dyn MediaLookup>, model: String, quota_policy: QuotaPolicy) -> Self {
        Self { provider, lookup, model, quota_policy }
    }
}

#[async_trait]
impl Tool for TranscribeAudioTool {
    fn name(&self) -> &str {
        "transcribe_audio"
    }

    fn description(&self) -> &str {
        "Transcribe spoken audio to text"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {"media_id": {"type": "string"}}})
    }

    fn quota_policy(&self) -> QuotaPolicy {
        self.quota_policy
    }

    async fn execute(&self, input: serde_json::Value) -> ToolOutcome {
        let media_id = input.get("media_id").and_then(|v| v.as_str());
        let (bytes, mime) = match self.lookup.resolve(media_id).await {
            Ok(pair) => pair,
            Err(message) => return ToolOutcome::Error { kind: "media_not_found".to_string(), message },
        };
        summarize(self.provider.as_ref(), &self.model, bytes, mime, "Transcribe the spoken words verbatim.").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Completion, FunctionCall, Usage};
    use async_trait::async_trait;

    struct StubProvider;

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn capabilities(&self) -> crate::provider::ModelCapabilities {
            crate::provider::ModelCapabilities::default()
        }

        async fn generate(&self, _request: &ChatRequest) -> crate::error::Result<Completion> {
            Ok(Completion {
                finish_reason: FinishReason::Stop,
                text: Some("a red bicycle".to_string()),
                tool_calls: Vec::<FunctionCall>::new(),
                safety_reason: None,
                usage: Usage::default(),
            })
        }
    }

    struct StubLookup;

    #[async_trait]
    impl MediaLookup for StubLookup {
        async fn resolve(&self, _media_id: Option<&str>) -> Result<(Vec<u8>, String), String> {
            Ok((vec![1, 2, 3], "image/png".to_string()))
        }
    }

    #[tokio::test]
    async fn describe_media_returns_summary_text() {
        let tool = DescribeMediaTool::new(
            Arc::new(StubProvider),
            Arc::new(StubLookup),
            "claude-sonnet-4-6".to_string(),
            QuotaPolicy::NONE,
        );
        let outcome = tool.execute(json!({})).await;
        match outcome {
            ToolOutcome::Ok { result } => assert_eq!(result["summary"], "a red bicycle"),
            other => panic!("expected Ok, got {other:?}"),
        }
    }
}
