//! `generate_image` / `edit_image` (spec.md §4.4): HTTP-backed image tools
//! behind a provider trait, generalized from the teacher's Anthropic-style
//! request/response shape.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use gryag_core::config::ToolCredential;
use gryag_core::types::Clock;
use gryag_persistence::types::MediaCacheEntry;
use gryag_persistence::Repository;

use super::{QuotaPolicy, Tool, ToolOutcome};

/// TTL applied to media cache entries created by `generate_image`/`edit_image`
/// (spec.md §3 `MediaCacheEntry` "expired by TTL sweep"; §4.7 media cache
/// sweeper).
const GENERATED_MEDIA_TTL_SECS: i64 = 7 * 86_400;

/// Persists generated bytes as a local-ref media cache entry and returns
/// its id (spec.md §4.4: `generate_image`/`edit_image` "Returns media_id;
/// caches entry"). Local byte retention itself — where `local_ref` points —
/// is an external collaborator; this only records the reference.
fn cache_generated_image(
    repository: &Repository,
    image: &GeneratedImage,
    clock: &dyn Clock,
) -> Result<String, String> {
    let now = clock.now_unix();
    let media_id = uuid::Uuid::new_v4().to_string();
    let entry = MediaCacheEntry {
        media_id: media_id.clone(),
        mime: image.mime.clone(),
        external_source_ref: None,
        local_ref: Some(format!("generated://{media_id}")),
        width: None,
        height: None,
        duration_secs: None,
        created_at: now,
        ttl_secs: GENERATED_MEDIA_TTL_SECS,
    };
    repository.put_media(&entry).map_err(|e| e.to_string())
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate(&self, prompt: &str, aspect_ratio: Option<&str>) -> Result<GeneratedImage, String>;
    async fn edit(
        &self,
        prompt: &str,
        source: &[u8],
        source_mime: &str,
        aspect_ratio: Option<&str>,
    ) -> Result<GeneratedImage, String>;
}

pub struct HttpImageProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpImageProvider {
    pub fn new(credential: ToolCredential) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: credential
                .base_url
                .unwrap_or_else(|| "https://api.anthropic.com/v1/images".to_string()),
            api_key: credential.api_key,
        }
    }
}

#[derive(Deserialize)]
struct ImageApiResponse {
    mime_type: String,
    data: String,
}

#[async_trait]
impl ImageProvider for HttpImageProvider {
    async fn generate(&self, prompt: &str, aspect_ratio: Option<&str>) -> Result<GeneratedImage, String> {
        let mut body = json!({"prompt": prompt});
        if let Some(ratio) = aspect_ratio {
            body["aspect_ratio"] = json!(ratio);
        }
        self.post(&self.base_url, &body).await
    }

    async fn edit(
        &self,
        prompt: &str,
        source: &[u8],
        source_mime: &str,
        aspect_ratio: Option<&str>,
    ) -> Result<GeneratedImage, String> {
        let mut body = json!({
            "prompt": prompt,
            "image": {
                "mime_type": source_mime,
                "data": base64::engine::general_purpose::STANDARD.encode(source),
            },
        });
        // Aspect ratio is left unset when the caller doesn't specify one, so
        // the backend preserves the source image's own ratio.
        if let Some(ratio) = aspect_ratio {
            body["aspect_ratio"] = json!(ratio);
        }
        self.post(&format!("{}/edits", self.base_url), &body).await
    }
}

impl HttpImageProvider {
    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<GeneratedImage, String> {
        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("image backend returned {}", response.status()));
        }

        let parsed: ImageApiResponse = response.json().await.map_err(|e| e.to_string())?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(parsed.data)
            .map_err(|e| e.to_string())?;
        Ok(GeneratedImage { mime: parsed.mime_type, bytes })
    }
}

pub struct GenerateImageTool {
    provider: Arc<dyn ImageProvider>,
    repository: Arc<Repository>,
    clock: Arc<dyn Clock>,
    quota_policy: QuotaPolicy,
}

impl GenerateImageTool {
    pub fn new(
        provider: Arc<dyn ImageProvider>,
        repository: Arc<Repository>,
        clock: Arc<dyn Clock>,
        quota_policy: QuotaPolicy,
    ) -> Self {
        Self { provider, repository, clock, quota_policy }
    }
}

#[async_trait]
impl Tool for GenerateImageTool {
    fn name(&self) -> &str {
        "generate_image"
    }

    fn description(&self) -> &str {
        "Generate a new image from a text prompt"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string"},
                "aspect_ratio": {"type": "string"},
            },
            "required": ["prompt"],
        })
    }

    fn quota_policy(&self) -> QuotaPolicy {
        self.quota_policy
    }

    async fn execute(&self, input: serde_json::Value) -> ToolOutcome {
        let Some(prompt) = input.get("prompt").and_then(|v| v.as_str()) else {
            return ToolOutcome::InvalidArgument { detail: "prompt must be a string".to_string() };
        };
        let aspect_ratio = input.get("aspect_ratio").and_then(|v| v.as_str());

        match self.provider.generate(prompt, aspect_ratio).await {
            Ok(image) => match cache_generated_image(&self.repository, &image, self.clock.as_ref()) {
                Ok(media_id) => ToolOutcome::Ok {
                    result: json!({"media_id": media_id, "mime": image.mime}),
                },
                Err(message) => ToolOutcome::Error { kind: "media_cache_failed".to_string(), message },
            },
            Err(message) => ToolOutcome::Error { kind: "image_generation_failed".to_string(), message },
        }
    }
}

/// Resolves the source bytes for `edit_image`: a cached media id, or the
/// most recent image in the chat's multi-media buffer.
#[async_trait]
pub trait EditSourceResolver: Send + Sync {
    async fn resolve(&self, media_id: Option<&str>, use_context_image: bool) -> Result<(Vec<u8>, String), String>;
}

pub struct EditImageTool {
    provider: Arc<dyn ImageProvider>,
    resolver: Arc<dyn EditSourceResolver>,
    repository: Arc<Repository>,
    clock: Arc<dyn Clock>,
    quota_policy: QuotaPolicy,
}

impl EditImageTool {
    pub fn new(
        provider: Arc<dyn ImageProvider>,
        resolver: Arc<dyn EditSourceResolver>,
        repository: Arc<Repository>,
        clock: Arc<dyn Clock>,
        quota_policy: QuotaPolicy,
    ) -> Self {
        Self { provider, resolver, repository, clock, quota_policy }
    }
}

#[async_trait]
impl Tool for EditImageTool {
    fn name(&self) -> &str {
        "edit_image"
    }

    fn description(&self) -> &str {
        "Edit an existing image by media id or the chat's current context image"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string"},
                "media_id": {"type": "string"},
                "use_context_image": {"type": "boolean"},
                "aspect_ratio": {"type": "string"},
            },
            "required": ["prompt"],
        })
    }

    fn quota_policy(&self) -> QuotaPolicy {
        self.quota_policy
    }

    async fn execute(&self, input: serde_json::Value) -> ToolOutcome {
        let Some(prompt) = input.get("prompt").and_then(|v| v.as_str()) else {
            return ToolOutcome::InvalidArgument { detail: "prompt must be a string".to_string() };
        };
        let media_id = input.get("media_id").and_then(|v| v.as_str());
        let use_context_image = input.get("use_context_image").and_then(|v| v.as_bool()).unwrap_or(false);
        if media_id.is_none() && !use_context_image {
            return ToolOutcome::InvalidArgument {
                detail: "one of media_id or use_context_image must be given".to_string(),
            };
        }
        let aspect_ratio = input.get("aspect_ratio").and_then(|v| v.as_str());

        let (source, source_mime) = match self.resolver.resolve(media_id, use_context_image).await {
            Ok(pair) => pair,
            Err(message) => return ToolOutcome::Error { kind: "source_not_found".to_string(), message },
        };

        match self.provider.edit(prompt, &source, &source_mime, aspect_ratio).await {
            Ok(image) => match cache_generated_image(&self.repository, &image, self.clock.as_ref()) {
                Ok(media_id) => ToolOutcome::Ok {
                    result: json!({"media_id": media_id, "mime": image.mime}),
                },
                Err(message) => ToolOutcome::Error { kind: "media_cache_failed".to_string(), message },
            },
            Err(message) => ToolOutcome::Error { kind: "image_edit_failed".to_string(), message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct StubProvider;

    #[async_trait]
    impl ImageProvider for StubProvider {
        async fn generate(&self, _prompt: &str, _aspect_ratio: Option<&str>) -> Result<GeneratedImage, String> {
            Ok(GeneratedImage { mime: "image/png".to_string(), bytes: vec![1, 2, 3] })
        }
        async fn edit(
            &self,
            _prompt: &str,
            _source: &[u8],
            _source_mime: &str,
            _aspect_ratio: Option<&str>,
        ) -> Result<GeneratedImage, String> {
            Ok(GeneratedImage { mime: "image/png".to_string(), bytes: vec![4, 5, 6] })
        }
    }

    struct StubResolver;

    #[async_trait]
    impl EditSourceResolver for StubResolver {
        async fn resolve(&self, _media_id: Option<&str>, _use_context_image: bool) -> Result<(Vec<u8>, String), String> {
            Ok((vec![9, 9, 9], "image/jpeg".to_string()))
        }
    }

    fn test_repository() -> Arc<Repository> {
        Arc::new(Repository::new_in_memory().unwrap())
    }

    fn test_clock() -> Arc<dyn Clock> {
        Arc::new(gryag_core::types::FixedClock::new(1_700_000_000))
    }

    #[tokio::test]
    async fn generate_image_returns_media_id() {
        let tool = GenerateImageTool::new(
            Arc::new(StubProvider),
            test_repository(),
            test_clock(),
            QuotaPolicy::NONE,
        );
        let outcome = tool.execute(json!({"prompt": "a cat"})).await;
        match outcome {
            ToolOutcome::Ok { result } => assert!(result.get("media_id").is_some()),
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn edit_image_requires_a_source() {
        let tool = EditImageTool::new(
            Arc::new(StubProvider),
            Arc::new(StubResolver),
            test_repository(),
            test_clock(),
            QuotaPolicy::NONE,
        );
        let outcome = tool.execute(json!({"prompt": "make it blue"})).await;
        assert!(matches!(outcome, ToolOutcome::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn edit_image_with_context_image_succeeds() {
        let tool = EditImageTool::new(
            Arc::new(StubProvider),
            Arc::new(StubResolver),
            test_repository(),
            test_clock(),
            QuotaPolicy::NONE,
        );
        let outcome = tool
            .execute(json!({"prompt": "make it blue", "use_context_image": true}))
            .await;
        assert!(matches!(outcome, ToolOutcome::Ok { .. }));
    }
}
