//! `search_web` (spec.md §4.4): a thin HTTP lookup behind a provider trait,
//! mirroring the shape of the `LlmProvider` abstraction so the concrete
//! search backend can be swapped without touching the tool loop.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use gryag_core::config::ToolCredential;

use super::{QuotaPolicy, Tool, ToolOutcome};

#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, String>;
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Brave-style search endpoint: `GET {base_url}?q=...` with an API key
/// header, returning a `web.results[]` array.
pub struct HttpWebSearchProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpWebSearchProvider {
    pub fn new(credential: ToolCredential) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: credential
                .base_url
                .unwrap_or_else(|| "https://api.search.brave.com/res/v1/web/search".to_string()),
            api_key: credential.api_key,
        }
    }
}

#[derive(Deserialize)]
struct BraveResponse {
    web: Option<BraveWeb>,
}

#[derive(Deserialize)]
struct BraveWeb {
    results: Vec<BraveResult>,
}

#[derive(Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

#[async_trait]
impl WebSearchProvider for HttpWebSearchProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, String> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query)])
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("search backend returned {}", response.status()));
        }

        let parsed: BraveResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(parsed
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchResult { title: r.title, url: r.url, snippet: r.description })
            .collect())
    }
}

pub struct SearchWebTool {
    provider: Box<dyn WebSearchProvider>,
    quota_policy: QuotaPolicy,
}

impl SearchWebTool {
    pub fn new(provider: Box<dyn WebSearchProvider>, quota_policy: QuotaPolicy) -> Self {
        Self { provider, quota_policy }
    }
}

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Search the public web for a query and return titles, URLs, and snippets"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"],
        })
    }

    fn quota_policy(&self) -> QuotaPolicy {
        self.quota_policy
    }

    async fn execute(&self, input: serde_json::Value) -> ToolOutcome {
        let Some(query) = input.get("query").and_then(|v| v.as_str()) else {
            return ToolOutcome::InvalidArgument { detail: "query must be a string".to_string() };
        };
        if query.trim().is_empty() {
            return ToolOutcome::InvalidArgument { detail: "query must not be empty".to_string() };
        }

        match self.provider.search(query).await {
            Ok(results) => ToolOutcome::Ok { result: json!({"results": results}) },
            Err(message) => ToolOutcome::Error { kind: "search_failed".to_string(), message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider(Vec<SearchResult>);

    #[async_trait]
    impl WebSearchProvider for StubProvider {
        async fn search(&self, _query: &str) -> Result<Vec<SearchResult>, String> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn rejects_empty_query() {
        let tool = SearchWebTool::new(Box::new(StubProvider(vec![])), QuotaPolicy::NONE);
        let outcome = tool.execute(json!({"query": "  "})).await;
        assert!(matches!(outcome, ToolOutcome::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn returns_results_from_provider() {
        let results = vec![SearchResult {
            title: "Rust".to_string(),
            url: "https://rust-lang.org".to_string(),
            snippet: "A systems language".to_string(),
        }];
        let tool = SearchWebTool::new(Box::new(StubProvider(results)), QuotaPolicy::NONE);
        let outcome = tool.execute(json!({"query": "rust"})).await;
        match outcome {
            ToolOutcome::Ok { result } => assert_eq!(result["results"].as_array().unwrap().len(), 1),
            other => panic!("expected Ok, got {other:?}"),
        }
    }
}
