//! OpenAI-compatible chat-completions client, used in tests and as the
//! default provider when no Anthropic credential is configured.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::provider::{
    map_http_status, ChatRequest, Completion, FinishReason, FunctionCall, LlmProvider,
    ModelCapabilities, Part, Role, Turn, Usage,
};

pub struct GenericProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
    chat_path: String,
    capabilities: ModelCapabilities,
}

impl GenericProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self::with_path(
            "openai-compatible",
            api_key,
            base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
            "/v1/chat/completions".to_string(),
        )
    }

    pub fn with_path(
        name: impl Into<String>,
        api_key: String,
        base_url: String,
        chat_path: String,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider_name: name.into(),
            api_key,
            base_url,
            chat_path,
            capabilities: ModelCapabilities {
                function_calling: true,
                audio_input: false,
                video_input: false,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for GenericProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn capabilities(&self) -> ModelCapabilities {
        self.capabilities
    }

    async fn generate(&self, request: &ChatRequest) -> Result<Completion> {
        let body = build_request_body(request);
        let url = format!("{}{}", self.base_url, self.chat_path);

        debug!(model = %request.model, "sending request to {}", self.provider_name);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000);
            let text = resp.text().await.unwrap_or_default();
            if status != 429 {
                warn!(status, body = %text, provider = %self.provider_name, "provider API error");
            }
            return Err(map_http_status(status, retry_after_ms, text));
        }

        let api_resp: ApiResponse = resp.json().await.map_err(|e| AgentError::Parse(e.to_string()))?;
        Ok(parse_response(api_resp))
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

fn build_request_body(req: &ChatRequest) -> serde_json::Value {
    let mut messages = vec![serde_json::json!({
        "role": "system",
        "content": req.system_instruction,
    })];

    for turn in &req.history {
        messages.push(turn_to_openai(turn));
    }

    let mut body = serde_json::json!({
        "model": req.model,
        "messages": messages,
        "max_tokens": req.max_output_tokens,
        "temperature": req.generation_mode.temperature(),
        "stream": false,
    });

    if !req.tools.is_empty() {
        let tools: Vec<serde_json::Value> = req
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect();
        body["tools"] = serde_json::json!(tools);
    }

    body
}

/// Flattens a `Turn`'s text parts; function calls/results become tool_calls
/// or tool-role messages per OpenAI's flat message model.
fn turn_to_openai(turn: &Turn) -> serde_json::Value {
    let text: String = turn
        .parts
        .iter()
        .filter_map(|p| match p {
            Part::Text { text } => Some(text.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    serde_json::json!({
        "role": role_str(turn.role),
        "content": text,
    })
}

fn parse_response(resp: ApiResponse) -> Completion {
    let choice = resp.choices.into_iter().next();
    let content = choice.as_ref().and_then(|c| c.message.content.clone());

    let tool_calls: Vec<FunctionCall> = choice
        .as_ref()
        .and_then(|c| c.message.tool_calls.as_ref())
        .map(|calls| {
            calls
                .iter()
                .map(|tc| FunctionCall {
                    id: tc.id.clone(),
                    name: tc.function.name.clone(),
                    args: serde_json::from_str(&tc.function.arguments).unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    let raw_reason = choice.and_then(|c| c.finish_reason).unwrap_or_default();
    let finish_reason = match raw_reason.as_str() {
        "tool_calls" => FinishReason::ToolCall,
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::Safety,
        _ => FinishReason::Stop,
    };

    Completion {
        finish_reason,
        text: content,
        tool_calls,
        safety_reason: None,
        usage: Usage {
            prompt_tokens: resp.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
            completion_tokens: resp.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
        },
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_calls_finish_reason_maps_from_openai() {
        let resp = ApiResponse {
            choices: vec![Choice {
                message: ChatMessage {
                    content: None,
                    tool_calls: Some(vec![ApiToolCall {
                        id: "call_1".to_string(),
                        function: ApiFunction {
                            name: "calculator".to_string(),
                            arguments: "{}".to_string(),
                        },
                    }]),
                },
                finish_reason: Some("tool_calls".to_string()),
            }],
            usage: None,
        };
        let completion = parse_response(resp);
        assert_eq!(completion.finish_reason, FinishReason::ToolCall);
        assert_eq!(completion.tool_calls[0].name, "calculator");
    }
}
