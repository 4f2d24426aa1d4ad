//! Anthropic Messages API client — wire format, auth branching, 429 handling.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::provider::{
    map_http_status, ChatRequest, Completion, FinishReason, FunctionCall, LlmProvider,
    ModelCapabilities, Part, Role, Turn, Usage,
};

const API_VERSION: &str = "2023-06-01";
const OAUTH_BETA: &str = "oauth-2025-04-20";
const OAUTH_TOKEN_PREFIX: &str = "sk-ant-oat01-";

pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    is_oauth: bool,
    capabilities: ModelCapabilities,
}

impl AnthropicClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        let is_oauth = api_key.starts_with(OAUTH_TOKEN_PREFIX);
        Self {
            client: reqwest::Client::new(),
            is_oauth,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            // Claude 3.5+ models all advertise function calling and vision;
            // audio input is not yet exposed over the Messages API.
            capabilities: ModelCapabilities {
                function_calling: true,
                audio_input: false,
                video_input: false,
            },
        }
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.is_oauth {
            builder
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("anthropic-beta", OAUTH_BETA)
        } else {
            builder.header("x-api-key", &self.api_key)
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn capabilities(&self) -> ModelCapabilities {
        self.capabilities
    }

    async fn generate(&self, request: &ChatRequest) -> Result<Completion> {
        let body = build_request_body(request);
        let url = format!("{}/v1/messages", self.base_url);

        debug!(model = %request.model, "sending request to anthropic");

        let builder = self
            .client
            .post(&url)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let resp = self.apply_auth(builder).send().await?;
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
                warn!(status, body = %text, "anthropic API error");
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
        Role::System => "user",
    }
}

fn build_request_body(req: &ChatRequest) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = req.history.iter().map(turn_to_anthropic).collect();

    let mut body = serde_json::json!({
        "model": req.model,
        "max_tokens": req.max_output_tokens,
        "system": req.system_instruction,
        "messages": messages,
        "temperature": req.generation_mode.temperature(),
        "stream": false,
    });

    if !req.tools.is_empty() {
        let tools: Vec<serde_json::Value> = req
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();
        body["tools"] = serde_json::Value::Array(tools);
    }

    body
}

fn turn_to_anthropic(turn: &Turn) -> serde_json::Value {
    let blocks: Vec<serde_json::Value> = turn.parts.iter().map(part_to_anthropic).collect();
    serde_json::json!({
        "role": role_str(turn.role),
        "content": blocks,
    })
}

fn part_to_anthropic(part: &Part) -> serde_json::Value {
    match part {
        Part::Text { text } => serde_json::json!({ "type": "text", "text": text }),
        Part::InlineMedia { mime, bytes, .. } => {
            use base64::Engine;
            let data = base64::engine::general_purpose::STANDARD.encode(bytes);
            serde_json::json!({
                "type": "image",
                "source": { "type": "base64", "media_type": mime, "data": data },
            })
        }
        Part::FileRef { mime, uri, .. } => serde_json::json!({
            "type": "image",
            "source": { "type": "url", "media_type": mime, "url": uri },
        }),
        Part::FunctionCall { id, name, args } => serde_json::json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": args,
        }),
        Part::FunctionResult { id, result, is_error, .. } => serde_json::json!({
            "type": "tool_result",
            "tool_use_id": id,
            "content": result.to_string(),
            "is_error": is_error,
        }),
    }
}

fn parse_response(resp: ApiResponse) -> Completion {
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<FunctionCall> = Vec::new();

    for block in resp.content {
        match block {
            ContentBlock::Text { text } => text_parts.push(text),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(FunctionCall { id, name, args: input });
            }
            ContentBlock::Unknown => {}
        }
    }

    let finish_reason = match resp.stop_reason.as_deref() {
        Some("tool_use") => FinishReason::ToolCall,
        Some("max_tokens") => FinishReason::Length,
        Some("stop_sequence") | Some("end_turn") => FinishReason::Stop,
        _ => FinishReason::Stop,
    };

    Completion {
        finish_reason,
        text: if text_parts.is_empty() {
            None
        } else {
            Some(text_parts.join(""))
        },
        tool_calls,
        safety_reason: None,
        usage: Usage {
            prompt_tokens: resp.usage.input_tokens,
            completion_tokens: resp.usage.output_tokens,
        },
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: ApiUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::GenerationMode;

    #[test]
    fn request_body_carries_temperature_from_generation_mode() {
        let req = ChatRequest {
            model: "claude-3-5-sonnet".to_string(),
            system_instruction: "be terse".to_string(),
            history: vec![Turn::user("hi")],
            tools: vec![],
            generation_mode: GenerationMode::DeterministicRouting,
            max_output_tokens: 512,
        };
        let body = build_request_body(&req);
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn stop_reason_tool_use_maps_to_tool_call() {
        let resp = ApiResponse {
            content: vec![ContentBlock::ToolUse {
                id: "1".to_string(),
                name: "calculator".to_string(),
                input: serde_json::json!({}),
            }],
            stop_reason: Some("tool_use".to_string()),
            usage: ApiUsage { input_tokens: 1, output_tokens: 1 },
        };
        let completion = parse_response(resp);
        assert_eq!(completion.finish_reason, FinishReason::ToolCall);
        assert_eq!(completion.tool_calls.len(), 1);
    }
}
