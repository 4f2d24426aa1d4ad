//! Provider-neutral LLM client contract (spec.md §4.3): one primitive,
//! `generate`, hiding model-specific wire formats behind `Part`/`Turn`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One unit of turn content. `inline_media` carries raw bytes for small
/// attachments; `file_ref` points at something the provider fetches itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    InlineMedia {
        mime: String,
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
        caption: Option<String>,
    },
    FileRef {
        mime: String,
        uri: String,
        caption: Option<String>,
    },
    FunctionCall {
        id: String,
        name: String,
        args: serde_json::Value,
    },
    FunctionResult {
        id: String,
        name: String,
        result: serde_json::Value,
        is_error: bool,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn is_media(&self) -> bool {
        matches!(self, Part::InlineMedia { .. } | Part::FileRef { .. })
    }

    pub fn is_video(&self) -> bool {
        match self {
            Part::InlineMedia { mime, .. } | Part::FileRef { mime, .. } => {
                mime.starts_with("video/")
            }
            _ => false,
        }
    }

    pub fn mime(&self) -> Option<&str> {
        match self {
            Part::InlineMedia { mime, .. } | Part::FileRef { mime, .. } => Some(mime),
            _ => None,
        }
    }
}

mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        use base64::Engine;
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        use base64::Engine;
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Turn {
            role: Role::Assistant,
            parts: vec![Part::text(text)],
        }
    }
}

/// JSON-schema tool declaration sent to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Temperature preset driving §4.3's two generation modes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    Creative,
    DeterministicRouting,
}

impl GenerationMode {
    pub fn temperature(self) -> f32 {
        match self {
            GenerationMode::Creative => 0.9,
            GenerationMode::DeterministicRouting => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system_instruction: String,
    pub history: Vec<Turn>,
    pub tools: Vec<ToolSchema>,
    pub generation_mode: GenerationMode,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    Safety,
    ToolCall,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub finish_reason: FinishReason,
    pub text: Option<String>,
    pub tool_calls: Vec<FunctionCall>,
    pub safety_reason: Option<String>,
    pub usage: Usage,
}

/// Flags a model advertises on initialization (spec.md §4.3 capability probing).
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelCapabilities {
    pub function_calling: bool,
    pub audio_input: bool,
    pub video_input: bool,
}

/// Provider-neutral wrapper exposing one primitive, `generate`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> ModelCapabilities;

    async fn generate(&self, request: &ChatRequest) -> Result<Completion>;
}

/// Strip parts the active model cannot ingest, replacing each with a text
/// placeholder and logging once per dropped part (spec.md §4.3).
pub fn filter_unsupported_parts(turns: &mut [Turn], caps: ModelCapabilities) {
    for turn in turns.iter_mut() {
        for part in turn.parts.iter_mut() {
            let unsupported = match part {
                Part::InlineMedia { mime, .. } | Part::FileRef { mime, .. } => {
                    (mime.starts_with("audio/") && !caps.audio_input)
                        || (mime.starts_with("video/") && !caps.video_input)
                }
                _ => false,
            };
            if unsupported {
                let (mime, caption) = match part {
                    Part::InlineMedia { mime, caption, .. }
                    | Part::FileRef { mime, caption, .. } => (mime.clone(), caption.clone()),
                    _ => unreachable!(),
                };
                tracing::warn!(mime = %mime, "dropping media part unsupported by model");
                *part = Part::Text {
                    text: placeholder_for(&mime, caption.as_deref()),
                };
            }
        }
    }
}

pub fn placeholder_for(mime: &str, caption: Option<&str>) -> String {
    let kind = if mime.starts_with("video/") {
        "video"
    } else if mime.starts_with("audio/") {
        "audio"
    } else {
        "image"
    };
    match caption {
        Some(c) if !c.is_empty() => format!("[{kind}: {c}]"),
        _ => format!("[{kind}]"),
    }
}

pub(crate) fn map_http_status(status: u16, retry_after_ms: Option<u64>, body: String) -> AgentError {
    match status {
        429 => AgentError::RateLimited {
            retry_after_ms: retry_after_ms.unwrap_or(5_000),
        },
        503 | 502 | 500 => AgentError::Transient(body),
        400 => AgentError::InvalidRequest(body),
        _ => AgentError::ProviderUnavailable(format!("status {status}: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_modes_map_to_expected_temperatures() {
        assert_eq!(GenerationMode::Creative.temperature(), 0.9);
        assert_eq!(GenerationMode::DeterministicRouting.temperature(), 0.0);
    }

    #[test]
    fn filter_drops_unsupported_video_with_placeholder() {
        let mut turns = vec![Turn {
            role: Role::User,
            parts: vec![Part::FileRef {
                mime: "video/mp4".to_string(),
                uri: "ref://1".to_string(),
                caption: Some("cat".to_string()),
            }],
        }];
        filter_unsupported_parts(&mut turns, ModelCapabilities::default());
        match &turns[0].parts[0] {
            Part::Text { text } => assert_eq!(text, "[video: cat]"),
            other => panic!("expected placeholder text, got {other:?}"),
        }
    }

    #[test]
    fn filter_keeps_supported_media() {
        let mut turns = vec![Turn {
            role: Role::User,
            parts: vec![Part::FileRef {
                mime: "audio/ogg".to_string(),
                uri: "ref://1".to_string(),
                caption: None,
            }],
        }];
        filter_unsupported_parts(
            &mut turns,
            ModelCapabilities {
                audio_input: true,
                ..Default::default()
            },
        );
        assert!(turns[0].parts[0].is_media());
    }
}
