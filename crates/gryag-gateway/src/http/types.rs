//! Wire DTOs for `POST /api/v1/process` (spec.md §6).

use serde::{Deserialize, Serialize};

use crate::trigger::Triggers;

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub chat: ChatDto,
    pub user: UserDto,
    pub message: MessageDto,
    #[serde(default)]
    pub triggers: Triggers,
}

#[derive(Debug, Deserialize)]
pub struct ChatDto {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub title: Option<String>,
    pub thread_id: Option<i64>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

#[derive(Debug, Deserialize)]
pub struct UserDto {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_bot: bool,
}

#[derive(Debug, Deserialize)]
pub struct MessageDto {
    pub id: i64,
    pub date: i64,
    pub text: Option<String>,
    #[serde(default)]
    pub media: Vec<MediaDto>,
    pub reply_to: Option<ReplyToDto>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MediaDto {
    pub kind: String,
    pub mime: String,
    pub file_ref: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<u32>,
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyToDto {
    pub message_id: i64,
    pub user_id: i64,
    pub text: Option<String>,
    pub media: Option<MediaDto>,
}

#[derive(Debug, Serialize, Default)]
pub struct ProcessResponse {
    pub reply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDto>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDto {
    pub kind: String,
    pub message: String,
}

impl ProcessResponse {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn throttled_notice(text: String) -> Self {
        Self {
            reply: Some(text),
            throttled: Some(true),
            ..Default::default()
        }
    }

    pub fn throttled_silent() -> Self {
        Self {
            reply: None,
            throttled: Some(true),
            silent: Some(true),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, kind: &str, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDto {
            kind: kind.to_string(),
            message: message.into(),
        });
        self
    }

    pub fn with_media(mut self, media_id: String, media_kind: &str) -> Self {
        self.media_id = Some(media_id);
        self.media_kind = Some(media_kind.to_string());
        self
    }
}
