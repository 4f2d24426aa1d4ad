use gryag_core::types::{ChatId, MediaKind, Role, UserId, WindowKind};
use serde::{Deserialize, Serialize};

/// Media attached to a message or produced by a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub kind: MediaKind,
    pub mime: String,
    pub file_ref: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_secs: Option<u32>,
    pub caption: Option<String>,
}

/// A single Telegram message observed by the system (spec.md §3 `Message`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub chat_id: ChatId,
    pub thread_id: Option<i64>,
    pub external_message_id: Option<i64>,
    pub external_user_id: Option<UserId>,
    pub role: Role,
    pub text: Option<String>,
    pub media: Option<MediaDescriptor>,
    pub reply_to_external_message_id: Option<i64>,
    pub reply_to_external_user_id: Option<UserId>,
    pub created_at: i64,
}

/// A new message ready for insertion — no surrogate id yet.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: ChatId,
    pub thread_id: Option<i64>,
    pub external_message_id: Option<i64>,
    pub external_user_id: Option<UserId>,
    pub role: Role,
    pub text: Option<String>,
    pub media: Option<MediaDescriptor>,
    pub reply_to_external_message_id: Option<i64>,
    pub reply_to_external_user_id: Option<UserId>,
    pub created_at: i64,
}

/// Outcome of `upsert_user_fact` (spec.md §3 `UserFact` invariant: silent
/// dedup on insert).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Duplicate,
}

/// A durable claim about a user in a chat (spec.md §3 `UserFact`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFact {
    pub id: i64,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub text: String,
    pub fingerprint: String,
    pub created_at: i64,
}

/// A rolling natural-language condensation over a window (spec.md §3
/// `ChatSummary`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub chat_id: ChatId,
    pub window_kind: WindowKind,
    pub text: String,
    pub refreshed_at: i64,
}

/// A content-addressed reference for generated or uploaded media
/// (spec.md §3 `MediaCacheEntry`). `width`/`height` apply to images and
/// video, `duration_secs` to audio and video; all three are `None` when the
/// source never reported them (spec.md §4.5 block 7's buffer rendering
/// treats a missing dimension/duration as absent, not zero).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaCacheEntry {
    pub media_id: String,
    pub mime: String,
    pub external_source_ref: Option<String>,
    pub local_ref: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_secs: Option<u32>,
    pub created_at: i64,
    pub ttl_secs: i64,
}

/// Normalizes free-form fact text for MD5 fingerprinting: lowercase, trim,
/// collapse internal whitespace. Two facts normalizing to the same string
/// are considered duplicates (spec.md §8 invariant 4, scenario F).
pub fn normalize_fact_text(text: &str) -> String {
    let trimmed = text.trim().trim_end_matches(['.', '!', '?']);
    trimmed
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 16-hex MD5 fingerprint of normalized fact text.
pub fn fingerprint_fact(text: &str) -> String {
    use md5::{Digest, Md5};
    let normalized = normalize_fact_text(text);
    let digest = Md5::digest(normalized.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_case_and_trailing_punctuation_whitespace() {
        let a = fingerprint_fact("lives in Kyiv");
        let b = fingerprint_fact("  Lives in Kyiv ");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn fingerprint_ignores_trailing_sentence_punctuation() {
        let a = fingerprint_fact("lives in Kyiv");
        let b = fingerprint_fact("Lives in Kyiv.");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_distinguishes_different_facts() {
        let a = fingerprint_fact("lives in Kyiv");
        let b = fingerprint_fact("lives in Lviv");
        assert_ne!(a, b);
    }
}
