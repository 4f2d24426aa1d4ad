use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Telegram chat id. Negative for groups/supergroups/channels, positive for
/// private chats — kept as a signed integer rather than a newtype-over-u64
/// because the sign itself is meaningful to callers.
pub type ChatId = i64;

/// Telegram user id. Always positive; kept as a bare alias (not wrapped)
/// because it crosses the persistence/admission/agent boundary constantly
/// and every call site already disambiguates by parameter name.
pub type UserId = i64;

/// Role of a single message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Kind of rolling chat summary window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    SevenDay,
    ThirtyDay,
}

impl WindowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::SevenDay => "7d",
            WindowKind::ThirtyDay => "30d",
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            WindowKind::SevenDay => 7,
            WindowKind::ThirtyDay => 30,
        }
    }
}

impl std::str::FromStr for WindowKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(WindowKind::SevenDay),
            "30d" => Ok(WindowKind::ThirtyDay),
            other => Err(format!("unknown window kind: {other}")),
        }
    }
}

/// Media kind attached to a message or produced by a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Document,
    Video,
    Audio,
    Voice,
    Sticker,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MediaKind::Photo => "photo",
            MediaKind::Document => "document",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Voice => "voice",
            MediaKind::Sticker => "sticker",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" => Ok(MediaKind::Photo),
            "document" => Ok(MediaKind::Document),
            "video" => Ok(MediaKind::Video),
            "audio" => Ok(MediaKind::Audio),
            "voice" => Ok(MediaKind::Voice),
            "sticker" => Ok(MediaKind::Sticker),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

/// Source of truth for "now", injected everywhere admission windows, TTLs,
/// and retention cutoffs are computed so tests can control time instead of
/// racing the wall clock.
pub trait Clock: Send + Sync {
    /// Current unix time in whole seconds.
    fn now_unix(&self) -> i64;
}

/// Production clock — reads the real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Deterministic clock for tests — starts at a fixed instant and only moves
/// when explicitly advanced.
#[derive(Debug)]
pub struct FixedClock {
    now: std::sync::atomic::AtomicI64,
}

impl FixedClock {
    pub fn new(now_unix: i64) -> Self {
        Self {
            now: std::sync::atomic::AtomicI64::new(now_unix),
        }
    }

    pub fn advance(&self, secs: i64) {
        self.now
            .fetch_add(secs, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set(&self, now_unix: i64) {
        self.now.store(now_unix, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.now.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Role granted to a caller for tool-permission and admin-endpoint checks.
/// Admin bypasses quota/budget checks; user is subject to all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

impl UserRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::User => write!(f, "user"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "user" => Ok(UserRole::User),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances_explicitly() {
        let clock = FixedClock::new(1_000);
        assert_eq!(clock.now_unix(), 1_000);
        clock.advance(60);
        assert_eq!(clock.now_unix(), 1_060);
        clock.set(5_000);
        assert_eq!(clock.now_unix(), 5_000);
    }

    #[test]
    fn window_kind_roundtrips() {
        assert_eq!("7d".parse::<WindowKind>().unwrap().as_str(), "7d");
        assert_eq!("30d".parse::<WindowKind>().unwrap().as_str(), "30d");
        assert!("90d".parse::<WindowKind>().is_err());
    }

    #[test]
    fn role_roundtrips() {
        assert_eq!("admin".parse::<UserRole>().unwrap().to_string(), "admin");
        assert!(UserRole::Admin.is_admin());
        assert!(!UserRole::User.is_admin());
    }
}
