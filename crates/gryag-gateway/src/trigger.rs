//! Trigger/addressing semantics (spec.md §4.6): decide whether an admitted
//! message should drive generation. The message is always persisted and
//! admission always consumes quota regardless of the outcome here — only
//! step 3 onward (instruction build + tool loop) is skipped.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Triggers {
    #[serde(default)]
    pub mentioned: bool,
    #[serde(default)]
    pub reply_to_bot: bool,
    #[serde(default)]
    pub is_private: bool,
    /// Set on the synthesized request the proactive-messaging job sends to
    /// itself, never by a real inbound Telegram message (spec.md §9 Open
    /// Question: "role=system trigger").
    #[serde(default)]
    pub system: bool,
}

impl Triggers {
    /// True when any configured trigger pattern matches — name mention,
    /// reply-to-bot, a private chat, or a proactive-job's system trigger
    /// (spec.md §4.6).
    pub fn matches(&self) -> bool {
        self.mentioned || self.reply_to_bot || self.is_private || self.system
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_trigger_does_not_match() {
        assert!(!Triggers::default().matches());
    }

    #[test]
    fn private_chat_always_matches() {
        let t = Triggers { is_private: true, ..Default::default() };
        assert!(t.matches());
    }

    #[test]
    fn mention_or_reply_matches() {
        assert!(Triggers { mentioned: true, ..Default::default() }.matches());
        assert!(Triggers { reply_to_bot: true, ..Default::default() }.matches());
    }
}
