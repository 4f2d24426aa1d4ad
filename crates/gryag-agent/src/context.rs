//! Seven-block system instruction assembly (spec.md §4.5). Generalizes the
//! teacher's tiered `PromptBuilder`/`WorkspaceLoader` budget-and-truncate
//! shape: the teacher's per-*file* budget becomes a per-*block* budget here,
//! and `WorkspaceLoader`'s "trim from the last section backwards" becomes
//! "trim the immediate-context block oldest-turn-first, then summaries."

use std::sync::Arc;

use chrono::TimeZone;
use gryag_core::types::{ChatId, Clock, UserId, WindowKind};
use gryag_persistence::types::MediaCacheEntry;
use gryag_persistence::Repository;

use crate::provider::{ModelCapabilities, Part, Role, Turn};

const SEPARATOR: &str = "=== Current message ===";

pub struct BlockBudgets {
    pub time: f32,
    pub tools: f32,
    pub summaries: f32,
    pub context: f32,
    pub facts: f32,
}

impl Default for BlockBudgets {
    fn default() -> Self {
        Self {
            time: 0.05,
            tools: 0.10,
            summaries: 0.20,
            context: 0.50,
            facts: 0.15,
        }
    }
}

pub struct ContextBuilder {
    repository: Arc<Repository>,
    timezone: chrono_tz::Tz,
    context_turns: u32,
    multi_media_k: u32,
    char_budget: usize,
    budgets: BlockBudgets,
}

pub struct CurrentMessage<'a> {
    pub speaker: &'a str,
    pub timestamp: i64,
    pub text: &'a str,
    pub attachments: Vec<String>,
    /// External message id this turn replies to, if any — rendered as a
    /// `[↩ target]` marker ahead of the speaker header (spec.md §4.5 block 5
    /// / §8 scenario C).
    pub reply_to: Option<i64>,
}

impl ContextBuilder {
    pub fn new(
        repository: Arc<Repository>,
        timezone_name: &str,
        context_turns: u32,
        multi_media_k: u32,
        char_budget: usize,
    ) -> Self {
        let timezone = timezone_name.parse().unwrap_or(chrono_tz::Europe::Kyiv);
        Self {
            repository,
            timezone,
            context_turns,
            multi_media_k,
            char_budget,
            budgets: BlockBudgets::default(),
        }
    }

    /// Builds the full instruction text: seven blocks, a separator, then the
    /// rendered current-turn text.
    pub fn build(
        &self,
        chat_id: ChatId,
        thread_id: Option<i64>,
        chat_title: Option<&str>,
        tool_catalog: &[(String, String)],
        user_id: UserId,
        caps: ModelCapabilities,
        current: &CurrentMessage<'_>,
        clock: &dyn Clock,
    ) -> gryag_persistence::Result<String> {
        let time_block = self.render_time_block(chat_id, thread_id, chat_title, clock);
        let tools_block = self.render_tools_block(tool_catalog);
        let summary_30d = self
            .repository
            .get_summary(chat_id, WindowKind::ThirtyDay)?
            .map(|s| s.text);
        let summary_7d = self
            .repository
            .get_summary(chat_id, WindowKind::SevenDay)?
            .map(|s| s.text);
        let mut context_lines =
            self.render_context_block(chat_id, thread_id, caps)?;
        let facts_block = self.render_facts_block(chat_id, user_id)?;
        let media_block = self.render_media_block()?;

        let time_budget = (self.char_budget as f32 * self.budgets.time) as usize;
        let tools_budget = (self.char_budget as f32 * self.budgets.tools) as usize;
        let summaries_budget = (self.char_budget as f32 * self.budgets.summaries) as usize;
        let context_budget = (self.char_budget as f32 * self.budgets.context) as usize;
        let facts_budget = (self.char_budget as f32 * self.budgets.facts) as usize;

        let time_block = truncate_tail(&time_block, time_budget);
        let tools_block = truncate_tail(&tools_block, tools_budget);
        let mut summary_text = join_summaries(summary_30d.as_deref(), summary_7d.as_deref());

        // Overflow: trim immediate-context block oldest-turns-first, then
        // summaries. Blocks 1-2 (time, tools) are always preserved whole.
        while context_lines.join("\n").len() > context_budget && context_lines.len() > 1 {
            context_lines.remove(0);
        }
        if context_lines.join("\n").len() > context_budget {
            context_lines = vec![truncate_tail(&context_lines.join("\n"), context_budget)];
        }
        if summary_text.len() > summaries_budget {
            summary_text = truncate_tail(&summary_text, summaries_budget);
        }
        let facts_block = truncate_tail(&facts_block, facts_budget);

        let mut blocks = vec![time_block, tools_block];
        if !summary_text.is_empty() {
            blocks.push(summary_text);
        }
        blocks.push(format!("Immediate chat context:\n{}", context_lines.join("\n")));
        blocks.push(format!("Current user facts:\n{facts_block}"));
        blocks.push(media_block);

        let mut out = blocks.join("\n\n");
        out.push_str("\n\n");
        out.push_str(SEPARATOR);
        out.push('\n');
        out.push_str(&render_current_message(current));

        Ok(out)
    }

    fn render_time_block(
        &self,
        chat_id: ChatId,
        thread_id: Option<i64>,
        chat_title: Option<&str>,
        clock: &dyn Clock,
    ) -> String {
        let now = self
            .timezone
            .timestamp_opt(clock.now_unix(), 0)
            .single()
            .unwrap_or_else(|| self.timezone.timestamp_opt(0, 0).unwrap());
        let mut line = format!(
            "Current time: {} ({})\nChat id: {chat_id}",
            now.format("%Y-%m-%d %H:%M:%S %Z"),
            self.timezone
        );
        if let Some(title) = chat_title {
            line.push_str(&format!("\nChat title: {title}"));
        }
        if let Some(thread) = thread_id {
            line.push_str(&format!("\nThread id: {thread}"));
        }
        line
    }

    fn render_tools_block(&self, catalog: &[(String, String)]) -> String {
        if catalog.is_empty() {
            return "Available tools:\n(none)".to_string();
        }
        let lines: Vec<String> = catalog
            .iter()
            .map(|(name, desc)| format!("{name} — {desc}"))
            .collect();
        format!("Available tools:\n{}", lines.join("\n"))
    }

    fn render_context_block(
        &self,
        chat_id: ChatId,
        thread_id: Option<i64>,
        caps: ModelCapabilities,
    ) -> gryag_persistence::Result<Vec<String>> {
        let messages = self
            .repository
            .recent_messages(chat_id, thread_id, self.context_turns)?;
        let lines = messages
            .iter()
            .map(|m| render_history_message(m, caps))
            .collect();
        Ok(lines)
    }

    fn render_facts_block(&self, chat_id: ChatId, user_id: UserId) -> gryag_persistence::Result<String> {
        let facts = self.repository.list_user_facts(chat_id, user_id)?;
        if facts.is_empty() {
            return Ok("(none)".to_string());
        }
        Ok(facts
            .iter()
            .map(|f| format!("- {}", f.text))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn render_media_block(&self) -> gryag_persistence::Result<String> {
        let entries = self.repository.recent_media(self.multi_media_k)?;
        if entries.is_empty() {
            return Ok("Multi-media buffer:\n(none)".to_string());
        }
        let lines: Vec<String> = entries
            .iter()
            .map(|e| match render_media_dimensions(e) {
                Some(dims) => format!("{} — {} {}", e.media_id, e.mime, dims),
                None => format!("{} — {}", e.media_id, e.mime),
            })
            .collect();
        Ok(format!("Multi-media buffer:\n{}", lines.join("\n")))
    }
}

/// `{width}×{height}` for an image/video with known dimensions, or
/// `{duration_secs}s` for audio/video with a known duration (spec.md §4.5
/// block 7). `None` when the entry carries neither.
fn render_media_dimensions(entry: &MediaCacheEntry) -> Option<String> {
    match (entry.width, entry.height, entry.duration_secs) {
        (Some(w), Some(h), _) => Some(format!("{w}×{h}")),
        (_, _, Some(d)) => Some(format!("{d}s")),
        _ => None,
    }
}

fn join_summaries(thirty_day: Option<&str>, seven_day: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(t) = thirty_day {
        parts.push(format!("30-day summary:\n{t}"));
    }
    if let Some(s) = seven_day {
        parts.push(format!("7-day summary:\n{s}"));
    }
    parts.join("\n\n")
}

fn render_history_message(msg: &gryag_persistence::types::Message, caps: ModelCapabilities) -> String {
    let speaker = match msg.role {
        gryag_core::types::Role::Assistant => "bot".to_string(),
        _ => msg
            .external_user_id
            .map(|id| format!("user#{id}"))
            .unwrap_or_else(|| "user".to_string()),
    };
    let reply_marker = msg
        .reply_to_external_message_id
        .map(|target| format!("[↩ {target}] "))
        .unwrap_or_default();
    let attachment = msg.media.as_ref().map(|m| {
        let supported = match m.mime.split('/').next() {
            Some("audio") => caps.audio_input,
            Some("video") => caps.video_input,
            _ => true,
        };
        if supported {
            format!(" [{} {}]", m.mime, m.caption.as_deref().unwrap_or(""))
        } else {
            format!(" [{}]", m.kind)
        }
    });
    format!(
        "{reply_marker}[{speaker} | {}]: {}{}",
        msg.created_at,
        msg.text.as_deref().unwrap_or(""),
        attachment.unwrap_or_default()
    )
}

fn render_current_message(current: &CurrentMessage<'_>) -> String {
    let reply_marker = current
        .reply_to
        .map(|target| format!("[↩ {target}] "))
        .unwrap_or_default();
    let mut line = format!(
        "{reply_marker}[{} | {}]: {}",
        current.speaker, current.timestamp, current.text
    );
    for attachment in &current.attachments {
        line.push_str(&format!(" [{attachment}]"));
    }
    line
}

/// Trims to `max_chars`, cutting on a newline boundary where possible.
fn truncate_tail(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars || max_chars == 0 {
        return text.to_string();
    }
    let cut = text[..max_chars]
        .rfind('\n')
        .unwrap_or(max_chars);
    text[..cut].to_string()
}

/// Converts a `Message`/current turn pair into the provider-neutral
/// `Turn` history the LLM client consumes (spec.md §4.3's `Part`/`Turn`).
pub fn history_to_turns(messages: &[gryag_persistence::types::Message]) -> Vec<Turn> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                gryag_core::types::Role::Assistant => Role::Assistant,
                gryag_core::types::Role::System => Role::System,
                gryag_core::types::Role::User => Role::User,
            };
            let mut parts = Vec::new();
            if let Some(text) = &m.text {
                parts.push(Part::text(text.clone()));
            }
            if let Some(media) = &m.media {
                parts.push(Part::FileRef {
                    mime: media.mime.clone(),
                    uri: media.file_ref.clone(),
                    caption: media.caption.clone(),
                });
            }
            if parts.is_empty() {
                parts.push(Part::text(""));
            }
            Turn { role, parts }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gryag_core::types::{FixedClock, Role as CoreRole};
    use gryag_persistence::types::NewMessage;

    fn builder(repo: Arc<Repository>) -> ContextBuilder {
        ContextBuilder::new(repo, "Europe/Kyiv", 15, 10, 24_000)
    }

    #[test]
    fn build_includes_separator_and_current_message() {
        let repo = Arc::new(Repository::new_in_memory().unwrap());
        let cb = builder(repo);
        let clock = FixedClock::new(1_700_000_000);
        let current = CurrentMessage {
            speaker: "user#7",
            timestamp: 1_700_000_000,
            text: "hello there",
            attachments: vec![],
            reply_to: None,
        };
        let out = cb
            .build(-100, None, None, &[], 7, ModelCapabilities::default(), &current, &clock)
            .unwrap();
        assert!(out.contains(SEPARATOR));
        assert!(out.contains("hello there"));
    }

    #[test]
    fn facts_block_renders_bullet_list_when_present() {
        let repo = Arc::new(Repository::new_in_memory().unwrap());
        repo.upsert_user_fact(-100, 7, "lives in Kyiv", 1000).unwrap();
        let cb = builder(repo);
        let clock = FixedClock::new(1_700_000_000);
        let current = CurrentMessage {
            speaker: "user#7",
            timestamp: 1_700_000_000,
            text: "hi",
            attachments: vec![],
            reply_to: None,
        };
        let out = cb
            .build(-100, None, None, &[], 7, ModelCapabilities::default(), &current, &clock)
            .unwrap();
        assert!(out.contains("- lives in Kyiv"));
    }

    #[test]
    fn facts_block_uses_none_literal_when_absent() {
        let repo = Arc::new(Repository::new_in_memory().unwrap());
        let cb = builder(repo);
        let clock = FixedClock::new(1_700_000_000);
        let current = CurrentMessage {
            speaker: "user#7",
            timestamp: 1_700_000_000,
            text: "hi",
            attachments: vec![],
            reply_to: None,
        };
        let out = cb
            .build(-100, None, None, &[], 7, ModelCapabilities::default(), &current, &clock)
            .unwrap();
        assert!(out.contains("(none)"));
    }

    #[test]
    fn history_to_turns_maps_roles() {
        let repo = Repository::new_in_memory().unwrap();
        repo.insert_message(&NewMessage {
            chat_id: -100,
            thread_id: None,
            external_message_id: Some(1),
            external_user_id: Some(7),
            role: CoreRole::User,
            text: Some("hi".to_string()),
            media: None,
            reply_to_external_message_id: None,
            reply_to_external_user_id: None,
            created_at: 1000,
        })
        .unwrap();
        let messages = repo.recent_messages(-100, None, 1).unwrap();
        let turns = history_to_turns(&messages);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
    }
}
