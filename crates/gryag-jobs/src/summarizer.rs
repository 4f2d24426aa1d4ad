//! Hourly rolling-summary refresh (spec.md §4.7): recomputes the 7-day and
//! 30-day chat summaries for every chat whose activity has outrun its last
//! refresh.

use std::sync::Arc;
use std::time::Duration;

use gryag_agent::provider::{ChatRequest, GenerationMode, Part, Role, Turn};
use gryag_agent::AgentRuntime;
use gryag_core::types::{ChatId, Clock, WindowKind};
use gryag_persistence::types::Message;
use gryag_persistence::Repository;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::engine::run_loop;
use crate::error::Result;
use crate::lock::JobLock;

const WINDOWS: [WindowKind; 2] = [WindowKind::SevenDay, WindowKind::ThirtyDay];
const LOCK_TTL_SECS: u64 = 300;
const SUMMARY_MAX_OUTPUT_TOKENS: u32 = 512;
const SUMMARY_INSTRUCTION: &str =
    "Summarize the conversation transcript below in at most five sentences. \
     Capture ongoing topics, open questions, and any commitments made. \
     Respond with the summary text only, no preamble.";

pub async fn run(
    period: Duration,
    repository: Arc<Repository>,
    runtime: Arc<AgentRuntime>,
    lock: Arc<JobLock>,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
) {
    run_loop("summarizer", period, shutdown, move || {
        let repository = repository.clone();
        let runtime = runtime.clone();
        let lock = lock.clone();
        let clock = clock.clone();
        async move { run_once(&repository, &runtime, &lock, clock.as_ref()).await }
    })
    .await;
}

pub async fn run_once(
    repository: &Repository,
    runtime: &AgentRuntime,
    lock: &JobLock,
    clock: &dyn Clock,
) -> Result<()> {
    for window in WINDOWS {
        let lock_key = format!("job:summarizer:{}", window.as_str());
        if !lock.try_acquire(&lock_key, LOCK_TTL_SECS).await? {
            continue;
        }
        let now = clock.now_unix();
        let chats = repository.chats_needing_summary(window, now)?;
        for chat_id in chats {
            if let Err(e) = summarize_chat(repository, runtime, chat_id, window, now).await {
                warn!(chat_id, window = window.as_str(), error = %e, "summarization failed");
            }
        }
        lock.release(&lock_key).await?;
    }
    Ok(())
}

async fn summarize_chat(
    repository: &Repository,
    runtime: &AgentRuntime,
    chat_id: ChatId,
    window: WindowKind,
    now: i64,
) -> Result<()> {
    let since = now - window.days() * 86_400;
    let messages = repository.messages_in_range(chat_id, since, now)?;
    if messages.is_empty() {
        return Ok(());
    }
    let transcript = render_transcript(&messages);
    let request = ChatRequest {
        model: runtime.model().await,
        system_instruction: SUMMARY_INSTRUCTION.to_string(),
        history: vec![Turn {
            role: Role::User,
            parts: vec![Part::text(transcript)],
        }],
        tools: Vec::new(),
        generation_mode: GenerationMode::DeterministicRouting,
        max_output_tokens: SUMMARY_MAX_OUTPUT_TOKENS,
    };
    let completion = runtime.provider().generate(&request).await?;
    let text = completion.text.unwrap_or_default();
    if !text.trim().is_empty() {
        repository.upsert_summary(chat_id, window, text.trim(), now)?;
        info!(chat_id, window = window.as_str(), "summary refreshed");
    }
    Ok(())
}

fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        let speaker = match msg.role {
            gryag_core::types::Role::User => "user",
            gryag_core::types::Role::Assistant => "assistant",
            gryag_core::types::Role::System => "system",
        };
        let text = msg.text.as_deref().unwrap_or("[media]");
        out.push_str(speaker);
        out.push_str(": ");
        out.push_str(text);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gryag_agent::provider::{Completion, FinishReason, FunctionCall, ModelCapabilities, Usage};
    use gryag_agent::LlmProvider;
    use gryag_core::types::Role as CoreRole;
    use gryag_persistence::types::NewMessage;

    struct StubProvider {
        reply: String,
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        fn capabilities(&self) -> ModelCapabilities {
            ModelCapabilities::default()
        }
        async fn generate(&self, _request: &ChatRequest) -> gryag_agent::error::Result<Completion> {
            Ok(Completion {
                finish_reason: FinishReason::Stop,
                text: Some(self.reply.clone()),
                tool_calls: Vec::<FunctionCall>::new(),
                safety_reason: None,
                usage: Usage::default(),
            })
        }
    }

    fn msg(chat_id: ChatId, external_id: i64, created_at: i64, text: &str) -> NewMessage {
        NewMessage {
            chat_id,
            thread_id: None,
            external_message_id: Some(external_id),
            external_user_id: Some(7),
            role: CoreRole::User,
            text: Some(text.to_string()),
            media: None,
            reply_to_external_message_id: None,
            reply_to_external_user_id: None,
            created_at,
        }
    }

    #[tokio::test]
    async fn summarize_chat_persists_completion_text() {
        let repo = Repository::new_in_memory().unwrap();
        repo.insert_message(&msg(-100, 1, 1_000, "planning a trip to Lviv")).unwrap();
        let runtime = AgentRuntime::new(
            Arc::new(StubProvider {
                reply: "discussing a trip to Lviv".to_string(),
            }) as Arc<dyn LlmProvider>,
            "stub-model".to_string(),
        );
        summarize_chat(&repo, &runtime, -100, WindowKind::SevenDay, 2_000)
            .await
            .unwrap();
        let summary = repo.get_summary(-100, WindowKind::SevenDay).unwrap().unwrap();
        assert_eq!(summary.text, "discussing a trip to Lviv");
    }

    #[tokio::test]
    async fn summarize_chat_skips_empty_window() {
        let repo = Repository::new_in_memory().unwrap();
        let runtime = AgentRuntime::new(
            Arc::new(StubProvider { reply: "unused".to_string() }) as Arc<dyn LlmProvider>,
            "stub-model".to_string(),
        );
        summarize_chat(&repo, &runtime, -100, WindowKind::SevenDay, 2_000)
            .await
            .unwrap();
        assert!(repo.get_summary(-100, WindowKind::SevenDay).unwrap().is_none());
    }

    #[test]
    fn render_transcript_labels_each_role() {
        let messages = vec![gryag_persistence::types::Message {
            id: 1,
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
        }];
        let transcript = render_transcript(&messages);
        assert_eq!(transcript, "user: hi\n");
    }
}
