//! Nightly pass over bot-addressed messages, pulling durable user facts
//! into `user_facts` (spec.md §4.7). Dedup is implicit: `Repository::
//! upsert_user_fact` fingerprints on normalized text and silently ignores
//! repeats, so a fact re-extracted across windows never produces a
//! duplicate row.

use std::sync::Arc;
use std::time::Duration;

use gryag_agent::provider::{ChatRequest, GenerationMode, Part, Role, Turn};
use gryag_agent::AgentRuntime;
use gryag_core::types::{ChatId, Clock, UserId};
use gryag_persistence::types::Message;
use gryag_persistence::Repository;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::engine::run_loop;
use crate::error::Result;
use crate::lock::JobLock;

const JOB_NAME: &str = "memory_extractor";
const LOCK_TTL_SECS: u64 = 600;
const EXTRACTION_MAX_OUTPUT_TOKENS: u32 = 1024;
const EXTRACTION_INSTRUCTION: &str = "You extract durable facts about chat participants from a \
     transcript of messages addressed to a bot. A durable fact is something that stays true \
     beyond this conversation (preferences, location, occupation, relationships, recurring \
     habits) — not a one-off statement about the current moment. Respond with JSON only, \
     matching {\"facts\": [{\"user_id\": <int>, \"text\": \"<fact>\"}]}. Return an empty \
     array if there is nothing durable to record.";

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    facts: Vec<ExtractedFact>,
}

#[derive(Debug, Deserialize)]
struct ExtractedFact {
    user_id: UserId,
    text: String,
}

pub async fn run(
    period: Duration,
    repository: Arc<Repository>,
    runtime: Arc<AgentRuntime>,
    lock: Arc<JobLock>,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
) {
    run_loop(JOB_NAME, period, shutdown, move || {
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
    let lock_key = format!("job:{JOB_NAME}");
    if !lock.try_acquire(&lock_key, LOCK_TTL_SECS).await? {
        return Ok(());
    }
    let now = clock.now_unix();
    // Chats never seen by this job start from one retention window back,
    // so the first run doesn't scan the entire message history.
    let since_default = now - 30 * 86_400;
    let chats = repository.chats_with_unprocessed_messages(JOB_NAME, since_default)?;
    for (chat_id, newest_at) in chats {
        if let Err(e) = extract_chat(repository, runtime, chat_id, now, newest_at).await {
            warn!(chat_id, error = %e, "memory extraction failed");
        }
    }
    lock.release(&lock_key).await?;
    Ok(())
}

async fn extract_chat(
    repository: &Repository,
    runtime: &AgentRuntime,
    chat_id: ChatId,
    now: i64,
    newest_at: i64,
) -> Result<()> {
    let cursor_floor = now - 30 * 86_400;
    let messages = repository.messages_in_range(chat_id, cursor_floor, newest_at)?;
    let addressed: Vec<&Message> = messages
        .iter()
        .filter(|m| m.role == gryag_core::types::Role::User && m.text.is_some())
        .collect();
    if addressed.is_empty() {
        repository.set_job_cursor(JOB_NAME, chat_id, newest_at)?;
        return Ok(());
    }

    let transcript = render_transcript(&addressed);
    let request = ChatRequest {
        model: runtime.model().await,
        system_instruction: EXTRACTION_INSTRUCTION.to_string(),
        history: vec![Turn {
            role: Role::User,
            parts: vec![Part::text(transcript)],
        }],
        tools: Vec::new(),
        generation_mode: GenerationMode::DeterministicRouting,
        max_output_tokens: EXTRACTION_MAX_OUTPUT_TOKENS,
    };
    let completion = runtime.provider().generate(&request).await?;
    let raw = completion.text.unwrap_or_default();
    let facts = parse_facts(&raw);
    for fact in &facts {
        repository.upsert_user_fact(chat_id, fact.user_id, &fact.text, now)?;
    }
    info!(chat_id, extracted = facts.len(), "memory extraction pass complete");
    repository.set_job_cursor(JOB_NAME, chat_id, newest_at)?;
    Ok(())
}

fn parse_facts(raw: &str) -> Vec<ExtractedFact> {
    let trimmed = raw.trim();
    match serde_json::from_str::<ExtractionResponse>(trimmed) {
        Ok(response) => response.facts,
        Err(e) => {
            warn!(error = %e, "memory extractor response was not valid JSON, skipping");
            Vec::new()
        }
    }
}

fn render_transcript(messages: &[&Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        let user_id = msg.external_user_id.unwrap_or_default();
        let text = msg.text.as_deref().unwrap_or("");
        out.push_str(&format!("user {user_id}: {text}\n"));
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

    fn msg(chat_id: ChatId, external_id: i64, created_at: i64, user_id: UserId, text: &str) -> NewMessage {
        NewMessage {
            chat_id,
            thread_id: None,
            external_message_id: Some(external_id),
            external_user_id: Some(user_id),
            role: CoreRole::User,
            text: Some(text.to_string()),
            media: None,
            reply_to_external_message_id: None,
            reply_to_external_user_id: None,
            created_at,
        }
    }

    #[tokio::test]
    async fn extract_chat_upserts_facts_and_advances_cursor() {
        let repo = Repository::new_in_memory().unwrap();
        repo.insert_message(&msg(-100, 1, 1_000, 7, "I live in Kyiv")).unwrap();
        let runtime = AgentRuntime::new(
            Arc::new(StubProvider {
                reply: r#"{"facts":[{"user_id":7,"text":"lives in Kyiv"}]}"#.to_string(),
            }) as Arc<dyn LlmProvider>,
            "stub-model".to_string(),
        );
        extract_chat(&repo, &runtime, -100, 2_000, 1_000).await.unwrap();
        let facts = repo.list_user_facts(-100, 7).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].text, "lives in Kyiv");
    }

    #[test]
    fn parse_facts_returns_empty_on_malformed_json() {
        assert!(parse_facts("not json").is_empty());
    }

    #[test]
    fn parse_facts_reads_valid_payload() {
        let facts = parse_facts(r#"{"facts":[{"user_id":1,"text":"a"},{"user_id":2,"text":"b"}]}"#);
        assert_eq!(facts.len(), 2);
    }
}
