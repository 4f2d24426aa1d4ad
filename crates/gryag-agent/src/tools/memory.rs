//! `recall_memories`, `remember_memory`, `forget_memory` (spec.md §4.4):
//! flat fingerprint-deduped `UserFact` storage, generalized from the
//! teacher's free-form `MemoryManager::{learn, forget, build_user_context}`.

use std::sync::Arc;

use async_trait::async_trait;
use gryag_core::types::Clock;
use gryag_persistence::types::UpsertOutcome;
use gryag_persistence::Repository;
use serde_json::json;

use super::{QuotaPolicy, Tool, ToolOutcome};

pub struct RecallMemoriesTool {
    repository: Arc<Repository>,
}

impl RecallMemoriesTool {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Tool for RecallMemoriesTool {
    fn name(&self) -> &str {
        "recall_memories"
    }

    fn description(&self) -> &str {
        "Enumerate stored facts about a user in this chat"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": {"type": "integer"},
                "chat_id": {"type": "integer"},
            },
            "required": ["user_id", "chat_id"],
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolOutcome {
        let (Some(user_id), Some(chat_id)) = (
            input.get("user_id").and_then(|v| v.as_i64()),
            input.get("chat_id").and_then(|v| v.as_i64()),
        ) else {
            return ToolOutcome::InvalidArgument {
                detail: "user_id and chat_id must be integers".to_string(),
            };
        };

        match self.repository.list_user_facts(chat_id, user_id) {
            Ok(facts) => {
                let items: Vec<_> = facts
                    .iter()
                    .map(|f| json!({"id": f.id, "text": f.text}))
                    .collect();
                ToolOutcome::Ok { result: json!({"facts": items}) }
            }
            Err(e) => ToolOutcome::Error {
                kind: "persistence_error".to_string(),
                message: e.to_string(),
            },
        }
    }
}

pub struct RememberMemoryTool {
    repository: Arc<Repository>,
    clock: Arc<dyn Clock>,
    quota_policy: QuotaPolicy,
}

impl RememberMemoryTool {
    pub fn new(repository: Arc<Repository>, clock: Arc<dyn Clock>, quota_policy: QuotaPolicy) -> Self {
        Self { repository, clock, quota_policy }
    }
}

#[async_trait]
impl Tool for RememberMemoryTool {
    fn name(&self) -> &str {
        "remember_memory"
    }

    fn description(&self) -> &str {
        "Insert a durable fact about a user, deduped by fingerprint"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": {"type": "integer"},
                "chat_id": {"type": "integer"},
                "text": {"type": "string"},
            },
            "required": ["user_id", "chat_id", "text"],
        })
    }

    fn quota_policy(&self) -> QuotaPolicy {
        self.quota_policy
    }

    async fn execute(&self, input: serde_json::Value) -> ToolOutcome {
        let (Some(user_id), Some(chat_id), Some(text)) = (
            input.get("user_id").and_then(|v| v.as_i64()),
            input.get("chat_id").and_then(|v| v.as_i64()),
            input.get("text").and_then(|v| v.as_str()),
        ) else {
            return ToolOutcome::InvalidArgument {
                detail: "user_id, chat_id, and text are required".to_string(),
            };
        };
        if text.trim().is_empty() {
            return ToolOutcome::InvalidArgument { detail: "text must not be empty".to_string() };
        }

        let now = self.clock.now_unix();
        match self.repository.upsert_user_fact(chat_id, user_id, text, now) {
            Ok(outcome) => {
                let status = match outcome {
                    UpsertOutcome::Created => "created",
                    UpsertOutcome::Duplicate => "duplicate",
                };
                ToolOutcome::Ok { result: json!({"outcome": status}) }
            }
            Err(e) => ToolOutcome::Error {
                kind: "persistence_error".to_string(),
                message: e.to_string(),
            },
        }
    }
}

pub struct ForgetMemoryTool {
    repository: Arc<Repository>,
    quota_policy: QuotaPolicy,
}

impl ForgetMemoryTool {
    pub fn new(repository: Arc<Repository>, quota_policy: QuotaPolicy) -> Self {
        Self { repository, quota_policy }
    }
}

#[async_trait]
impl Tool for ForgetMemoryTool {
    fn name(&self) -> &str {
        "forget_memory"
    }

    fn description(&self) -> &str {
        "Delete a single previously recalled fact by id"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {"memory_id": {"type": "integer"}},
            "required": ["memory_id"],
        })
    }

    fn quota_policy(&self) -> QuotaPolicy {
        self.quota_policy
    }

    async fn execute(&self, input: serde_json::Value) -> ToolOutcome {
        let Some(memory_id) = input.get("memory_id").and_then(|v| v.as_i64()) else {
            return ToolOutcome::InvalidArgument { detail: "memory_id must be an integer".to_string() };
        };

        match self.repository.delete_user_fact(memory_id) {
            Ok(true) => ToolOutcome::Ok { result: json!({"deleted": true}) },
            Ok(false) => ToolOutcome::InvalidArgument {
                detail: format!("no such memory id: {memory_id}"),
            },
            Err(e) => ToolOutcome::Error {
                kind: "persistence_error".to_string(),
                message: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gryag_core::types::FixedClock;

    #[tokio::test]
    async fn remember_then_recall_round_trips() {
        let repo = Arc::new(Repository::new_in_memory().unwrap());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(1000));
        let remember = RememberMemoryTool::new(Arc::clone(&repo), Arc::clone(&clock), QuotaPolicy::NONE);
        let outcome = remember
            .execute(json!({"user_id": 7, "chat_id": -100, "text": "lives in Kyiv"}))
            .await;
        assert!(matches!(outcome, ToolOutcome::Ok { .. }));

        let recall = RecallMemoriesTool::new(Arc::clone(&repo));
        let outcome = recall.execute(json!({"user_id": 7, "chat_id": -100})).await;
        match outcome {
            ToolOutcome::Ok { result } => {
                assert_eq!(result["facts"].as_array().unwrap().len(), 1);
            }
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn forget_missing_memory_is_invalid_argument() {
        let repo = Arc::new(Repository::new_in_memory().unwrap());
        let forget = ForgetMemoryTool::new(repo, QuotaPolicy::NONE);
        let outcome = forget.execute(json!({"memory_id": 999})).await;
        assert!(matches!(outcome, ToolOutcome::InvalidArgument { .. }));
    }
}
