//! Tool registry and executor (spec.md §4.4): the catalog of callable
//! functions exposed to the model, dispatch, quota enforcement, and
//! `function_result` marshalling.

pub mod build;
pub mod calculator;
pub mod external_api;
pub mod image;
pub mod media_tools;
pub mod memory;
pub mod sandbox;
pub mod search_web;
pub mod tool_loop;

use async_trait::async_trait;
use gryag_core::types::UserRole;
use serde::{Deserialize, Serialize};

use crate::provider::ToolSchema;

pub use gryag_admission::QuotaPolicy;

/// Outcome returned to the tool loop — never an `Err`; failures are encoded
/// as structured payloads so the model can adapt (spec.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Ok { result: serde_json::Value },
    Throttled { retry_after_seconds: u64, reason: String },
    InvalidArgument { detail: String },
    Error { kind: String, message: String },
}

impl ToolOutcome {
    pub fn to_result_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Required permission level to call a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    User,
    Admin,
}

impl Permission {
    pub fn allows(&self, role: UserRole) -> bool {
        match self {
            Permission::User => true,
            Permission::Admin => role.is_admin(),
        }
    }
}

/// Trait every registered tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;
    fn permission(&self) -> Permission {
        Permission::User
    }
    fn quota_policy(&self) -> QuotaPolicy {
        QuotaPolicy::NONE
    }
    async fn execute(&self, input: serde_json::Value) -> ToolOutcome;
}

/// Converts a slice of tools to API-level tool schemas for the LLM request.
pub fn to_schemas(tools: &[Box<dyn Tool>]) -> Vec<ToolSchema> {
    tools
        .iter()
        .map(|t| ToolSchema {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}

/// `(name, description)` pairs for the context builder's tool-catalog block.
pub fn catalog(tools: &[Box<dyn Tool>]) -> Vec<(String, String)> {
    tools
        .iter()
        .map(|t| (t.name().to_string(), t.description().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_permission_rejects_plain_user() {
        assert!(!Permission::Admin.allows(UserRole::User));
        assert!(Permission::Admin.allows(UserRole::Admin));
    }

    #[test]
    fn user_permission_allows_everyone() {
        assert!(Permission::User.allows(UserRole::User));
        assert!(Permission::User.allows(UserRole::Admin));
    }
}
