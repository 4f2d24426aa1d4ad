//! Bounded tool-dispatch loop (spec.md §4.6 steps 4a-4f): call the model,
//! dispatch any requested tools, append results, repeat until the model
//! stops or `max_tool_turns` is hit.

use std::time::Duration;

use gryag_admission::QuotaTracker;
use gryag_core::types::{Clock, UserId, UserRole};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::provider::{ChatRequest, Completion, FinishReason, FunctionCall, LlmProvider, Part, Role, Turn};

use super::{Tool, ToolOutcome};

const MAX_PROVIDER_ATTEMPTS: u32 = 3;

/// Final completion plus every `Ok` tool result produced along the way that
/// carries a `media_id` (spec.md §4.6 step 5: attaching a tool-generated
/// image/audio reference to the response). Callers only care about the most
/// recent one, but the whole list is kept so a caller can decide.
pub struct ToolLoopOutcome {
    pub completion: Completion,
    pub media_results: Vec<serde_json::Value>,
}

/// Runs the loop starting from `request.history` (the last turn is the
/// current user turn). Returns the final completion once the model stops
/// calling tools, hits a terminal finish reason, or the turn budget runs out.
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    mut request: ChatRequest,
    tools: &[Box<dyn Tool>],
    quotas: &QuotaTracker,
    user_id: UserId,
    role: UserRole,
    clock: &dyn Clock,
    max_tool_turns: u32,
    cancel: &CancellationToken,
    llm_call_timeout: Duration,
) -> Result<ToolLoopOutcome> {
    let mut media_results = Vec::new();
    let started = std::time::Instant::now();

    for turn in 0..max_tool_turns {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled { elapsed_ms: started.elapsed().as_millis() as u64 });
        }
        debug!(turn, "tool loop iteration");
        let completion = call_with_retry(provider, &request, llm_call_timeout).await?;

        match completion.finish_reason {
            FinishReason::ToolCall => {
                if completion.tool_calls.is_empty() {
                    return Ok(ToolLoopOutcome { completion, media_results });
                }
                append_assistant_call_turn(&mut request.history, &completion);
                let mut result_parts = Vec::with_capacity(completion.tool_calls.len());
                for call in &completion.tool_calls {
                    if cancel.is_cancelled() {
                        return Err(AgentError::Cancelled { elapsed_ms: started.elapsed().as_millis() as u64 });
                    }
                    let outcome = dispatch(tools, quotas, user_id, role, clock, call).await;
                    if let ToolOutcome::Ok { result } = &outcome {
                        if result.get("media_id").is_some() {
                            media_results.push(result.clone());
                        }
                    }
                    result_parts.push(Part::FunctionResult {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        result: outcome.to_result_value(),
                        is_error: matches!(outcome, ToolOutcome::Error { .. }),
                    });
                }
                request.history.push(Turn {
                    role: Role::User,
                    parts: result_parts,
                });
            }
            _ => return Ok(ToolLoopOutcome { completion, media_results }),
        }
    }

    warn!(max_tool_turns, "tool loop hit turn budget without a final response");
    Err(AgentError::Transient(format!(
        "tool loop exceeded {max_tool_turns} turns without a final response"
    )))
}

fn append_assistant_call_turn(history: &mut Vec<Turn>, completion: &Completion) {
    let mut parts = Vec::new();
    if let Some(text) = &completion.text {
        if !text.is_empty() {
            parts.push(Part::text(text.clone()));
        }
    }
    for call in &completion.tool_calls {
        parts.push(Part::FunctionCall {
            id: call.id.clone(),
            name: call.name.clone(),
            args: call.args.clone(),
        });
    }
    history.push(Turn {
        role: Role::Assistant,
        parts,
    });
}

/// Exponential backoff retried up to `MAX_PROVIDER_ATTEMPTS` within a single
/// turn (spec.md §4.6 step 4f). Honors an explicit `retry_after_ms` when the
/// provider signals rate limiting. A call that outruns `call_timeout`
/// (spec.md §5's "per LLM call" bound) is folded into the same retry policy
/// as a transient failure.
async fn call_with_retry(
    provider: &dyn LlmProvider,
    request: &ChatRequest,
    call_timeout: Duration,
) -> Result<Completion> {
    let mut attempt = 0;
    loop {
        let outcome = match tokio::time::timeout(call_timeout, provider.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Transient(format!("llm call exceeded {call_timeout:?}"))),
        };
        match outcome {
            Ok(completion) => return Ok(completion),
            Err(err) if err.is_retryable() && attempt + 1 < MAX_PROVIDER_ATTEMPTS => {
                let delay = match &err {
                    AgentError::RateLimited { retry_after_ms } => Duration::from_millis(*retry_after_ms),
                    _ => Duration::from_millis(200u64.saturating_mul(1 << attempt)),
                };
                warn!(attempt, ?delay, error = %err, "retrying LLM call after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Validates presence of the schema's declared `required` fields. A missing
/// field never reaches the tool's own `execute` — it is reported as
/// `invalid_argument` immediately (spec.md §4.4).
fn validate_required_fields(schema: &serde_json::Value, input: &serde_json::Value) -> Option<String> {
    let required = schema.get("required")?.as_array()?;
    for field in required {
        let Some(name) = field.as_str() else { continue };
        if input.get(name).is_none() {
            return Some(format!("missing required field: {name}"));
        }
    }
    None
}

async fn dispatch(
    tools: &[Box<dyn Tool>],
    quotas: &QuotaTracker,
    user_id: UserId,
    role: UserRole,
    clock: &dyn Clock,
    call: &FunctionCall,
) -> ToolOutcome {
    let Some(tool) = tools.iter().find(|t| t.name() == call.name) else {
        return ToolOutcome::Error {
            kind: "unknown_tool".to_string(),
            message: format!("unknown tool: {}", call.name),
        };
    };

    if !tool.permission().allows(role) {
        return ToolOutcome::Error {
            kind: "forbidden".to_string(),
            message: format!("{} requires admin permission", tool.name()),
        };
    }

    if let Some(detail) = validate_required_fields(&tool.input_schema(), &call.args) {
        return ToolOutcome::InvalidArgument { detail };
    }

    let policy = tool.quota_policy();
    if !role.is_admin() && (policy.hour_quota.is_some() || policy.day_quota.is_some()) {
        match quotas.check_and_consume(tool.name(), user_id, policy, clock).await {
            Ok(gryag_admission::QuotaOutcome::Allowed) => {}
            Ok(gryag_admission::QuotaOutcome::Throttled { retry_after_seconds })
            | Ok(gryag_admission::QuotaOutcome::Cooldown { retry_after_seconds }) => {
                return ToolOutcome::Throttled {
                    retry_after_seconds,
                    reason: format!("{} quota exceeded", tool.name()),
                };
            }
            Err(e) => {
                warn!(tool = tool.name(), error = %e, "quota store error, failing open");
            }
        }
    }

    debug!(tool = tool.name(), "executing tool");
    tool.execute(call.args.clone()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_required_fields_flags_missing_field() {
        let schema = json!({"required": ["expression"]});
        let input = json!({});
        assert!(validate_required_fields(&schema, &input).is_some());
    }

    #[test]
    fn validate_required_fields_passes_when_present() {
        let schema = json!({"required": ["expression"]});
        let input = json!({"expression": "1+1"});
        assert!(validate_required_fields(&schema, &input).is_none());
    }
}
