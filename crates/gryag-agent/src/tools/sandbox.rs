//! `run_python_code` (spec.md §4.4, §1 Non-goals): executes untrusted code
//! through an opaque `SandboxExecutor`. The concrete backend (container
//! runtime, resource caps) is intentionally not modeled here — only the
//! contract the tool loop depends on.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{QuotaPolicy, Tool, ToolOutcome};

pub const WALL_CLOCK_LIMIT: Duration = Duration::from_secs(5);
pub const MEMORY_LIMIT_BYTES: u64 = 128 * 1024 * 1024;
pub const MAX_OUTPUT_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct SandboxRun {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

/// Runs one snippet to completion or until `WALL_CLOCK_LIMIT` elapses.
/// A real implementation spins up a disposable, network-isolated,
/// read-only-root container (e.g. via `bollard`) per call; this trait keeps
/// that detail out of the tool loop entirely.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn run(&self, code: &str) -> Result<SandboxRun, String>;
}

fn truncate_output(output: String) -> String {
    if output.len() <= MAX_OUTPUT_BYTES {
        return output;
    }
    let mut truncated: String = output.chars().take(MAX_OUTPUT_BYTES).collect();
    truncated.push_str("\n… [output truncated]");
    truncated
}

pub struct RunPythonCodeTool {
    executor: std::sync::Arc<dyn SandboxExecutor>,
    quota_policy: QuotaPolicy,
}

impl RunPythonCodeTool {
    pub fn new(executor: std::sync::Arc<dyn SandboxExecutor>, quota_policy: QuotaPolicy) -> Self {
        Self { executor, quota_policy }
    }
}

#[async_trait]
impl Tool for RunPythonCodeTool {
    fn name(&self) -> &str {
        "run_python_code"
    }

    fn description(&self) -> &str {
        "Run a short Python snippet in an isolated sandbox with no network access"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {"code": {"type": "string"}},
            "required": ["code"],
        })
    }

    fn quota_policy(&self) -> QuotaPolicy {
        self.quota_policy
    }

    async fn execute(&self, input: serde_json::Value) -> ToolOutcome {
        let Some(code) = input.get("code").and_then(|v| v.as_str()) else {
            return ToolOutcome::InvalidArgument { detail: "code must be a string".to_string() };
        };
        if code.trim().is_empty() {
            return ToolOutcome::InvalidArgument { detail: "code must not be empty".to_string() };
        }

        match self.executor.run(code).await {
            Ok(run) => ToolOutcome::Ok {
                result: json!({
                    "stdout": truncate_output(run.stdout),
                    "stderr": truncate_output(run.stderr),
                    "exit_code": run.exit_code,
                    "timed_out": run.timed_out,
                }),
            },
            Err(message) => ToolOutcome::Error { kind: "sandbox_error".to_string(), message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RestrictedPythonSandbox;

    #[async_trait]
    impl SandboxExecutor for RestrictedPythonSandbox {
        async fn run(&self, code: &str) -> Result<SandboxRun, String> {
            if code.contains("import os") {
                return Ok(SandboxRun {
                    stdout: String::new(),
                    stderr: "network and filesystem access are disabled".to_string(),
                    exit_code: 1,
                    timed_out: false,
                });
            }
            Ok(SandboxRun { stdout: "4\n".to_string(), stderr: String::new(), exit_code: 0, timed_out: false })
        }
    }

    #[tokio::test]
    async fn runs_simple_snippet() {
        let tool = RunPythonCodeTool::new(std::sync::Arc::new(RestrictedPythonSandbox), QuotaPolicy::NONE);
        let outcome = tool.execute(json!({"code": "print(2 + 2)"})).await;
        match outcome {
            ToolOutcome::Ok { result } => assert_eq!(result["stdout"], "4\n"),
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[test]
    fn truncates_oversized_output() {
        let huge = "x".repeat(MAX_OUTPUT_BYTES + 100);
        let truncated = truncate_output(huge);
        assert!(truncated.len() < MAX_OUTPUT_BYTES + 100);
        assert!(truncated.ends_with("[output truncated]"));
    }

    #[tokio::test]
    async fn rejects_empty_code() {
        let tool = RunPythonCodeTool::new(std::sync::Arc::new(RestrictedPythonSandbox), QuotaPolicy::NONE);
        let outcome = tool.execute(json!({"code": "  "})).await;
        assert!(matches!(outcome, ToolOutcome::InvalidArgument { .. }));
    }
}
