use serde::{Deserialize, Serialize};

use crate::error::RunError;
use crate::handler::SourceLocation;

/// Exit code reported when the run pipeline killed the tool itself
/// (timeout, cancellation, forced teardown) and no real exit status exists.
pub const FORCED_TERMINATION_EXIT_CODE: i32 = -1;

/// How a run reached its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The tool exited on its own; the exit code is the tool's.
    Completed,
    /// The tool outlived the configured timeout and was killed.
    TimedOut,
}

/// Live status exposed by a `RunningProcess`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Finished,
    TimedOut,
    Cancelled,
    DebugFailed,
}

/// The terminal, immutable record of one run. Created exactly once, after
/// the process has exited, both output drains have finished, and any debug
/// session has terminated.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Where the debugger stopped, if a debug session hit a breakpoint.
    pub breakpoint_hit: Option<SourceLocation>,
    pub outcome: RunOutcome,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.outcome == RunOutcome::Completed && self.exit_code == 0
    }

    /// Structured error for tooling that distinguishes "the tool ran but
    /// failed" (None — read the exit code) from "the tool never finished".
    pub fn error(&self, timeout_secs: u64) -> Option<RunError> {
        match self.outcome {
            RunOutcome::Completed => None,
            RunOutcome::TimedOut => Some(RunError::ProcessTimeout {
                limit_secs: timeout_secs,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_out_result_maps_to_process_timeout() {
        let result = ExecutionResult {
            exit_code: FORCED_TERMINATION_EXIT_CODE,
            stdout: String::new(),
            stderr: String::new(),
            breakpoint_hit: None,
            outcome: RunOutcome::TimedOut,
        };
        assert!(!result.success());
        assert!(matches!(
            result.error(30),
            Some(RunError::ProcessTimeout { limit_secs: 30 })
        ));
    }

    #[test]
    fn failing_tool_exit_is_not_an_error() {
        let result = ExecutionResult {
            exit_code: 1,
            stdout: String::new(),
            stderr: "boom".to_string(),
            breakpoint_hit: None,
            outcome: RunOutcome::Completed,
        };
        assert!(!result.success());
        assert!(result.error(30).is_none());
    }
}
