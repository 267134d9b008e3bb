//! Typed failure taxonomy for local invocations.
//!
//! Validation problems are returned before any process is spawned. A SAM CLI
//! run that starts but exits non-zero is NOT an error — it is a completed
//! `ExecutionResult` with a failing exit code. Only the conditions a caller
//! must be able to tell apart (never-started tool, debugger that never
//! attached, cancellation) surface through this enum.

use crate::invoke::ValidationReport;

/// Errors surfaced by the run pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The handler reference did not resolve to any entry point in the code
    /// root. Absence is an expected outcome for discovery, but launching an
    /// unresolvable handler is a hard stop.
    #[error("handler not found: {handler}")]
    HandlerNotFound { handler: String },

    /// The run configuration failed pre-launch validation.
    #[error("invalid run configuration: {0}")]
    Validation(ValidationReport),

    /// The SAM CLI process could not be started at all.
    #[error("failed to launch local execution tool: {0}")]
    LaunchFailure(anyhow::Error),

    /// The tool ran but did not exit within the configured timeout. The
    /// process was killed; the accompanying `ExecutionResult` carries exit
    /// code -1.
    #[error("local invocation timed out after {limit_secs}s")]
    ProcessTimeout { limit_secs: u64 },

    /// The debug worker never connected to the negotiated port.
    #[error("debug process failed to start within {waited_ms} ms")]
    DebugAttachTimeout { waited_ms: u64 },

    /// The worker connected but the initialize exchange failed.
    #[error("debugger handshake failed: {reason}")]
    DebugHandshakeFailure { reason: String },

    /// The caller cancelled the run. The process was killed and reaped
    /// before this was returned.
    #[error("run cancelled")]
    Cancelled,

    /// No credentials registered under the configured identifier.
    #[error("unknown credentials id: {0}")]
    UnknownCredentials(String),

    /// No resolver registered for the configured runtime.
    #[error("no handler resolver for runtime family {0}")]
    UnsupportedRuntime(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_distinguishable() {
        let timeout = RunError::ProcessTimeout { limit_secs: 30 };
        let attach = RunError::DebugAttachTimeout { waited_ms: 60_000 };
        assert!(timeout.to_string().contains("timed out after 30s"));
        assert!(attach.to_string().contains("within 60000 ms"));
        assert_ne!(timeout.to_string(), attach.to_string());
    }
}
