//! Debug session coordination.
//!
//! One coordinator per debug-enabled run. It owns the listening socket the
//! debug worker dials back to, walks the session through
//! `Idle → AwaitingConnection → Handshaking → Attached → Terminated`, and
//! races the whole attach sequence against the configured timeout. The wire
//! format is newline-delimited JSON and treated as opaque beyond the
//! lifecycle contract: an initialize request that eventually reports
//! initialized (or fails), breakpoint-hit events, and a target-exited event.

use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::RunError;
use crate::events::EventBroadcaster;
use crate::handler::SourceLocation;

// ─── States & outcomes ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugState {
    Idle,
    AwaitingConnection,
    Handshaking,
    Attached,
    Terminated,
}

impl DebugState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingConnection => "awaiting_connection",
            Self::Handshaking => "handshaking",
            Self::Attached => "attached",
            Self::Terminated => "terminated",
        }
    }
}

/// How the session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Reached `Attached`; terminated by target exit, owner exit, or shutdown.
    Attached { target_exit_code: Option<i32> },
    /// Torn down before any worker connected (owner exited or run cancelled).
    NeverConnected,
    /// The worker never connected within the attach timeout.
    AttachTimeout,
    /// The worker connected but initialization failed.
    HandshakeFailed(String),
}

/// Terminal record of one debug session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub outcome: SessionOutcome,
    pub breakpoint_hit: Option<SourceLocation>,
}

// ─── Wire messages ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WorkerMessage {
    id: Option<i64>,
    result: Option<String>,
    error: Option<String>,
    event: Option<String>,
    #[serde(default)]
    params: serde_json::Value,
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// The launcher's view of a running coordinator.
pub struct DebugSessionHandle {
    pub port: u16,
    state_rx: watch::Receiver<DebugState>,
    terminate: Arc<Notify>,
    target_exited: Arc<Notify>,
    failure_rx: Option<oneshot::Receiver<RunError>>,
    task: JoinHandle<SessionSummary>,
}

impl DebugSessionHandle {
    pub fn state(&self) -> DebugState {
        *self.state_rx.borrow()
    }

    /// Resolves when the session reaches `Attached`; errors if it terminates
    /// first.
    pub async fn wait_attached(&mut self) -> Result<(), RunError> {
        let reached = self
            .state_rx
            .wait_for(|s| matches!(s, DebugState::Attached | DebugState::Terminated))
            .await;
        match reached.as_deref() {
            Ok(DebugState::Attached) => Ok(()),
            _ => Err(RunError::DebugHandshakeFailure {
                reason: "session terminated before attach".to_string(),
            }),
        }
    }

    /// Resolves only if the attach sequence fails (timeout or handshake
    /// error); pends forever otherwise, so it can sit in a `select!`.
    pub async fn failed(&mut self) -> RunError {
        if let Some(rx) = self.failure_rx.take() {
            if let Ok(err) = rx.await {
                return err;
            }
        }
        std::future::pending().await
    }

    /// Signal fired when the worker reports the sandboxed target exited.
    /// The owner selects on this to tear down the OS process handle.
    pub fn target_exited_signal(&self) -> Arc<Notify> {
        self.target_exited.clone()
    }

    /// Terminate (idempotent) and collect the summary. The coordinator gets
    /// `grace` to wind down on its own before it is aborted outright.
    pub async fn shutdown(mut self, grace: Duration) -> SessionSummary {
        self.terminate.notify_one();
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(summary)) => summary,
            Ok(Err(join_err)) => {
                warn!(error = %join_err, "debug coordinator task failed");
                SessionSummary {
                    outcome: SessionOutcome::NeverConnected,
                    breakpoint_hit: None,
                }
            }
            Err(_) => {
                self.task.abort();
                warn!("debug coordinator did not wind down within grace — aborted");
                SessionSummary {
                    outcome: SessionOutcome::NeverConnected,
                    breakpoint_hit: None,
                }
            }
        }
    }
}

// ─── Coordinator ─────────────────────────────────────────────────────────────

pub struct CoordinatorParams {
    pub run_id: String,
    pub port: u16,
    pub attach_timeout: Duration,
    pub breakpoints: Vec<SourceLocation>,
    pub broadcaster: Arc<EventBroadcaster>,
}

struct Coordinator {
    run_id: String,
    state_tx: watch::Sender<DebugState>,
    terminate: Arc<Notify>,
    target_exited: Arc<Notify>,
    failure_tx: Option<oneshot::Sender<RunError>>,
    breakpoints: Vec<SourceLocation>,
    breakpoint_hit: Option<SourceLocation>,
    broadcaster: Arc<EventBroadcaster>,
    /// Correlates request/response pairs on the wire. Scoped to this
    /// coordinator, not ambient.
    next_request_id: AtomicI64,
}

/// Bind the listener and start the coordinator task. The listener is bound
/// before this returns, so the caller can spawn the tool knowing the worker
/// has something to dial.
pub async fn start(params: CoordinatorParams) -> Result<DebugSessionHandle, RunError> {
    let listener = TcpListener::bind(("127.0.0.1", params.port))
        .await
        .map_err(|e| RunError::LaunchFailure(anyhow::anyhow!("failed to bind debug port: {e}")))?;

    let (state_tx, state_rx) = watch::channel(DebugState::Idle);
    let (failure_tx, failure_rx) = oneshot::channel();
    let terminate = Arc::new(Notify::new());
    let target_exited = Arc::new(Notify::new());

    let coordinator = Coordinator {
        run_id: params.run_id,
        state_tx,
        terminate: terminate.clone(),
        target_exited: target_exited.clone(),
        failure_tx: Some(failure_tx),
        breakpoints: params.breakpoints,
        breakpoint_hit: None,
        broadcaster: params.broadcaster,
        next_request_id: AtomicI64::new(1),
    };

    let port = params.port;
    let attach_timeout = params.attach_timeout;
    let task = tokio::spawn(coordinator.run(listener, attach_timeout));

    Ok(DebugSessionHandle {
        port,
        state_rx,
        terminate,
        target_exited,
        failure_rx: Some(failure_rx),
        task,
    })
}

impl Coordinator {
    fn set_state(&self, next: DebugState) {
        // Terminated is terminal — teardown must not fire twice.
        if *self.state_tx.borrow() == DebugState::Terminated {
            return;
        }
        let _ = self.state_tx.send(next);
        self.broadcaster.broadcast(
            "debug.stateChanged",
            json!({ "runId": self.run_id, "state": next.as_str() }),
        );
    }

    fn fail(&mut self, err: RunError) {
        if let Some(tx) = self.failure_tx.take() {
            let _ = tx.send(err);
        }
    }

    fn finish(mut self, outcome: SessionOutcome) -> SessionSummary {
        self.set_state(DebugState::Terminated);
        debug!(run = %self.run_id, outcome = ?outcome, "debug session terminated");
        SessionSummary {
            outcome,
            breakpoint_hit: self.breakpoint_hit.take(),
        }
    }

    async fn run(mut self, listener: TcpListener, attach_timeout: Duration) -> SessionSummary {
        self.set_state(DebugState::AwaitingConnection);

        let terminate = self.terminate.clone();
        let deadline = tokio::time::sleep(attach_timeout);
        tokio::pin!(deadline);

        // ── AwaitingConnection ──────────────────────────────────────────────
        let stream = tokio::select! {
            biased;
            _ = terminate.notified() => {
                return self.finish(SessionOutcome::NeverConnected);
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    trace!(run = %self.run_id, peer = %peer, "debug worker connected");
                    stream
                }
                Err(e) => {
                    self.fail(RunError::DebugHandshakeFailure { reason: e.to_string() });
                    return self.finish(SessionOutcome::HandshakeFailed(e.to_string()));
                }
            },
            _ = &mut deadline => {
                let waited_ms = attach_timeout.as_millis() as u64;
                self.fail(RunError::DebugAttachTimeout { waited_ms });
                return self.finish(SessionOutcome::AttachTimeout);
            }
        };
        // The listener accepts exactly one worker; further dials get refused
        // once it drops here.
        drop(listener);

        self.set_state(DebugState::Handshaking);
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        // ── Handshaking ─────────────────────────────────────────────────────
        let init_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let init = json!({ "id": init_id, "method": "initialize" });
        if let Err(e) = send_line(&mut write_half, &init).await {
            self.fail(RunError::DebugHandshakeFailure { reason: e.to_string() });
            return self.finish(SessionOutcome::HandshakeFailed(e.to_string()));
        }

        loop {
            let message = tokio::select! {
                biased;
                _ = terminate.notified() => {
                    return self.finish(SessionOutcome::NeverConnected);
                }
                line = lines.next_line() => line,
                _ = &mut deadline => {
                    let waited_ms = attach_timeout.as_millis() as u64;
                    self.fail(RunError::DebugAttachTimeout { waited_ms });
                    return self.finish(SessionOutcome::AttachTimeout);
                }
            };

            match parse_line(message) {
                Line::Message(msg) if msg.id == Some(init_id) => {
                    if msg.result.as_deref() == Some("initialized") {
                        break;
                    }
                    let reason = msg
                        .error
                        .unwrap_or_else(|| "worker rejected initialize".to_string());
                    self.fail(RunError::DebugHandshakeFailure { reason: reason.clone() });
                    return self.finish(SessionOutcome::HandshakeFailed(reason));
                }
                Line::Message(msg) => {
                    trace!(run = %self.run_id, message = ?msg, "pre-attach message ignored");
                }
                Line::Closed => {
                    let reason = "worker closed the connection during handshake".to_string();
                    self.fail(RunError::DebugHandshakeFailure { reason: reason.clone() });
                    return self.finish(SessionOutcome::HandshakeFailed(reason));
                }
                Line::Garbage => continue,
            }
        }

        // ── Attached ────────────────────────────────────────────────────────
        self.set_state(DebugState::Attached);
        self.broadcaster
            .broadcast("debug.attached", json!({ "runId": self.run_id }));

        if !self.breakpoints.is_empty() {
            let bind_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            let bind = json!({
                "id": bind_id,
                "method": "bindBreakpoints",
                "params": { "breakpoints": self.breakpoints },
            });
            if let Err(e) = send_line(&mut write_half, &bind).await {
                warn!(run = %self.run_id, error = %e, "failed to bind breakpoints");
                return self.finish(SessionOutcome::Attached {
                    target_exit_code: None,
                });
            }
        }

        let mut target_exit_code = None;
        loop {
            let message = tokio::select! {
                biased;
                _ = terminate.notified() => break,
                line = lines.next_line() => line,
            };

            match parse_line(message) {
                Line::Message(msg) => match msg.event.as_deref() {
                    Some("breakpointHit") => {
                        if let Ok(location) =
                            serde_json::from_value::<SourceLocation>(msg.params.clone())
                        {
                            debug!(run = %self.run_id, file = %location.file.display(), line = location.line, "breakpoint hit");
                            self.broadcaster.broadcast(
                                "debug.breakpointHit",
                                json!({ "runId": self.run_id, "location": location }),
                            );
                            self.breakpoint_hit = Some(location);
                        }
                    }
                    Some("targetExited") => {
                        target_exit_code =
                            msg.params.get("exitCode").and_then(|v| v.as_i64()).map(|c| c as i32);
                        trace!(run = %self.run_id, code = ?target_exit_code, "target exited");
                        self.target_exited.notify_one();
                        break;
                    }
                    _ => {
                        trace!(run = %self.run_id, message = ?msg, "worker message ignored");
                    }
                },
                Line::Closed => break,
                Line::Garbage => continue,
            }
        }

        self.finish(SessionOutcome::Attached { target_exit_code })
    }
}

enum Line {
    Message(WorkerMessage),
    Closed,
    Garbage,
}

fn parse_line(read: std::io::Result<Option<String>>) -> Line {
    match read {
        Ok(Some(raw)) => match serde_json::from_str::<WorkerMessage>(&raw) {
            Ok(msg) => Line::Message(msg),
            Err(_) => {
                warn!(line = %raw, "unparseable debug worker message");
                Line::Garbage
            }
        },
        Ok(None) => Line::Closed,
        Err(_) => Line::Closed,
    }
}

async fn send_line(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    message: &serde_json::Value,
) -> std::io::Result<()> {
    let mut raw = serde_json::to_vec(message)?;
    raw.push(b'\n');
    write_half.write_all(&raw).await
}

// Used by tests to speak the worker side of the protocol.
#[doc(hidden)]
pub async fn connect_worker(port: u16) -> std::io::Result<TcpStream> {
    TcpStream::connect(("127.0.0.1", port)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn params(port: u16, attach_timeout_ms: u64) -> CoordinatorParams {
        CoordinatorParams {
            run_id: "r-test".to_string(),
            port,
            attach_timeout: Duration::from_millis(attach_timeout_ms),
            breakpoints: Vec::new(),
            broadcaster: Arc::new(EventBroadcaster::new()),
        }
    }

    #[tokio::test]
    async fn attach_timeout_when_nobody_connects() {
        let mut handle = start(params(5931, 200)).await.unwrap();
        let err = handle.failed().await;
        assert!(matches!(err, RunError::DebugAttachTimeout { waited_ms: 200 }));
        let summary = handle.shutdown(Duration::from_secs(1)).await;
        assert_eq!(summary.outcome, SessionOutcome::AttachTimeout);
    }

    #[tokio::test]
    async fn full_handshake_reaches_attached() {
        let mut handle = start(params(5932, 5_000)).await.unwrap();

        let worker = tokio::spawn(async move {
            let stream = connect_worker(5932).await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();

            // initialize request
            let init = lines.next_line().await.unwrap().unwrap();
            let init: serde_json::Value = serde_json::from_str(&init).unwrap();
            assert_eq!(init["method"], "initialize");
            let reply = json!({ "id": init["id"], "result": "initialized" });
            write_half
                .write_all(format!("{reply}\n").as_bytes())
                .await
                .unwrap();

            // report a breakpoint, then target exit
            let hit = json!({ "event": "breakpointHit", "params": { "file": "app.py", "line": 4 } });
            write_half
                .write_all(format!("{hit}\n").as_bytes())
                .await
                .unwrap();
            let exited = json!({ "event": "targetExited", "params": { "exitCode": 0 } });
            write_half
                .write_all(format!("{exited}\n").as_bytes())
                .await
                .unwrap();
        });

        handle.wait_attached().await.unwrap();
        worker.await.unwrap();

        let summary = handle.shutdown(Duration::from_secs(1)).await;
        assert_eq!(
            summary.outcome,
            SessionOutcome::Attached {
                target_exit_code: Some(0)
            }
        );
        assert_eq!(
            summary.breakpoint_hit,
            Some(SourceLocation {
                file: PathBuf::from("app.py"),
                line: 4
            })
        );
    }

    #[tokio::test]
    async fn handshake_rejection_is_reported() {
        let mut handle = start(params(5933, 5_000)).await.unwrap();

        tokio::spawn(async move {
            let stream = connect_worker(5933).await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let init = lines.next_line().await.unwrap().unwrap();
            let init: serde_json::Value = serde_json::from_str(&init).unwrap();
            let reply = json!({ "id": init["id"], "error": "unsupported protocol" });
            write_half
                .write_all(format!("{reply}\n").as_bytes())
                .await
                .unwrap();
        });

        let err = handle.failed().await;
        assert!(matches!(err, RunError::DebugHandshakeFailure { .. }));
        let summary = handle.shutdown(Duration::from_secs(1)).await;
        assert_eq!(
            summary.outcome,
            SessionOutcome::HandshakeFailed("unsupported protocol".to_string())
        );
    }

    #[tokio::test]
    async fn shutdown_before_connection_is_clean_and_idempotent() {
        let handle = start(params(5934, 10_000)).await.unwrap();
        let summary = handle.shutdown(Duration::from_secs(1)).await;
        assert_eq!(summary.outcome, SessionOutcome::NeverConnected);
        // The port is free again once the listener is gone.
        let rebind = TcpListener::bind(("127.0.0.1", 5934)).await;
        assert!(rebind.is_ok());
    }
}
