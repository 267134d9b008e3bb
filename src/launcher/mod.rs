// SPDX-License-Identifier: MIT
//! Process launching and run supervision.
//!
//! `launch` validates, resolves, and spawns one SAM CLI invocation, then
//! hands back a `RunningProcess`. A supervisor task owns the child and every
//! per-run resource (scratch dir, debug port reservation, debug session) and
//! releases all of them on every exit path — normal exit, timeout,
//! cancellation, debug attach failure. Stdout and stderr are drained by two
//! independent tasks so a full pipe buffer can never deadlock the run.

pub mod request;
pub mod result;

pub use request::{build, merge_env, LaunchPlan, LaunchRequest, SYNTHESIZED_LOGICAL_ID};
pub use result::{ExecutionResult, RunOutcome, RunStatus, FORCED_TERMINATION_EXIT_CODE};

use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::credentials::AwsCredentials;
use crate::debugger::{self, DebugOptions, DebugRequest, DebugSessionHandle, SessionOutcome};
use crate::error::RunError;
use crate::handler::SourceLocation;
use crate::invoke::{RunConfiguration, Runtime};
use crate::RunnerContext;

// ─── RunningProcess ──────────────────────────────────────────────────────────

/// Caller's handle on one in-flight run.
#[derive(Debug)]
pub struct RunningProcess {
    pub run_id: String,
    status_rx: watch::Receiver<RunStatus>,
    cancel: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
    supervisor: JoinHandle<Result<ExecutionResult, RunError>>,
}

impl RunningProcess {
    /// Live status of the run.
    pub fn status(&self) -> RunStatus {
        *self.status_rx.borrow()
    }

    /// Cancel the run: the SAM process is killed (not merely disconnected),
    /// the attach timer stops, and any debug session terminates. Idempotent;
    /// `wait()` still returns promptly afterwards.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            info!(run = %self.run_id, "run cancelled");
        }
        self.cancel.notify_one();
    }

    /// Wait for the terminal result. Completed and timed-out runs return
    /// `Ok` (the outcome field tells them apart); cancellation and debug
    /// attach failures return their distinct errors after cleanup finishes.
    pub async fn wait(self) -> Result<ExecutionResult, RunError> {
        match self.supervisor.await {
            Ok(result) => result,
            Err(join_err) => Err(RunError::LaunchFailure(anyhow::anyhow!(
                "run supervisor failed: {join_err}"
            ))),
        }
    }
}

// ─── Launch ──────────────────────────────────────────────────────────────────

/// Resolve, spawn, and supervise one local invocation.
pub async fn launch(
    ctx: &RunnerContext,
    code_root: &Path,
    config: &RunConfiguration,
    debug: Option<DebugOptions>,
) -> Result<RunningProcess, RunError> {
    // Validation is returned, never thrown, and happens before any spawn.
    let report = config.validate();
    if !report.is_ok() {
        return Err(RunError::Validation(report));
    }

    let runtime = config
        .runtime()
        .ok_or_else(|| RunError::UnsupportedRuntime(config.runtime_id.clone().unwrap_or_default()))?;

    let resolution_root = resolution_root(config, code_root);
    resolve_handler(ctx, config, runtime, &resolution_root)?;

    let credentials = match &config.credentials_id {
        Some(id) => Some(
            ctx.credentials
                .resolve(id)
                .await
                .ok_or_else(|| RunError::UnknownCredentials(id.clone()))?,
        ),
        None => None,
    };

    let run_id = Uuid::new_v4().to_string();

    // Debug setup happens before the spawn so the worker has a listener to
    // dial the moment the sandbox starts.
    let debug_state = match debug {
        Some(options) => Some(prepare_debug(ctx, &run_id, options).await?),
        None => None,
    };
    let debug_request = debug_state.as_ref().map(|d| d.request.clone());

    let plan = match request::build(
        config,
        runtime,
        code_root,
        credentials.as_ref(),
        debug_request.as_ref(),
    ) {
        Ok(plan) => plan,
        Err(e) => {
            if let Some(debug_state) = debug_state {
                debug_state.session.shutdown(Duration::ZERO).await;
            }
            return Err(RunError::LaunchFailure(e));
        }
    };

    spawn_and_supervise(ctx, run_id, config, plan, credentials, debug_state).await
}

struct DebugLaunchState {
    request: DebugRequest,
    session: DebugSessionHandle,
    reservation: debugger::PortReservation,
}

async fn prepare_debug(
    ctx: &RunnerContext,
    run_id: &str,
    options: DebugOptions,
) -> Result<DebugLaunchState, RunError> {
    let debug_config = &ctx.config.debug;

    let reservation = match options.port {
        Some(port) => debugger::reserve(port),
        None => debugger::allocate(debug_config.port_range_start, debug_config.port_range_end),
    }
    .map_err(RunError::LaunchFailure)?;

    let debugger_path: PathBuf = options
        .debugger_path
        .clone()
        .or_else(|| debug_config.debugger_path.clone())
        .ok_or_else(|| {
            RunError::LaunchFailure(anyhow::anyhow!(
                "no debugger artifact directory configured ([debug] debugger_path)"
            ))
        })?;

    let request = DebugRequest::new(reservation.port(), debugger_path);
    let session = debugger::start(debugger::CoordinatorParams {
        run_id: run_id.to_string(),
        port: reservation.port(),
        attach_timeout: Duration::from_millis(debug_config.attach_timeout_ms),
        breakpoints: options.breakpoints,
        broadcaster: ctx.broadcaster.clone(),
    })
    .await?;

    Ok(DebugLaunchState {
        request,
        session,
        reservation,
    })
}

fn resolution_root(config: &RunConfiguration, code_root: &Path) -> PathBuf {
    // Template-based runs resolve the declared handler against the
    // resource's code root, relative to the template file.
    if let Some(ref target) = config.template {
        let template_dir = target.path.parent().unwrap_or(Path::new("."));
        if let Ok(template) = crate::invoke::SamTemplate::load(&target.path) {
            if let Some(resource) = template.function(&target.logical_id) {
                if let Some(code) = resource.properties.code_root() {
                    return template_dir.join(code);
                }
            }
        }
        return template_dir.to_path_buf();
    }
    code_root.to_path_buf()
}

fn resolve_handler(
    ctx: &RunnerContext,
    config: &RunConfiguration,
    runtime: Runtime,
    resolution_root: &Path,
) -> Result<(), RunError> {
    // Validation passed, but the template may have changed on disk since;
    // fall back to a launch failure rather than trusting it blindly.
    let handler = match (&config.handler, &config.template) {
        (Some(handler), _) => handler.clone(),
        (None, Some(target)) => {
            let template = crate::invoke::SamTemplate::load(&target.path)
                .map_err(RunError::LaunchFailure)?;
            template
                .function(&target.logical_id)
                .and_then(|resource| resource.properties.handler.clone())
                .ok_or_else(|| {
                    RunError::LaunchFailure(anyhow::anyhow!(
                        "resource '{}' no longer declares a handler",
                        target.logical_id
                    ))
                })?
        }
        (None, None) => {
            return Err(RunError::LaunchFailure(anyhow::anyhow!(
                "run configuration has no target"
            )))
        }
    };

    let located = ctx
        .resolvers
        .resolve(runtime.family(), resolution_root, &handler)
        .ok_or_else(|| RunError::UnsupportedRuntime(runtime.family().to_string()))?;

    // Exactly one entry point is launchable; zero or several is a miss.
    if located.len() != 1 {
        if located.len() > 1 {
            warn!(handler = %handler, hits = located.len(), "ambiguous handler reference");
        }
        return Err(RunError::HandlerNotFound { handler });
    }
    Ok(())
}

// ─── Supervision ─────────────────────────────────────────────────────────────

async fn spawn_and_supervise(
    ctx: &RunnerContext,
    run_id: String,
    config: &RunConfiguration,
    plan: LaunchPlan,
    credentials: Option<AwsCredentials>,
    debug_state: Option<DebugLaunchState>,
) -> Result<RunningProcess, RunError> {
    let sam = ctx.config.tool.sam_executable();
    let timeout = Duration::from_secs(config.timeout_secs);
    let broadcaster = ctx.broadcaster.clone();

    let mut cmd = Command::new(&sam);
    cmd.args(&plan.request.args)
        .envs(plan.request.env.iter().cloned())
        .current_dir(&plan.request.working_dir)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    // The SAM CLI forks its own children (docker, runtime shims). Put the
    // whole tree in one process group so a kill cannot leave orphans holding
    // the output pipes open.
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setpgid(0, 0);
            Ok(())
        });
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            // Scratch dir and port reservation drop here; the coordinator
            // must be told to stand down explicitly.
            if let Some(debug_state) = debug_state {
                debug_state.session.shutdown(Duration::ZERO).await;
            }
            return Err(RunError::LaunchFailure(anyhow::anyhow!(
                "failed to spawn {}: {e} — is the SAM CLI installed?",
                sam.display()
            )));
        }
    };

    debug!(run = %run_id, sam = %sam.display(), args = ?plan.request.args, "spawned local invocation");
    broadcaster.broadcast(
        "run.started",
        json!({
            "runId": run_id,
            "debug": debug_state.is_some(),
            "credentials": credentials.is_some(),
        }),
    );

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");
    let stdout_buf = Arc::new(Mutex::new(String::new()));
    let stderr_buf = Arc::new(Mutex::new(String::new()));
    let stdout_drain = drain(stdout, stdout_buf.clone(), broadcaster.clone(), run_id.clone(), "run.stdout");
    let stderr_drain = drain(stderr, stderr_buf.clone(), broadcaster.clone(), run_id.clone(), "run.stderr");

    let (status_tx, status_rx) = watch::channel(RunStatus::Running);
    let cancel = Arc::new(Notify::new());
    let cancelled = Arc::new(AtomicBool::new(false));

    let supervisor = tokio::spawn(supervise(Supervision {
        run_id: run_id.clone(),
        child,
        timeout,
        grace: Duration::from_millis(ctx.config.debug.terminate_grace_ms),
        plan,
        debug_state,
        stdout_buf,
        stderr_buf,
        stdout_drain,
        stderr_drain,
        status_tx,
        cancel: cancel.clone(),
        broadcaster,
    }));

    Ok(RunningProcess {
        run_id,
        status_rx,
        cancel,
        cancelled,
        supervisor,
    })
}

fn drain<R: AsyncRead + Unpin + Send + 'static>(
    reader: R,
    buffer: Arc<Mutex<String>>,
    broadcaster: Arc<crate::events::EventBroadcaster>,
    run_id: String,
    event: &'static str,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            broadcaster.broadcast(event, json!({ "runId": run_id, "line": line }));
            let mut buffer = buffer.lock().expect("drain buffer lock");
            buffer.push_str(&line);
            buffer.push('\n');
        }
    })
}

struct Supervision {
    run_id: String,
    child: tokio::process::Child,
    timeout: Duration,
    grace: Duration,
    plan: LaunchPlan,
    debug_state: Option<DebugLaunchState>,
    stdout_buf: Arc<Mutex<String>>,
    stderr_buf: Arc<Mutex<String>>,
    stdout_drain: JoinHandle<()>,
    stderr_drain: JoinHandle<()>,
    status_tx: watch::Sender<RunStatus>,
    cancel: Arc<Notify>,
    broadcaster: Arc<crate::events::EventBroadcaster>,
}

enum ExitCause {
    Exited(Option<i32>),
    TimedOut,
    Cancelled,
    DebugFailed(RunError),
    TargetExited,
}

async fn supervise(mut s: Supervision) -> Result<ExecutionResult, RunError> {
    let target_exited = s
        .debug_state
        .as_ref()
        .map(|d| d.session.target_exited_signal());

    // Process exit always wins: the arms are ordered so a child that has
    // already exited is observed before any concurrent timeout, cancel, or
    // debug signal that arrives in the same instant.
    let cause = tokio::select! {
        biased;
        status = s.child.wait() => match status {
            Ok(status) => ExitCause::Exited(status.code()),
            Err(e) => {
                warn!(run = %s.run_id, error = %e, "wait on SAM process failed");
                ExitCause::Exited(None)
            }
        },
        _ = s.cancel.notified() => ExitCause::Cancelled,
        err = debug_failure(s.debug_state.as_mut()) => ExitCause::DebugFailed(err),
        _ = signal_wait(target_exited) => ExitCause::TargetExited,
        _ = tokio::time::sleep(s.timeout) => ExitCause::TimedOut,
    };

    // Any cause other than a natural exit leaves a live child to kill.
    let exit_code = match cause {
        ExitCause::Exited(code) => code.unwrap_or(FORCED_TERMINATION_EXIT_CODE),
        _ => {
            kill_process_group(&s.child);
            if let Err(e) = s.child.kill().await {
                warn!(run = %s.run_id, error = %e, "failed to kill SAM process");
            }
            let _ = s.child.wait().await;
            FORCED_TERMINATION_EXIT_CODE
        }
    };

    // Both drains finish once the pipes close; the child is dead either way
    // by this point, so neither can block.
    let _ = s.stdout_drain.await;
    let _ = s.stderr_drain.await;

    // The debug session must be terminated before the result materializes.
    let summary = match s.debug_state.take() {
        Some(debug_state) => {
            let summary = debug_state.session.shutdown(s.grace).await;
            drop(debug_state.reservation);
            Some(summary)
        }
        None => None,
    };

    let stdout = std::mem::take(&mut *s.stdout_buf.lock().expect("stdout buffer lock"));
    let stderr = std::mem::take(&mut *s.stderr_buf.lock().expect("stderr buffer lock"));
    let breakpoint_hit: Option<SourceLocation> =
        summary.as_ref().and_then(|sum| sum.breakpoint_hit.clone());

    // Scratch files survive exactly as long as the run.
    drop(s.plan);

    let (status, outcome) = match &cause {
        ExitCause::Exited(_) => (RunStatus::Finished, RunOutcome::Completed),
        ExitCause::TargetExited => (RunStatus::Finished, RunOutcome::Completed),
        ExitCause::TimedOut => (RunStatus::TimedOut, RunOutcome::TimedOut),
        ExitCause::Cancelled => (RunStatus::Cancelled, RunOutcome::Completed),
        ExitCause::DebugFailed(_) => (RunStatus::DebugFailed, RunOutcome::Completed),
    };
    let _ = s.status_tx.send(status);
    s.broadcaster.broadcast(
        "run.finished",
        json!({ "runId": s.run_id, "status": status, "exitCode": exit_code }),
    );

    match cause {
        ExitCause::Cancelled => Err(RunError::Cancelled),
        ExitCause::DebugFailed(err) => Err(err),
        ExitCause::TargetExited => {
            // The worker saw the target exit before the OS process wound
            // down; prefer the exit code it reported.
            let reported = summary.as_ref().and_then(|sum| match &sum.outcome {
                SessionOutcome::Attached { target_exit_code } => *target_exit_code,
                _ => None,
            });
            Ok(ExecutionResult {
                exit_code: reported.unwrap_or(exit_code),
                stdout,
                stderr,
                breakpoint_hit,
                outcome,
            })
        }
        ExitCause::Exited(_) | ExitCause::TimedOut => Ok(ExecutionResult {
            exit_code,
            stdout,
            stderr,
            breakpoint_hit,
            outcome,
        }),
    }
}

/// Kill the tool's whole process group (set up at spawn time), so forked
/// children die with it and release their ends of the output pipes.
#[cfg(unix)]
fn kill_process_group(child: &tokio::process::Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &tokio::process::Child) {}

async fn debug_failure(debug_state: Option<&mut DebugLaunchState>) -> RunError {
    match debug_state {
        Some(state) => state.session.failed().await,
        None => std::future::pending().await,
    }
}

async fn signal_wait(signal: Option<Arc<Notify>>) {
    match signal {
        Some(notify) => notify.notified().await,
        None => std::future::pending().await,
    }
}
