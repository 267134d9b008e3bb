use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const DEFAULT_ATTACH_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_DEBUG_PORT_RANGE: (u16, u16) = (5890, 5999);
const DEFAULT_INVOKE_TIMEOUT_SECS: u64 = 900;
const DEFAULT_DEBUG_TERMINATE_GRACE_MS: u64 = 2_000;
const DEFAULT_MIN_SAM_VERSION: &str = "0.16.0";

// ─── ToolConfig ──────────────────────────────────────────────────────────────

/// Local execution tool configuration (`[tool]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Path to the SAM CLI executable. None = `$SAM_CLI_EXEC`, falling back
    /// to `sam` on PATH.
    pub executable: Option<PathBuf>,
    /// Minimum SAM CLI version accepted by the doctor/version gate
    /// (default: "0.16.0" — first release with `--debug-args` pass-through).
    pub min_version: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            executable: None,
            min_version: DEFAULT_MIN_SAM_VERSION.to_string(),
        }
    }
}

impl ToolConfig {
    /// Resolve the SAM CLI executable: config value, then `$SAM_CLI_EXEC`,
    /// then bare `sam` (PATH lookup at spawn time).
    pub fn sam_executable(&self) -> PathBuf {
        if let Some(ref path) = self.executable {
            return path.clone();
        }
        if let Ok(env_path) = std::env::var("SAM_CLI_EXEC") {
            if !env_path.is_empty() {
                return PathBuf::from(env_path);
            }
        }
        PathBuf::from("sam")
    }
}

// ─── DebugConfig ─────────────────────────────────────────────────────────────

/// Debugger attach configuration (`[debug]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DebugConfig {
    /// How long to wait for the debug worker to connect and initialize
    /// before the run is failed with an attach timeout (default: 60000).
    pub attach_timeout_ms: u64,
    /// Inclusive port range the coordinator allocates debug ports from
    /// (default: 5890–5999). Caller-supplied ports bypass the range but
    /// still go through the per-run reservation set.
    pub port_range_start: u16,
    pub port_range_end: u16,
    /// After the SAM process exits, how long to wait for the debug session
    /// to wind down on its own before it is force-terminated (default: 2000).
    pub terminate_grace_ms: u64,
    /// Directory holding the debugger-launcher artifact mounted into the
    /// sandbox via `--debugger-path`. None = debugging requires the caller
    /// to pass one per run.
    pub debugger_path: Option<PathBuf>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            attach_timeout_ms: DEFAULT_ATTACH_TIMEOUT_MS,
            port_range_start: DEFAULT_DEBUG_PORT_RANGE.0,
            port_range_end: DEFAULT_DEBUG_PORT_RANGE.1,
            terminate_grace_ms: DEFAULT_DEBUG_TERMINATE_GRACE_MS,
            debugger_path: None,
        }
    }
}

// ─── LimitsConfig ────────────────────────────────────────────────────────────

/// Invocation limits (`[limits]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Timeout applied to a run configuration that does not set its own
    /// (default: 900 — the Lambda maximum).
    pub default_invoke_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_invoke_timeout_secs: DEFAULT_INVOKE_TIMEOUT_SECS,
        }
    }
}

// ─── SamRunConfig ────────────────────────────────────────────────────────────

/// Top-level configuration, loaded from `config.toml` next to the invocation
/// (or a path given with `--config`), with unset sections filled from
/// defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SamRunConfig {
    pub tool: ToolConfig,
    pub debug: DebugConfig,
    pub limits: LimitsConfig,
}

impl SamRunConfig {
    /// Load config from the given file. A missing file is not an error —
    /// defaults apply. A malformed file is logged and defaults apply, so a
    /// broken config never blocks an invocation.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<SamRunConfig>(&raw) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded config");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "malformed config — using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}
