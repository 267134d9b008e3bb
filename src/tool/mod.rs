// SPDX-License-Identifier: MIT
//! SAM CLI location and version gate.
//!
//! The version probe is slow (the SAM CLI is a Python entry point, a cold
//! `sam --version` takes hundreds of milliseconds), so results are cached
//! per executable path. Callers that know an invocation is coming can
//! `pre_warm` the cache off the critical path.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Matches `SAM CLI, version 1.100.0` (current) and the bare `0.16.0`
/// older builds printed.
static VERSION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("version regex"));

static VERSION_CACHE: Lazy<RwLock<HashMap<PathBuf, Version>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Run `<sam> --version` and parse the reported version.
async fn probe_version(executable: &Path) -> Result<Version> {
    let output = Command::new(executable)
        .arg("--version")
        .output()
        .await
        .with_context(|| format!("failed to execute {} --version", executable.display()))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let captures = VERSION_LINE
        .captures(&stdout)
        .with_context(|| format!("unrecognized version output: {stdout:?}"))?;

    let version = Version::parse(&format!("{}.{}.{}", &captures[1], &captures[2], &captures[3]))?;
    Ok(version)
}

/// Report the SAM CLI version at `executable`, consulting the cache first.
pub async fn sam_version(executable: &Path) -> Result<Version> {
    if let Some(version) = VERSION_CACHE.read().await.get(executable) {
        return Ok(version.clone());
    }
    let version = probe_version(executable).await?;
    debug!(sam = %executable.display(), version = %version, "probed SAM CLI version");
    VERSION_CACHE
        .write()
        .await
        .insert(executable.to_path_buf(), version.clone());
    Ok(version)
}

/// Populate the version cache in the background so the first invocation does
/// not pay the probe. Errors are logged, not surfaced — the launch path
/// re-probes and reports properly.
pub fn pre_warm(executable: PathBuf) {
    tokio::spawn(async move {
        if let Err(e) = sam_version(&executable).await {
            warn!(sam = %executable.display(), error = %e, "SAM CLI version pre-warm failed");
        }
    });
}

/// Check the installed SAM CLI against the configured minimum.
pub async fn check_min_version(executable: &Path, min_version: &str) -> Result<Version> {
    let min = Version::parse(min_version)
        .with_context(|| format!("invalid min_version in config: {min_version}"))?;
    let found = sam_version(executable).await?;
    anyhow::ensure!(
        found >= min,
        "SAM CLI {} at {} is older than the supported minimum {}",
        found,
        executable.display(),
        min
    );
    Ok(found)
}

// ─── Doctor checks ───────────────────────────────────────────────────────────

/// The result of a single diagnostic check.
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Pre-flight diagnostics for `samrun doctor`: SAM CLI present, version
/// acceptable, debugger artifact directory (if configured) exists.
pub async fn run_doctor(config: &crate::config::SamRunConfig) -> Vec<CheckResult> {
    let executable = config.tool.sam_executable();

    let version_check = match check_min_version(&executable, &config.tool.min_version).await {
        Ok(version) => CheckResult {
            name: "SAM CLI version",
            passed: true,
            detail: format!("{} (>= {})", version, config.tool.min_version),
        },
        Err(e) => CheckResult {
            name: "SAM CLI version",
            passed: false,
            detail: e.to_string(),
        },
    };

    let debugger_check = match &config.debug.debugger_path {
        Some(dir) => CheckResult {
            name: "Debugger artifact directory",
            passed: dir.is_dir(),
            detail: if dir.is_dir() {
                dir.display().to_string()
            } else {
                format!("{} does not exist", dir.display())
            },
        },
        None => CheckResult {
            name: "Debugger artifact directory",
            passed: true,
            detail: "not configured — debug runs must pass one explicitly".to_string(),
        },
    };

    vec![version_check, debugger_check]
}
