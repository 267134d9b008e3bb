//! Shared fixtures for the integration suite: stub SAM CLI scripts and
//! ready-made runner contexts.
#![cfg(unix)]
#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use samrun::config::SamRunConfig;
use samrun::credentials::{AwsCredentials, CredentialRegistry};
use samrun::RunnerContext;

pub const MOCK_CREDS_ID: &str = "MockCredsId";

/// Write an executable stub standing in for the SAM CLI.
pub fn stub_sam(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("sam");
    let script = format!("#!/bin/sh\n{body}");
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Stub that reads the `--event` payload and echoes it uppercased — the
/// classic uppercase-echo handler, minus the sandbox.
pub const UPPER_STUB: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --event) EVENT="$2"; shift 2 ;;
    *) shift ;;
  esac
done
tr '[:lower:]' '[:upper:]' < "$EVENT"
"#;

/// Stub that dumps its environment, one KEY=VALUE per line.
pub const ENV_STUB: &str = "env\n";

/// Stub that prints one line and then blocks far past any test bound.
pub const HANG_STUB: &str = "echo started\nexec sleep 600\n";

pub fn config_for(stub: &Path) -> SamRunConfig {
    let mut config = SamRunConfig::default();
    config.tool.executable = Some(stub.to_path_buf());
    // The artifact directory only has to exist as an argument value.
    config.debug.debugger_path = Some(stub.parent().unwrap().to_path_buf());
    config
}

/// Context wired to the stub, with mock credentials registered.
pub async fn context_for(stub: &Path) -> RunnerContext {
    context_with_config(config_for(stub)).await
}

pub async fn context_with_config(config: SamRunConfig) -> RunnerContext {
    let registry = Arc::new(CredentialRegistry::new());
    registry
        .add(MOCK_CREDS_ID, AwsCredentials::basic("Access", "ItsASecret"))
        .await;
    RunnerContext::new(config).with_credentials(registry)
}

/// A python code root with one resolvable handler, `app.handler`.
pub fn python_code_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("app.py"),
        "def handler(event, context):\n    return event.upper()\n",
    )
    .unwrap();
    dir
}
