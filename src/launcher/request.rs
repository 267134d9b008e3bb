//! Launch request construction — the ephemeral command line, environment,
//! and scratch files for one invocation. Owned by the launcher for the
//! duration of the run, never persisted.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::credentials::AwsCredentials;
use crate::debugger::DebugRequest;
use crate::invoke::{RunConfiguration, Runtime};

/// Logical id used when a handler-based run synthesizes its template.
pub const SYNTHESIZED_LOGICAL_ID: &str = "Function";

/// The fully-built command for one run.
#[derive(Debug)]
pub struct LaunchRequest {
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Merged environment, sorted by key — injected credentials and region
    /// first, user variables winning on collision.
    pub env: Vec<(String, String)>,
}

/// A `LaunchRequest` plus the scratch directory backing it. Dropping the
/// plan removes the payload file and any synthesized template.
#[derive(Debug)]
pub struct LaunchPlan {
    pub request: LaunchRequest,
    pub scratch: TempDir,
}

/// Merge user variables over the injected credential/region set. User values
/// win on a shared key; output ordering is stable (sorted by key) so repeat
/// runs of the same configuration build identical requests.
pub fn merge_env(
    user: &BTreeMap<String, String>,
    credentials: Option<&AwsCredentials>,
    region_id: &str,
) -> Vec<(String, String)> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();

    if let Some(creds) = credentials {
        merged.insert("AWS_ACCESS_KEY_ID".to_string(), creds.access_key_id.clone());
        merged.insert(
            "AWS_SECRET_ACCESS_KEY".to_string(),
            creds.secret_access_key.clone(),
        );
        if let Some(ref token) = creds.session_token {
            merged.insert("AWS_SESSION_TOKEN".to_string(), token.clone());
        }
    }
    merged.insert("AWS_REGION".to_string(), region_id.to_string());
    merged.insert("AWS_DEFAULT_REGION".to_string(), region_id.to_string());

    for (key, value) in user {
        merged.insert(key.clone(), value.clone());
    }

    merged.into_iter().collect()
}

/// Payload scratch file name: content-addressed so the same input produces
/// the same `--event` argument on every run.
fn payload_file_name(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("event-{hex}.json")
}

fn synthesize_template(
    scratch: &Path,
    handler: &str,
    runtime: Runtime,
    code_root: &Path,
    timeout_secs: u64,
) -> Result<PathBuf> {
    // Single-resource template under the fixed logical id `Function`
    // (SYNTHESIZED_LOGICAL_ID).
    let template = serde_yaml::to_string(&serde_json::json!({
        "AWSTemplateFormatVersion": "2010-09-09",
        "Transform": "AWS::Serverless-2016-10-31",
        "Resources": {
            "Function": {
                "Type": "AWS::Serverless::Function",
                "Properties": {
                    "Handler": handler,
                    "Runtime": runtime.id(),
                    "CodeUri": code_root.to_string_lossy(),
                    "Timeout": timeout_secs,
                }
            }
        }
    }))?;

    let path = scratch.join("template.yaml");
    std::fs::write(&path, template).context("failed to write synthesized template")?;
    Ok(path)
}

/// Build the launch plan for a validated configuration.
///
/// Handler-based targets synthesize a single-resource template in the
/// scratch directory; template-based targets invoke the user's template in
/// place and run from its directory.
pub fn build(
    config: &RunConfiguration,
    runtime: Runtime,
    code_root: &Path,
    credentials: Option<&AwsCredentials>,
    debug: Option<&DebugRequest>,
) -> Result<LaunchPlan> {
    let scratch = tempfile::Builder::new()
        .prefix("samrun-")
        .tempdir()
        .context("failed to create scratch directory")?;

    let payload_path = scratch.path().join(payload_file_name(&config.input));
    std::fs::write(&payload_path, &config.input).context("failed to write payload file")?;

    let (template_path, logical_id, working_dir) = match &config.template {
        Some(target) => {
            let working_dir = target
                .path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            (target.path.clone(), target.logical_id.clone(), working_dir)
        }
        None => {
            let handler = config.handler.as_deref().unwrap_or_default();
            let template_path = synthesize_template(
                scratch.path(),
                handler,
                runtime,
                code_root,
                config.timeout_secs,
            )?;
            (
                template_path,
                SYNTHESIZED_LOGICAL_ID.to_string(),
                code_root.to_path_buf(),
            )
        }
    };

    let mut args = vec![
        "local".to_string(),
        "invoke".to_string(),
        logical_id,
        "--template".to_string(),
        template_path.to_string_lossy().into_owned(),
        "--event".to_string(),
        payload_path.to_string_lossy().into_owned(),
        "--region".to_string(),
        config.region_id.clone(),
    ];

    if let Some(debug) = debug {
        args.push("--debugger-path".to_string());
        args.push(debug.debugger_path.to_string_lossy().into_owned());
        args.push("--debug-args".to_string());
        args.push(debug.debug_args.clone());
        args.push("--debug-port".to_string());
        args.push(debug.port.to_string());
    }

    let env = merge_env(&config.env, credentials, &config.region_id);

    Ok(LaunchPlan {
        request: LaunchRequest {
            args,
            working_dir,
            env,
        },
        scratch,
    })
}
