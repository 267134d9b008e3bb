// SPDX-License-Identifier: MIT
//! CLI subcommand implementations for the `samrun` binary.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::credentials::{AwsCredentials, CredentialRegistry};
use crate::debugger::DebugOptions;
use crate::error::RunError;
use crate::handler::SourceLocation;
use crate::invoke::{Runtime, RunConfiguration, SUPPORTED_RUNTIMES};
use crate::launcher::{self, RunOutcome};
use crate::{tool, RunnerContext};

/// Shared flags describing what to invoke.
pub struct InvokeArgs {
    pub handler: Option<String>,
    pub template: Option<PathBuf>,
    pub logical_id: Option<String>,
    pub runtime: Option<String>,
    pub input: String,
    pub env: Vec<String>,
    pub region: String,
    pub timeout_secs: Option<u64>,
    pub code_root: PathBuf,
    pub debug: bool,
    pub debug_port: Option<u16>,
    pub breakpoint: Option<String>,
}

/// Split repeated `KEY=VALUE` flags.
fn parse_env_pairs(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => bail!("invalid --env entry {pair:?} — expected KEY=VALUE"),
        })
        .collect()
}

/// `file:line` breakpoint flag.
fn parse_breakpoint(raw: &str) -> Result<SourceLocation> {
    let (file, line) = raw
        .rsplit_once(':')
        .context("invalid --breakpoint — expected FILE:LINE")?;
    Ok(SourceLocation {
        file: PathBuf::from(file),
        line: line.parse().context("invalid --breakpoint line number")?,
    })
}

fn build_config(
    args: &InvokeArgs,
    credentials_id: Option<&str>,
    default_timeout_secs: Option<u64>,
) -> Result<RunConfiguration> {
    let mut builder = RunConfiguration::builder()
        .input(args.input.clone())
        .region(args.region.clone());

    if let Some(id) = credentials_id {
        builder = builder.credentials(id);
    }
    if let Some(default_timeout) = default_timeout_secs {
        if args.timeout_secs.is_none() {
            builder = builder.timeout_secs(default_timeout);
        }
    }

    if let Some(ref handler) = args.handler {
        builder = builder.handler(handler.clone());
    }
    match (&args.template, &args.logical_id) {
        (Some(template), Some(logical_id)) => {
            builder = builder.template(template.clone(), logical_id.clone());
        }
        (Some(_), None) => bail!("--template requires --logical-id"),
        (None, Some(_)) => bail!("--logical-id requires --template"),
        (None, None) => {}
    }
    if let Some(ref runtime) = args.runtime {
        builder = builder.runtime(runtime.clone());
    }
    if let Some(timeout) = args.timeout_secs {
        builder = builder.timeout_secs(timeout);
    }
    for (key, value) in parse_env_pairs(&args.env)? {
        builder = builder.env(key, value);
    }

    Ok(builder.build())
}

/// Build a context whose credential registry carries the caller's ambient
/// AWS environment, if one is set.
async fn context_with_ambient_credentials(
    config: crate::config::SamRunConfig,
) -> (RunnerContext, Option<String>) {
    let registry = Arc::new(CredentialRegistry::new());
    let ctx = RunnerContext::new(config).with_credentials(registry.clone());

    let key = std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default();
    let secret = std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default();
    if key.is_empty() || secret.is_empty() {
        return (ctx, None);
    }
    let mut creds = AwsCredentials::basic(key, secret);
    creds.session_token = std::env::var("AWS_SESSION_TOKEN").ok().filter(|t| !t.is_empty());

    registry.add("environment", creds).await;
    (ctx, Some("environment".to_string()))
}

/// `samrun invoke` — run one local invocation and stream its output.
pub async fn invoke(config: crate::config::SamRunConfig, args: InvokeArgs, quiet: bool) -> Result<i32> {
    tool::pre_warm(config.tool.sam_executable());

    let (ctx, ambient_credentials) = context_with_ambient_credentials(config).await;

    let run_config = build_config(
        &args,
        ambient_credentials.as_deref(),
        Some(ctx.config.limits.default_invoke_timeout_secs),
    )?;

    let debug = if args.debug {
        let breakpoints = match &args.breakpoint {
            Some(raw) => vec![parse_breakpoint(raw)?],
            None => Vec::new(),
        };
        Some(DebugOptions {
            port: args.debug_port,
            debugger_path: None,
            breakpoints,
        })
    } else {
        None
    };

    // Mirror broadcast output lines to the console as they arrive.
    let mut events = ctx.broadcaster.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(raw) = events.recv().await {
            let Ok(event) = serde_json::from_str::<serde_json::Value>(&raw) else {
                continue;
            };
            match event["event"].as_str() {
                Some("run.stdout") => println!("{}", event["params"]["line"].as_str().unwrap_or("")),
                Some("run.stderr") => eprintln!("{}", event["params"]["line"].as_str().unwrap_or("")),
                _ => {}
            }
        }
    });

    let running = launcher::launch(&ctx, &args.code_root, &run_config, debug).await?;
    let outcome = running.wait().await;
    printer.abort();

    match outcome {
        Ok(result) => {
            if !quiet {
                match result.outcome {
                    RunOutcome::Completed => {
                        eprintln!("invocation finished with exit code {}", result.exit_code)
                    }
                    RunOutcome::TimedOut => eprintln!(
                        "invocation timed out after {}s and was killed",
                        run_config.timeout_secs
                    ),
                }
                if let Some(ref hit) = result.breakpoint_hit {
                    eprintln!("breakpoint hit at {}:{}", hit.file.display(), hit.line);
                }
            }
            Ok(if result.success() { 0 } else { 1 })
        }
        Err(RunError::Cancelled) => Ok(2),
        Err(e) => Err(e.into()),
    }
}

/// `samrun validate` — validate without launching.
pub fn validate(args: &InvokeArgs) -> Result<i32> {
    let config = build_config(args, None, None)?;
    let report = config.validate();
    if report.is_ok() {
        println!("ok");
        return Ok(0);
    }
    for error in &report.errors {
        println!("{}: {}", error.field, error.reason);
    }
    Ok(1)
}

/// `samrun handlers` — enumerate handler references in a code root.
pub fn handlers(code_root: &Path, runtime_id: &str) -> Result<i32> {
    let runtime = Runtime::from_id(runtime_id).with_context(|| {
        let supported = SUPPORTED_RUNTIMES
            .iter()
            .map(|r| r.id())
            .collect::<Vec<_>>()
            .join(", ");
        format!("unsupported runtime {runtime_id:?} — supported: {supported}")
    })?;

    let registry = crate::handler::ResolverRegistry::with_defaults();
    let resolver = registry
        .resolver(runtime.family())
        .context("no resolver for runtime family")?;

    let found = resolver.discover(code_root);
    if found.is_empty() {
        eprintln!("no handlers found under {}", code_root.display());
        return Ok(1);
    }
    for handler in found {
        println!("{handler}");
    }
    Ok(0)
}

/// `samrun doctor` — environment sanity checks.
pub async fn doctor(config: &crate::config::SamRunConfig) -> Result<i32> {
    let results = tool::run_doctor(config).await;
    let mut failed = 0;
    for check in &results {
        let mark = if check.passed { "✓" } else { "✗" };
        println!("{mark} {} — {}", check.name, check.detail);
        if !check.passed {
            failed += 1;
        }
    }
    Ok(if failed == 0 { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_pairs_parse() {
        let pairs = parse_env_pairs(&["Foo=Bar".to_string(), "Bat=Baz".to_string()]).unwrap();
        assert_eq!(pairs[0], ("Foo".to_string(), "Bar".to_string()));
        assert!(parse_env_pairs(&["NoEquals".to_string()]).is_err());
        assert!(parse_env_pairs(&["=empty".to_string()]).is_err());
    }

    #[test]
    fn breakpoint_parses_file_and_line() {
        let location = parse_breakpoint("src/app.py:14").unwrap();
        assert_eq!(location.file, PathBuf::from("src/app.py"));
        assert_eq!(location.line, 14);
        assert!(parse_breakpoint("src/app.py").is_err());
        assert!(parse_breakpoint("app.py:abc").is_err());
    }

    #[test]
    fn template_flags_must_pair() {
        let args = InvokeArgs {
            handler: None,
            template: Some(PathBuf::from("template.yaml")),
            logical_id: None,
            runtime: None,
            input: String::new(),
            env: Vec::new(),
            region: "us-east-1".to_string(),
            timeout_secs: None,
            code_root: PathBuf::from("."),
            debug: false,
            debug_port: None,
            breakpoint: None,
        };
        assert!(build_config(&args, None, None).is_err());
    }
}
