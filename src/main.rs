use anyhow::Result;
use clap::{Parser, Subcommand};
use samrun::cli::{self, InvokeArgs};
use samrun::config::SamRunConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "samrun",
    about = "Local serverless-function runner — invoke and debug Lambda handlers through the SAM CLI",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config.toml
    #[arg(long, env = "SAMRUN_CONFIG", default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SAMRUN_LOG", global = true)]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "SAMRUN_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Suppress progress and informational output.
    ///
    /// Function output on stdout is unaffected. Use this flag when piping
    /// output to other tools.
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Invoke a function locally through the SAM CLI.
    ///
    /// Either a handler reference (with a runtime) or a template resource
    /// must be given.
    ///
    /// Examples:
    ///   samrun invoke --handler app.handler --runtime python3.12 --input '"hello world"'
    ///   samrun invoke --template template.yaml --logical-id SomeFunction --input '{}'
    ///   samrun invoke --handler app.handler --runtime python3.12 --debug --breakpoint app.py:4
    Invoke {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Validate a run configuration without launching anything.
    ///
    /// Examples:
    ///   samrun validate --template template.yaml --logical-id SomeFunction
    Validate {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// List handler references discovered in a code root.
    ///
    /// Examples:
    ///   samrun handlers --runtime python3.12 .
    Handlers {
        /// Runtime whose resolver scans the code root
        #[arg(long)]
        runtime: String,
        /// Code root to scan
        #[arg(default_value = ".")]
        code_root: PathBuf,
    },
    /// Check the environment: SAM CLI presence, version, debugger artifacts.
    Doctor,
}

#[derive(clap::Args)]
struct TargetArgs {
    /// Handler reference, e.g. `app.handler` or `Echo::Echo.Function::Handle`
    #[arg(long)]
    handler: Option<String>,

    /// SAM template path (requires --logical-id)
    #[arg(long)]
    template: Option<PathBuf>,

    /// Logical resource id within the template
    #[arg(long)]
    logical_id: Option<String>,

    /// Runtime identifier, e.g. python3.12 (required with --handler)
    #[arg(long)]
    runtime: Option<String>,

    /// Input payload passed to the function
    #[arg(long, default_value = "{}")]
    input: String,

    /// Environment variable KEY=VALUE (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// AWS region injected into the sandbox
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    region: String,

    /// Seconds before the invocation is killed
    #[arg(long)]
    timeout: Option<u64>,

    /// Code root the handler resolves against
    #[arg(long, default_value = ".")]
    code_root: PathBuf,

    /// Attach a debugger to the invocation
    #[arg(long)]
    debug: bool,

    /// Explicit debug port (default: allocated from the configured range)
    #[arg(long)]
    debug_port: Option<u16>,

    /// Breakpoint to bind once attached, as FILE:LINE
    #[arg(long)]
    breakpoint: Option<String>,
}

impl From<TargetArgs> for InvokeArgs {
    fn from(t: TargetArgs) -> Self {
        InvokeArgs {
            handler: t.handler,
            template: t.template,
            logical_id: t.logical_id,
            runtime: t.runtime,
            input: t.input,
            env: t.env,
            region: t.region,
            timeout_secs: t.timeout,
            code_root: t.code_root,
            debug: t.debug,
            debug_port: t.debug_port,
            breakpoint: t.breakpoint,
        }
    }
}

fn init_tracing(level: Option<&str>, log_file: Option<&PathBuf>) {
    let filter = EnvFilter::try_from_env("SAMRUN_LOG")
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let directory = path.parent().unwrap_or(std::path::Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "samrun.log".to_string());
            let appender = tracing_appender::rolling::daily(directory, file_name);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(appender)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log.as_deref(), args.log_file.as_ref());

    let config = SamRunConfig::load(&args.config);

    let code = match args.command {
        Command::Invoke { target } => cli::invoke(config, target.into(), args.quiet).await?,
        Command::Validate { target } => cli::validate(&target.into())?,
        Command::Handlers { runtime, code_root } => cli::handlers(&code_root, &runtime)?,
        Command::Doctor => cli::doctor(&config).await?,
    };

    std::process::exit(code);
}
