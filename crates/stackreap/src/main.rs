//! stackreap: force-delete CloudFormation stacks stuck in DELETE_FAILED
//!
//! Empties and removes the resources that block a stack delete, recurses into
//! nested stacks and deletes multiple stacks in export/import order.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use stackreap::aws::api::{StackApi, StackSummary};
use stackreap::aws::{AwsContext, CloudClients, CloudFormationClient, FromAwsContext};
use stackreap::config::{AwsConfig, ReapConfig};
use stackreap::error::ReapError;
use stackreap::orchestrator::DeleteOutcome;
use stackreap::retry::RetryPolicy;
use stackreap::{DeletionReport, Reaper};
use stackreap_common::defaults::{
    DEFAULT_CLEANUP_CONCURRENCY, DEFAULT_MAX_DELETE_ATTEMPTS, DEFAULT_OBJECT_DELETE_WORKERS,
    DEFAULT_STACK_WAIT_TIMEOUT_SECS,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "stackreap")]
#[command(about = "Force-delete CloudFormation stacks and the resources blocking them")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Connection arguments shared by every command
#[derive(clap::Args, Debug)]
struct AwsArgs {
    /// AWS region
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// AWS profile to use
    #[arg(long, env = "AWS_PROFILE")]
    profile: Option<String>,
}

impl From<AwsArgs> for AwsConfig {
    fn from(args: AwsArgs) -> Self {
        Self {
            region: args.region,
            profile: args.profile,
        }
    }
}

/// Arguments for the delete command (extracted to reduce enum size)
#[derive(clap::Args, Debug)]
struct DeleteArgs {
    /// Stack to delete (repeat for several)
    #[arg(short, long = "stack", required = true)]
    stacks: Vec<String>,

    /// Remove Retain deletion policies from the templates first
    #[arg(long)]
    force: bool,

    /// Stacks deleted at once within a dependency group (default: all of them)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Blocking resources cleaned at once within one stack
    #[arg(long, default_value_t = DEFAULT_CLEANUP_CONCURRENCY)]
    cleanup_concurrency: usize,

    /// Concurrent DeleteObjects workers per bucket
    #[arg(long, default_value_t = DEFAULT_OBJECT_DELETE_WORKERS)]
    object_workers: usize,

    /// Minutes to wait for a single stack to settle
    #[arg(long, default_value_t = DEFAULT_STACK_WAIT_TIMEOUT_SECS / 60)]
    timeout_minutes: u64,

    /// Delete calls issued per stack before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_DELETE_ATTEMPTS)]
    max_delete_attempts: usize,

    #[command(flatten)]
    aws: AwsArgs,
}

impl DeleteArgs {
    fn reap_config(&self) -> ReapConfig {
        ReapConfig {
            force: self.force,
            concurrency: self.concurrency,
            cleanup_concurrency: self.cleanup_concurrency,
            object_workers: self.object_workers,
            timeout: Duration::from_secs(self.timeout_minutes.saturating_mul(60)),
            max_delete_attempts: self.max_delete_attempts,
            ..ReapConfig::default()
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Force-delete one or more stacks
    Delete(Box<DeleteArgs>),

    /// List live stacks, DELETE_FAILED first
    List {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        #[command(flatten)]
        aws: AwsArgs,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    // Print main error message
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    // Print error chain (causes)
    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    // One block per failed stack
    if let Some(ReapError::StackFailures {
        failures,
        deleted,
        not_started,
    }) = e.downcast_ref::<ReapError>()
    {
        for failure in failures {
            let _ = writeln!(stderr, "\n\x1b[1m{}\x1b[0m: {}", failure.stack, failure.error);
            let mut source = std::error::Error::source(&failure.error);
            while let Some(cause) = source {
                let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
                source = cause.source();
            }
        }
        if !deleted.is_empty() {
            let _ = writeln!(stderr, "\nDeleted: {}", deleted.join(", "));
        }
        if !not_started.is_empty() {
            let _ = writeln!(stderr, "Not started: {}", not_started.join(", "));
        }
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

fn init_tracing() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy()
        // Reduce noise from AWS SDK (show only warnings and errors)
        .add_directive("aws_config=warn".parse()?)
        .add_directive("aws_sdk=warn".parse()?)
        .add_directive("aws_smithy=warn".parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing()?;

    match args.command {
        Command::Delete(delete_args) => handle_delete(*delete_args).await,
        Command::List { format, aws } => handle_list(aws.into(), format).await,
    }
}

async fn load_context(aws: &AwsConfig) -> Result<AwsContext> {
    aws.validate()?;
    if let Some(profile) = &aws.profile {
        info!(profile = %profile, "Using AWS profile");
    }
    let ctx = AwsContext::with_profile(aws.region.as_deref(), aws.profile.as_deref()).await;
    if ctx.region().is_none() {
        anyhow::bail!("no AWS region configured; pass --region or set AWS_REGION");
    }
    Ok(ctx)
}

/// Handle the delete command
async fn handle_delete(args: DeleteArgs) -> Result<()> {
    let config = args.reap_config();
    config.validate()?;

    let aws: AwsConfig = args.aws.into();
    let ctx = load_context(&aws).await?;
    info!(
        region = ?ctx.region(),
        stacks = ?args.stacks,
        force = config.force,
        concurrency = ?config.concurrency,
        "Starting force delete"
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after in-flight calls");
                cancel.cancel();
            }
        }
    });

    let reaper = Reaper::new(CloudClients::from_context(&ctx), &config);
    let report = reaper.run(&args.stacks, &cancel).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &DeletionReport) {
    println!("\n=== Delete Report ===");
    for (index, group) in report.groups.iter().enumerate() {
        println!("Group {}:", index + 1);
        for stack in group {
            let status = match report.outcomes.get(stack) {
                Some(DeleteOutcome::Deleted {
                    delete_calls,
                    cleaned,
                }) => format!("deleted ({delete_calls} delete calls, {cleaned} resources cleaned)"),
                Some(DeleteOutcome::AlreadyDeleted) => "did not exist".to_string(),
                None => "not processed".to_string(),
            };
            println!("  {stack:<40} {status}");
        }
    }
}

/// Handle the list command
async fn handle_list(aws: AwsConfig, format: OutputFormat) -> Result<()> {
    let ctx = load_context(&aws).await?;
    let client = CloudFormationClient::from_context(&ctx);

    let mut stacks = RetryPolicy::default()
        .call("ListStacks", || client.list_stacks())
        .await
        .context("failed to list stacks")?;
    sort_for_listing(&mut stacks);

    if stacks.is_empty() {
        println!("No stacks found.");
        return Ok(());
    }

    match format {
        OutputFormat::Json => {
            let json: Vec<_> = stacks
                .iter()
                .map(|s| serde_json::json!({ "name": s.name, "status": s.raw_status }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => {
            println!("{:<60} {:<30}", "STACK", "STATUS");
            println!("{}", "-".repeat(90));
            for s in &stacks {
                println!("{:<60} {:<30}", s.name, s.raw_status);
            }
            println!("\nTotal: {} stacks", stacks.len());
        }
    }

    Ok(())
}

/// DELETE_FAILED stacks first, then by name
fn sort_for_listing(stacks: &mut [StackSummary]) {
    stacks.sort_by(|a, b| {
        (a.raw_status != "DELETE_FAILED", &a.name).cmp(&(b.raw_status != "DELETE_FAILED", &b.name))
    });
}
