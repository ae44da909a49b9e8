use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod context;
pub mod emitter;
pub mod lambda_config;
pub mod stacks;
pub mod template;

/// Synthesize the data platform stacks from a branch-resolved context.
#[derive(Parser, Debug)]
#[command(name = "cfn-stack-synth")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the context document (JSON, or YAML by extension)
    #[arg(long, short, default_value = "cdk.context.json")]
    context_file: PathBuf,

    /// Branch to resolve the environment for; defaults to the document's
    /// currentBranch
    #[arg(long, short)]
    branch: Option<String>,

    /// Directory the synthesized templates are written to
    #[arg(long, short, default_value = "cdk.out")]
    out_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cfn_stack_synth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // All-or-nothing: any synthesis error aborts the whole invocation.
    if let Err(error) = run(Cli::parse()).await {
        tracing::error!("synthesis failed: {error:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let document = context::load_document(&cli.context_file)?;
    let current_branch = cli
        .branch
        .or_else(|| document.current_branch.clone())
        .context("no branch given and the context document has no currentBranch")?;
    tracing::info!("Current git branch: {current_branch}");

    let context = context::resolve_context(&current_branch, &document).await;

    let emitter = emitter::CloudFormationEmitter;
    let stacks = [
        stacks::platform::assemble(&context)?,
        stacks::gateway::assemble(&context)?,
    ];
    for stack in &stacks {
        let path = emitter::write_template(&emitter, stack, &cli.out_dir)?;
        tracing::info!(
            "synthesized {} ({} resources) to {}",
            stack.stack_name,
            stack.resources.len(),
            path.display()
        );
    }

    return Ok(());
}
