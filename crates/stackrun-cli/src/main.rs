//! Stackrun CLI - plan/apply/destroy infrastructure stacks per environment
//!
//! Commands:
//! - stackrun sync-tfvars <env>       - Pull the environment's variable file
//! - stackrun upload-artifacts <env>  - Upload changed deployment archives
//! - stackrun plan <env> [--parallel] - Plan all stacks (or one with --stack)
//! - stackrun apply <env>             - Apply saved plans
//! - stackrun destroy <env>           - Destroy stacks in reverse order
//! - stackrun stacks                  - List configured stacks
//! - stackrun config                  - Show the resolved configuration

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use stackrun_core::{open_store, Config, ProcessRunner, RunReport, StackRunner, Syncer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stackrun - infrastructure stack task runner
#[derive(Parser)]
#[command(name = "stackrun", version, about = "Per-environment infrastructure stack runner")]
struct Cli {
    /// Config file (default: ./stackrun.json, then ~/.stackrun/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull the environment's tfvars file from the object store
    SyncTfvars {
        env: String,
    },
    /// Upload deployment archives whose content changed
    UploadArtifacts {
        env: String,
    },
    /// Plan all stacks, or a single one
    Plan {
        env: String,
        /// Only this stack
        #[arg(short, long)]
        stack: Option<String>,
        /// Plan stacks concurrently (failures don't stop other stacks)
        #[arg(short, long, conflicts_with = "stack")]
        parallel: bool,
        /// Max concurrent stacks in parallel mode (default: from config)
        #[arg(short = 'j', long, requires = "parallel")]
        concurrency: Option<usize>,
    },
    /// Apply saved plans, in configured order
    Apply {
        env: String,
        #[arg(short, long)]
        stack: Option<String>,
    },
    /// Destroy stacks, last configured first
    Destroy {
        env: String,
        #[arg(short, long)]
        stack: Option<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// List configured stacks in order
    Stacks,
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let cwd = std::env::current_dir()?;
    let config = Arc::new(Config::load(cli.config.as_deref(), &cwd)?);

    match cli.command {
        Commands::SyncTfvars { env } => {
            let syncer = Syncer::new(open_store(&config.store)?);
            let path = syncer.sync_tfvars(&config, &env).await?;
            println!("✅ tfvars ready at {}", path.display());
        }

        Commands::UploadArtifacts { env } => {
            let syncer = Syncer::new(open_store(&config.store)?);
            let summary = syncer.upload_artifacts(&config, &env).await?;
            println!();
            print!("{}", summary);
            println!(
                "⬆️  {} uploaded, {} skipped",
                summary.uploaded(),
                summary.skipped()
            );
        }

        Commands::Plan {
            env,
            stack,
            parallel,
            concurrency,
        } => {
            let runner = stack_runner(&config);
            let start = Instant::now();
            let report = match stack {
                Some(stack) => runner.plan_stack(&env, &stack)?,
                None => {
                    let workers = concurrency.unwrap_or(config.concurrency);
                    runner.plan_all_with(&env, parallel, workers).await?
                }
            };
            finish(&report, start)?;
        }

        Commands::Apply { env, stack } => {
            let runner = stack_runner(&config);
            let start = Instant::now();
            let report = match stack {
                Some(stack) => runner.apply_stack(&env, &stack)?,
                None => runner.apply_all(&env)?,
            };
            finish(&report, start)?;
        }

        Commands::Destroy { env, stack, yes } => {
            let target = stack.as_deref().unwrap_or("ALL stacks");
            if !yes && !confirm_destroy(target, &env)? {
                println!("Aborted.");
                return Ok(());
            }

            let runner = stack_runner(&config);
            let start = Instant::now();
            let report = match stack {
                Some(stack) => runner.destroy_stack(&env, &stack)?,
                None => runner.destroy_all(&env)?,
            };
            finish(&report, start)?;
        }

        Commands::Stacks => {
            println!("📋 Stacks ({}):", config.stacks.len());
            for (i, stack) in config.stacks.iter().enumerate() {
                println!("   {}. {}", i + 1, stack);
            }
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        }
    }

    Ok(())
}

fn stack_runner(config: &Arc<Config>) -> StackRunner<ProcessRunner> {
    let timeout = config.step_timeout_secs.map(Duration::from_secs);
    let commands = ProcessRunner::new().with_timeout(timeout);
    StackRunner::new(Arc::clone(config), commands)
}

fn confirm_destroy(target: &str, env: &str) -> Result<bool> {
    let confirmed = Confirm::new()
        .with_prompt(format!("⚠️  Destroy {} in {}?", target, env))
        .default(false)
        .interact()?;
    Ok(confirmed)
}

/// Print the run summary; any failed stack makes the command fail
fn finish(report: &RunReport, start: Instant) -> Result<()> {
    println!();
    print!("{}", report);

    let failed = report.failures().count();
    if failed > 0 {
        bail!(
            "{} of {} stacks failed ({} succeeded) in {:?}",
            failed,
            report.outcomes.len(),
            report.succeeded(),
            start.elapsed()
        );
    }

    println!("✅ All {} stacks completed in {:?}", report.succeeded(), start.elapsed());
    Ok(())
}
