mod context;
mod crawl;
mod duration;
mod error;
mod gc;
mod stats;
mod verify;

use clap::{Parser, Subcommand};
use context::EngineContext;
use error::CliError;
use ptolemies_core::config::EngineConfig;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "ptolemies", author, version, about = "Documentation ingestion and retrieval engine operator CLI")]
struct Cli {
    /// Path to ptolemies.toml; falls back to compiled defaults plus environment overrides.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Crawl one source or all configured sources.
    Crawl {
        #[arg(long, conflicts_with = "all")]
        source: Option<String>,
        #[arg(long)]
        all: bool,
        /// Resume an unstarted source from its last checkpoint, reusing conditional-request state.
        #[arg(long)]
        incremental: bool,
    },
    /// Hard-delete tombstoned rows older than the retention window.
    Gc {
        /// e.g. `30d`, `12h`, `90` (bare seconds).
        #[arg(long)]
        retention: String,
    },
    /// Print combined vector/graph store statistics as JSON.
    Stats,
    /// Check the five cross-store invariants and report violations.
    Verify,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false).with_file(false).with_line_number(false);
    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    miette::set_panic_hook();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    std::process::exit(run(cli).await);
}

fn report(err: CliError) {
    eprintln!("{:?}", miette::Report::new(err));
}

/// Every exit code here is documented by the operational CLI's command
/// table: startup failures (bad config, unreachable store) fall back to
/// each command's own "could not complete" code since that is what an
/// operator scripting around this CLI needs to branch on, not a generic 1.
async fn run(cli: Cli) -> i32 {
    let command = cli.command;

    let config = match EngineConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            report(err.into());
            return 1;
        }
    };
    let ctx = match EngineContext::build(config).await {
        Ok(ctx) => ctx,
        Err(err) => {
            report(err);
            return command.startup_failure_code();
        }
    };

    match command {
        Command::Crawl { source, all, incremental } => match crawl::run(&ctx, source.as_deref(), all, incremental).await {
            Ok(code) => code,
            Err(err) => {
                report(err);
                3
            }
        },
        Command::Gc { retention } => match duration::parse_retention(&retention) {
            Ok(retention) => match gc::run(&ctx, retention).await {
                Ok(code) => code,
                Err(err) => {
                    report(err);
                    4
                }
            },
            Err(err) => {
                report(err);
                1
            }
        },
        Command::Stats => match stats::run(&ctx).await {
            Ok(code) => code,
            Err(err) => {
                report(err);
                1
            }
        },
        Command::Verify => match verify::run(&ctx).await {
            Ok(violations) => {
                for violation in &violations {
                    println!("{}: {}", violation.invariant, violation.detail);
                }
                if violations.is_empty() {
                    0
                } else {
                    5
                }
            }
            Err(err) => {
                report(err);
                1
            }
        },
    }
}

impl Command {
    fn startup_failure_code(&self) -> i32 {
        match self {
            Command::Crawl { .. } => 3,
            Command::Gc { .. } => 4,
            Command::Stats | Command::Verify => 1,
        }
    }
}
