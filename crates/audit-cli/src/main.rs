//! # audit CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use audit_cli::engagement::{run_engagement, EngagementArgs};
use audit_cli::matrix::{run_matrix, MatrixArgs};
use audit_cli::testing::{run_testing, TestingArgs};

/// Audit engagement toolchain.
///
/// Validates risk & control matrices, evaluates control samples and rolls
/// control statuses up to an engagement status.
#[derive(Parser, Debug)]
#[command(name = "audit", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Risk & control matrix operations.
    Matrix(MatrixArgs),

    /// Sample evaluation for one control.
    Testing(TestingArgs),

    /// Engagement status roll-up.
    Engagement(EngagementArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Matrix(args) => run_matrix(&args),
        Commands::Testing(args) => run_testing(&args),
        Commands::Engagement(args) => run_engagement(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
