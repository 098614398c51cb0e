//! Command-line harness for belief-tracking experiments.
//!
//! Loads a TOML config and a JSON scenario set, runs every
//! (model, temperature, trial, scenario) task against the live providers,
//! and writes a result artifact after each task.

mod cli;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracker::exit_codes;
use tracker::io::artifact::RunStatus;
use tracker::io::config::load_config;

use crate::config::{RunOverrides, apply_overrides};

#[derive(Parser)]
#[command(name = "eval", version, about = "Belief-state tracking experiments")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the experiment and write the result artifact.
    Run {
        /// TOML config file. Missing file means defaults.
        #[arg(long, default_value = "experiment.toml")]
        config: PathBuf,
        #[command(flatten)]
        overrides: RunOverrides,
    },
    /// Recompute the aggregation section of an existing artifact.
    Aggregate {
        artifact: PathBuf,
    },
    /// Print known models and the scenarios in a scenario set.
    List {
        #[arg(long, default_value = "scenarios.json")]
        scenarios: PathBuf,
    },
}

fn main() {
    tracker::logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { config, overrides } => {
            let cfg = apply_overrides(load_config(&config)?, &overrides)?;
            let status = cli::run(&cfg)?;
            Ok(match status {
                RunStatus::Interrupted => exit_codes::INTERRUPTED,
                RunStatus::Completed | RunStatus::Running => exit_codes::OK,
            })
        }
        Command::Aggregate { artifact } => {
            cli::aggregate(&artifact)?;
            Ok(exit_codes::OK)
        }
        Command::List { scenarios } => {
            cli::list(&scenarios)?;
            Ok(exit_codes::OK)
        }
    }
}
