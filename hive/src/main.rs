//! Hive driver.
//!
//! Seeds a root agent with one objective and runs scheduling sweeps over
//! the agent tree, printing the root's replies and the live tree after each
//! sweep. Configuration lives in `.hive/config.toml`.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use hive::core::chat::ChatEntry;
use hive::core::error::HiveError;
use hive::exit_codes;
use hive::hive::Hive;
use hive::io::config::{DEFAULT_CONFIG_PATH, HiveConfig, load_config, write_config};
use hive::io::model::{CommandModel, Model};
use hive::io::sandbox::SandboxManager;
use hive::logging;

#[derive(Parser)]
#[command(
    name = "hive",
    version,
    about = "Drive a tree of tool-calling agents toward one objective"
)]
struct Cli {
    /// Path to the TOML config.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Check that the sandbox can run commands and reach the network.
    Health,
    /// Seed the root agent with an objective and run sweeps.
    Run {
        /// Objective delivered to the root agent.
        objective: String,
        /// Number of sweeps to run.
        #[arg(long, default_value_t = 10)]
        sweeps: u32,
        /// Skip the startup sandbox health check.
        #[arg(long)]
        skip_health_check: bool,
        /// Read one line from stdin after each sweep and deliver it to the root.
        #[arg(long)]
        follow_up: bool,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Health => {
            let config = load_config(&cli.config)?;
            Ok(cmd_health(&config))
        }
        Command::Run {
            objective,
            sweeps,
            skip_health_check,
            follow_up,
        } => {
            let config = load_config(&cli.config)?;
            if !skip_health_check {
                let code = cmd_health(&config);
                if code != exit_codes::OK {
                    return Ok(code);
                }
            }
            let model = CommandModel::new(&config.model);
            let hive = Hive::new(config, model)?;
            cmd_run(hive, &objective, sweeps, follow_up)
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        return Ok(exit_codes::OK);
    }
    write_config(path, &HiveConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_health(config: &HiveConfig) -> i32 {
    let mut sandbox = SandboxManager::new(config.sandbox.clone());
    match sandbox.health_check() {
        Ok(report) => {
            println!("sandbox echo: {}", report.echo);
            println!("sandbox network: {}", report.network);
            exit_codes::OK
        }
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::UNHEALTHY
        }
    }
}

fn cmd_run<M: Model>(mut hive: Hive<M>, objective: &str, sweeps: u32, follow_up: bool) -> Result<i32> {
    hive.deliver_external(objective)
        .context("deliver objective to root")?;
    let mut printed = hive.external_transcript().len();
    let mut stdin = follow_up.then(|| io::stdin().lock().lines());

    for sweep in 1..=sweeps {
        let report = match hive.sweep() {
            Ok(report) => report,
            Err(err @ HiveError::ModelUnavailable(_)) => {
                eprintln!("{err}");
                return Ok(exit_codes::MODEL_UNAVAILABLE);
            }
            Err(err) => return Err(err.into()),
        };
        info!(sweep, turns = report.turns.len(), "sweep complete");
        for failure in report.failures() {
            eprintln!("warning: {failure}");
        }

        let root_label = hive
            .registry()
            .lookup(hive.root_id())
            .map(|root| root.label().to_string())
            .unwrap_or_default();
        let transcript = hive.external_transcript();
        for entry in &transcript[printed.min(transcript.len())..] {
            if let ChatEntry::Peer(text) = entry {
                println!("{root_label}: {text}");
            }
        }
        printed = transcript.len();
        println!("--- sweep {sweep} ---");
        print!("{}", hive.summary());

        if let Some(lines) = stdin.as_mut() {
            match lines.next() {
                Some(line) => {
                    let line = line.context("read follow-up from stdin")?;
                    if !line.trim().is_empty() {
                        hive.deliver_external(line.trim())
                            .context("deliver follow-up to root")?;
                        printed += 1;
                    }
                }
                None => stdin = None,
            }
        }
    }
    Ok(exit_codes::OK)
}
