use std::{
    fs::File,
    io::{self, BufReader, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lending_ledger::{
    config::{LedgerConfig, OverpaymentPolicy},
    ledger::Ledger,
    script::{demo_commands, run_commands, run_script, write_snapshot, ScriptSummary},
};

#[derive(Parser)]
#[command(name = "lending-ledger", version, about = "Borrower/loan ledger driven by JSON-lines commands")]
struct Cli {
    /// JSON config file (e.g. {"overpayment":"settle"})
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the overpayment policy from the config file
    #[arg(long, value_enum, global = true)]
    overpayment: Option<OverpaymentPolicy>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a JSON-lines command script ("-" reads stdin)
    Run {
        script: PathBuf,
        /// Print the final ledger snapshot after the last command
        #[arg(long)]
        snapshot: bool,
    },
    /// Replay the Alice/Bob walkthrough
    Demo {
        #[arg(long)]
        snapshot: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<LedgerConfig> {
    let mut config = match &cli.config {
        Some(path) => LedgerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LedgerConfig::default(),
    };
    if let Some(policy) = cli.overpayment {
        config.overpayment = policy;
    }
    Ok(config)
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!(overpayment = ?config.overpayment, "ledger configured");
    let mut ledger = Ledger::with_config(config);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let (summary, snapshot): (ScriptSummary, bool) = match &cli.command {
        Command::Run { script, snapshot } => {
            let summary = if script.as_os_str() == "-" {
                run_script(&mut ledger, io::stdin().lock(), &mut out)
            } else {
                let file = File::open(script)
                    .with_context(|| format!("opening script {}", script.display()))?;
                run_script(&mut ledger, BufReader::new(file), &mut out)
            }
            .context("running script")?;
            (summary, *snapshot)
        }
        Command::Demo { snapshot } => {
            let summary = run_commands(&mut ledger, demo_commands(), &mut out)
                .context("running demo")?;
            (summary, *snapshot)
        }
    };
    if snapshot {
        write_snapshot(&ledger, &mut out).context("writing snapshot")?;
    }
    out.flush()?;

    info!(
        applied = summary.applied,
        rejected = summary.rejected,
        malformed = summary.malformed,
        "done"
    );
    Ok(())
}
