use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;
use propensity::manager::Manager;
use std::path::PathBuf;

/// Kinetic Monte Carlo simulation of agent populations.
///
/// Runs live under `--sim-dir` next to its `config.toml`, one `run-NNNN`
/// directory per independent trajectory.
#[derive(Debug, Parser)]
#[command(version, about, long_about)]
struct CLI {
    /// Simulation directory containing `config.toml`.
    #[arg(long)]
    sim_dir: PathBuf,

    /// Log more detail (`-v` for debug, `-vv` to trace every event).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Seed a new run directory from `[init]` and write its first trajectory file.
    Create,

    /// Load `checkpoint.msgpack` of a run and append one more trajectory file.
    ///
    /// Fails if `config.toml` changed since the checkpoint was written.
    Resume {
        /// Index of the run, as in `run-NNNN`.
        #[arg(long)]
        run_idx: usize,
    },

    /// Write `results.msgpack` with mean counts, event shares and total count of every run.
    Analyze,

    /// Remove every `run-NNNN` directory, keeping `config.toml`.
    Clean,
}

fn level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() {
    let args = CLI::parse();

    // `RUST_LOG` still overrides the verbosity flag.
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(level(args.verbose))
        .parse_default_env()
        .init();

    if let Err(error) = run_cli(args) {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli(args: CLI) -> Result<()> {
    log::info!("{args:#?}");

    let mgr = Manager::new(&args.sim_dir)
        .with_context(|| format!("failed to open simulation in {:?}", args.sim_dir))?;

    match args.command {
        Command::Create => mgr.create_run().context("failed to create run")?,
        Command::Resume { run_idx } => mgr
            .resume_run(run_idx)
            .with_context(|| format!("failed to resume run {run_idx}"))?,
        Command::Analyze => mgr.analyze_sim().context("failed to analyze runs")?,
        Command::Clean => mgr.clean_sim().context("failed to clean runs")?,
    }

    Ok(())
}
