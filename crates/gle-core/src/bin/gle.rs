// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — CLI
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueHint};
use gle_core::pipeline::Pipeline;
use gle_types::config::PipelineConfig;
use gle_types::error::GleResult;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Reconstruct memory kernels from trajectory ensembles and resynthesise trajectories"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every stage, reusing cached artifacts in the output directory
    Run(RunArgs),

    /// Parse and validate a configuration, then print it with defaults filled in
    Check(ConfigArg),
}

#[derive(Args)]
struct ConfigArg {
    /// JSON pipeline configuration
    #[arg(long, short, value_hint = ValueHint::FilePath)]
    config: PathBuf,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArg,

    /// Override simulation.num_sim
    #[arg(long)]
    num_sim: Option<usize>,

    /// Override simulation.seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override output_dir
    #[arg(long, value_hint = ValueHint::DirPath)]
    output_dir: Option<PathBuf>,
}

fn run(args: RunArgs) -> GleResult<()> {
    let mut config = PipelineConfig::from_file(&args.config.config)?;
    if let Some(n) = args.num_sim {
        config.simulation.num_sim = n;
    }
    if let Some(seed) = args.seed {
        config.simulation.seed = Some(seed);
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    let report = Pipeline::new(config)?.run()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn check(args: ConfigArg) -> GleResult<()> {
    let config = PipelineConfig::from_file(&args.config)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "gle=info,gle_core=info".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(args) => run(args),
        Command::Check(args) => check(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "gle failed");
            ExitCode::FAILURE
        }
    }
}
