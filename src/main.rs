//! Contact router replay tool.
//!
//! Plays a JSON contact trace through the collision router and prints one
//! line per subscriber callback, followed by a per-tick summary. Handy for
//! checking how a set of subscriptions reacts to a recorded contact stream
//! without running the physics engine.
//!
//! # Running
//!
//! ```sh
//! cargo run --release -- traces/demo.json
//! cargo run --release -- traces/demo.json --shuffle 7
//! cargo run --release -- traces/demo.json --config contacts.ini
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, warn};

use contactrouter::replay::{Replay, load_trace};
use contactrouter::resources::routerconfig::RouterConfig;

/// Replay a contact trace through the collision router.
#[derive(Parser)]
#[command(version, about = "Replays physics contact traces through the collision router.")]
struct Cli {
    /// JSON trace to replay.
    #[arg(value_name = "TRACE", required_unless_present = "write_config")]
    trace: Option<PathBuf>,

    /// INI file with router settings. Defaults are used if it is missing.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Shuffle raw pair order and orientation within each tick using this seed.
    #[arg(long, value_name = "SEED")]
    shuffle: Option<u64>,

    /// Write the effective router settings to PATH and exit.
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,

    /// Print per-tick statistics after the callback log.
    #[arg(long)]
    stats: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = RouterConfig::new();
    if let Some(path) = &cli.config {
        config.config_path = path.clone();
        if let Err(e) = config.load_from_file() {
            warn!("Config file not found or invalid, using defaults: {}", e);
        }
    }

    if let Some(path) = &cli.write_config {
        config.config_path = path.clone();
        return match config.save_to_file() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    let Some(trace_path) = &cli.trace else {
        error!("No trace given");
        return ExitCode::FAILURE;
    };
    let trace = match load_trace(trace_path) {
        Ok(trace) => trace,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut replay = Replay::new(config);
    if let Some(seed) = cli.shuffle {
        replay = replay.with_shuffle(seed);
    }
    let output = match replay.run(&trace) {
        Ok(output) => output,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    for line in &output.lines {
        println!("{}", line);
    }
    if cli.stats {
        for stats in &output.stats {
            println!(
                "tick {}: raw={} matched={} start={} active={} end={} failed={}",
                stats.tick,
                stats.raw_pairs,
                stats.matched,
                stats.starts,
                stats.actives,
                stats.ends,
                stats.failures
            );
        }
    }
    for failure in &output.failures {
        println!("failed: {}", failure);
    }

    ExitCode::SUCCESS
}
