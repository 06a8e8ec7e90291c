//! # mercator: ln(x) from a threaded Mercator series
//!
//! ## Usage
//! ```bash
//! # ln(1.5) with 4 threads, 1000 terms each
//! mercator 1.5 4 1000
//!
//! # Contiguous partitioning with a per-worker breakdown
//! mercator 0.5 8 50000 --strategy contiguous --report
//!
//! # Worker-level logging
//! mercator 2 4 1000 -vv
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use mercator::{ParallelReducer, SeriesInput, ShardStrategy};

#[derive(Parser, Debug)]
#[command(
    name = "mercator",
    about = "Approximate ln(x) for 0 < x <= 2 by summing the Mercator series on several threads.",
    version
)]
struct Config {
    /// Value to take the natural logarithm of, in (0, 2].
    #[arg(allow_negative_numbers = true)]
    x: f64,
    /// Number of worker threads.
    threads: usize,
    /// Series terms summed by each thread.
    iterations: usize,
    /// How series indices are assigned to threads.
    #[arg(long, value_enum, default_value_t = StrategyArg::Strided)]
    strategy: StrategyArg,
    /// Print a per-worker breakdown after the result.
    #[arg(long)]
    report: bool,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Strided,
    Contiguous,
}

impl From<StrategyArg> for ShardStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Strided => ShardStrategy::Strided,
            StrategyArg::Contiguous => ShardStrategy::Contiguous,
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Install a stderr fmt subscriber filtered by RUST_LOG or the -v count
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(true)
        .init();
}

/// The comparison lines printed after every successful run
fn render_result(total: f64, reference: f64) -> String {
    format!(
        "Value Calculated by the threads: {:.14}\n\
         Value Calculated by the math function: {:.14}\n\n\
         {:.14}\n\
         {:.14}\n",
        total, reference, total, reference
    )
}

fn run() -> Result<()> {
    let config = Config::parse();
    init_logging(config.verbose);

    let input = SeriesInput::new(config.x, config.threads, config.iterations)
        .context("invalid arguments")?;

    let reducer = ParallelReducer::new().with_strategy(config.strategy.into());
    let report = reducer
        .reduce_with_report(&input)
        .with_context(|| format!("failed to compute ln({})", config.x))?;

    let total = report.total();
    let reference = input.reference();

    print!("{}", render_result(total, reference));

    if config.report {
        println!();
        print!("{}", report);
    }

    Ok(())
}
