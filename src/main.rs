use std::{path::PathBuf, process::exit};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{prelude::*, EnvFilter};

use collatz_core::{load_checkpoint, save_checkpoint, RunStats, Verifier, VerifyError, VerifyRange};

/// Brute-force verify the Collatz conjecture for every value in [START, STOP),
/// building on the step map saved by a previous run.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// First value to verify (inclusive). An even start begins at the next odd value.
    start: u64,

    /// End of the range (exclusive)
    stop: u64,

    /// Step map to resume from. A file holding only the header line starts from scratch.
    checkpoint_in: PathBuf,

    /// Where to save the step map. It must cover every odd value below STOP.
    checkpoint_out: PathBuf,
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    debug!(?cli, "collatz starting");

    if let Err(e) = run(cli) {
        match e.downcast_ref::<VerifyError>() {
            Some(VerifyError::Counterexample { start, .. }) => {
                eprintln!("COUNTER FOUND: {start}");
            }
            _ => eprintln!("Error: {e:#}"),
        }
        exit(1);
    }
}

/// Diagnostics go to stderr, filtered by `RUST_LOG` (default `warn`), so the
/// report on stdout stays readable.
fn init_logging() {
    let log_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_filter(log_filter);

    tracing_subscriber::registry().with(log_layer).init();
}

fn run(cli: Cli) -> Result<()> {
    let range = VerifyRange::new(cli.start, cli.stop)?;

    println!("Initializing...");
    let mut step_map = load_checkpoint(&cli.checkpoint_in)
        .with_context(|| format!("Failed to load checkpoint {}", cli.checkpoint_in.display()))?;
    // The saved step map must cover [1, stop); the run itself only fills [start, stop).
    step_map.ensure_covers(range.start()).with_context(|| {
        format!(
            "Checkpoint {} does not cover every odd value below {}",
            cli.checkpoint_in.display(),
            range.start()
        )
    })?;
    debug!(entries = step_map.len(), "step map ready");

    println!("Running...");
    let stats = Verifier::new().with_progress().run(range, &mut step_map)?;

    println!("Saving results...");
    save_checkpoint(&step_map, &cli.checkpoint_out, range.stop())
        .with_context(|| format!("Failed to save checkpoint {}", cli.checkpoint_out.display()))?;

    print_report(&stats);
    Ok(())
}

fn print_report(stats: &RunStats) {
    println!();
    println!("Verification Time: {:.6}s", stats.elapsed.as_secs_f64());
    println!("Checks Per Second: {:.0}", stats.checks_per_second());
    println!();
    println!("Avg Steps: {:.2}", stats.avg_steps());
    if let Some((steps, value)) = stats.max_steps {
        println!("Max Steps: {steps} (at {value})");
    }
    println!(
        "Overflows: {} ({:.3}%)",
        stats.overflows,
        stats.overflow_percent()
    );
}
