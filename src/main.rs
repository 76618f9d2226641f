//! semgate: stress the semaphore, counter and per-key lock primitives
//!
//! Each subcommand runs one scenario across a pool of worker threads and
//! fails if a primitive breaks its contract.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use semgate::cli::Args;

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging based on verbosity and quiet mode
    let level = if args.quiet {
        Level::ERROR
    } else {
        match args.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_names(args.verbose > 1)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting semgate v{}", env!("CARGO_PKG_VERSION"));
    info!("Scenario: {:?}", args.command);
    info!("Worker threads: {}", args.effective_threads());
    info!("Until timeout: {} ms", args.until_timeout_ms);

    // Validate arguments
    args.validate().context("Invalid arguments")?;

    let report = semgate::run(&args).context("Stress run failed")?;

    if !args.quiet {
        println!("{report}");
    }
    Ok(())
}
