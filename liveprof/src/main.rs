//! # liveprof - Demo Workload Driver
//!
//! Runs a synthetic concurrent workload under the profiler, then prints the
//! aggregated statistics and optionally saves the recent transactions as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, Level};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::Instant;

use liveprof::cli::Args;
use liveprof::subscribers::{LoggingSubscriber, StatsSubscriber};
use liveprof::workload::{self, Workload};
use liveprof::{snapshot, Profiler, ProfilerConfig, ProfilerError};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ProfilerError>() {
        Some(ProfilerError::InvalidConfig(_) | ProfilerError::InvalidArgument { .. }) => EXIT_USAGE,
        _ => EXIT_ERROR,
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let mut config = ProfilerConfig::from_env();
    if let Some(cap) = args.max_recent {
        config = config.with_max_recent_transactions(cap);
    }
    let profiler = Profiler::new(config).context("Invalid profiler configuration")?;

    if !quiet {
        println!("liveprof v{}", env!("CARGO_PKG_VERSION"));
        println!(
            "workload: {} transactions x {} steps, concurrency {}",
            args.transactions, args.steps, args.concurrency
        );
    }

    let stats = Arc::new(StatsSubscriber::new());
    profiler.register_subscriber(stats.clone())?;
    let logger = Arc::new(LoggingSubscriber::new(Level::Info));
    if args.log_events {
        profiler.register_subscriber(logger.clone())?;
    }

    let started = Instant::now();
    let summary = workload::run(
        &profiler,
        Workload {
            transactions: args.transactions,
            steps: args.steps,
            concurrency: args.concurrency,
            ..Workload::default()
        },
    )
    .await?;
    let elapsed = started.elapsed();

    // Waits until both have seen every event, so keep it off the runtime threads
    let drain = {
        let profiler = profiler.clone();
        let stats = Arc::clone(&stats);
        let logger = Arc::clone(&logger);
        tokio::task::spawn_blocking(move || {
            profiler.unregister_subscriber(&stats);
            profiler.unregister_subscriber(&logger);
        })
    };
    drain.await.context("Failed to stop subscribers")?;
    debug!("Workload finished in {elapsed:?}");

    if !quiet {
        println!(
            "done: {} ok, {} failed in {:.2}s",
            summary.succeeded,
            summary.failed,
            elapsed.as_secs_f64()
        );
        println!("\n{}", stats.snapshot());
    }

    if let Some(ref export_path) = args.export {
        let recent = profiler.recent_transactions(false);
        let file = File::create(export_path)
            .with_context(|| format!("Failed to create {}", export_path.display()))?;
        let mut writer = BufWriter::new(file);
        snapshot::write_json(&recent, &mut writer).context("Failed to export transactions")?;
        writer.flush().context("Failed to export transactions")?;
        if !quiet {
            println!("saved: {} ({} transactions)", export_path.display(), recent.len());
        }
    }

    Ok(())
}
