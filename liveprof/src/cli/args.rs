//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "liveprof",
    about = "Run a synthetic concurrent workload under the live profiler",
    after_help = "\
EXAMPLES:
    liveprof                                     50 transactions, 8 steps each
    liveprof --transactions 500 --concurrency 16 Heavier workload
    liveprof --export recent.json                Save recent transactions as JSON
    RUST_LOG=liveprof::events=info liveprof --log-events"
)]
pub struct Args {
    /// Number of transactions to run
    #[arg(long, default_value = "50", value_parser = clap::value_parser!(u32).range(1..))]
    pub transactions: u32,

    /// Steps per transaction
    #[arg(long, default_value = "8")]
    pub steps: u32,

    /// Transactions running at the same time
    #[arg(long, default_value = "4", value_parser = clap::value_parser!(u32).range(1..))]
    pub concurrency: u32,

    /// Size of the recent-transactions list
    #[arg(long, value_name = "N")]
    pub max_recent: Option<usize>,

    /// Write the recent transactions to a JSON file
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Log every profiler event (target `liveprof::events`)
    #[arg(long)]
    pub log_events: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["liveprof"]).unwrap();
        assert_eq!(args.transactions, 50);
        assert_eq!(args.steps, 8);
        assert_eq!(args.concurrency, 4);
        assert!(args.max_recent.is_none());
        assert!(!args.quiet);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(Args::try_parse_from(["liveprof", "--concurrency", "0"]).is_err());
    }

    #[test]
    fn test_export_path() {
        let args = Args::try_parse_from(["liveprof", "--export", "out.json", "-q"]).unwrap();
        assert_eq!(args.export, Some(PathBuf::from("out.json")));
        assert!(args.quiet);
    }
}
