//! Command-line interface of the demo workload driver

mod args;

pub use args::Args;
