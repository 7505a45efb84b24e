//! Synthetic workload used by the demo binary
//!
//! Runs transactions on a handful of concurrent tasks. Every transaction goes
//! through a fixed pipeline of stages; `db` stages nest a fetch step, and
//! roughly one stage in thirteen fails.

use anyhow::{Context, Result};
use serde_json::json;
use std::time::Duration;

use crate::context;
use crate::domain::ProfilerError;
use crate::profiler::{Profiler, StepOptions, TransactionOptions};

const STAGES: [(&str, &str); 4] = [
    ("http", "parse request"),
    ("cache", "lookup"),
    ("db", "query"),
    ("compute", "render"),
];

#[derive(Debug, Clone, Copy)]
pub struct Workload {
    pub transactions: u32,
    pub steps: u32,
    pub concurrency: u32,
    /// Base delay of one stage; actual delays vary between 1x and 5x
    pub step_delay: Duration,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            transactions: 50,
            steps: 8,
            concurrency: 4,
            step_delay: Duration::from_millis(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadSummary {
    pub succeeded: u32,
    pub failed: u32,
}

impl WorkloadSummary {
    #[must_use]
    pub fn total(&self) -> u32 {
        self.succeeded + self.failed
    }
}

/// Run `workload` to completion
///
/// # Errors
/// Returns an error if a worker task panics or the profiler rejects a call
pub async fn run(profiler: &Profiler, workload: Workload) -> Result<WorkloadSummary> {
    let concurrency = workload.concurrency.max(1);
    let workers: Vec<_> = (0..concurrency)
        .map(|worker| context::spawn(run_worker(profiler.clone(), workload, worker, concurrency)))
        .collect();

    let mut summary = WorkloadSummary::default();
    for worker in workers {
        let partial = worker.await.context("Workload task panicked")??;
        summary.succeeded += partial.succeeded;
        summary.failed += partial.failed;
    }
    Ok(summary)
}

async fn run_worker(
    profiler: Profiler,
    workload: Workload,
    worker: u32,
    concurrency: u32,
) -> Result<WorkloadSummary, ProfilerError> {
    let mut summary = WorkloadSummary::default();

    for index in (worker..workload.transactions).step_by(concurrency as usize) {
        let transaction = profiler.transaction_with(
            "workload",
            "job",
            TransactionOptions::new()
                .display_name(format!("job #{index}"))
                .parameters(json!({ "index": index, "worker": worker }))
                .correlation_id(format!("demo-{index}")),
        )?;

        let mut failed_stages = 0;
        for stage in 0..workload.steps {
            let (category, name) = STAGES[stage as usize % STAGES.len()];
            let step = profiler.step_with(category, name, StepOptions::new().parameters(json!({ "stage": stage })))?;
            tokio::time::sleep(workload.step_delay * stage_delay_factor(index, stage)).await;

            if category == "db" {
                let fetch = profiler.step("db", "fetch rows")?;
                tokio::time::sleep(workload.step_delay).await;
                fetch.success_with(json!({ "rows": (u64::from(index) + u64::from(stage)) % 17 }))?;
            }

            if (u64::from(index) + u64::from(stage)) % 13 == 0 {
                step.failure(json!({ "error": "simulated timeout" }))?;
                failed_stages += 1;
            } else {
                step.success()?;
            }
        }

        if failed_stages == 0 {
            transaction.success()?;
            summary.succeeded += 1;
        } else {
            transaction.failure(json!({ "failedStages": failed_stages }))?;
            summary.failed += 1;
        }
    }
    Ok(summary)
}

/// Between 1 and 5; reduced before multiplying so large indices cannot overflow
fn stage_delay_factor(index: u32, stage: u32) -> u32 {
    1 + (index % 5 * 7 + stage % 5 * 13) % 5
}
