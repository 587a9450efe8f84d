//! Demo host for the gantry engine.
//!
//! Builds a small pipeline (ingest feeding an enrich step, plus a cleanup
//! task gated on failure), runs it against a filesystem store, and prints
//! what the engine recorded. Running the binary twice shows the committed
//! output being replayed instead of recomputed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gantry_core::{Engine, FsStore, RunStatus, Task, Work, WorkError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IngestRequest {
    source: String,
    size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Batch {
    source: String,
    records: Vec<u64>,
}

/// Produces a batch; the first invocation fails to exercise retries.
struct Ingest {
    remaining_failures: AtomicU32,
}

#[async_trait]
impl Work<IngestRequest, Batch> for Ingest {
    async fn run(&self, input: IngestRequest) -> Result<Batch, WorkError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(WorkError::failed(format!(
                "upstream unavailable (left={left})"
            )));
        }
        Ok(Batch {
            records: (0..u64::from(input.size)).map(|n| n * 10).collect(),
            source: input.source,
        })
    }
}

/// Level filter from `GANTRY_LOG` (e.g. "debug"), default `info`.
fn init_logging() {
    let filter = EnvFilter::try_from_env("GANTRY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();

    let store = Arc::new(FsStore::new("gantry-store"));
    let engine = Engine::new(store);

    let ingest: Task<IngestRequest, Batch> = Task::new(
        "ingest",
        Ingest {
            remaining_failures: AtomicU32::new(1),
        },
    );
    let enrich: Task<Batch, usize> =
        Task::from_fn("enrich", |batch: Batch| Ok(batch.records.len()));
    let cleanup: Task<Option<Batch>, String> = Task::from_fn("cleanup", |_seen: Option<Batch>| {
        Ok("partial state removed".to_string())
    });

    // Enrich only batches with enough records; clean up whenever ingest fails.
    ingest.register(&enrich, |r| {
        r.output
            .as_ref()
            .and_then(|v| v.get("records"))
            .and_then(|v| v.as_array())
            .is_some_and(|records| records.len() >= 3)
    });
    ingest.register(&cleanup, |r| r.status == RunStatus::Fail);

    let request = IngestRequest {
        source: "demo".into(),
        size: 5,
    };

    // Retry until the run passes. The first attempt fails on a fresh store;
    // on a rerun the committed output is replayed immediately.
    let mut record = engine.execute(&ingest, request.clone()).await;
    while record.status == RunStatus::Fail {
        info!(attempts = record.attempts, "ingest failed, retrying");
        record = engine.execute(&ingest, request.clone()).await;
    }

    println!(
        "ingest: status={} attempts={} cached={} output={}",
        record.status,
        record.attempts,
        record.cached,
        record
            .output
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default(),
    );
    for run in enrich.records() {
        println!("enrich: status={} output={:?}", run.status, run.output);
    }
    for run in cleanup.records() {
        println!("cleanup: status={} output={:?}", run.status, run.output);
    }

    println!("elapsed in work attempts: {:?}", engine.elapsed());
}
