//! Execution engine: memoization, classification, propagation.
//!
//! `execute` resolves a [`RunRecord`] for a (task, input) pair — replayed from
//! the store when the fingerprint was committed before, computed otherwise —
//! and then walks the dependent graph, triggering every registration whose
//! predicate accepts the record.
//!
//! No error escapes `execute`: work failures, deadline expiry and engine
//! internals (store, codec) are all classified into the returned record.

mod elapsed;

pub use elapsed::ElapsedCounter;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{AttemptId, Fingerprint, RunRecord, RunStatus, StoredEntry, WorkError};
use crate::impls::JsonCodec;
use crate::ports::{Clock, Codec, CodecError, Store, StoreError, StoreKey, SystemClock};
use crate::task::{Payload, Task, TaskCore};

/// Per-call knobs for `execute_with`.
///
/// These apply to the root execution only; propagated dependents run with
/// defaults (a host that wants bounded dependents gates them and drives them
/// itself).
#[derive(Clone, Default)]
pub struct ExecOptions {
    /// Upper bound on the work invocation. Expiry drops the work future,
    /// persists nothing, and records `timeout`.
    pub deadline: Option<Duration>,

    /// Cooperative cancellation. Cancelled before start records `skip`;
    /// cancelled mid-run records `timeout`.
    pub cancel: Option<CancellationToken>,
}

impl ExecOptions {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Internal umbrella for infrastructure failures; classified into
/// `exception` records at the `execute` boundary, never surfaced raw.
#[derive(Debug, Error)]
enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("store entry vanished for key {0}")]
    Vanished(StoreKey),
}

/// How one work invocation ended, before classification.
enum Invocation {
    Output(Result<Value, WorkError>),
    DeadlineExceeded(Duration),
    Cancelled,
}

/// The execution engine for one pipeline run.
///
/// Owns the shared collaborators: the write-once [`Store`], the [`Codec`]
/// that shapes persisted entries, a [`Clock`], and the process-wide
/// elapsed-time counter.
pub struct Engine {
    store: Arc<dyn Store>,
    codec: Arc<dyn Codec>,
    clock: Arc<dyn Clock>,
    elapsed: ElapsedCounter,
}

impl Engine {
    /// Engine with the default JSON codec and system clock.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            codec: Arc::new(JsonCodec),
            clock: Arc::new(SystemClock),
            elapsed: ElapsedCounter::new(),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Total wall time spent in work attempts so far, across all tasks.
    pub fn elapsed(&self) -> Duration {
        self.elapsed.total()
    }

    /// Execute `task` against `input` and fan out to dependents.
    ///
    /// Always returns a fully-populated terminal record for the root task;
    /// dependent executions append to their own tasks' record logs.
    pub async fn execute<I, O>(&self, task: &Task<I, O>, input: I) -> RunRecord
    where
        I: Payload,
        O: Payload,
    {
        self.execute_with(task, input, ExecOptions::default()).await
    }

    /// [`execute`](Self::execute) with a deadline and/or cancellation token.
    pub async fn execute_with<I, O>(
        &self,
        task: &Task<I, O>,
        input: I,
        options: ExecOptions,
    ) -> RunRecord
    where
        I: Payload,
        O: Payload,
    {
        let input = match serde_json::to_value(&input) {
            Ok(value) => value,
            Err(e) => {
                // Nothing ran; report the encode problem as the record.
                let now = self.clock.now();
                let record = Draft {
                    core: &task.core,
                    fingerprint: fingerprint_of_null(),
                    input: Value::Null,
                    started: now,
                    attempts: 0,
                }
                .exception(now, format!("input encode: {e}"));
                task.core.push_record(record.clone());
                self.propagate(&task.core, &record).await;
                return record;
            }
        };

        let record = self.run_one(&task.core, input, &options).await;
        self.propagate(&task.core, &record).await;
        record
    }

    /// Resolve one record for one (task, input) pair. No propagation here.
    async fn run_one(
        &self,
        core: &Arc<TaskCore>,
        input: Value,
        options: &ExecOptions,
    ) -> RunRecord {
        let started = self.clock.now();
        let fingerprint = match Fingerprint::of(&input) {
            Ok(fp) => fp,
            Err(e) => {
                let record = Draft {
                    core,
                    fingerprint: fingerprint_of_null(),
                    input,
                    started,
                    attempts: 0,
                }
                .exception(self.clock.now(), format!("fingerprint: {e}"));
                core.push_record(record.clone());
                return record;
            }
        };

        // Cancelled before anything started: skip, work never runs.
        if options.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            let attempts = core.attempts_so_far(&fingerprint).await;
            debug!(task = %core.name, fingerprint = %fingerprint, "skipped: cancelled before start");
            let record = Draft {
                core,
                fingerprint,
                input,
                started,
                attempts,
            }
            .skip(self.clock.now());
            core.push_record(record.clone());
            return record;
        }

        // Single-flight: one computation per (task, fingerprint) at a time.
        // Latecomers block here and then observe the committed entry below.
        // Already-committed keys get no lock; their lookup is read-only.
        let flight = core.flight(&fingerprint).await;
        let _guard = match &flight {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        match self.lookup(core, &fingerprint).await {
            Ok(Some(entry)) => {
                info!(task = %core.name, fingerprint = %fingerprint, "cache hit");
                let record = Draft {
                    core,
                    fingerprint,
                    input,
                    started,
                    attempts: entry.attempts,
                }
                .pass(self.clock.now(), entry.output, true);
                core.push_record(record.clone());
                return record;
            }
            Ok(None) => {}
            Err(e) => {
                let attempts = core.attempts_so_far(&fingerprint).await;
                warn!(task = %core.name, error = %e, "store lookup failed");
                let record = Draft {
                    core,
                    fingerprint,
                    input,
                    started,
                    attempts,
                }
                .exception(self.clock.now(), e.to_string());
                core.push_record(record.clone());
                return record;
            }
        }

        // Cache miss: this is a real attempt.
        let attempts = core.bump_attempts(&fingerprint).await;
        debug!(task = %core.name, fingerprint = %fingerprint, attempts, "cache miss, invoking work");

        let t0 = Instant::now();
        let finished = self.invoke(core, input.clone(), options).await;
        self.elapsed.add(t0.elapsed());

        let ended = self.clock.now();
        let draft = Draft {
            core,
            fingerprint: fingerprint.clone(),
            input,
            started,
            attempts,
        };

        let record = match finished {
            Invocation::Output(Ok(output)) => {
                match self.persist(core, &fingerprint, output, attempts).await {
                    Ok(output) => draft.pass(ended, output, false),
                    Err(e) => {
                        warn!(task = %core.name, error = %e, "persisting output failed");
                        draft.exception(self.clock.now(), e.to_string())
                    }
                }
            }
            Invocation::Output(Err(WorkError::Failed(reason))) => draft.fail(ended, reason),
            Invocation::Output(Err(WorkError::Raised(reason))) => draft.exception(ended, reason),
            Invocation::DeadlineExceeded(deadline) => {
                draft.timeout(ended, format!("deadline of {deadline:?} exceeded"))
            }
            Invocation::Cancelled => draft.timeout(ended, "cancelled while running".to_string()),
        };

        match record.status {
            RunStatus::Pass => info!(task = %core.name, attempts, "pass"),
            status => warn!(task = %core.name, attempts, %status, error = record.error.as_deref().unwrap_or(""), "attempt did not pass"),
        }

        core.push_record(record.clone());
        record
    }

    /// Run the work with the configured deadline and cancellation applied.
    async fn invoke(&self, core: &TaskCore, input: Value, options: &ExecOptions) -> Invocation {
        let work = core.work.run_value(input);
        let bounded = async {
            match options.deadline {
                Some(deadline) => match tokio::time::timeout(deadline, work).await {
                    Ok(result) => Invocation::Output(result),
                    Err(_) => Invocation::DeadlineExceeded(deadline),
                },
                None => Invocation::Output(work.await),
            }
        };

        match &options.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Invocation::Cancelled,
                finished = bounded => finished,
            },
            None => bounded.await,
        }
    }

    /// Find a committed entry for the fingerprint: in-memory cache first,
    /// then the store itself (re-attachment after a restart).
    async fn lookup(
        &self,
        core: &Arc<TaskCore>,
        fingerprint: &Fingerprint,
    ) -> Result<Option<StoredEntry>, EngineError> {
        let reference = match core.cached_ref(fingerprint).await {
            Some(reference) => Some(reference),
            None => {
                let key = StoreKey::new(&core.name, fingerprint.clone());
                match self.store.contains(&key).await? {
                    Some(reference) => {
                        core.note_cached(fingerprint.clone(), reference.clone()).await;
                        Some(reference)
                    }
                    None => None,
                }
            }
        };

        let Some(reference) = reference else {
            return Ok(None);
        };
        let bytes = self.store.get(&reference).await?;
        Ok(Some(self.codec.decode(&bytes)?))
    }

    /// Commit the output under the write-once key and remember the reference.
    async fn persist(
        &self,
        core: &Arc<TaskCore>,
        fingerprint: &Fingerprint,
        output: Value,
        attempts: u32,
    ) -> Result<Value, EngineError> {
        let entry = StoredEntry {
            output,
            attempts,
            recorded_at: self.clock.now(),
        };
        let bytes = self.codec.encode(&entry)?;
        let key = StoreKey::new(&core.name, fingerprint.clone());

        let reference = match self.store.put(&key, &bytes).await {
            Ok(reference) => reference,
            // Another writer (typically an earlier process) committed first.
            // Write-once: the existing entry wins, and since work is pure the
            // values agree.
            Err(StoreError::KeyExists(_)) => self
                .store
                .contains(&key)
                .await?
                .ok_or_else(|| EngineError::Vanished(key.clone()))?,
            Err(e) => return Err(e.into()),
        };

        core.note_cached(fingerprint.clone(), reference).await;
        Ok(entry.output)
    }

    /// Walk the dependent graph depth-first with an explicit stack, so deep
    /// graphs cannot exhaust the call stack.
    async fn propagate(&self, root: &Arc<TaskCore>, record: &RunRecord) {
        let mut stack: Vec<(Arc<TaskCore>, Value)> = Vec::new();
        Self::fan_out(root, record, &mut stack);

        while let Some((core, input)) = stack.pop() {
            let record = self.run_one(&core, input, &ExecOptions::default()).await;
            Self::fan_out(&core, &record, &mut stack);
        }
    }

    /// Evaluate every edge of `core` against `record`, in registration order.
    /// Accepted edges are pushed for execution; every edge remembers the
    /// record either way.
    fn fan_out(core: &Arc<TaskCore>, record: &RunRecord, stack: &mut Vec<(Arc<TaskCore>, Value)>) {
        debug_assert!(record.is_terminal());

        let mut triggered = Vec::new();
        for edge in core.edges() {
            let fired = edge.observe(record);
            debug!(
                task = %core.name,
                dependent = %edge.downstream.name,
                fired,
                "dependent predicate evaluated"
            );
            if fired {
                let input = record.output.clone().unwrap_or(Value::Null);
                triggered.push((Arc::clone(&edge.downstream), input));
            }
        }

        // LIFO stack: push in reverse so the first registration runs first.
        while let Some(next) = triggered.pop() {
            stack.push(next);
        }
    }
}

/// Common fields of a record under construction; one constructor per
/// terminal status keeps the call sites honest.
struct Draft<'a> {
    core: &'a TaskCore,
    fingerprint: Fingerprint,
    input: Value,
    started: DateTime<Utc>,
    attempts: u32,
}

impl Draft<'_> {
    fn pass(self, ended: DateTime<Utc>, output: Value, cached: bool) -> RunRecord {
        self.finish(ended, RunStatus::Pass, Some(output), None, cached)
    }

    fn fail(self, ended: DateTime<Utc>, error: String) -> RunRecord {
        self.finish(ended, RunStatus::Fail, None, Some(error), false)
    }

    fn exception(self, ended: DateTime<Utc>, error: String) -> RunRecord {
        self.finish(ended, RunStatus::Exception, None, Some(error), false)
    }

    fn timeout(self, ended: DateTime<Utc>, error: String) -> RunRecord {
        self.finish(ended, RunStatus::Timeout, None, Some(error), false)
    }

    fn skip(self, ended: DateTime<Utc>) -> RunRecord {
        self.finish(ended, RunStatus::Skip, None, None, false)
    }

    fn finish(
        self,
        ended: DateTime<Utc>,
        status: RunStatus,
        output: Option<Value>,
        error: Option<String>,
        cached: bool,
    ) -> RunRecord {
        let from = if status == RunStatus::Skip {
            RunStatus::Pending
        } else {
            RunStatus::Running
        };
        debug_assert!(from.can_transition(status));

        RunRecord {
            id: AttemptId::generate(),
            task_id: self.core.id,
            task: self.core.name.clone(),
            status,
            fingerprint: self.fingerprint,
            started: self.started,
            ended,
            input: self.input,
            output,
            error,
            attempts: self.attempts,
            cached,
        }
    }
}

fn fingerprint_of_null() -> Fingerprint {
    Fingerprint::of(&Value::Null).expect("null always serializes")
}
