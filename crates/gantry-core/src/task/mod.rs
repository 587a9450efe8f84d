//! Typed Task API.
//!
//! Two layers, following the usual type-erasure split:
//! - **surface**: [`Task<I, O>`] and [`Work<I, O>`] — fully typed
//! - **interior**: [`DynWork`] — object-safe, moves `serde_json::Value`
//!
//! Erasure is what lets heterogeneously-typed tasks live in one propagation
//! graph: an upstream's JSON output is decoded into the downstream's input
//! type at the moment it is handed over.

mod edge;

pub(crate) use edge::DependentEdge;

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex as AsyncMutex;

use crate::domain::{Fingerprint, RunRecord, TaskId, WorkError};
use crate::ports::StoreRef;

/// Capability bound for task inputs and outputs.
///
/// Blanket-implemented: anything serde can move in and out of JSON, and that
/// can cross threads, qualifies.
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// The work function a task wraps.
///
/// May be long-running and may suspend. Must be safe to call more than once
/// with the same input: the engine retries after non-pass outcomes, and a
/// crashed process may re-invoke work whose output never got committed.
#[async_trait]
pub trait Work<I, O>: Send + Sync {
    async fn run(&self, input: I) -> Result<O, WorkError>;
}

/// Adapter so plain closures can serve as work functions.
struct FnWork<F> {
    f: F,
}

#[async_trait]
impl<I, O, F> Work<I, O> for FnWork<F>
where
    I: Payload,
    O: Payload,
    F: Fn(I) -> Result<O, WorkError> + Send + Sync,
{
    async fn run(&self, input: I) -> Result<O, WorkError> {
        (self.f)(input)
    }
}

/// Object-safe face of a work function: JSON in, JSON out.
#[async_trait]
pub(crate) trait DynWork: Send + Sync {
    async fn run_value(&self, input: serde_json::Value) -> Result<serde_json::Value, WorkError>;
}

/// Wraps a typed [`Work`] into a [`DynWork`].
///
/// Decode/encode problems at this boundary are classified as `Raised`: they
/// are not domain failures of the work itself.
struct TypedWork<I, O, W> {
    work: W,
    _marker: PhantomData<fn(I) -> O>,
}

#[async_trait]
impl<I, O, W> DynWork for TypedWork<I, O, W>
where
    I: Payload,
    O: Payload,
    W: Work<I, O>,
{
    async fn run_value(&self, input: serde_json::Value) -> Result<serde_json::Value, WorkError> {
        let input: I = serde_json::from_value(input)
            .map_err(|e| WorkError::raised(format!("input decode: {e}")))?;
        let output = self.work.run(input).await?;
        serde_json::to_value(&output).map_err(|e| WorkError::raised(format!("output encode: {e}")))
    }
}

/// Per-fingerprint execution state, guarded as one unit.
#[derive(Default)]
pub(crate) struct ExecState {
    /// fingerprint -> committed store reference. Only the engine writes here,
    /// and only after a successful `put`; memoization stays write-once.
    pub(crate) cache: HashMap<Fingerprint, StoreRef>,

    /// fingerprint -> attempts made in this process (failures included).
    /// Entries are dropped on commit: the persisted entry then carries the
    /// count, so only in-flight and still-failing keys are held.
    pub(crate) attempts: HashMap<Fingerprint, u32>,

    /// fingerprint -> single-flight lock. At most one computation per key is
    /// ever in flight; concurrent callers queue behind the same mutex.
    /// Dropped on commit, so the map is bounded by uncommitted keys rather
    /// than growing per distinct input forever.
    pub(crate) flights: HashMap<Fingerprint, Arc<AsyncMutex<()>>>,
}

/// Shared interior of a [`Task`] handle.
pub(crate) struct TaskCore {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) work: Box<dyn DynWork>,
    pub(crate) exec: AsyncMutex<ExecState>,
    dependents: std::sync::Mutex<Vec<Arc<DependentEdge>>>,
    records: std::sync::Mutex<Vec<RunRecord>>,
}

impl TaskCore {
    fn new(name: String, work: Box<dyn DynWork>) -> Self {
        Self {
            id: TaskId::generate(),
            name,
            work,
            exec: AsyncMutex::new(ExecState::default()),
            dependents: std::sync::Mutex::new(Vec::new()),
            records: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Fetch (or create) the single-flight lock for a fingerprint.
    ///
    /// `None` once the key has a committed cache slot: replays are read-only
    /// against a write-once entry and need no serialization, and declining to
    /// recreate the lock keeps `flights` bounded by uncommitted keys.
    pub(crate) async fn flight(&self, fingerprint: &Fingerprint) -> Option<Arc<AsyncMutex<()>>> {
        let mut exec = self.exec.lock().await;
        if exec.cache.contains_key(fingerprint) {
            return None;
        }
        Some(exec.flights.entry(fingerprint.clone()).or_default().clone())
    }

    pub(crate) async fn cached_ref(&self, fingerprint: &Fingerprint) -> Option<StoreRef> {
        self.exec.lock().await.cache.get(fingerprint).cloned()
    }

    /// Record a committed reference and release the per-key execution state.
    ///
    /// Callers already queued on the old flight lock finish their turn and
    /// observe the cache slot; everyone later replays without a counter or
    /// lock entry for this key.
    pub(crate) async fn note_cached(&self, fingerprint: Fingerprint, reference: StoreRef) {
        let mut exec = self.exec.lock().await;
        exec.flights.remove(&fingerprint);
        exec.attempts.remove(&fingerprint);
        exec.cache.insert(fingerprint, reference);
    }

    /// Increment and return the attempt count for a fingerprint.
    pub(crate) async fn bump_attempts(&self, fingerprint: &Fingerprint) -> u32 {
        let mut exec = self.exec.lock().await;
        let n = exec.attempts.entry(fingerprint.clone()).or_insert(0);
        *n += 1;
        *n
    }

    pub(crate) async fn attempts_so_far(&self, fingerprint: &Fingerprint) -> u32 {
        self.exec
            .lock()
            .await
            .attempts
            .get(fingerprint)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn push_record(&self, record: RunRecord) {
        self.records
            .lock()
            .expect("record mutex poisoned")
            .push(record);
    }

    /// Snapshot of the dependent edges, in registration order.
    pub(crate) fn edges(&self) -> Vec<Arc<DependentEdge>> {
        self.dependents
            .lock()
            .expect("dependents mutex poisoned")
            .clone()
    }

    fn register_edge(&self, edge: DependentEdge) {
        self.dependents
            .lock()
            .expect("dependents mutex poisoned")
            .push(Arc::new(edge));
    }

    fn records_snapshot(&self) -> Vec<RunRecord> {
        self.records
            .lock()
            .expect("record mutex poisoned")
            .clone()
    }
}

/// A named unit of work in the graph.
///
/// Cloning a `Task` clones the handle, not the task: all clones share one
/// cache, one attempt history and one dependent list.
///
/// The `name` doubles as the persistence namespace, so a task constructed
/// with the same name in a later process re-attaches to the outputs this one
/// committed. Keep names stable across runs (and path-friendly if you use
/// [`FsStore`](crate::impls::FsStore)).
pub struct Task<I, O> {
    pub(crate) core: Arc<TaskCore>,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O> Clone for Task<I, O> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            _marker: PhantomData,
        }
    }
}

impl<I, O> Task<I, O>
where
    I: Payload,
    O: Payload,
{
    pub fn new(name: impl Into<String>, work: impl Work<I, O> + 'static) -> Self {
        let erased: Box<dyn DynWork> = Box::new(TypedWork::<I, O, _> {
            work,
            _marker: PhantomData,
        });
        Self {
            core: Arc::new(TaskCore::new(name.into(), erased)),
            _marker: PhantomData,
        }
    }

    /// Build a task from a plain (synchronous) closure.
    pub fn from_fn(
        name: impl Into<String>,
        f: impl Fn(I) -> Result<O, WorkError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, FnWork { f })
    }

    pub fn id(&self) -> TaskId {
        self.core.id
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Register `downstream` as a dependent of this task.
    ///
    /// After each terminal record of `self`, `predicate` is evaluated against
    /// it (in registration order, all statuses included); when it accepts,
    /// `downstream` is executed with this task's output decoded into `I2`.
    /// Non-pass records carry no output and hand over JSON `null`, so a
    /// failure-gated dependent should type its input as an `Option` (or
    /// `serde_json::Value`).
    pub fn register<I2, O2>(
        &self,
        downstream: &Task<I2, O2>,
        predicate: impl Fn(&RunRecord) -> bool + Send + Sync + 'static,
    ) where
        I2: Payload,
        O2: Payload,
    {
        self.core.register_edge(DependentEdge {
            downstream: Arc::clone(&downstream.core),
            predicate: Box::new(predicate),
            last_observed: std::sync::Mutex::new(None),
        });
    }

    /// All records this task has produced, in execution order.
    pub fn records(&self) -> Vec<RunRecord> {
        self.core.records_snapshot()
    }

    pub fn dependent_count(&self) -> usize {
        self.core.edges().len()
    }

    /// The upstream record last evaluated against the `index`-th registration
    /// (registration order), regardless of the predicate's verdict.
    pub fn last_observed(&self, index: usize) -> Option<RunRecord> {
        self.core.edges().get(index).and_then(|edge| {
            edge.last_observed
                .lock()
                .expect("edge mutex poisoned")
                .clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Doubling {
        n: i64,
    }

    #[tokio::test]
    async fn erased_work_decodes_and_encodes() {
        let task = Task::<Doubling, i64>::from_fn("double", |d| Ok(d.n * 2));

        let out = task.core.work.run_value(json!({"n": 21})).await.unwrap();
        assert_eq!(out, json!(42));
    }

    #[tokio::test]
    async fn undecodable_input_is_raised_not_failed() {
        let task = Task::<Doubling, i64>::from_fn("double", |d| Ok(d.n * 2));

        let err = task.core.work.run_value(json!("not a doubling")).await;
        assert!(matches!(err, Err(WorkError::Raised(_))));
    }

    #[tokio::test]
    async fn domain_failures_pass_through() {
        let task = Task::<i64, i64>::from_fn("never", |_| {
            Err::<i64, _>(WorkError::failed("nope"))
        });

        let err = task.core.work.run_value(json!(1)).await;
        assert!(matches!(err, Err(WorkError::Failed(_))));
    }

    #[test]
    fn registration_order_is_preserved() {
        let up = Task::<i64, i64>::from_fn("up", |n| Ok(n));
        let d1 = Task::<i64, i64>::from_fn("d1", |n| Ok(n));
        let d2 = Task::<i64, i64>::from_fn("d2", |n| Ok(n));

        up.register(&d1, |_| true);
        up.register(&d2, |_| true);

        let edges = up.core.edges();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].downstream.name, "d1");
        assert_eq!(edges[1].downstream.name, "d2");
    }

    #[test]
    fn clones_share_state() {
        let task = Task::<i64, i64>::from_fn("shared", |n| Ok(n));
        let other = task.clone();
        let sink = Task::<i64, i64>::from_fn("sink", |n| Ok(n));

        task.register(&sink, |_| true);
        assert_eq!(other.dependent_count(), 1);
        assert_eq!(task.id(), other.id());
    }

    #[test]
    fn attempt_counters_start_empty() {
        let task = Task::<i64, i64>::from_fn("fresh", |n| Ok(n));
        let fp = Fingerprint::of(&1i64).unwrap();

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            assert_eq!(task.core.attempts_so_far(&fp).await, 0);
            assert_eq!(task.core.bump_attempts(&fp).await, 1);
            assert_eq!(task.core.bump_attempts(&fp).await, 2);
        });
    }
}
