//! gantry-core
//!
//! A memoizing task-graph engine for long-running pipelines.
//!
//! A [`Task`] wraps a work function. The [`Engine`] executes a task against an
//! input: identical inputs are computed at most once, results are committed to
//! a write-once [`Store`] so a later process can pick them up, and terminal
//! results fan out to registered dependents whose predicates accept them.
//!
//! # Module layout
//! - **domain**: data model (ids, status, records, fingerprints, errors)
//! - **ports**: abstraction seams (Store, Codec, Clock)
//! - **impls**: bundled implementations (MemoryStore, FsStore, JsonCodec)
//! - **task**: typed Task API and dependent registration
//! - **engine**: execution, memoization, propagation, elapsed-time budget

pub mod domain;
pub mod engine;
pub mod impls;
pub mod ports;
pub mod task;

pub use self::domain::{AttemptId, Fingerprint, RunRecord, RunStatus, TaskId, WorkError};
pub use self::engine::{Engine, ExecOptions};
pub use self::impls::{FsStore, JsonCodec, MemoryStore};
pub use self::ports::{Clock, Codec, Store, StoreKey, StoreRef, SystemClock};
pub use self::task::{Payload, Task, Work};
