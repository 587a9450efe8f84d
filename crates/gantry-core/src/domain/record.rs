//! Run records: the immutable outcome of one execution attempt.
//!
//! This module is architecture-agnostic: it does not assume a store or an
//! engine. It only defines the "shape" of results that the system records and
//! can explain later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fingerprint::Fingerprint;
use super::ids::{AttemptId, TaskId};
use super::status::RunStatus;

/// Immutable summary of one task execution attempt.
///
/// Invariants:
/// - `output` is present iff `status == Pass`.
/// - `error` is present iff `status` is `Fail`, `Exception` or `Timeout`.
/// - `attempts >= 1` once execution has actually started (`Skip` records may
///   carry the attempt count observed so far, which can be zero).
/// - `cached` records that the output was replayed from the store rather than
///   recomputed; `started`/`ended` then reflect the read, not the original
///   computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Identity of this observation; fresh even for cache replays.
    pub id: AttemptId,

    pub task_id: TaskId,

    /// Stable task name; also the store namespace.
    pub task: String,

    pub status: RunStatus,

    pub fingerprint: Fingerprint,

    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,

    /// The input this attempt was invoked with.
    pub input: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub attempts: u32,

    #[serde(default)]
    pub cached: bool,
}

impl RunRecord {
    pub fn is_pass(&self) -> bool {
        self.status == RunStatus::Pass
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall time of this attempt (or of the cache read, for replays).
    pub fn duration(&self) -> chrono::Duration {
        self.ended - self.started
    }
}

/// What actually gets persisted under a store key.
///
/// The attempt count travels with the output so that a cache hit in a later
/// process can report the attempts of the attempt that produced the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub output: serde_json::Value,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> RunRecord {
        RunRecord {
            id: AttemptId::generate(),
            task_id: TaskId::generate(),
            task: "double".to_string(),
            status: RunStatus::Pass,
            fingerprint: Fingerprint::of(&serde_json::json!(3)).unwrap(),
            started: Utc::now(),
            ended: Utc::now(),
            input: serde_json::json!(3),
            output: Some(serde_json::json!(6)),
            error: None,
            attempts: 1,
            cached: false,
        }
    }

    #[test]
    fn record_roundtrips_through_json() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        let back: RunRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn absent_fields_are_omitted() {
        let mut record = sample_record();
        record.status = RunStatus::Fail;
        record.output = None;
        record.error = Some("boom".to_string());

        let v: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert!(v.get("output").is_none());
        assert_eq!(v["error"], "boom");
        assert_eq!(v["status"], "fail");
    }

    #[test]
    fn stored_entry_roundtrips() {
        let entry = StoredEntry {
            output: serde_json::json!({"n": 6}),
            attempts: 2,
            recorded_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&entry).unwrap();
        let back: StoredEntry = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(entry, back);
    }
}
