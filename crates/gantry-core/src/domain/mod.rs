//! Domain model: ids, status state machine, run records, fingerprints, errors.

pub mod errors;
pub mod fingerprint;
pub mod ids;
pub mod record;
pub mod status;

pub use errors::WorkError;
pub use fingerprint::Fingerprint;
pub use ids::{AttemptId, TaskId};
pub use record::{RunRecord, StoredEntry};
pub use status::RunStatus;
