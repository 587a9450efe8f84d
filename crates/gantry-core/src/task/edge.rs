//! Dependent registrations: the edges of the propagation graph.

use std::sync::{Arc, Mutex};

use crate::domain::RunRecord;

use super::TaskCore;

/// Binds a downstream task to an upstream one via a predicate over the
/// upstream's terminal [`RunRecord`].
///
/// Edges are permanent: once registered they live as long as the graph.
/// Every evaluation stores the upstream record as `last_observed`, whether or
/// not the predicate accepted it.
pub(crate) struct DependentEdge {
    pub(crate) downstream: Arc<TaskCore>,
    pub(crate) predicate: Box<dyn Fn(&RunRecord) -> bool + Send + Sync>,
    pub(crate) last_observed: Mutex<Option<RunRecord>>,
}

impl DependentEdge {
    /// Record the upstream result and evaluate the predicate.
    pub(crate) fn observe(&self, record: &RunRecord) -> bool {
        *self.last_observed.lock().expect("edge mutex poisoned") = Some(record.clone());
        (self.predicate)(record)
    }
}
