//! Per-attempt status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one execution attempt.
///
/// State transitions:
/// - Pending -> Running -> {Pass | Fail | Exception | Timeout}
/// - Pending -> Skip (a precondition decided the task need not run)
///
/// All five right-hand states are terminal and absorbing. A retry never
/// mutates a terminal record; it produces a new record with `attempts`
/// incremented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, not yet started.
    Pending,

    /// Work function is in flight.
    Running,

    /// Work completed and the output was committed to the store.
    Pass,

    /// Work completed but reported a domain failure.
    Fail,

    /// Work (or the engine around it) raised an unexpected error.
    Exception,

    /// Execution exceeded its deadline or was cancelled mid-run.
    Timeout,

    /// A precondition prevented execution; the work never ran.
    Skip,
}

impl RunStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Pass
                | RunStatus::Fail
                | RunStatus::Exception
                | RunStatus::Timeout
                | RunStatus::Skip
        )
    }

    /// Is `next` a legal successor of `self`?
    pub fn can_transition(self, next: RunStatus) -> bool {
        match self {
            RunStatus::Pending => matches!(next, RunStatus::Running | RunStatus::Skip),
            RunStatus::Running => {
                next.is_terminal() && !matches!(next, RunStatus::Skip)
            }
            // Terminal states are absorbing.
            _ => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Pass => "pass",
            RunStatus::Fail => "fail",
            RunStatus::Exception => "exception",
            RunStatus::Timeout => "timeout",
            RunStatus::Skip => "skip",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(RunStatus::Pass)]
    #[case(RunStatus::Fail)]
    #[case(RunStatus::Exception)]
    #[case(RunStatus::Timeout)]
    #[case(RunStatus::Skip)]
    fn terminal_states_are_absorbing(#[case] terminal: RunStatus) {
        assert!(terminal.is_terminal());
        for next in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Pass,
            RunStatus::Fail,
            RunStatus::Exception,
            RunStatus::Timeout,
            RunStatus::Skip,
        ] {
            assert!(!terminal.can_transition(next));
        }
    }

    #[rstest]
    #[case(RunStatus::Pending, RunStatus::Running, true)]
    #[case(RunStatus::Pending, RunStatus::Skip, true)]
    #[case(RunStatus::Pending, RunStatus::Pass, false)]
    #[case(RunStatus::Running, RunStatus::Pass, true)]
    #[case(RunStatus::Running, RunStatus::Fail, true)]
    #[case(RunStatus::Running, RunStatus::Exception, true)]
    #[case(RunStatus::Running, RunStatus::Timeout, true)]
    #[case(RunStatus::Running, RunStatus::Skip, false)]
    #[case(RunStatus::Running, RunStatus::Pending, false)]
    fn transition_table(
        #[case] from: RunStatus,
        #[case] to: RunStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition(to), allowed);
    }

    #[test]
    fn serializes_as_lowercase_names() {
        let s = serde_json::to_string(&RunStatus::Pass).unwrap();
        assert_eq!(s, "\"pass\"");
        let s = serde_json::to_string(&RunStatus::Exception).unwrap();
        assert_eq!(s, "\"exception\"");
    }
}
