//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of one create or delete saga as seen by the coordinator.
///
/// State transitions:
/// ```text
/// Running ──┬──────────────────────► Completed
///           └──► Compensating ──┬──► Failed
///                               └──► Stuck
/// ```
///
/// A first step that fails has nothing to compensate and goes straight from
/// `Running` to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaState {
    /// Forward steps are being executed.
    Running,

    /// A forward step failed and the store is being rolled back.
    Compensating,

    /// Every forward step succeeded (terminal state).
    Completed,

    /// The saga failed and was compensated (terminal state).
    Failed,

    /// Compensation itself failed; the row needs the reconciler or an
    /// operator (terminal state).
    Stuck,
}

impl SagaState {
    /// Returns true if the saga can begin compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaState::Running)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Completed | SagaState::Failed | SagaState::Stuck
        )
    }

    /// Returns true if the diagram above allows moving to `next`.
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        match next {
            SagaState::Running => false,
            SagaState::Compensating => self.can_compensate(),
            SagaState::Completed => matches!(self, SagaState::Running),
            SagaState::Failed => !self.is_terminal(),
            SagaState::Stuck => matches!(self, SagaState::Compensating),
        }
    }

    /// Returns true if the record may be forgotten once its dedupe window passes.
    pub fn is_prunable(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Running => "Running",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
            SagaState::Stuck => "Stuck",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
