use super::errors::{invalid_transition, StateMachineError, StateMachineResult};
use super::states::RemovalSubStage;

/// Protocol guard for removal substage transitions
pub struct TransitionGuard;

impl TransitionGuard {
    /// Check that `from -> to` is a legal move in the removal protocol
    ///
    /// This is independent of what is currently stored; the store enforces
    /// the expected-substage match separately.
    pub fn can_transition(from: RemovalSubStage, to: RemovalSubStage) -> StateMachineResult<()> {
        if from.is_terminal() {
            return Err(StateMachineError::GuardFailed {
                reason: format!("{from} is terminal"),
            });
        }

        if !from.can_transition_to(to) {
            return Err(invalid_transition(from, to));
        }

        Ok(())
    }
}
