use super::Reducer;
use crate::state::{GenerationState, StatePatch};

/// Replace-semantics merge for all scalar fields and the doubly-optional
/// slots (pending / resume / current_element), where the outer `Some`
/// means "write this", including `Some(None)` to clear.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct MergeScalars;

impl Reducer for MergeScalars {
    fn apply(&self, state: &mut GenerationState, patch: &StatePatch) {
        if let Some(phase) = patch.phase {
            state.phase = phase;
        }
        if let Some(iterations) = patch.architect_iterations {
            state.architect_iterations = iterations;
        }
        if let Some(skeleton) = &patch.skeleton {
            state.skeleton = Some(skeleton.clone());
        }
        if let Some(approved) = patch.skeleton_approved {
            state.skeleton_approved = approved;
        }
        if let Some(pending) = &patch.pending {
            state.pending = pending.clone();
        }
        if let Some(resume) = &patch.resume {
            state.resume = resume.clone();
        }
        if let Some(current) = patch.current_element {
            state.current_element = current;
        }
        if let Some(started) = patch.started_at {
            state.started_at = Some(started);
        }
    }
}
