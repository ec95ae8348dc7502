use async_trait::async_trait;

use crate::node::{NodeContext, NodeError, PhaseNode, PhaseOutcome};
use crate::state::{StatePatch, StateSnapshot};
use crate::types::Phase;

/// Marker gate between skeleton production and element generation.
///
/// Does no generation work: it inspects the approval flag and either lets
/// the run proceed or parks it in the awaiting-approval phase, where the
/// router holds until the caller approves.
#[derive(Clone, Debug, Default)]
pub struct ApprovalGate;

#[async_trait]
impl PhaseNode for ApprovalGate {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<PhaseOutcome, NodeError> {
        if snapshot.skeleton.is_none() {
            return Err(NodeError::MissingInput {
                what: "world skeleton",
            });
        }
        let phase = if snapshot.skeleton_approved {
            ctx.emit("approval", "skeleton approved, proceeding to elements");
            Phase::GeneratingElements
        } else {
            ctx.emit("approval", "holding for skeleton approval");
            Phase::AwaitingApproval
        };
        Ok(PhaseOutcome::Advance(StatePatch::phase(phase)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ElementKind, Genre, WorldSkeleton};
    use crate::state::GenerationState;
    use crate::types::PhaseKind;

    fn ctx() -> NodeContext {
        NodeContext {
            phase: PhaseKind::WaitForApproval,
            step: 1,
        }
    }

    fn state_with_skeleton(approved: bool) -> GenerationState {
        let mut state = GenerationState::new(Genre::Fantasy, "x");
        state.skeleton = Some(WorldSkeleton {
            name: "W".into(),
            setting: "s".into(),
            era: "e".into(),
            tone: "t".into(),
            core_conflict: "c".into(),
            unique_features: vec![],
            primer: "p".into(),
            elements_to_generate: vec![ElementKind::Locations],
        });
        state.skeleton_approved = approved;
        state
    }

    #[tokio::test]
    async fn holds_until_approved() {
        let outcome = ApprovalGate
            .run(state_with_skeleton(false).snapshot(), ctx())
            .await
            .unwrap();
        let PhaseOutcome::Advance(patch) = outcome else {
            panic!("gate never suspends");
        };
        assert_eq!(patch.phase, Some(Phase::AwaitingApproval));
    }

    #[tokio::test]
    async fn passes_once_approved() {
        let outcome = ApprovalGate
            .run(state_with_skeleton(true).snapshot(), ctx())
            .await
            .unwrap();
        let PhaseOutcome::Advance(patch) = outcome else {
            panic!("gate never suspends");
        };
        assert_eq!(patch.phase, Some(Phase::GeneratingElements));
    }

    #[tokio::test]
    async fn missing_skeleton_is_fatal() {
        let state = GenerationState::new(Genre::Fantasy, "x");
        let err = ApprovalGate.run(state.snapshot(), ctx()).await.unwrap_err();
        assert!(matches!(err, NodeError::MissingInput { .. }));
    }
}
