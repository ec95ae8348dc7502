use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::channels::ErrorEvent;
use crate::domain::{
    ClarificationRequest, ClarificationTurn, ElementKind, WorldSkeleton, validate_questions,
};
use crate::generator::{ArchitectDraft, StructuredGenerator};
use crate::node::{NodeContext, NodeError, PhaseNode, PhaseOutcome};
use crate::prompts;
use crate::state::{StatePatch, StateSnapshot};
use crate::types::Phase;

/// Produces a world skeleton, asking for direction along the way.
///
/// Decision priority per invocation:
/// 1. A pending resume: fold the answers into history and loop back for a
///    fresh generation pass.
/// 2. Generator asks for clarification, rounds remain: suspend with the
///    typed request.
/// 3. Generator committed a skeleton: accept it.
/// 4. Anything else: force a skeleton-only call; its output is accepted
///    unconditionally, its failure ends the run.
///
/// Clarification rounds are bounded by `max_iterations`; from the last
/// permitted round onward the prompt forbids further questions.
pub struct ArchitectNode {
    generator: Arc<dyn StructuredGenerator>,
    max_iterations: u8,
}

impl ArchitectNode {
    pub fn new(generator: Arc<dyn StructuredGenerator>, max_iterations: u8) -> Self {
        Self {
            generator,
            max_iterations,
        }
    }

    fn resume_patch(snapshot: &StateSnapshot) -> StatePatch {
        let answers = snapshot.resume.clone().unwrap_or_default();
        let turns = snapshot
            .pending
            .as_ref()
            .map(|req| ClarificationTurn::pair(req.questions(), &answers))
            .unwrap_or_default();
        StatePatch {
            phase: Some(Phase::ArchitectProcessing),
            architect_iterations: Some(snapshot.architect_iterations.saturating_add(1)),
            pending: Some(None),
            resume: Some(None),
            history: turns,
            ..StatePatch::default()
        }
    }

    fn accept(mut skeleton: WorldSkeleton) -> StatePatch {
        skeleton.dedup_plan();
        if skeleton.elements_to_generate.is_empty() {
            // A skeleton with nothing to generate is useless; fall back to
            // the full category roster rather than finishing empty.
            skeleton.elements_to_generate = ElementKind::all().to_vec();
        }
        StatePatch {
            phase: Some(Phase::SkeletonReady),
            skeleton: Some(skeleton),
            pending: Some(None),
            resume: Some(None),
            ..StatePatch::default()
        }
    }

    /// Skeleton-only forcing call, used when the structured response was
    /// malformed or the rounds are spent without a committed outline.
    async fn force_skeleton(&self, snapshot: &StateSnapshot, ctx: &NodeContext) -> PhaseOutcome {
        ctx.emit("architect", "forcing skeleton-only generation");
        let prompt =
            prompts::skeleton_prompt(snapshot.genre, &snapshot.user_input, &snapshot.history);
        match self.generator.skeleton(&prompt).await {
            Ok(skeleton) => PhaseOutcome::Advance(Self::accept(skeleton)),
            Err(err) => PhaseOutcome::Advance(StatePatch::error(ErrorEvent::new(
                ctx.phase,
                err.to_string(),
            ))),
        }
    }

    fn usable_questions(draft: &ArchitectDraft) -> bool {
        draft.needs_clarification
            && !draft.questions.is_empty()
            && validate_questions(&draft.questions).is_ok()
    }
}

#[async_trait]
impl PhaseNode for ArchitectNode {
    #[instrument(skip(self, snapshot, ctx), fields(step = ctx.step))]
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<PhaseOutcome, NodeError> {
        if snapshot.resume.is_some() {
            ctx.emit("architect", "folding clarification answers into history");
            return Ok(PhaseOutcome::Advance(Self::resume_patch(&snapshot)));
        }

        let rounds_left = snapshot.architect_iterations < self.max_iterations;
        // The last permitted round already gets the forcing prompt variant.
        let final_round = snapshot.architect_iterations.saturating_add(1) >= self.max_iterations;
        let prompt = prompts::architect_prompt(
            snapshot.genre,
            &snapshot.user_input,
            &snapshot.history,
            final_round,
        );

        let draft = match self.generator.architect(&prompt).await {
            Ok(draft) => draft,
            Err(err) => {
                ctx.emit("architect", format!("generator failed: {err}"));
                return Ok(PhaseOutcome::Advance(StatePatch::error(ErrorEvent::new(
                    ctx.phase,
                    err.to_string(),
                ))));
            }
        };

        if rounds_left && Self::usable_questions(&draft) {
            let request = ClarificationRequest::ArchitectClarification {
                reason: draft
                    .reason
                    .unwrap_or_else(|| "the concept needs direction".to_string()),
                questions: draft.questions,
                iteration: snapshot.architect_iterations + 1,
            };
            let patch = StatePatch {
                phase: Some(Phase::AwaitingClarification),
                pending: Some(Some(request.clone())),
                ..StatePatch::default()
            };
            return Ok(PhaseOutcome::Suspend { request, patch });
        }

        match draft.skeleton {
            Some(skeleton) => Ok(PhaseOutcome::Advance(Self::accept(skeleton))),
            None => Ok(self.force_skeleton(&snapshot, &ctx).await),
        }
    }
}
