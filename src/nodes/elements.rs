use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::channels::ErrorEvent;
use crate::domain::{
    ClarificationRequest, ClarificationTurn, ElementKind, WorldElementCategory, WorldSkeleton,
    validate_questions,
};
use crate::generator::StructuredGenerator;
use crate::node::{NodeContext, NodeError, PhaseNode, PhaseOutcome};
use crate::prompts::{self, Prompt};
use crate::state::{StatePatch, StateSnapshot};
use crate::types::Phase;

/// Generates one element category per invocation, in plan order.
///
/// At most one clarification round per category: the round is bound
/// structurally, because the resume path never suspends again. A malformed
/// or clarification-happy follow-up response degrades to the bare
/// element-list fallback, whose output is wrapped with static per-category
/// metadata. Categories accumulate append-only; an already generated
/// category is never regenerated.
pub struct ElementsNode {
    generator: Arc<dyn StructuredGenerator>,
}

impl ElementsNode {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Self {
        Self { generator }
    }

    fn accept(kind: ElementKind, mut category: WorldElementCategory) -> Option<WorldElementCategory> {
        // Generators occasionally mislabel the batch; the plan decides the
        // category, not the model.
        category.category = kind;
        if category.elements.is_empty() {
            return None;
        }
        for element in &category.elements {
            if element.validate_fields().is_err() {
                return None;
            }
        }
        Some(category)
    }

    fn category_patch(kind: ElementKind, category: WorldElementCategory) -> StatePatch {
        StatePatch {
            phase: Some(Phase::GeneratingElements),
            current_element: Some(Some(kind)),
            pending: Some(None),
            resume: Some(None),
            categories: vec![category],
            ..StatePatch::default()
        }
    }

    /// Bare element-list fallback; the category wrapper is synthesized from
    /// static metadata so the result is never silently empty.
    async fn fallback(
        &self,
        kind: ElementKind,
        prompt: &Prompt,
        ctx: &NodeContext,
    ) -> PhaseOutcome {
        ctx.emit("elements", format!("falling back to bare list for {kind}"));
        match self.generator.element_list(prompt).await {
            Ok(elements) if !elements.is_empty() => PhaseOutcome::Advance(Self::category_patch(
                kind,
                WorldElementCategory::from_elements(kind, elements),
            )),
            Ok(_) => PhaseOutcome::Advance(StatePatch::error(ErrorEvent::new(
                ctx.phase,
                format!("generator produced no elements for {kind}"),
            ))),
            Err(err) => PhaseOutcome::Advance(StatePatch::error(ErrorEvent::new(
                ctx.phase,
                err.to_string(),
            ))),
        }
    }

    /// Follow-up pass after a clarification round: one more structured call
    /// with the caller's direction appended, then the fallback ladder.
    async fn resume(
        &self,
        snapshot: &StateSnapshot,
        skeleton: &WorldSkeleton,
        ctx: &NodeContext,
    ) -> Result<PhaseOutcome, NodeError> {
        let Some(ClarificationRequest::ElementsClarification {
            element, questions, ..
        }) = snapshot.pending.clone()
        else {
            return Err(NodeError::MissingInput {
                what: "pending elements clarification",
            });
        };
        let answers = snapshot.resume.clone().unwrap_or_default();
        let turns = ClarificationTurn::pair(&questions, &answers);

        let done: Vec<ElementKind> = snapshot.categories.iter().map(|c| c.category).collect();
        let prompt = prompts::with_answers(
            prompts::category_prompt(skeleton, element, &done),
            &turns,
        );

        let outcome = match self.generator.elements(&prompt).await {
            Ok(draft) => match draft.category.and_then(|c| Self::accept(element, c)) {
                Some(category) => {
                    PhaseOutcome::Advance(Self::category_patch(element, category))
                }
                None => self.fallback(element, &prompt, ctx).await,
            },
            Err(err) => {
                ctx.emit("elements", format!("follow-up failed: {err}"));
                self.fallback(element, &prompt, ctx).await
            }
        };

        // The resolved round lands in history regardless of what the
        // follow-up produced.
        Ok(match outcome {
            PhaseOutcome::Advance(mut patch) => {
                patch.history = turns;
                if patch.pending.is_none() {
                    patch.pending = Some(None);
                }
                if patch.resume.is_none() {
                    patch.resume = Some(None);
                }
                PhaseOutcome::Advance(patch)
            }
            suspend => suspend,
        })
    }
}

#[async_trait]
impl PhaseNode for ElementsNode {
    #[instrument(skip(self, snapshot, ctx), fields(step = ctx.step))]
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<PhaseOutcome, NodeError> {
        let Some(skeleton) = snapshot.skeleton.clone() else {
            return Err(NodeError::MissingInput {
                what: "world skeleton",
            });
        };

        if snapshot.resume.is_some() {
            return self.resume(&snapshot, &skeleton, &ctx).await;
        }

        let remaining = snapshot.remaining_kinds();
        let Some(kind) = remaining.first().copied() else {
            ctx.emit("elements", "all planned categories generated");
            return Ok(PhaseOutcome::Advance(StatePatch {
                phase: Some(Phase::Completed),
                current_element: Some(None),
                ..StatePatch::default()
            }));
        };

        let done: Vec<ElementKind> = snapshot.categories.iter().map(|c| c.category).collect();
        let prompt = prompts::category_prompt(&skeleton, kind, &done);

        let draft = match self.generator.elements(&prompt).await {
            Ok(draft) => draft,
            Err(err) => {
                ctx.emit("elements", format!("generator failed: {err}"));
                return Ok(PhaseOutcome::Advance(StatePatch::error(ErrorEvent::new(
                    ctx.phase,
                    err.to_string(),
                ))));
            }
        };

        if draft.needs_clarification
            && !draft.questions.is_empty()
            && validate_questions(&draft.questions).is_ok()
        {
            let request = ClarificationRequest::ElementsClarification {
                element: kind,
                reason: draft
                    .reason
                    .unwrap_or_else(|| format!("{} needs direction", kind.display_name())),
                questions: draft.questions,
            };
            let patch = StatePatch {
                phase: Some(Phase::AwaitingClarification),
                current_element: Some(Some(kind)),
                pending: Some(Some(request.clone())),
                ..StatePatch::default()
            };
            return Ok(PhaseOutcome::Suspend { request, patch });
        }

        match draft.category.and_then(|c| Self::accept(kind, c)) {
            Some(category) => Ok(PhaseOutcome::Advance(Self::category_patch(kind, category))),
            None => Ok(self.fallback(kind, &prompt, &ctx).await),
        }
    }
}
