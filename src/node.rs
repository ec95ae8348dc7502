//! Phase execution framework for the generation pipeline.
//!
//! This module provides the core abstractions for executable phases: the
//! [`PhaseNode`] trait, execution context, the [`PhaseOutcome`] return
//! contract, and error handling.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::domain::ClarificationRequest;
use crate::state::{StatePatch, StateSnapshot};
use crate::types::PhaseKind;

/// Core trait defining executable phases.
///
/// A phase receives the current state snapshot and execution context,
/// performs its work, and returns a [`PhaseOutcome`].
///
/// # Suspension
///
/// Suspension is a value, not an error: a phase that needs caller input
/// returns [`PhaseOutcome::Suspend`] carrying the typed
/// [`ClarificationRequest`] plus a patch that records the pending request in
/// state. The stepper checkpoints and returns control to the caller;
/// resumption re-enters the same phase with the answers injected through the
/// state's resume slot.
///
/// # Error Handling
///
/// Phases handle failures in two ways:
/// 1. **Fatal errors**: return `Err(NodeError)`; the stepper captures the
///    failure into the errors channel and ends the run in the error phase
/// 2. **Recoverable failures**: fall back (skeleton-only / element-list
///    calls) and return `Ok` with the salvaged content
#[async_trait]
pub trait PhaseNode: Send + Sync {
    /// Execute this phase against the given state snapshot.
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<PhaseOutcome, NodeError>;
}

/// Execution context passed to phases.
#[derive(Clone, Debug)]
pub struct NodeContext {
    /// The phase being executed.
    pub phase: PhaseKind,
    /// Current stepper step number.
    pub step: u64,
}

impl NodeContext {
    /// Emit a phase-scoped tracing event enriched with this context's
    /// metadata.
    pub fn emit(&self, scope: &str, message: impl AsRef<str>) {
        tracing::info!(
            phase = %self.phase,
            step = self.step,
            scope,
            "{}",
            message.as_ref()
        );
    }
}

/// What a phase invocation produced.
///
/// All state effects travel through the patch in both variants; the variant
/// only tells the stepper whether to keep going or hand control back.
#[derive(Clone, Debug)]
pub enum PhaseOutcome {
    /// The phase finished its step; merge the patch and route onward.
    Advance(StatePatch),
    /// The phase needs caller input. Merge the patch (which records the
    /// pending request), checkpoint, and surface the request.
    Suspend {
        request: ClarificationRequest,
        patch: StatePatch,
    },
}

/// Fatal errors during phase execution.
///
/// Failures a phase can absorb through a fallback should not use this; the
/// stepper treats any `NodeError` as the end of the run.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// Expected input data is missing from the state snapshot.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(worldloom::node::missing_input),
        help("Check that the previous phase produced the required data.")
    )]
    MissingInput { what: &'static str },

    /// The generator seam failed in a way no fallback covers.
    #[error(transparent)]
    #[diagnostic(code(worldloom::node::generator))]
    Generator(#[from] crate::generator::GeneratorError),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    #[diagnostic(code(worldloom::node::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Structural validation of generated content failed.
    #[error(transparent)]
    #[diagnostic(code(worldloom::node::domain))]
    Domain(#[from] crate::domain::DomainError),
}
