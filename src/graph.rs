//! Graph construction and the checkpointing stepper.
//!
//! [`GraphBuilder`] assembles phases and routing predicates and compiles
//! them, with validation, into a [`GenerationGraph`]. The graph's
//! [`invoke`](GenerationGraph::invoke) is the stepper: it drives phases until
//! the run finishes, holds for approval, or suspends on a clarification.
//! Every merged step is checkpointed, so any outcome can be resumed later by
//! thread id, including from another process.

use std::sync::Arc;

use chrono::Utc;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::instrument;

use crate::channels::{Channel, ErrorEvent};
use crate::checkpoint::{Checkpoint, Checkpointer, CheckpointerError};
use crate::domain::{ClarificationAnswers, ClarificationRequest, Genre, WorldSkeleton};
use crate::generator::StructuredGenerator;
use crate::node::{NodeContext, PhaseNode, PhaseOutcome};
use crate::nodes::{ApprovalGate, ArchitectNode, ElementsNode};
use crate::reducers::ReducerRegistry;
use crate::state::{GenerationState, StatePatch, StateSnapshot};
use crate::types::{Phase, PhaseKind};

/// Routing decision made after a phase advances.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseRoute {
    /// Continue with the named phase.
    Next(PhaseKind),
    /// Park the run; a later invoke re-enters the same phase.
    Hold,
    /// The run is over (completed or errored).
    Finish,
}

/// Per-phase routing predicate over the post-merge state.
pub type RoutePredicate = Arc<dyn Fn(&StateSnapshot) -> PhaseRoute + Send + Sync>;

/// How an invoke enters the graph.
#[derive(Clone, Debug)]
pub enum GraphInput {
    /// Begin a fresh run on an unused thread id.
    Start { genre: Genre, user_input: String },
    /// Answer the pending clarification and re-enter the suspended phase.
    Resume(ClarificationAnswers),
    /// Approve the skeleton (optionally edited) and re-poke a holding run.
    Nudge {
        approved_skeleton: Option<WorldSkeleton>,
    },
}

/// How an invoke left the graph.
#[derive(Clone, Debug)]
pub enum GraphOutcome {
    /// A phase suspended on a clarification request.
    Suspended {
        request: ClarificationRequest,
        snapshot: StateSnapshot,
    },
    /// The run is parked awaiting skeleton approval.
    Holding { snapshot: StateSnapshot },
    /// The run reached a terminal phase (completed or errored).
    Finished { snapshot: StateSnapshot },
}

impl GraphOutcome {
    #[must_use]
    pub fn snapshot(&self) -> &StateSnapshot {
        match self {
            GraphOutcome::Suspended { snapshot, .. }
            | GraphOutcome::Holding { snapshot }
            | GraphOutcome::Finished { snapshot } => snapshot,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("thread already has checkpoints: {0}")]
    #[diagnostic(
        code(worldloom::graph::thread_in_use),
        help("Thread ids are single-use; mint a fresh id per run.")
    )]
    ThreadInUse(String),

    #[error("unknown thread: {0}")]
    #[diagnostic(code(worldloom::graph::unknown_thread))]
    UnknownThread(String),

    #[error("no phase registered for {0}")]
    #[diagnostic(code(worldloom::graph::missing_phase))]
    MissingPhase(PhaseKind),

    #[error("no route registered for {0}")]
    #[diagnostic(code(worldloom::graph::missing_route))]
    MissingRoute(PhaseKind),

    #[error("step limit {limit} exceeded on thread {thread_id}")]
    #[diagnostic(
        code(worldloom::graph::step_limit),
        help("Routing is looping without making progress; inspect the checkpoint history.")
    )]
    StepLimit { thread_id: String, limit: u64 },

    #[error(transparent)]
    #[diagnostic(code(worldloom::graph::checkpoint))]
    Checkpoint(#[from] CheckpointerError),

    #[error("reducer failure: {0}")]
    #[diagnostic(code(worldloom::graph::reducer))]
    Reducer(String),
}

/// Validation failures at compile time.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphCompileError {
    #[error("graph has no phases")]
    #[diagnostic(code(worldloom::graph::empty))]
    Empty,

    #[error("phase {0} has no route")]
    #[diagnostic(code(worldloom::graph::unrouted_phase))]
    UnroutedPhase(PhaseKind),

    #[error("entry phase {0} is not registered")]
    #[diagnostic(code(worldloom::graph::bad_entry))]
    BadEntry(PhaseKind),
}

/// Builder for assembling a [`GenerationGraph`].
pub struct GraphBuilder {
    phases: FxHashMap<PhaseKind, Arc<dyn PhaseNode>>,
    routes: FxHashMap<PhaseKind, RoutePredicate>,
    entry: PhaseKind,
    max_steps: u64,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phases: FxHashMap::default(),
            routes: FxHashMap::default(),
            entry: PhaseKind::Architect,
            max_steps: 64,
        }
    }

    /// Register a phase implementation.
    ///
    /// `PhaseKind::Start` and `PhaseKind::End` are virtual endpoints; an
    /// attempt to register them is ignored with a warning.
    #[must_use]
    pub fn add_phase(mut self, kind: PhaseKind, node: impl PhaseNode + 'static) -> Self {
        match kind {
            PhaseKind::Start | PhaseKind::End => {
                tracing::warn!(?kind, "ignoring registration of virtual phase kind");
            }
            _ => {
                self.phases.insert(kind, Arc::new(node));
            }
        }
        self
    }

    /// Register the routing predicate evaluated after `kind` advances.
    #[must_use]
    pub fn add_route(mut self, kind: PhaseKind, predicate: RoutePredicate) -> Self {
        self.routes.insert(kind, predicate);
        self
    }

    #[must_use]
    pub fn with_entry(mut self, entry: PhaseKind) -> Self {
        self.entry = entry;
        self
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Validate and produce the executable graph.
    pub fn compile(
        self,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Result<GenerationGraph, GraphCompileError> {
        if self.phases.is_empty() {
            return Err(GraphCompileError::Empty);
        }
        if !self.phases.contains_key(&self.entry) {
            return Err(GraphCompileError::BadEntry(self.entry));
        }
        for kind in self.phases.keys() {
            if !self.routes.contains_key(kind) {
                return Err(GraphCompileError::UnroutedPhase(*kind));
            }
        }
        Ok(GenerationGraph {
            phases: self.phases,
            routes: self.routes,
            entry: self.entry,
            max_steps: self.max_steps,
            checkpointer,
            registry: ReducerRegistry::default(),
        })
    }
}

/// The compiled pipeline plus its checkpointing stepper.
pub struct GenerationGraph {
    phases: FxHashMap<PhaseKind, Arc<dyn PhaseNode>>,
    routes: FxHashMap<PhaseKind, RoutePredicate>,
    entry: PhaseKind,
    max_steps: u64,
    checkpointer: Arc<dyn Checkpointer>,
    registry: ReducerRegistry,
}

/// Wire the canonical three-phase pipeline:
/// architect → approval gate → element generation.
pub fn world_pipeline(
    generator: Arc<dyn StructuredGenerator>,
    checkpointer: Arc<dyn Checkpointer>,
    max_architect_iterations: u8,
    max_steps: u64,
) -> Result<GenerationGraph, GraphCompileError> {
    GraphBuilder::new()
        .add_phase(
            PhaseKind::Architect,
            ArchitectNode::new(Arc::clone(&generator), max_architect_iterations),
        )
        .add_phase(PhaseKind::WaitForApproval, ApprovalGate)
        .add_phase(PhaseKind::GenerateElements, ElementsNode::new(generator))
        .add_route(
            PhaseKind::Architect,
            Arc::new(|s: &StateSnapshot| match s.phase {
                Phase::SkeletonReady => PhaseRoute::Next(PhaseKind::WaitForApproval),
                Phase::Error => PhaseRoute::Finish,
                // After a resume fold-in the architect loops back to itself
                // for a fresh generation pass.
                _ => PhaseRoute::Next(PhaseKind::Architect),
            }),
        )
        .add_route(
            PhaseKind::WaitForApproval,
            Arc::new(|s: &StateSnapshot| match s.phase {
                Phase::GeneratingElements => PhaseRoute::Next(PhaseKind::GenerateElements),
                Phase::Error => PhaseRoute::Finish,
                _ => PhaseRoute::Hold,
            }),
        )
        .add_route(
            PhaseKind::GenerateElements,
            Arc::new(|s: &StateSnapshot| match s.phase {
                Phase::Completed | Phase::Error => PhaseRoute::Finish,
                _ => PhaseRoute::Next(PhaseKind::GenerateElements),
            }),
        )
        .with_entry(PhaseKind::Architect)
        .with_max_steps(max_steps)
        .compile(checkpointer)
}

impl GenerationGraph {
    /// Merge a patch through the reducer registry, bumping each channel's
    /// version only when its content actually changed.
    fn apply_patch(&self, state: &mut GenerationState, patch: &StatePatch) -> Result<(), GraphError> {
        let before = (
            state.history.len(),
            state.categories.len(),
            state.errors.len(),
        );
        self.registry
            .apply_patch(state, patch)
            .map_err(|e| GraphError::Reducer(e.to_string()))?;
        if state.history.len() != before.0 {
            let v = state.history.version();
            state.history.set_version(v + 1);
        }
        if state.categories.len() != before.1 {
            let v = state.categories.version();
            state.categories.set_version(v + 1);
        }
        if state.errors.len() != before.2 {
            let v = state.errors.version();
            state.errors.set_version(v + 1);
        }
        Ok(())
    }

    async fn save(
        &self,
        thread_id: &str,
        step: u64,
        state: &GenerationState,
        next: PhaseKind,
    ) -> Result<(), GraphError> {
        self.checkpointer
            .save(Checkpoint {
                thread_id: thread_id.to_string(),
                step,
                state: state.clone(),
                next,
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Latest known state for a thread, without executing anything.
    pub async fn peek(&self, thread_id: &str) -> Result<Option<StateSnapshot>, GraphError> {
        Ok(self
            .checkpointer
            .load_latest(thread_id)
            .await?
            .map(|cp| cp.state.snapshot()))
    }

    /// Drop every checkpoint for a thread.
    pub async fn forget(&self, thread_id: &str) -> Result<(), GraphError> {
        self.checkpointer.delete_thread(thread_id).await?;
        Ok(())
    }

    /// Run the stepper for one invoke.
    ///
    /// Drives phases until the run finishes, holds, or suspends; each merged
    /// step is checkpointed first, so the returned outcome is always the
    /// durable one. Phase failures never escape as errors: they are captured
    /// into the errors channel and surface as a finished run in the error
    /// phase.
    #[instrument(skip(self, input), err)]
    pub async fn invoke(
        &self,
        thread_id: &str,
        input: GraphInput,
    ) -> Result<GraphOutcome, GraphError> {
        let (mut state, mut next, mut step) = match input {
            GraphInput::Start { genre, user_input } => {
                if self.checkpointer.load_latest(thread_id).await?.is_some() {
                    return Err(GraphError::ThreadInUse(thread_id.to_string()));
                }
                (GenerationState::new(genre, user_input), self.entry, 0)
            }
            GraphInput::Resume(answers) => {
                let cp = self
                    .checkpointer
                    .load_latest(thread_id)
                    .await?
                    .ok_or_else(|| GraphError::UnknownThread(thread_id.to_string()))?;
                let mut state = cp.state;
                // The pending request stays for the suspended phase to read;
                // the phase clears both slots in its own patch.
                state.resume = Some(answers);
                (state, cp.next, cp.step)
            }
            GraphInput::Nudge { approved_skeleton } => {
                let cp = self
                    .checkpointer
                    .load_latest(thread_id)
                    .await?
                    .ok_or_else(|| GraphError::UnknownThread(thread_id.to_string()))?;
                let mut state = cp.state;
                if let Some(mut skeleton) = approved_skeleton {
                    skeleton.dedup_plan();
                    state.skeleton = Some(skeleton);
                }
                state.skeleton_approved = true;
                (state, cp.next, cp.step)
            }
        };

        let step_limit = step + self.max_steps;
        loop {
            if next.is_end() {
                return Ok(GraphOutcome::Finished {
                    snapshot: state.snapshot(),
                });
            }
            if step >= step_limit {
                return Err(GraphError::StepLimit {
                    thread_id: thread_id.to_string(),
                    limit: self.max_steps,
                });
            }

            let node = self
                .phases
                .get(&next)
                .ok_or(GraphError::MissingPhase(next))?;
            step += 1;
            let ctx = NodeContext { phase: next, step };

            let outcome = match node.run(state.snapshot(), ctx).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    // Phase failure: capture into state and end the run.
                    tracing::warn!(phase = %next, error = %err, "phase failed");
                    let patch = StatePatch::error(ErrorEvent::new(next, err.to_string()));
                    self.apply_patch(&mut state, &patch)?;
                    self.save(thread_id, step, &state, PhaseKind::End).await?;
                    return Ok(GraphOutcome::Finished {
                        snapshot: state.snapshot(),
                    });
                }
            };

            match outcome {
                PhaseOutcome::Suspend { request, patch } => {
                    self.apply_patch(&mut state, &patch)?;
                    // Save with next = the suspended phase itself, so resume
                    // re-enters it at the suspension point.
                    self.save(thread_id, step, &state, next).await?;
                    return Ok(GraphOutcome::Suspended {
                        request,
                        snapshot: state.snapshot(),
                    });
                }
                PhaseOutcome::Advance(patch) => {
                    self.apply_patch(&mut state, &patch)?;
                    let route = self
                        .routes
                        .get(&next)
                        .ok_or(GraphError::MissingRoute(next))?;
                    match route(&state.snapshot()) {
                        PhaseRoute::Finish => {
                            self.save(thread_id, step, &state, PhaseKind::End).await?;
                            return Ok(GraphOutcome::Finished {
                                snapshot: state.snapshot(),
                            });
                        }
                        PhaseRoute::Hold => {
                            // Re-enter the same phase on the next invoke.
                            self.save(thread_id, step, &state, next).await?;
                            return Ok(GraphOutcome::Holding {
                                snapshot: state.snapshot(),
                            });
                        }
                        PhaseRoute::Next(kind) => {
                            self.save(thread_id, step, &state, kind).await?;
                            next = kind;
                        }
                    }
                }
            }
        }
    }
}
