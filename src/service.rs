//! Caller-facing orchestration over sessions, the graph, and the store.
//!
//! [`GenerationService`] is the composition root's product: every operation
//! a caller performs on a session goes through it. The service owns the
//! session records, mints thread ids, serializes in-flight invokes per
//! session, and translates every graph outcome into one uniform
//! [`GenerationReply`] through a single classification routine.

use std::sync::Arc;

use chrono::Utc;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::domain::{
    ClarificationAnswers, ClarificationRequest, ElementKind, GeneratedWorld, Genre, WorldMetadata,
    WorldSkeleton,
};
use crate::graph::{GenerationGraph, GraphError, GraphInput, GraphOutcome};
use crate::ids::IdGenerator;
use crate::state::StateSnapshot;
use crate::store::{ClarificationRecord, Session, SessionStatus, SessionStore, StoreError};
use crate::types::Phase;

/// Uniform reply for every session operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationReply {
    pub status: SessionStatus,
    /// The session record as of this reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification: Option<PendingClarification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skeleton: Option<WorldSkeleton>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world: Option<GeneratedWorld>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<GenerationProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl GenerationReply {
    fn status_only(status: SessionStatus) -> Self {
        Self {
            status,
            session: None,
            clarification: None,
            skeleton: None,
            world: None,
            progress: None,
            errors: None,
        }
    }
}

/// The pending clarification, addressable for [`GenerationService::respond_to_clarification`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingClarification {
    pub id: String,
    pub request: ClarificationRequest,
}

/// Where element generation stands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationProgress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<ElementKind>,
    pub completed: usize,
    pub total: usize,
}

/// Receipt returned by [`GenerationService::save_world`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SaveReceipt {
    pub world_id: String,
    pub world: GeneratedWorld,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    #[error("session not found: {0}")]
    #[diagnostic(code(worldloom::service::session_not_found))]
    SessionNotFound(String),

    #[error("session {session_id} is {status}, cannot {operation}")]
    #[diagnostic(
        code(worldloom::service::invalid_state),
        help("Check session_status before calling lifecycle operations.")
    )]
    InvalidState {
        session_id: String,
        status: SessionStatus,
        operation: &'static str,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

impl ServiceError {
    fn from_store(err: StoreError, session_id: &str) -> Self {
        match err {
            StoreError::NotFound { what: "session", .. } => {
                ServiceError::SessionNotFound(session_id.to_string())
            }
            other => ServiceError::Store(other),
        }
    }
}

/// Orchestrates generation sessions end to end.
pub struct GenerationService {
    store: Arc<dyn SessionStore>,
    graph: Arc<GenerationGraph>,
    ids: IdGenerator,
    /// Per-session invoke serialization; entries are dropped when a session
    /// reaches a terminal status.
    live: Mutex<FxHashMap<String, Arc<Mutex<()>>>>,
}

impl GenerationService {
    pub fn new(store: Arc<dyn SessionStore>, graph: Arc<GenerationGraph>) -> Self {
        Self {
            store,
            graph,
            ids: IdGenerator::new(),
            live: Mutex::new(FxHashMap::default()),
        }
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut live = self.live.lock().await;
        Arc::clone(live.entry(session_id.to_string()).or_default())
    }

    async fn release(&self, session_id: &str) {
        let mut live = self.live.lock().await;
        live.remove(session_id);
    }

    async fn load(&self, session_id: &str) -> Result<Session, ServiceError> {
        self.store
            .get(session_id)
            .await
            .map_err(|e| ServiceError::from_store(e, session_id))
    }

    fn progress_of(snapshot: &StateSnapshot) -> Option<GenerationProgress> {
        let skeleton = snapshot.skeleton.as_ref()?;
        Some(GenerationProgress {
            current: snapshot.current_element,
            completed: snapshot.categories.len(),
            total: skeleton.elements_to_generate.len(),
        })
    }

    fn assemble_world(&self, snapshot: &StateSnapshot, skeleton: WorldSkeleton) -> GeneratedWorld {
        let generation_ms = snapshot
            .started_at
            .map(|t| (Utc::now() - t).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        let categories = snapshot.categories.clone();
        let total_elements = categories.iter().map(|c| c.elements.len()).sum();
        GeneratedWorld {
            id: self.ids.world_id(),
            skeleton,
            categories,
            metadata: WorldMetadata {
                generated_at: Utc::now(),
                total_elements,
                generation_ms,
            },
        }
    }

    /// The one place graph outcomes become session updates and replies.
    async fn classify(
        &self,
        mut session: Session,
        outcome: GraphOutcome,
    ) -> Result<GenerationReply, ServiceError> {
        let snapshot = outcome.snapshot().clone();
        session.architect_iterations = snapshot.architect_iterations;

        let mut reply = match outcome {
            GraphOutcome::Suspended { request, .. } => {
                let record = ClarificationRecord {
                    id: self.ids.clarification_id(),
                    session_id: session.id.clone(),
                    request: request.clone(),
                    response: None,
                    asked_at: Utc::now(),
                    answered_at: None,
                };
                self.store.append_clarification(record.clone()).await?;
                session.status = match &request {
                    ClarificationRequest::ArchitectClarification { .. } => {
                        SessionStatus::ArchitectAsking
                    }
                    ClarificationRequest::ElementsClarification { .. } => {
                        SessionStatus::ElementsAsking
                    }
                };
                self.store.update(session.clone()).await?;
                GenerationReply {
                    clarification: Some(PendingClarification {
                        id: record.id,
                        request,
                    }),
                    progress: Self::progress_of(&snapshot),
                    ..GenerationReply::status_only(session.status)
                }
            }
            GraphOutcome::Holding { .. } => {
                session.skeleton = snapshot.skeleton.clone();
                session.status = SessionStatus::SkeletonReady;
                self.store.update(session.clone()).await?;
                GenerationReply {
                    skeleton: session.skeleton.clone(),
                    ..GenerationReply::status_only(session.status)
                }
            }
            GraphOutcome::Finished { .. } => {
                if snapshot.phase == Phase::Completed {
                    let skeleton = snapshot
                        .skeleton
                        .clone()
                        .or_else(|| session.skeleton.clone())
                        .unwrap_or_else(|| WorldSkeleton {
                            name: "Untitled world".into(),
                            setting: String::new(),
                            era: String::new(),
                            tone: String::new(),
                            core_conflict: String::new(),
                            unique_features: vec![],
                            primer: String::new(),
                            elements_to_generate: vec![],
                        });
                    let world = self.assemble_world(&snapshot, skeleton);
                    session.world = Some(world.clone());
                    session.status = SessionStatus::Completed;
                    self.store.update(session.clone()).await?;
                    GenerationReply {
                        world: Some(world),
                        progress: Self::progress_of(&snapshot),
                        ..GenerationReply::status_only(session.status)
                    }
                } else {
                    session.status = SessionStatus::Error;
                    self.store.update(session.clone()).await?;
                    GenerationReply {
                        errors: Some(snapshot.errors.iter().map(|e| e.message.clone()).collect()),
                        progress: Self::progress_of(&snapshot),
                        ..GenerationReply::status_only(session.status)
                    }
                }
            }
        };
        reply.session = Some(session);
        Ok(reply)
    }

    /// Create a new session in the `Created` status.
    #[instrument(skip(self), err)]
    pub async fn create_session(&self, genre: Genre) -> Result<Session, ServiceError> {
        let session = Session::new(self.ids.session_id(), genre);
        self.store.create(session.clone()).await?;
        Ok(session)
    }

    /// Start (or restart after an error) the generation run.
    ///
    /// Mints a fresh thread id every time; thread ids are never reused, so a
    /// failed run's checkpoints stay inspectable until the session ends.
    #[instrument(skip(self, user_input), err)]
    pub async fn start_generation(
        &self,
        session_id: &str,
        user_input: impl Into<String> + std::fmt::Debug,
    ) -> Result<GenerationReply, ServiceError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let mut session = self.load(session_id).await?;
        if !matches!(
            session.status,
            SessionStatus::Created | SessionStatus::Error
        ) {
            return Err(ServiceError::InvalidState {
                session_id: session_id.to_string(),
                status: session.status,
                operation: "start generation",
            });
        }

        let user_input = user_input.into();
        let thread_id = self.ids.thread_id();
        session.user_input = Some(user_input.clone());
        session.thread_id = Some(thread_id.clone());
        session.skeleton_approved = false;
        self.store.update(session.clone()).await?;

        let outcome = self
            .graph
            .invoke(
                &thread_id,
                GraphInput::Start {
                    genre: session.genre,
                    user_input,
                },
            )
            .await?;
        self.classify(session, outcome).await
    }

    /// Answer the pending clarification and resume the suspended phase.
    ///
    /// `request_id` must name the clarification currently pending; a stale
    /// or unknown id is rejected so answers never land on the wrong round.
    #[instrument(skip(self, answers), err)]
    pub async fn respond_to_clarification(
        &self,
        session_id: &str,
        request_id: &str,
        answers: ClarificationAnswers,
    ) -> Result<GenerationReply, ServiceError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let session = self.load(session_id).await?;
        if !matches!(
            session.status,
            SessionStatus::ArchitectAsking | SessionStatus::ElementsAsking
        ) {
            return Err(ServiceError::InvalidState {
                session_id: session_id.to_string(),
                status: session.status,
                operation: "respond to clarification",
            });
        }
        let pending = self
            .store
            .pending_clarification(session_id)
            .await?
            .ok_or_else(|| ServiceError::InvalidState {
                session_id: session_id.to_string(),
                status: session.status,
                operation: "respond with no pending clarification",
            })?;
        if pending.id != request_id {
            return Err(ServiceError::InvalidState {
                session_id: session_id.to_string(),
                status: session.status,
                operation: "respond to a clarification that is not pending",
            });
        }
        let thread_id = session.thread_id.clone().ok_or_else(|| {
            ServiceError::InvalidState {
                session_id: session_id.to_string(),
                status: session.status,
                operation: "resume without a thread",
            }
        })?;

        self.store
            .record_response(&pending.id, answers.clone())
            .await?;
        let outcome = self
            .graph
            .invoke(&thread_id, GraphInput::Resume(answers))
            .await?;
        self.classify(session, outcome).await
    }

    /// Approve the skeleton, optionally applying an edited version
    /// atomically with the approval.
    ///
    /// Idempotent: once generation has moved past the gate, re-approval
    /// returns the current reply without re-invoking the graph.
    #[instrument(skip(self, edited), err)]
    pub async fn approve_skeleton(
        &self,
        session_id: &str,
        edited: Option<WorldSkeleton>,
    ) -> Result<GenerationReply, ServiceError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let mut session = self.load(session_id).await?;
        match session.status {
            SessionStatus::SkeletonReady => {}
            // Already past the gate: report, don't re-run.
            SessionStatus::GeneratingElements
            | SessionStatus::ElementsAsking
            | SessionStatus::Completed
            | SessionStatus::Saved
                if session.skeleton_approved =>
            {
                return self.session_status(session_id).await;
            }
            status => {
                return Err(ServiceError::InvalidState {
                    session_id: session_id.to_string(),
                    status,
                    operation: "approve skeleton",
                });
            }
        }
        let thread_id = session.thread_id.clone().ok_or_else(|| {
            ServiceError::InvalidState {
                session_id: session_id.to_string(),
                status: session.status,
                operation: "approve without a thread",
            }
        })?;

        if let Some(skeleton) = &edited {
            session.skeleton = Some(skeleton.clone());
        }
        session.skeleton_approved = true;
        session.status = SessionStatus::GeneratingElements;
        self.store.update(session.clone()).await?;

        let outcome = self
            .graph
            .invoke(
                &thread_id,
                GraphInput::Nudge {
                    approved_skeleton: edited,
                },
            )
            .await?;
        self.classify(session, outcome).await
    }

    /// Current state of a session, without executing anything.
    #[instrument(skip(self), err)]
    pub async fn session_status(&self, session_id: &str) -> Result<GenerationReply, ServiceError> {
        let session = self.load(session_id).await?;
        let pending = self.store.pending_clarification(session_id).await?;
        let progress = match &session.thread_id {
            Some(thread_id) => self
                .graph
                .peek(thread_id)
                .await?
                .as_ref()
                .and_then(Self::progress_of),
            None => None,
        };
        Ok(GenerationReply {
            status: session.status,
            clarification: pending.map(|record| PendingClarification {
                id: record.id,
                request: record.request,
            }),
            skeleton: session.skeleton.clone(),
            world: session.world.clone(),
            progress,
            errors: None,
            session: Some(session),
        })
    }

    /// Persist the generated world and close the run.
    ///
    /// An `edited` world is stored verbatim in place of the assembled one,
    /// so callers can hand-tune the result before it becomes durable.
    /// Callable before element generation completes: the saved world then
    /// carries whatever categories exist (possibly none) around the
    /// skeleton. Releases the thread's checkpoints and the live handle.
    #[instrument(skip(self, edited), err)]
    pub async fn save_world(
        &self,
        session_id: &str,
        edited: Option<GeneratedWorld>,
    ) -> Result<SaveReceipt, ServiceError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let mut session = self.load(session_id).await?;
        if session.status.is_terminal() || session.status == SessionStatus::Created {
            return Err(ServiceError::InvalidState {
                session_id: session_id.to_string(),
                status: session.status,
                operation: "save world",
            });
        }

        let world = match edited.or_else(|| session.world.clone()) {
            Some(world) => world,
            None => {
                let skeleton =
                    session
                        .skeleton
                        .clone()
                        .ok_or_else(|| ServiceError::InvalidState {
                            session_id: session_id.to_string(),
                            status: session.status,
                            operation: "save world before a skeleton exists",
                        })?;
                let snapshot = match &session.thread_id {
                    Some(thread_id) => self.graph.peek(thread_id).await?,
                    None => None,
                };
                match snapshot {
                    Some(snapshot) => self.assemble_world(&snapshot, skeleton),
                    None => GeneratedWorld {
                        id: self.ids.world_id(),
                        skeleton,
                        categories: vec![],
                        metadata: WorldMetadata {
                            generated_at: Utc::now(),
                            total_elements: 0,
                            generation_ms: 0,
                        },
                    },
                }
            }
        };

        session.world = Some(world.clone());
        session.status = SessionStatus::Saved;
        self.store.update(session.clone()).await?;

        if let Some(thread_id) = &session.thread_id {
            self.graph.forget(thread_id).await?;
        }
        drop(_guard);
        self.release(session_id).await;

        Ok(SaveReceipt {
            world_id: world.id.clone(),
            world,
        })
    }

    /// Abandon a session. The clarification history stays readable; only
    /// the thread's checkpoints are dropped.
    #[instrument(skip(self), err)]
    pub async fn abandon_session(&self, session_id: &str) -> Result<(), ServiceError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let mut session = self.load(session_id).await?;
        if session.status.is_terminal() {
            return Err(ServiceError::InvalidState {
                session_id: session_id.to_string(),
                status: session.status,
                operation: "abandon",
            });
        }
        session.status = SessionStatus::Abandoned;
        self.store.update(session.clone()).await?;

        if let Some(thread_id) = &session.thread_id {
            self.graph.forget(thread_id).await?;
        }
        drop(_guard);
        self.release(session_id).await;
        Ok(())
    }
}
