//! Caller-facing session records and their storage contract.
//!
//! A session is the durable, user-visible side of a generation run: status,
//! the approved artifacts, and the append-only clarification exchange. The
//! graph's working state lives in checkpoints; the session row only mirrors
//! what the caller needs to see between calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::{ClarificationAnswers, ClarificationRequest, GeneratedWorld, Genre, WorldSkeleton};

/// Session lifecycle states.
///
/// `Saved`, `Abandoned` are terminal. `Error` permits a restart (a fresh
/// thread id is minted; the session keeps its history).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    /// The architect phase is waiting on clarification answers.
    ArchitectAsking,
    SkeletonReady,
    GeneratingElements,
    /// Element generation is waiting on clarification answers.
    ElementsAsking,
    Completed,
    Saved,
    Error,
    Abandoned,
}

impl SessionStatus {
    /// Whether a transition to `next` is legal. Staying in the same status
    /// is always allowed (idempotent updates).
    #[must_use]
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        if *self == next {
            return true;
        }
        match self {
            Created | Error => matches!(
                next,
                ArchitectAsking | SkeletonReady | Completed | Error | Abandoned
            ),
            ArchitectAsking => matches!(
                next,
                SkeletonReady | Completed | Saved | Error | Abandoned
            ),
            SkeletonReady => matches!(
                next,
                GeneratingElements | Completed | Saved | Error | Abandoned
            ),
            GeneratingElements => {
                matches!(next, ElementsAsking | Completed | Saved | Error | Abandoned)
            }
            ElementsAsking => {
                matches!(next, GeneratingElements | Completed | Saved | Error | Abandoned)
            }
            Completed => matches!(next, Saved | Abandoned),
            Saved | Abandoned => false,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Saved | SessionStatus::Abandoned)
    }
}

impl SessionStatus {
    /// Wire/storage form, matching the serde encoding.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::ArchitectAsking => "architect_asking",
            SessionStatus::SkeletonReady => "skeleton_ready",
            SessionStatus::GeneratingElements => "generating_elements",
            SessionStatus::ElementsAsking => "elements_asking",
            SessionStatus::Completed => "completed",
            SessionStatus::Saved => "saved",
            SessionStatus::Error => "error",
            SessionStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use SessionStatus::*;
        let status = match s {
            "created" => Created,
            "architect_asking" => ArchitectAsking,
            "skeleton_ready" => SkeletonReady,
            "generating_elements" => GeneratingElements,
            "elements_asking" => ElementsAsking,
            "completed" => Completed,
            "saved" => Saved,
            "error" => Error,
            "abandoned" => Abandoned,
            other => return Err(format!("unknown session status: {other}")),
        };
        Ok(status)
    }
}

/// One caller-facing generation session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub genre: Genre,
    pub user_input: Option<String>,
    pub architect_iterations: u8,
    /// Graph thread backing the current run; minted fresh per start.
    pub thread_id: Option<String>,
    pub skeleton: Option<WorldSkeleton>,
    pub skeleton_approved: bool,
    pub world: Option<GeneratedWorld>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>, genre: Genre) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: SessionStatus::Created,
            genre,
            user_input: None,
            architect_iterations: 0,
            thread_id: None,
            skeleton: None,
            skeleton_approved: false,
            world: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One row of the append-only clarification exchange.
///
/// Exactly one response per record: `record_response` refuses a second.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClarificationRecord {
    pub id: String,
    pub session_id: String,
    pub request: ClarificationRequest,
    pub response: Option<ClarificationAnswers>,
    pub asked_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("{what} not found: {id}")]
    #[diagnostic(
        code(worldloom::store::not_found),
        help("Lookups never auto-create; check the id came from this store.")
    )]
    NotFound { what: &'static str, id: String },

    #[error("conflict: {0}")]
    #[diagnostic(code(worldloom::store::conflict))]
    Conflict(String),

    #[error("store (de)serialization failed: {source}")]
    #[diagnostic(code(worldloom::store::serde))]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    #[cfg(feature = "sqlite")]
    #[error("sqlite store backend failed: {source}")]
    #[diagnostic(code(worldloom::store::sqlite))]
    Sqlite {
        #[source]
        source: sqlx::Error,
    },
}

/// Storage contract for sessions and their clarification history.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: Session) -> Result<(), StoreError>;

    async fn get(&self, session_id: &str) -> Result<Session, StoreError>;

    /// Persist an updated session. Status changes are validated against
    /// [`SessionStatus::can_transition_to`].
    async fn update(&self, session: Session) -> Result<(), StoreError>;

    /// Delete a session and, cascading, its clarification history.
    async fn delete(&self, session_id: &str) -> Result<(), StoreError>;

    async fn append_clarification(&self, record: ClarificationRecord) -> Result<(), StoreError>;

    /// Record the single response to a clarification. A second response for
    /// the same record is a conflict.
    async fn record_response(
        &self,
        clarification_id: &str,
        answers: ClarificationAnswers,
    ) -> Result<(), StoreError>;

    /// The most recent unanswered clarification for a session, if any.
    async fn pending_clarification(
        &self,
        session_id: &str,
    ) -> Result<Option<ClarificationRecord>, StoreError>;

    /// Full exchange for a session, oldest first.
    async fn clarification_history(
        &self,
        session_id: &str,
    ) -> Result<Vec<ClarificationRecord>, StoreError>;
}

/// Volatile store for tests and single-process development.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<FxHashMap<String, Session>>>,
    clarifications: Arc<RwLock<Vec<ClarificationRecord>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict(format!(
                "session already exists: {}",
                session.id
            )));
        }
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Session, StoreError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                what: "session",
                id: session_id.to_string(),
            })
    }

    async fn update(&self, mut session: Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let existing = sessions
            .get(&session.id)
            .ok_or_else(|| StoreError::NotFound {
                what: "session",
                id: session.id.clone(),
            })?;
        if !existing.status.can_transition_to(session.status) {
            return Err(StoreError::Conflict(format!(
                "illegal status transition {} -> {} for session {}",
                existing.status, session.status, session.id
            )));
        }
        session.updated_at = Utc::now();
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(session_id).is_none() {
            return Err(StoreError::NotFound {
                what: "session",
                id: session_id.to_string(),
            });
        }
        drop(sessions);
        let mut clarifications = self.clarifications.write().await;
        clarifications.retain(|c| c.session_id != session_id);
        Ok(())
    }

    async fn append_clarification(&self, record: ClarificationRecord) -> Result<(), StoreError> {
        let sessions = self.sessions.read().await;
        if !sessions.contains_key(&record.session_id) {
            return Err(StoreError::NotFound {
                what: "session",
                id: record.session_id.clone(),
            });
        }
        drop(sessions);
        let mut clarifications = self.clarifications.write().await;
        clarifications.push(record);
        Ok(())
    }

    async fn record_response(
        &self,
        clarification_id: &str,
        answers: ClarificationAnswers,
    ) -> Result<(), StoreError> {
        let mut clarifications = self.clarifications.write().await;
        let record = clarifications
            .iter_mut()
            .find(|c| c.id == clarification_id)
            .ok_or_else(|| StoreError::NotFound {
                what: "clarification",
                id: clarification_id.to_string(),
            })?;
        if record.response.is_some() {
            return Err(StoreError::Conflict(format!(
                "clarification already answered: {clarification_id}"
            )));
        }
        record.response = Some(answers);
        record.answered_at = Some(Utc::now());
        Ok(())
    }

    async fn pending_clarification(
        &self,
        session_id: &str,
    ) -> Result<Option<ClarificationRecord>, StoreError> {
        let clarifications = self.clarifications.read().await;
        Ok(clarifications
            .iter()
            .filter(|c| c.session_id == session_id && c.response.is_none())
            .max_by_key(|c| c.asked_at)
            .cloned())
    }

    async fn clarification_history(
        &self,
        session_id: &str,
    ) -> Result<Vec<ClarificationRecord>, StoreError> {
        let clarifications = self.clarifications.read().await;
        Ok(clarifications
            .iter()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClarificationQuestion, validate_questions};

    fn record(id: &str, session_id: &str) -> ClarificationRecord {
        let questions = vec![ClarificationQuestion {
            id: "tone".into(),
            question: "what tone?".into(),
            options: vec!["grim".into(), "hopeful".into(), "weird".into()],
            allow_custom: true,
        }];
        validate_questions(&questions).unwrap();
        ClarificationRecord {
            id: id.into(),
            session_id: session_id.into(),
            request: ClarificationRequest::ArchitectClarification {
                reason: "ambiguous".into(),
                questions,
                iteration: 1,
            },
            response: None,
            asked_at: Utc::now(),
            answered_at: None,
        }
    }

    #[test]
    fn terminal_statuses_admit_nothing() {
        assert!(!SessionStatus::Saved.can_transition_to(SessionStatus::Created));
        assert!(!SessionStatus::Abandoned.can_transition_to(SessionStatus::Error));
        assert!(SessionStatus::Completed.can_transition_to(SessionStatus::Saved));
        assert!(SessionStatus::Error.can_transition_to(SessionStatus::ArchitectAsking));
    }

    #[test]
    fn asking_statuses_name_their_phase_on_the_wire() {
        let json = serde_json::to_value(SessionStatus::ArchitectAsking).unwrap();
        assert_eq!(json, "architect_asking");
        let json = serde_json::to_value(SessionStatus::ElementsAsking).unwrap();
        assert_eq!(json, "elements_asking");
        assert_eq!(
            "elements_asking".parse::<SessionStatus>().unwrap(),
            SessionStatus::ElementsAsking
        );
    }

    #[test]
    fn element_generation_threads_through_its_transient_status() {
        assert!(SessionStatus::SkeletonReady.can_transition_to(SessionStatus::GeneratingElements));
        assert!(SessionStatus::GeneratingElements.can_transition_to(SessionStatus::ElementsAsking));
        assert!(SessionStatus::ElementsAsking.can_transition_to(SessionStatus::Completed));
        // The asking states are per phase; a skeleton approval never falls
        // back into the architect's asking state.
        assert!(!SessionStatus::SkeletonReady.can_transition_to(SessionStatus::ArchitectAsking));
    }

    #[tokio::test]
    async fn update_rejects_illegal_transition() {
        let store = InMemorySessionStore::new();
        let mut session = Session::new("s1", Genre::Fantasy);
        store.create(session.clone()).await.unwrap();

        session.status = SessionStatus::Saved;
        let err = store.update(session).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn one_response_per_clarification() {
        let store = InMemorySessionStore::new();
        store.create(Session::new("s1", Genre::Fantasy)).await.unwrap();
        store.append_clarification(record("c1", "s1")).await.unwrap();

        store
            .record_response("c1", ClarificationAnswers::default())
            .await
            .unwrap();
        let err = store
            .record_response("c1", ClarificationAnswers::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.pending_clarification("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_cascades_clarifications() {
        let store = InMemorySessionStore::new();
        store.create(Session::new("s1", Genre::Fantasy)).await.unwrap();
        store.append_clarification(record("c1", "s1")).await.unwrap();

        store.delete("s1").await.unwrap();
        assert!(store.clarification_history("s1").await.unwrap().is_empty());
        assert!(matches!(
            store.get("s1").await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
