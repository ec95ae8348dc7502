/*!
Persistence primitives for serializing/deserializing working state and
checkpoints (used by the SQLite checkpointer and any future persistent
backends).

Design Goals:
- Provide explicit serde-friendly structs decoupled from internal
  in-memory representations.
- Keep conversion logic localized (From / TryFrom impls) so the
  checkpointer code is lean and declarative.
- Reject unknown `PhaseKind` encodings explicitly so a corrupted row
  never routes a resumed run somewhere arbitrary.

This module intentionally does NOT perform I/O. It is pure data
transformation and (de)serialization glue.
*/

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    channels::{Channel, VersionedVec},
    checkpoint::Checkpoint,
    state::GenerationState,
    types::PhaseKind,
};

/// Channel that stores a vector collection with version metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct PersistedVecChannel<T> {
    pub version: u32,
    #[serde(default)]
    pub items: Vec<T>,
}

impl<T> Default for PersistedVecChannel<T> {
    fn default() -> Self {
        Self {
            version: 1,
            items: Vec::new(),
        }
    }
}

/// Complete persisted shape of the in-memory GenerationState.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub genre: crate::domain::Genre,
    pub user_input: String,
    pub phase: crate::types::Phase,
    pub architect_iterations: u8,
    #[serde(default)]
    pub skeleton: Option<crate::domain::WorldSkeleton>,
    #[serde(default)]
    pub skeleton_approved: bool,
    #[serde(default)]
    pub pending: Option<crate::domain::ClarificationRequest>,
    #[serde(default)]
    pub resume: Option<crate::domain::ClarificationAnswers>,
    #[serde(default)]
    pub current_element: Option<crate::domain::ElementKind>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub history: PersistedVecChannel<crate::domain::ClarificationTurn>,
    #[serde(default)]
    pub categories: PersistedVecChannel<crate::domain::WorldElementCategory>,
    #[serde(default)]
    pub errors: PersistedVecChannel<crate::channels::ErrorEvent>,
}

/// Full persisted checkpoint representation.
/// (Step history tables store multiple instances of this shape.)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedCheckpoint {
    pub thread_id: String,
    pub step: u64,
    pub state: PersistedState,
    /// Node to enter, encoded via PhaseKind::encode().
    pub next: String,
    /// RFC3339 string form of creation time (keeps chrono::DateTime out of
    /// the serialized shape).
    pub created_at: String,
}

use miette::Diagnostic;
use thiserror::Error;

/// Bidirectional conversion and serialization errors for persistence models.
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("JSON serialization/deserialization failed: {source}")]
    #[diagnostic(
        code(worldloom::persistence::serde),
        help("Ensure the JSON structure matches Persisted* types.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown phase encoding: {0}")]
    #[diagnostic(code(worldloom::persistence::unknown_phase))]
    UnknownPhase(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

pub fn to_json_string<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| PersistenceError::Serde { source: e })
}

pub fn from_json_str<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T> {
    serde_json::from_str(s).map_err(|e| PersistenceError::Serde { source: e })
}

/* ---------- GenerationState <-> PersistedState Conversions ---------- */

impl From<&GenerationState> for PersistedState {
    fn from(s: &GenerationState) -> Self {
        PersistedState {
            genre: s.genre,
            user_input: s.user_input.clone(),
            phase: s.phase,
            architect_iterations: s.architect_iterations,
            skeleton: s.skeleton.clone(),
            skeleton_approved: s.skeleton_approved,
            pending: s.pending.clone(),
            resume: s.resume.clone(),
            current_element: s.current_element,
            started_at: s.started_at.map(|dt| dt.to_rfc3339()),
            history: PersistedVecChannel {
                version: s.history.version(),
                items: s.history.snapshot(),
            },
            categories: PersistedVecChannel {
                version: s.categories.version(),
                items: s.categories.snapshot(),
            },
            errors: PersistedVecChannel {
                version: s.errors.version(),
                items: s.errors.snapshot(),
            },
        }
    }
}

impl From<PersistedState> for GenerationState {
    fn from(p: PersistedState) -> Self {
        let started_at = p.started_at.as_deref().and_then(|s| {
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        });
        GenerationState {
            genre: p.genre,
            user_input: p.user_input,
            phase: p.phase,
            architect_iterations: p.architect_iterations,
            skeleton: p.skeleton,
            skeleton_approved: p.skeleton_approved,
            pending: p.pending,
            resume: p.resume,
            current_element: p.current_element,
            started_at,
            history: VersionedVec::new(p.history.items, p.history.version),
            categories: VersionedVec::new(p.categories.items, p.categories.version),
            errors: VersionedVec::new(p.errors.items, p.errors.version),
        }
    }
}

/* ---------- Checkpoint <-> PersistedCheckpoint Conversions ---------- */

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(cp: &Checkpoint) -> Self {
        PersistedCheckpoint {
            thread_id: cp.thread_id.clone(),
            step: cp.step,
            state: PersistedState::from(&cp.state),
            next: cp.next.encode().to_string(),
            created_at: cp.created_at.to_rfc3339(),
        }
    }
}

impl TryFrom<PersistedCheckpoint> for Checkpoint {
    type Error = PersistenceError;

    fn try_from(p: PersistedCheckpoint) -> Result<Self> {
        let next = PhaseKind::decode(&p.next)
            .ok_or_else(|| PersistenceError::UnknownPhase(p.next.clone()))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&p.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Ok(Checkpoint {
            thread_id: p.thread_id,
            step: p.step,
            state: GenerationState::from(p.state),
            next,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Genre;

    #[test]
    fn checkpoint_round_trips_through_json() {
        let mut state = GenerationState::new(Genre::Horror, "an abbey");
        state.architect_iterations = 2;
        let cp = Checkpoint {
            thread_id: "t1".into(),
            step: 4,
            state,
            next: PhaseKind::WaitForApproval,
            created_at: Utc::now(),
        };
        let json = to_json_string(&PersistedCheckpoint::from(&cp)).unwrap();
        let back = Checkpoint::try_from(from_json_str::<PersistedCheckpoint>(&json).unwrap())
            .unwrap();
        assert_eq!(back.thread_id, "t1");
        assert_eq!(back.step, 4);
        assert_eq!(back.next, PhaseKind::WaitForApproval);
        assert_eq!(back.state.architect_iterations, 2);
    }

    #[test]
    fn populated_channels_deserialize_without_default_items() {
        let mut state = GenerationState::new(Genre::Horror, "an abbey");
        state.history.get_mut().push(crate::domain::ClarificationTurn {
            question: "tone?".into(),
            answer: "grim".into(),
        });
        state
            .errors
            .get_mut()
            .push(crate::channels::ErrorEvent::new(PhaseKind::Architect, "boom"));

        let json = to_json_string(&PersistedState::from(&state)).unwrap();
        let back: GenerationState = from_json_str::<PersistedState>(&json).unwrap().into();
        assert_eq!(back.history.len(), 1);
        assert_eq!(back.errors.len(), 1);
        assert_eq!(back.history.items()[0].answer, "grim");
    }

    #[test]
    fn missing_channel_fields_fall_back_to_empty_defaults() {
        let json = r#"{
            "genre": "horror",
            "user_input": "an abbey",
            "phase": "architect_processing",
            "architect_iterations": 0
        }"#;
        let state: GenerationState = from_json_str::<PersistedState>(json).unwrap().into();
        assert!(state.history.is_empty());
        assert_eq!(state.categories.version(), 1);
    }

    #[test]
    fn unknown_phase_encoding_is_rejected() {
        let cp = Checkpoint {
            thread_id: "t1".into(),
            step: 1,
            state: GenerationState::new(Genre::Horror, "x"),
            next: PhaseKind::Architect,
            created_at: Utc::now(),
        };
        let mut persisted = PersistedCheckpoint::from(&cp);
        persisted.next = "NotAPhase".into();
        assert!(matches!(
            Checkpoint::try_from(persisted),
            Err(PersistenceError::UnknownPhase(_))
        ));
    }
}
