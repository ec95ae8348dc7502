//! Working state for a generation run.
//!
//! [`GenerationState`] is the single mutable value threaded through the
//! graph. Nodes never touch it directly: they observe an immutable
//! [`StateSnapshot`] and return a [`StatePatch`], which the stepper merges
//! through the reducer registry. The whole state serializes into checkpoints,
//! so a run can be resumed by a different process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channels::{Channel, ErrorEvent, VersionedVec};
use crate::domain::{
    ClarificationAnswers, ClarificationRequest, ClarificationTurn, ElementKind, Genre,
    WorldElementCategory, WorldSkeleton,
};
use crate::types::Phase;

/// Complete working state for one generation thread.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationState {
    pub genre: Genre,
    pub user_input: String,
    pub phase: Phase,
    /// Completed architect clarification rounds.
    pub architect_iterations: u8,
    pub skeleton: Option<WorldSkeleton>,
    pub skeleton_approved: bool,
    /// The interrupt slot: set when a phase suspends, cleared on resume.
    pub pending: Option<ClarificationRequest>,
    /// Answers injected by a resume, consumed by the suspended phase.
    pub resume: Option<ClarificationAnswers>,
    /// Category most recently worked on by the elements phase.
    pub current_element: Option<ElementKind>,
    pub started_at: Option<DateTime<Utc>>,
    pub history: VersionedVec<ClarificationTurn>,
    pub categories: VersionedVec<WorldElementCategory>,
    pub errors: VersionedVec<ErrorEvent>,
}

impl GenerationState {
    /// Fresh state at the start of a run.
    #[must_use]
    pub fn new(genre: Genre, user_input: impl Into<String>) -> Self {
        Self {
            genre,
            user_input: user_input.into(),
            phase: Phase::ArchitectProcessing,
            architect_iterations: 0,
            skeleton: None,
            skeleton_approved: false,
            pending: None,
            resume: None,
            current_element: None,
            started_at: Some(Utc::now()),
            history: VersionedVec::default(),
            categories: VersionedVec::default(),
            errors: VersionedVec::default(),
        }
    }

    /// Immutable view handed to nodes and routing predicates.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            genre: self.genre,
            user_input: self.user_input.clone(),
            phase: self.phase,
            architect_iterations: self.architect_iterations,
            skeleton: self.skeleton.clone(),
            skeleton_approved: self.skeleton_approved,
            pending: self.pending.clone(),
            resume: self.resume.clone(),
            current_element: self.current_element,
            started_at: self.started_at,
            history: self.history.snapshot(),
            history_version: self.history.version(),
            categories: self.categories.snapshot(),
            categories_version: self.categories.version(),
            errors: self.errors.snapshot(),
            errors_version: self.errors.version(),
        }
    }

    /// Categories already generated, by kind, in generation order.
    #[must_use]
    pub fn generated_kinds(&self) -> Vec<ElementKind> {
        self.categories.items().iter().map(|c| c.category).collect()
    }
}

/// Point-in-time copy of the state, cheap to hand across an `.await`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub genre: Genre,
    pub user_input: String,
    pub phase: Phase,
    pub architect_iterations: u8,
    pub skeleton: Option<WorldSkeleton>,
    pub skeleton_approved: bool,
    pub pending: Option<ClarificationRequest>,
    pub resume: Option<ClarificationAnswers>,
    pub current_element: Option<ElementKind>,
    pub started_at: Option<DateTime<Utc>>,
    pub history: Vec<ClarificationTurn>,
    pub history_version: u32,
    pub categories: Vec<WorldElementCategory>,
    pub categories_version: u32,
    pub errors: Vec<ErrorEvent>,
    pub errors_version: u32,
}

impl StateSnapshot {
    /// Kinds still missing from the skeleton's generation plan, in plan order.
    #[must_use]
    pub fn remaining_kinds(&self) -> Vec<ElementKind> {
        let Some(skeleton) = &self.skeleton else {
            return Vec::new();
        };
        let done: Vec<ElementKind> = self.categories.iter().map(|c| c.category).collect();
        skeleton
            .elements_to_generate
            .iter()
            .filter(|k| !done.contains(k))
            .copied()
            .collect()
    }
}

/// Partial update returned by a node.
///
/// `None` means "leave unchanged". The slot fields (`pending`, `resume`,
/// `current_element`) are doubly optional so a patch can distinguish "leave
/// alone" from "clear". Vector fields are appended, never replaced.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatePatch {
    pub phase: Option<Phase>,
    pub architect_iterations: Option<u8>,
    pub skeleton: Option<WorldSkeleton>,
    pub skeleton_approved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<Option<ClarificationRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume: Option<Option<ClarificationAnswers>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_element: Option<Option<ElementKind>>,
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ClarificationTurn>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<WorldElementCategory>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorEvent>,
}

impl StatePatch {
    /// A patch that only advances the phase marker.
    #[must_use]
    pub fn phase(phase: Phase) -> Self {
        Self {
            phase: Some(phase),
            ..Self::default()
        }
    }

    /// A patch that records a failure and moves the run into the error phase.
    #[must_use]
    pub fn error(event: ErrorEvent) -> Self {
        Self {
            phase: Some(Phase::Error),
            errors: vec![event],
            ..Self::default()
        }
    }

    /// True when the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phase.is_none()
            && self.architect_iterations.is_none()
            && self.skeleton.is_none()
            && self.skeleton_approved.is_none()
            && self.pending.is_none()
            && self.resume.is_none()
            && self.current_element.is_none()
            && self.started_at.is_none()
            && self.history.is_empty()
            && self.categories.is_empty()
            && self.errors.is_empty()
    }
}
