//! Core identifiers for the worldloom generation pipeline.
//!
//! This module defines the two enums that describe *where* execution is:
//!
//! - [`PhaseKind`]: identifies a node in the workflow graph (used for routing
//!   and checkpoint persistence)
//! - [`Phase`]: the fine-grained marker carried inside the working state,
//!   advanced by node patches and inspected by routing predicates
//!
//! `PhaseKind` supports a stable string encoding so checkpoints survive
//! process restarts; `Phase` is plain serde data persisted as part of the
//! state itself.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a node within the generation graph.
///
/// `Start` and `End` are virtual endpoints: they carry no implementation and
/// exist only so the stepper has an unambiguous entry and terminal marker.
///
/// # Persistence
///
/// `PhaseKind` round-trips through [`encode`](Self::encode) /
/// [`decode`](Self::decode) for checkpoint storage.
///
/// ```rust
/// use worldloom::types::PhaseKind;
///
/// let kind = PhaseKind::GenerateElements;
/// assert_eq!(PhaseKind::decode(&kind.encode()), Some(kind));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseKind {
    /// Virtual entry point; never implemented by a node.
    Start,
    /// Produces a world skeleton or a clarification request.
    Architect,
    /// Marker gate that holds until the skeleton is approved.
    WaitForApproval,
    /// Generates one element category per step.
    GenerateElements,
    /// Virtual terminal marker.
    End,
}

impl PhaseKind {
    /// Encode into the persisted string form.
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            PhaseKind::Start => "Start",
            PhaseKind::Architect => "Architect",
            PhaseKind::WaitForApproval => "WaitForApproval",
            PhaseKind::GenerateElements => "GenerateElements",
            PhaseKind::End => "End",
        }
    }

    /// Decode a persisted string form. Unknown encodings yield `None` so a
    /// corrupted checkpoint surfaces as an explicit error instead of routing
    /// somewhere arbitrary.
    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "Start" => Some(PhaseKind::Start),
            "Architect" => Some(PhaseKind::Architect),
            "WaitForApproval" => Some(PhaseKind::WaitForApproval),
            "GenerateElements" => Some(PhaseKind::GenerateElements),
            "End" => Some(PhaseKind::End),
            _ => None,
        }
    }

    /// Returns `true` if this is the virtual terminal marker.
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

/// Identifies a reducible region of the working state.
///
/// `Scalar` covers all replace-semantics fields (phase, skeleton, slots);
/// the remaining variants name the append channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelType {
    Scalar,
    History,
    Categories,
    Errors,
}

/// Fine-grained execution marker carried in [`GenerationState`](crate::state::GenerationState).
///
/// Nodes advance this marker through their patches; routing predicates and
/// the orchestration service classify results by inspecting it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Architect is (re)composing a skeleton, possibly after a clarification round.
    ArchitectProcessing,
    /// Suspended on a pending clarification request.
    AwaitingClarification,
    /// A skeleton was produced and awaits approval.
    SkeletonReady,
    /// The approval gate ran and found the skeleton not yet approved.
    AwaitingApproval,
    /// Element categories are being generated.
    GeneratingElements,
    /// Every category in the skeleton's plan has been generated.
    Completed,
    /// A node captured an unrecoverable failure into state.
    Error,
}

impl Phase {
    /// Terminal phases end the stepper loop unconditionally.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Error)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::ArchitectProcessing => "architect_processing",
            Phase::AwaitingClarification => "awaiting_clarification",
            Phase::SkeletonReady => "skeleton_ready",
            Phase::AwaitingApproval => "awaiting_approval",
            Phase::GeneratingElements => "generating_elements",
            Phase::Completed => "completed",
            Phase::Error => "error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_kind_encoding_round_trips() {
        for kind in [
            PhaseKind::Start,
            PhaseKind::Architect,
            PhaseKind::WaitForApproval,
            PhaseKind::GenerateElements,
            PhaseKind::End,
        ] {
            assert_eq!(PhaseKind::decode(kind.encode()), Some(kind));
        }
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        assert_eq!(PhaseKind::decode("Custom:Nope"), None);
    }

    #[test]
    fn terminal_phases() {
        assert!(Phase::Completed.is_terminal());
        assert!(Phase::Error.is_terminal());
        assert!(!Phase::AwaitingApproval.is_terminal());
    }
}
