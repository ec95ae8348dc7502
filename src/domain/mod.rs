//! Domain model for generated worlds.
//!
//! These are the wire- and storage-facing types: everything here derives
//! serde and is persisted either inside session rows or inside graph
//! checkpoints. Validation is deliberately shallow for lore content (open
//! ended `fields` maps) and strict for the clarification protocol (question
//! counts and option counts are structural invariants).

mod clarification;
mod elements;
mod genre;
mod skeleton;
mod world;

pub use clarification::{
    ClarificationAnswers, ClarificationQuestion, ClarificationRequest, ClarificationTurn,
    MAX_QUESTIONS_PER_REQUEST, OPTIONS_PER_QUESTION, validate_questions,
};
pub use elements::{DynamicWorldElement, ElementKind, FieldValue, WorldElementCategory};
pub use genre::Genre;
pub use skeleton::WorldSkeleton;
pub use world::{GeneratedWorld, WorldMetadata};

use miette::Diagnostic;
use thiserror::Error;

/// Structural validation failures in domain data.
#[derive(Debug, Error, Diagnostic)]
pub enum DomainError {
    #[error("clarification request must carry 1..={max} questions, got {got}")]
    #[diagnostic(code(worldloom::domain::question_count))]
    QuestionCount { got: usize, max: usize },

    #[error("question {id} must carry exactly {expected} options, got {got}")]
    #[diagnostic(code(worldloom::domain::option_count))]
    OptionCount {
        id: String,
        expected: usize,
        got: usize,
    },

    #[error("element field {key} must be a string or an array of strings")]
    #[diagnostic(
        code(worldloom::domain::field_shape),
        help("Lore fields are intentionally open ended; only the outer shape is enforced.")
    )]
    FieldShape { key: String },

    #[error("unknown genre: {0}")]
    #[diagnostic(code(worldloom::domain::unknown_genre))]
    UnknownGenre(String),

    #[error("unknown element category: {0}")]
    #[diagnostic(code(worldloom::domain::unknown_element))]
    UnknownElement(String),
}
