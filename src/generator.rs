//! The structured-output generation capability, as a seam.
//!
//! The engine never talks to an LLM vendor directly: nodes depend on
//! [`StructuredGenerator`], injected at composition time. Implementations are
//! expected to enforce their own output schema and return [`GeneratorError`]
//! for anything that does not parse; nodes still re-validate the parts that
//! carry structural invariants (question counts, field shapes).

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ClarificationQuestion, DynamicWorldElement, WorldElementCategory, WorldSkeleton};
use crate::prompts::Prompt;

/// Schema-bound generation calls used by the phases.
///
/// Each method maps to one response schema:
/// - [`architect`](Self::architect): clarification questions *or* a skeleton
/// - [`skeleton`](Self::skeleton): skeleton only (final-round forcing)
/// - [`elements`](Self::elements): clarification questions *or* a category
/// - [`element_list`](Self::element_list): bare elements array (fallback)
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn architect(&self, prompt: &Prompt) -> Result<ArchitectDraft, GeneratorError>;

    async fn skeleton(&self, prompt: &Prompt) -> Result<WorldSkeleton, GeneratorError>;

    async fn elements(&self, prompt: &Prompt) -> Result<CategoryDraft, GeneratorError>;

    async fn element_list(
        &self,
        prompt: &Prompt,
    ) -> Result<Vec<DynamicWorldElement>, GeneratorError>;
}

/// Architect response: either a request for direction or a committed outline.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ArchitectDraft {
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub questions: Vec<ClarificationQuestion>,
    #[serde(default)]
    pub skeleton: Option<WorldSkeleton>,
}

/// Per-category response: either a request for direction or a finished batch.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CategoryDraft {
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub questions: Vec<ClarificationQuestion>,
    #[serde(default)]
    pub category: Option<WorldElementCategory>,
}

/// Failures crossing the generator seam.
#[derive(Debug, Error, Diagnostic)]
pub enum GeneratorError {
    #[error("generator is not configured: {0}")]
    #[diagnostic(
        code(worldloom::generator::config),
        help("Configuration failures are not retried; fix credentials and restart the run.")
    )]
    Config(String),

    #[error("provider call failed: {0}")]
    #[diagnostic(code(worldloom::generator::provider))]
    Provider(String),

    #[error("generator output violated its schema: {0}")]
    #[diagnostic(code(worldloom::generator::malformed))]
    Malformed(String),
}
