//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use worldloom::checkpoint::{Checkpointer, InMemoryCheckpointer};
use worldloom::domain::{
    ClarificationQuestion, DynamicWorldElement, ElementKind, WorldElementCategory, WorldSkeleton,
};
use worldloom::generator::{ArchitectDraft, CategoryDraft, GeneratorError, StructuredGenerator};
use worldloom::graph::{GenerationGraph, world_pipeline};
use worldloom::prompts::Prompt;

/// Generator double driven by scripted response queues, one per call.
///
/// Each generator method pops the front of its queue; an exhausted queue
/// yields a provider error, which makes missing script entries loud.
#[derive(Default)]
pub struct ScriptedGenerator {
    architect: Mutex<VecDeque<Result<ArchitectDraft, GeneratorError>>>,
    skeleton: Mutex<VecDeque<Result<WorldSkeleton, GeneratorError>>>,
    elements: Mutex<VecDeque<Result<CategoryDraft, GeneratorError>>>,
    element_list: Mutex<VecDeque<Result<Vec<DynamicWorldElement>, GeneratorError>>>,
    /// Prompts observed by the architect call, for round-forcing assertions.
    pub seen_architect_prompts: Mutex<Vec<Prompt>>,
    /// Prompts observed by the elements call, for resume-fidelity assertions.
    pub seen_element_prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_architect(&self, response: Result<ArchitectDraft, GeneratorError>) -> &Self {
        self.architect.lock().unwrap().push_back(response);
        self
    }

    pub fn push_skeleton(&self, response: Result<WorldSkeleton, GeneratorError>) -> &Self {
        self.skeleton.lock().unwrap().push_back(response);
        self
    }

    pub fn push_elements(&self, response: Result<CategoryDraft, GeneratorError>) -> &Self {
        self.elements.lock().unwrap().push_back(response);
        self
    }

    pub fn push_element_list(
        &self,
        response: Result<Vec<DynamicWorldElement>, GeneratorError>,
    ) -> &Self {
        self.element_list.lock().unwrap().push_back(response);
        self
    }

    fn exhausted(call: &str) -> GeneratorError {
        GeneratorError::Provider(format!("script exhausted for {call}"))
    }
}

#[async_trait]
impl StructuredGenerator for ScriptedGenerator {
    async fn architect(&self, prompt: &Prompt) -> Result<ArchitectDraft, GeneratorError> {
        self.seen_architect_prompts.lock().unwrap().push(prompt.clone());
        self.architect
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::exhausted("architect")))
    }

    async fn skeleton(&self, _prompt: &Prompt) -> Result<WorldSkeleton, GeneratorError> {
        self.skeleton
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::exhausted("skeleton")))
    }

    async fn elements(&self, prompt: &Prompt) -> Result<CategoryDraft, GeneratorError> {
        self.seen_element_prompts.lock().unwrap().push(prompt.clone());
        self.elements
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::exhausted("elements")))
    }

    async fn element_list(
        &self,
        _prompt: &Prompt,
    ) -> Result<Vec<DynamicWorldElement>, GeneratorError> {
        self.element_list
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::exhausted("element_list")))
    }
}

pub fn skeleton_with_plan(plan: Vec<ElementKind>) -> WorldSkeleton {
    WorldSkeleton {
        name: "Port Vespera".into(),
        setting: "a fogbound harbor city".into(),
        era: "gaslamp".into(),
        tone: "noir".into(),
        core_conflict: "the harbormaster's ledger names everyone".into(),
        unique_features: vec!["the fog never lifts".into()],
        primer: "Every light in Port Vespera is a lie told to ships.".into(),
        elements_to_generate: plan,
    }
}

pub fn question(id: &str) -> ClarificationQuestion {
    ClarificationQuestion {
        id: id.into(),
        question: format!("what about {id}?"),
        options: vec!["a".into(), "b".into(), "c".into()],
        allow_custom: true,
    }
}

pub fn clarifying_draft(questions: Vec<ClarificationQuestion>) -> ArchitectDraft {
    ArchitectDraft {
        needs_clarification: true,
        reason: Some("need direction".into()),
        questions,
        skeleton: None,
    }
}

pub fn skeleton_draft(skeleton: WorldSkeleton) -> ArchitectDraft {
    ArchitectDraft {
        needs_clarification: false,
        reason: None,
        questions: vec![],
        skeleton: Some(skeleton),
    }
}

pub fn element(id: &str, name: &str) -> DynamicWorldElement {
    DynamicWorldElement {
        id: id.into(),
        name: name.into(),
        description: format!("{name}, as the fog remembers it"),
        fields: serde_json::Map::new(),
    }
}

pub fn category(kind: ElementKind, ids: &[&str]) -> WorldElementCategory {
    WorldElementCategory {
        category: kind,
        name: kind.display_name().into(),
        description: kind.blurb().into(),
        elements: ids
            .iter()
            .map(|id| element(id, &format!("element {id}")))
            .collect(),
    }
}

pub fn category_draft(cat: WorldElementCategory) -> CategoryDraft {
    CategoryDraft {
        needs_clarification: false,
        reason: None,
        questions: vec![],
        category: Some(cat),
    }
}

pub fn elements_clarifying_draft(questions: Vec<ClarificationQuestion>) -> CategoryDraft {
    CategoryDraft {
        needs_clarification: true,
        reason: Some("category needs direction".into()),
        questions,
        category: None,
    }
}

/// Build the canonical pipeline over a shared checkpointer so tests can
/// simulate process restarts by compiling a second graph on the same backend.
pub fn pipeline(
    generator: Arc<ScriptedGenerator>,
    checkpointer: Arc<dyn Checkpointer>,
) -> GenerationGraph {
    world_pipeline(generator, checkpointer, 3, 64).expect("pipeline compiles")
}

pub fn in_memory_pipeline(generator: Arc<ScriptedGenerator>) -> GenerationGraph {
    pipeline(generator, Arc::new(InMemoryCheckpointer::new()))
}
