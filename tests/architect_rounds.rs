//! Architect phase behavior: bounded clarification rounds, final-round
//! forcing, and plan hygiene on acceptance.

mod common;

use std::sync::Arc;

use proptest::prelude::*;

use worldloom::checkpoint::InMemoryCheckpointer;
use worldloom::domain::{
    ClarificationAnswers, ClarificationQuestion, ClarificationRequest, ElementKind, Genre,
};
use worldloom::generator::ArchitectDraft;
use worldloom::graph::{GraphInput, GraphOutcome, world_pipeline};
use worldloom::types::Phase;

use common::{
    ScriptedGenerator, clarifying_draft, in_memory_pipeline, question, skeleton_draft,
    skeleton_with_plan,
};

fn start() -> GraphInput {
    GraphInput::Start {
        genre: Genre::Fantasy,
        user_input: "a city carved into a sleeping titan".into(),
    }
}

#[tokio::test]
async fn rounds_stop_at_max_iterations_and_force_a_skeleton() {
    let generator = Arc::new(ScriptedGenerator::new());
    // The generator wants to clarify forever; after three rounds the final
    // pass gets one more clarifying draft and must still end with an outline.
    for _ in 0..4 {
        generator.push_architect(Ok(clarifying_draft(vec![question("scope")])));
    }
    generator.push_skeleton(Ok(skeleton_with_plan(vec![ElementKind::Locations])));
    let graph = in_memory_pipeline(Arc::clone(&generator));

    let mut rounds = Vec::new();
    let mut outcome = graph.invoke("t-rounds", start()).await.unwrap();
    while let GraphOutcome::Suspended { request, .. } = outcome {
        let ClarificationRequest::ArchitectClarification { iteration, .. } = request else {
            panic!("unexpected request kind");
        };
        rounds.push(iteration);
        outcome = graph
            .invoke("t-rounds", GraphInput::Resume(ClarificationAnswers::skipped()))
            .await
            .unwrap();
    }

    assert_eq!(rounds, vec![1, 2, 3]);
    let GraphOutcome::Holding { snapshot } = outcome else {
        panic!("expected holding, got {outcome:?}");
    };
    assert_eq!(snapshot.architect_iterations, 3);
    assert!(snapshot.skeleton.is_some());
    assert_eq!(snapshot.history.len(), 3);
}

#[tokio::test]
async fn last_permitted_round_receives_the_forcing_prompt() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator
        .push_architect(Ok(clarifying_draft(vec![question("scope")])))
        .push_architect(Ok(clarifying_draft(vec![question("tone")])))
        .push_architect(Ok(skeleton_draft(skeleton_with_plan(vec![
            ElementKind::Locations,
        ]))));
    let graph = in_memory_pipeline(Arc::clone(&generator));

    graph.invoke("t-forcing", start()).await.unwrap();
    for _ in 0..2 {
        graph
            .invoke("t-forcing", GraphInput::Resume(ClarificationAnswers::skipped()))
            .await
            .unwrap();
    }

    // With three permitted rounds, the third architect call is the last one
    // allowed to ask, so its prompt already forbids further questions.
    let prompts = generator.seen_architect_prompts.lock().unwrap();
    assert_eq!(prompts.len(), 3);
    assert!(!prompts[0].user.contains("Do not ask further questions"));
    assert!(!prompts[1].user.contains("Do not ask further questions"));
    assert!(prompts[2].user.contains("Do not ask further questions"));
}

#[tokio::test]
async fn malformed_draft_falls_back_to_the_skeleton_call() {
    let generator = Arc::new(ScriptedGenerator::new());
    // Neither questions nor an outline: structurally useless.
    generator.push_architect(Ok(ArchitectDraft::default()));
    generator.push_skeleton(Ok(skeleton_with_plan(vec![ElementKind::History])));
    let graph = in_memory_pipeline(generator);

    let outcome = graph.invoke("t-malformed", start()).await.unwrap();
    let GraphOutcome::Holding { snapshot } = outcome else {
        panic!("expected holding, got {outcome:?}");
    };
    assert_eq!(snapshot.phase, Phase::AwaitingApproval);
    assert_eq!(
        snapshot.skeleton.unwrap().elements_to_generate,
        vec![ElementKind::History]
    );
}

#[tokio::test]
async fn invalid_question_batch_never_reaches_the_caller() {
    let generator = Arc::new(ScriptedGenerator::new());
    let bad = ClarificationQuestion {
        id: "scope".into(),
        question: "how big?".into(),
        options: vec!["small".into()], // wrong option count
        allow_custom: true,
    };
    generator.push_architect(Ok(clarifying_draft(vec![bad])));
    generator.push_skeleton(Ok(skeleton_with_plan(vec![ElementKind::Locations])));
    let graph = in_memory_pipeline(generator);

    let outcome = graph.invoke("t-badq", start()).await.unwrap();
    assert!(matches!(outcome, GraphOutcome::Holding { .. }));
}

#[tokio::test]
async fn empty_plan_is_filled_with_the_full_roster() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator.push_architect(Ok(skeleton_draft(skeleton_with_plan(vec![]))));
    let graph = in_memory_pipeline(generator);

    let outcome = graph.invoke("t-empty-plan", start()).await.unwrap();
    let GraphOutcome::Holding { snapshot } = outcome else {
        panic!("expected holding, got {outcome:?}");
    };
    assert_eq!(
        snapshot.skeleton.unwrap().elements_to_generate,
        ElementKind::all()
    );
}

#[tokio::test]
async fn duplicate_plan_entries_are_deduped_on_acceptance() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator.push_architect(Ok(skeleton_draft(skeleton_with_plan(vec![
        ElementKind::Locations,
        ElementKind::Locations,
        ElementKind::Factions,
        ElementKind::Locations,
    ]))));
    let graph = in_memory_pipeline(generator);

    let outcome = graph.invoke("t-dedup", start()).await.unwrap();
    let GraphOutcome::Holding { snapshot } = outcome else {
        panic!("expected holding, got {outcome:?}");
    };
    assert_eq!(
        snapshot.skeleton.unwrap().elements_to_generate,
        vec![ElementKind::Locations, ElementKind::Factions]
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// However eager the generator is to clarify, the caller is asked at
    /// most `max` times and the run still ends with an outline.
    #[test]
    fn clarification_rounds_are_bounded(max in 1u8..=4, eagerness in 0usize..4) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let generator = Arc::new(ScriptedGenerator::new());
            for _ in 0..(max as usize + eagerness + 1) {
                generator.push_architect(Ok(clarifying_draft(vec![question("q")])));
            }
            generator.push_skeleton(Ok(skeleton_with_plan(vec![ElementKind::Locations])));
            let graph = world_pipeline(
                Arc::clone(&generator) as Arc<dyn worldloom::generator::StructuredGenerator>,
                Arc::new(InMemoryCheckpointer::new()),
                max,
                64,
            )
            .unwrap();

            let mut suspensions = 0usize;
            let mut outcome = graph.invoke("t-prop", start()).await.unwrap();
            while let GraphOutcome::Suspended { .. } = outcome {
                suspensions += 1;
                outcome = graph
                    .invoke("t-prop", GraphInput::Resume(ClarificationAnswers::skipped()))
                    .await
                    .unwrap();
            }

            prop_assert_eq!(suspensions, max as usize);
            prop_assert!(
                matches!(outcome, GraphOutcome::Holding { .. }),
                "expected holding, got {:?}",
                outcome
            );
            Ok(())
        })?;
    }
}
