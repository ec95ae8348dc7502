//! SQLite backends against a real temp database: checkpoint round trips,
//! session rows, and resuming a suspended run through a fresh connection.

#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use worldloom::checkpoint::{Checkpoint, Checkpointer};
use worldloom::checkpointer_sqlite::SqliteCheckpointer;
use worldloom::domain::{ClarificationAnswers, ClarificationRequest, ElementKind, Genre};
use worldloom::graph::{GraphInput, GraphOutcome};
use worldloom::state::GenerationState;
use worldloom::store::{ClarificationRecord, Session, SessionStatus, SessionStore, StoreError};
use worldloom::store_sqlite::SqliteSessionStore;
use worldloom::types::{Phase, PhaseKind};

use common::{
    ScriptedGenerator, clarifying_draft, pipeline, question, skeleton_draft, skeleton_with_plan,
};

fn temp_db() -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("worldloom-test.db").display()
    );
    (dir, url)
}

fn sample_state() -> GenerationState {
    let mut state = GenerationState::new(Genre::Mystery, "a foggy port city");
    state.phase = Phase::AwaitingClarification;
    state.architect_iterations = 1;
    state.skeleton = Some(skeleton_with_plan(vec![
        ElementKind::Locations,
        ElementKind::Factions,
    ]));
    state.pending = Some(ClarificationRequest::ArchitectClarification {
        reason: "tone is ambiguous".into(),
        questions: vec![question("tone")],
        iteration: 1,
    });
    state
}

#[tokio::test]
async fn checkpoint_rows_survive_a_round_trip() {
    let (_dir, url) = temp_db();
    let cp = SqliteCheckpointer::connect(&url).await.unwrap();

    cp.save(Checkpoint {
        thread_id: "t-rt".into(),
        step: 1,
        state: sample_state(),
        next: PhaseKind::Architect,
        created_at: Utc::now(),
    })
    .await
    .unwrap();

    let loaded = cp.load_latest("t-rt").await.unwrap().unwrap();
    assert_eq!(loaded.step, 1);
    assert_eq!(loaded.next, PhaseKind::Architect);
    assert_eq!(loaded.state.phase, Phase::AwaitingClarification);
    assert_eq!(loaded.state.architect_iterations, 1);
    assert_eq!(
        loaded.state.skeleton.as_ref().unwrap().name,
        "Port Vespera"
    );
    assert!(loaded.state.pending.is_some());
}

#[tokio::test]
async fn load_latest_tracks_the_newest_step() {
    let (_dir, url) = temp_db();
    let cp = SqliteCheckpointer::connect(&url).await.unwrap();

    for step in 1..=3 {
        let mut state = sample_state();
        state.architect_iterations = step as u8;
        cp.save(Checkpoint {
            thread_id: "t-steps".into(),
            step,
            state,
            next: PhaseKind::Architect,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    }

    let loaded = cp.load_latest("t-steps").await.unwrap().unwrap();
    assert_eq!(loaded.step, 3);
    assert_eq!(loaded.state.architect_iterations, 3);

    cp.delete_thread("t-steps").await.unwrap();
    assert!(cp.load_latest("t-steps").await.unwrap().is_none());
}

#[tokio::test]
async fn suspended_run_resumes_through_a_fresh_connection() {
    let (_dir, url) = temp_db();

    {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push_architect(Ok(clarifying_draft(vec![question("tone")])));
        let cp = SqliteCheckpointer::connect(&url).await.unwrap();
        let graph = pipeline(generator, Arc::new(cp));
        let outcome = graph
            .invoke(
                "t-durable",
                GraphInput::Start {
                    genre: Genre::Mystery,
                    user_input: "a foggy port city".into(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(outcome, GraphOutcome::Suspended { .. }));
    }

    // New connection, new graph, same database file.
    let generator = Arc::new(ScriptedGenerator::new());
    generator.push_architect(Ok(skeleton_draft(skeleton_with_plan(vec![
        ElementKind::Locations,
    ]))));
    let cp = SqliteCheckpointer::connect(&url).await.unwrap();
    let graph = pipeline(generator, Arc::new(cp));
    let outcome = graph
        .invoke(
            "t-durable",
            GraphInput::Resume(ClarificationAnswers::skipped()),
        )
        .await
        .unwrap();
    let GraphOutcome::Holding { snapshot } = outcome else {
        panic!("expected holding, got {outcome:?}");
    };
    assert_eq!(snapshot.architect_iterations, 1);
    assert_eq!(snapshot.history.len(), 1);
}

#[tokio::test]
async fn session_rows_round_trip_with_json_columns() {
    let (_dir, url) = temp_db();
    let store = SqliteSessionStore::connect(&url).await.unwrap();

    let mut session = Session::new("s-rt", Genre::Horror);
    session.user_input = Some("a lighthouse that eats ships".into());
    session.skeleton = Some(skeleton_with_plan(vec![ElementKind::Creatures]));
    store.create(session.clone()).await.unwrap();

    let loaded = store.get("s-rt").await.unwrap();
    assert_eq!(loaded.status, SessionStatus::Created);
    assert_eq!(loaded.genre, Genre::Horror);
    assert_eq!(
        loaded.skeleton.unwrap().elements_to_generate,
        vec![ElementKind::Creatures]
    );

    let err = store.create(session).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn status_machine_is_enforced_on_update() {
    let (_dir, url) = temp_db();
    let store = SqliteSessionStore::connect(&url).await.unwrap();

    let mut session = Session::new("s-status", Genre::Fantasy);
    store.create(session.clone()).await.unwrap();

    // Created cannot jump straight to saved.
    session.status = SessionStatus::Saved;
    let err = store.update(session.clone()).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    session.status = SessionStatus::SkeletonReady;
    store.update(session.clone()).await.unwrap();
    session.status = SessionStatus::Saved;
    store.update(session).await.unwrap();
    assert_eq!(
        store.get("s-status").await.unwrap().status,
        SessionStatus::Saved
    );
}

#[tokio::test]
async fn clarifications_accept_exactly_one_response() {
    let (_dir, url) = temp_db();
    let store = SqliteSessionStore::connect(&url).await.unwrap();
    store
        .create(Session::new("s-clar", Genre::Mystery))
        .await
        .unwrap();

    let record = ClarificationRecord {
        id: "clar-1".into(),
        session_id: "s-clar".into(),
        request: ClarificationRequest::ElementsClarification {
            element: ElementKind::Factions,
            reason: "guild structure unclear".into(),
            questions: vec![question("guilds")],
        },
        response: None,
        asked_at: Utc::now(),
        answered_at: None,
    };
    store.append_clarification(record).await.unwrap();

    let pending = store.pending_clarification("s-clar").await.unwrap().unwrap();
    assert_eq!(pending.id, "clar-1");

    store
        .record_response("clar-1", ClarificationAnswers::skipped())
        .await
        .unwrap();
    assert!(store.pending_clarification("s-clar").await.unwrap().is_none());

    let err = store
        .record_response("clar-1", ClarificationAnswers::skipped())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let history = store.clarification_history("s-clar").await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].answered_at.is_some());

    // Cascade: deleting the session clears the exchange.
    store.delete("s-clar").await.unwrap();
    assert!(store.clarification_history("s-clar").await.unwrap().is_empty());
}
