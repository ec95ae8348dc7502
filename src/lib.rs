//! # Worldloom: Resumable World-Generation Workflow Engine
//!
//! Worldloom drives a multi-phase, human-in-the-loop world generation run:
//! an architect phase outlines the world, an approval gate hands the outline
//! to the caller, and an elements phase fills in one lore category at a
//! time. Any phase can suspend with a typed clarification request; the whole
//! run checkpoints after every step, so a suspended or parked run resumes
//! later, in the same process or another one.
//!
//! ## Core Concepts
//!
//! - **Phases**: Async units of work that observe a state snapshot and
//!   return a patch, or suspend with a [`domain::ClarificationRequest`]
//! - **State**: Versioned, channel-based working state, merged through
//!   reducers and persisted whole in checkpoints
//! - **Graph**: The three-phase pipeline with per-phase routing predicates
//! - **Sessions**: The caller-facing records and status machine layered on
//!   top of graph threads
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use worldloom::checkpoint::InMemoryCheckpointer;
//! use worldloom::config::EngineConfig;
//! use worldloom::domain::Genre;
//! use worldloom::generator::StructuredGenerator;
//! use worldloom::graph::world_pipeline;
//! use worldloom::service::GenerationService;
//! use worldloom::store::InMemorySessionStore;
//!
//! # async fn example(generator: Arc<dyn StructuredGenerator>) -> miette::Result<()> {
//! let config = EngineConfig::default();
//! let graph = world_pipeline(
//!     generator,
//!     Arc::new(InMemoryCheckpointer::new()),
//!     config.max_architect_iterations,
//!     config.max_steps,
//! )?;
//! let service = GenerationService::new(
//!     Arc::new(InMemorySessionStore::new()),
//!     Arc::new(graph),
//! );
//!
//! let session = service.create_session(Genre::Mystery).await?;
//! let reply = service
//!     .start_generation(&session.id, "a foggy port city full of secrets")
//!     .await?;
//! println!("status: {}", reply.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`domain`] - Genres, skeletons, elements, and the clarification protocol
//! - [`state`] - Working state, snapshots, and patches
//! - [`channels`] / [`reducers`] - Versioned channels and merge strategies
//! - [`generator`] / [`prompts`] - The structured-generation seam
//! - [`node`] / [`nodes`] - Phase trait and the three phase implementations
//! - [`graph`] - Pipeline assembly and the checkpointing stepper
//! - [`checkpoint`] / [`persistence`] - Checkpoint contract and storage shapes
//! - [`store`] - Session records and their storage contract
//! - [`service`] - Caller-facing orchestration

pub mod channels;
pub mod checkpoint;
#[cfg(feature = "sqlite")]
pub mod checkpointer_sqlite;
pub mod config;
pub mod domain;
pub mod generator;
pub mod graph;
pub mod ids;
pub mod node;
pub mod nodes;
pub mod persistence;
pub mod prompts;
pub mod reducers;
pub mod service;
pub mod state;
pub mod store;
#[cfg(feature = "sqlite")]
pub mod store_sqlite;
pub mod telemetry;
pub mod types;
