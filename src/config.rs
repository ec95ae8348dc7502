//! Engine configuration.

use crate::checkpoint::CheckpointerType;

/// Tunables for the generation engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Upper bound on architect clarification rounds.
    pub max_architect_iterations: u8,
    /// Stepper guard against runaway routing loops.
    pub max_steps: u64,
    pub checkpointer: CheckpointerType,
    pub sqlite_db_name: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_architect_iterations: 3,
            max_steps: 64,
            checkpointer: CheckpointerType::InMemory,
            sqlite_db_name: Self::resolve_sqlite_db_name(None),
        }
    }
}

impl EngineConfig {
    fn resolve_sqlite_db_name(provided: Option<String>) -> Option<String> {
        if let Some(name) = provided {
            return Some(name);
        }
        dotenvy::dotenv().ok();
        Some(std::env::var("WORLDLOOM_DB_NAME").unwrap_or_else(|_| "worldloom.db".to_string()))
    }

    pub fn new(checkpointer: CheckpointerType, sqlite_db_name: Option<String>) -> Self {
        Self {
            checkpointer,
            sqlite_db_name: Self::resolve_sqlite_db_name(sqlite_db_name),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_architect_iterations(mut self, max: u8) -> Self {
        self.max_architect_iterations = max;
        self
    }

    #[must_use]
    pub fn with_max_steps(mut self, max: u64) -> Self {
        self.max_steps = max;
        self
    }
}
