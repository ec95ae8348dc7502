/*!
SQLite checkpointer.

Durable implementation of the `Checkpointer` trait from `checkpoint.rs`.

## Behavior

- Uses the serde persistence models (see `persistence`) for encoding
  `GenerationState` and the next-phase marker.
- Keeps the complete step history in `thread_steps` and a denormalized
  latest row per thread in `threads`, so `load_latest` is a single-row read.
- When the `sqlite-migrations` feature is enabled (default), embedded
  migrations (`sqlx::migrate!("./migrations")`) are executed on connect;
  disabling the feature assumes external migration orchestration.

This module is focused on database I/O; pure serialization lives in the
persistence module.
*/

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::instrument;

use crate::{
    checkpoint::{Checkpoint, Checkpointer, CheckpointerError},
    persistence::{PersistedState, from_json_str, to_json_string},
    state::GenerationState,
    types::PhaseKind,
};

/// SQLite-backed checkpointer with full step history.
///
/// Storage grows roughly with `(threads × steps_per_thread × state_size)`;
/// the engine deletes a thread's rows when its world is saved, and
/// `delete_thread` covers manual cleanup.
pub struct SqliteCheckpointer {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteCheckpointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCheckpointer").finish()
    }
}

fn backend(e: sqlx::Error) -> CheckpointerError {
    CheckpointerError::Sqlite { source: e }
}

impl SqliteCheckpointer {
    /// Connect (or create) a SQLite database at `database_url`.
    /// Example URL: "sqlite://worldloom.db"
    #[must_use = "checkpointer must be used to persist state"]
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, CheckpointerError> {
        let pool = SqlitePool::connect(database_url).await.map_err(backend)?;
        // Run embedded migrations only if the feature is enabled (idempotent).
        #[cfg(feature = "sqlite-migrations")]
        {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                return Err(CheckpointerError::Corrupt(format!(
                    "migration failure: {e}"
                )));
            }
        }
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Share an already connected pool (the session store uses the same
    /// database file).
    pub fn from_pool(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    fn row_to_checkpoint(thread_id: &str, row: &SqliteRow) -> Result<Checkpoint, CheckpointerError> {
        let step: i64 = row.get("last_step");
        let state_json: String = row.get("last_state_json");
        let next_str: String = row.get("last_next");
        let updated_at_str: String = row.get("updated_at");

        let persisted: PersistedState =
            from_json_str(&state_json).map_err(|e| CheckpointerError::Corrupt(e.to_string()))?;
        let next = PhaseKind::decode(&next_str)
            .ok_or_else(|| CheckpointerError::Corrupt(format!("unknown phase: {next_str}")))?;
        let created_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Checkpoint {
            thread_id: thread_id.to_string(),
            step: step as u64,
            state: GenerationState::from(persisted),
            next,
            created_at,
        })
    }
}

#[async_trait::async_trait]
impl Checkpointer for SqliteCheckpointer {
    #[instrument(skip(self, checkpoint), err)]
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointerError> {
        let state_json = to_json_string(&PersistedState::from(&checkpoint.state))
            .map_err(|e| CheckpointerError::Corrupt(e.to_string()))?;
        let next = checkpoint.next.encode();
        let created_at = checkpoint.created_at.to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Upsert the denormalized latest row.
        sqlx::query(
            r#"
            INSERT INTO threads (id, last_step, last_state_json, last_next, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                last_step = excluded.last_step,
                last_state_json = excluded.last_state_json,
                last_next = excluded.last_next,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&checkpoint.thread_id)
        .bind(checkpoint.step as i64)
        .bind(&state_json)
        .bind(next)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        // Insert or replace step row (allows idempotent re-save of same step).
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO thread_steps (thread_id, step, state_json, next, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&checkpoint.thread_id)
        .bind(checkpoint.step as i64)
        .bind(&state_json)
        .bind(next)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn load_latest(
        &self,
        thread_id: &str,
    ) -> Result<Option<Checkpoint>, CheckpointerError> {
        let row: Option<SqliteRow> = sqlx::query(
            r#"
            SELECT last_step, last_state_json, last_next, updated_at
            FROM threads
            WHERE id = ?1
            "#,
        )
        .bind(thread_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => Ok(Some(Self::row_to_checkpoint(thread_id, &row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), err)]
    async fn delete_thread(&self, thread_id: &str) -> Result<(), CheckpointerError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query("DELETE FROM thread_steps WHERE thread_id = ?1")
            .bind(thread_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        sqlx::query("DELETE FROM threads WHERE id = ?1")
            .bind(thread_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }
}
