/*!
SQLite session store.

Durable implementation of the `SessionStore` trait from `store.rs`, sharing
the same database file (and migrations) as the SQLite checkpointer. Complex
values (skeleton, world, clarification payloads) are stored as JSON columns;
the status machine is still validated in Rust before any write.
*/

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::instrument;

use crate::domain::ClarificationAnswers;
use crate::store::{ClarificationRecord, Session, SessionStore, StoreError};

pub struct SqliteSessionStore {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSessionStore").finish()
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Sqlite { source: e }
}

fn serde_err(e: serde_json::Error) -> StoreError {
    StoreError::Serde { source: e }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl SqliteSessionStore {
    /// Connect (or create) a SQLite database at `database_url` and run
    /// embedded migrations when the feature allows.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(database_url).await.map_err(backend)?;
        #[cfg(feature = "sqlite-migrations")]
        {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                return Err(StoreError::Conflict(format!("migration failure: {e}")));
            }
        }
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn from_pool(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> Arc<SqlitePool> {
        Arc::clone(&self.pool)
    }

    fn row_to_session(row: &SqliteRow) -> Result<Session, StoreError> {
        let status_str: String = row.get("status");
        let genre_str: String = row.get("genre");
        let skeleton_json: Option<String> = row.get("skeleton_json");
        let world_json: Option<String> = row.get("world_json");
        let created_at: String = row.get("created_at");
        let updated_at: String = row.get("updated_at");

        Ok(Session {
            id: row.get("id"),
            status: status_str.parse().map_err(StoreError::Conflict)?,
            genre: genre_str
                .parse()
                .map_err(|e: crate::domain::DomainError| StoreError::Conflict(e.to_string()))?,
            user_input: row.get("user_input"),
            architect_iterations: row.get::<i64, _>("architect_iterations") as u8,
            thread_id: row.get("thread_id"),
            skeleton: skeleton_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(serde_err)?,
            skeleton_approved: row.get::<i64, _>("skeleton_approved") != 0,
            world: world_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(serde_err)?,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
        })
    }

    fn row_to_record(row: &SqliteRow) -> Result<ClarificationRecord, StoreError> {
        let request_json: String = row.get("request_json");
        let response_json: Option<String> = row.get("response_json");
        let asked_at: String = row.get("asked_at");
        let answered_at: Option<String> = row.get("answered_at");

        Ok(ClarificationRecord {
            id: row.get("id"),
            session_id: row.get("session_id"),
            request: serde_json::from_str(&request_json).map_err(serde_err)?,
            response: response_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(serde_err)?,
            asked_at: parse_ts(&asked_at),
            answered_at: answered_at.as_deref().map(parse_ts),
        })
    }

    async fn write_session(&self, session: &Session, insert: bool) -> Result<(), StoreError> {
        let skeleton_json = session
            .skeleton
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(serde_err)?;
        let world_json = session
            .world
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(serde_err)?;

        let sql = if insert {
            r#"
            INSERT INTO sessions (
                id, status, genre, user_input, architect_iterations, thread_id,
                skeleton_json, skeleton_approved, world_json, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#
        } else {
            r#"
            UPDATE sessions SET
                status = ?2, genre = ?3, user_input = ?4,
                architect_iterations = ?5, thread_id = ?6, skeleton_json = ?7,
                skeleton_approved = ?8, world_json = ?9, created_at = ?10,
                updated_at = ?11
            WHERE id = ?1
            "#
        };

        sqlx::query(sql)
            .bind(&session.id)
            .bind(session.status.to_string())
            .bind(session.genre.as_str())
            .bind(&session.user_input)
            .bind(session.architect_iterations as i64)
            .bind(&session.thread_id)
            .bind(&skeleton_json)
            .bind(session.skeleton_approved as i64)
            .bind(&world_json)
            .bind(session.created_at.to_rfc3339())
            .bind(session.updated_at.to_rfc3339())
            .execute(&*self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for SqliteSessionStore {
    #[instrument(skip(self, session), err)]
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM sessions WHERE id = ?1")
            .bind(&session.id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(backend)?;
        if exists.is_some() {
            return Err(StoreError::Conflict(format!(
                "session already exists: {}",
                session.id
            )));
        }
        self.write_session(&session, true).await
    }

    #[instrument(skip(self), err)]
    async fn get(&self, session_id: &str) -> Result<Session, StoreError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::NotFound {
                what: "session",
                id: session_id.to_string(),
            })?;
        Self::row_to_session(&row)
    }

    #[instrument(skip(self, session), err)]
    async fn update(&self, mut session: Session) -> Result<(), StoreError> {
        let existing = self.get(&session.id).await?;
        if !existing.status.can_transition_to(session.status) {
            return Err(StoreError::Conflict(format!(
                "illegal status transition {} -> {} for session {}",
                existing.status, session.status, session.id
            )));
        }
        session.updated_at = Utc::now();
        self.write_session(&session, false).await
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query("DELETE FROM clarifications WHERE session_id = ?1")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                what: "session",
                id: session_id.to_string(),
            });
        }
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    #[instrument(skip(self, record), err)]
    async fn append_clarification(&self, record: ClarificationRecord) -> Result<(), StoreError> {
        // Session must exist; lookups never auto-create.
        self.get(&record.session_id).await?;

        let request_json = serde_json::to_string(&record.request).map_err(serde_err)?;
        let response_json = record
            .response
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(serde_err)?;
        sqlx::query(
            r#"
            INSERT INTO clarifications (id, session_id, request_json, response_json, asked_at, answered_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&record.id)
        .bind(&record.session_id)
        .bind(&request_json)
        .bind(&response_json)
        .bind(record.asked_at.to_rfc3339())
        .bind(record.answered_at.map(|dt| dt.to_rfc3339()))
        .execute(&*self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    #[instrument(skip(self, answers), err)]
    async fn record_response(
        &self,
        clarification_id: &str,
        answers: ClarificationAnswers,
    ) -> Result<(), StoreError> {
        let response_json = serde_json::to_string(&answers).map_err(serde_err)?;
        let result = sqlx::query(
            r#"
            UPDATE clarifications
            SET response_json = ?2, answered_at = ?3
            WHERE id = ?1 AND response_json IS NULL
            "#,
        )
        .bind(clarification_id)
        .bind(&response_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&*self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT 1 FROM clarifications WHERE id = ?1")
                    .bind(clarification_id)
                    .fetch_optional(&*self.pool)
                    .await
                    .map_err(backend)?;
            return Err(if exists.is_some() {
                StoreError::Conflict(format!(
                    "clarification already answered: {clarification_id}"
                ))
            } else {
                StoreError::NotFound {
                    what: "clarification",
                    id: clarification_id.to_string(),
                }
            });
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn pending_clarification(
        &self,
        session_id: &str,
    ) -> Result<Option<ClarificationRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM clarifications
            WHERE session_id = ?1 AND response_json IS NULL
            ORDER BY asked_at DESC
            LIMIT 1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(backend)?;
        row.map(|r| Self::row_to_record(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn clarification_history(
        &self,
        session_id: &str,
    ) -> Result<Vec<ClarificationRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM clarifications
            WHERE session_id = ?1
            ORDER BY asked_at ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(Self::row_to_record).collect()
    }
}
