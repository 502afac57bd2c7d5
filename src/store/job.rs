//! Single-slot rebuild job record
//!
//! The record is versioned: every write goes through a compare-and-set on
//! `version`, so two continuations racing on the same step cannot both
//! commit it.

use super::schema::{job_table_name, job_table_sql};
use super::Database;
use crate::content::ContentId;
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use std::collections::VecDeque;
use tracing::debug;

/// Progress of a full rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildJobState {
    pub active: bool,
    pub total_chunks: usize,
    pub pending_chunks: VecDeque<Vec<ContentId>>,
    pub generation: Option<String>,
    pub started_at: Option<String>,
    /// Why the previous rebuild was abandoned, kept until the next one starts
    pub last_error: Option<String>,
}

impl RebuildJobState {
    /// The inactive record
    pub fn idle() -> Self {
        Self::default()
    }

    /// Inactive record remembering why the last attempt was abandoned
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            last_error: Some(error.into()),
            ..Self::default()
        }
    }

    /// A freshly started rebuild with every chunk pending
    pub fn started(chunks: VecDeque<Vec<ContentId>>, generation: String) -> Self {
        Self {
            active: true,
            total_chunks: chunks.len(),
            pending_chunks: chunks,
            generation: Some(generation),
            started_at: Some(Utc::now().to_rfc3339()),
            last_error: None,
        }
    }

    pub fn remaining_chunks(&self) -> usize {
        self.pending_chunks.len()
    }

    fn check(&self) -> Result<()> {
        if !self.active && (self.total_chunks != 0 || !self.pending_chunks.is_empty()) {
            return Err(Error::JobState(format!(
                "inactive job still lists {} of {} chunks",
                self.pending_chunks.len(),
                self.total_chunks
            )));
        }
        if self.pending_chunks.len() > self.total_chunks {
            return Err(Error::JobState(format!(
                "{} chunks pending out of {}",
                self.pending_chunks.len(),
                self.total_chunks
            )));
        }
        Ok(())
    }
}

/// A job record together with the version it was read at
#[derive(Debug, Clone)]
pub struct StoredJob {
    pub version: i64,
    pub updated_at: String,
    pub state: RebuildJobState,
}

#[derive(FromRow)]
struct JobRow {
    version: i64,
    active: bool,
    total_chunks: i64,
    pending_json: String,
    generation: Option<String>,
    started_at: Option<String>,
    updated_at: String,
    last_error: Option<String>,
}

impl TryFrom<JobRow> for StoredJob {
    type Error = Error;

    fn try_from(row: JobRow) -> Result<Self> {
        let pending_chunks: VecDeque<Vec<ContentId>> = serde_json::from_str(&row.pending_json)
            .map_err(|e| Error::JobState(format!("pending chunks: {}", e)))?;

        let state = RebuildJobState {
            active: row.active,
            total_chunks: usize::try_from(row.total_chunks)
                .map_err(|_| Error::JobState(format!("total_chunks = {}", row.total_chunks)))?,
            pending_chunks,
            generation: row.generation,
            started_at: row.started_at,
            last_error: row.last_error,
        };
        state.check()?;

        Ok(StoredJob {
            version: row.version,
            updated_at: row.updated_at,
            state,
        })
    }
}

/// Rebuild job table handle
#[derive(Clone)]
pub struct JobStateStore {
    db: Database,
    table: String,
}

impl JobStateStore {
    /// Job store belonging to the index table `index_table`
    pub fn new(db: &Database, index_table: &str) -> Self {
        Self {
            db: db.clone(),
            table: job_table_name(index_table),
        }
    }

    /// Create the job table and seed the idle record
    pub async fn init_schema(&self) -> Result<()> {
        debug!(table = %self.table, "Initializing job schema");
        let sql = job_table_sql(&self.table);
        sqlx::query(&sql).execute(self.db.pool()).await?;
        Ok(())
    }

    /// Read the current record
    pub async fn load(&self) -> Result<StoredJob> {
        let mut conn = self.db.pool().acquire().await?;
        self.load_in(&mut conn).await
    }

    /// Read the current record on an existing connection
    pub async fn load_in(&self, conn: &mut SqliteConnection) -> Result<StoredJob> {
        let sql = format!("SELECT * FROM {} WHERE slot = 0", self.table);
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(Error::NotInitialized)?;
        row.try_into()
    }

    /// Write `state` if the record is still at `expected_version`.
    ///
    /// Returns `false` when another writer got there first; nothing is
    /// written in that case.
    pub async fn compare_and_set(
        &self,
        conn: &mut SqliteConnection,
        expected_version: i64,
        state: &RebuildJobState,
    ) -> Result<bool> {
        state.check()?;
        let pending_json = serde_json::to_string(&state.pending_chunks)?;

        let sql = format!(
            r#"
            UPDATE {} SET
                version = version + 1,
                active = ?,
                total_chunks = ?,
                pending_json = ?,
                generation = ?,
                started_at = ?,
                updated_at = ?,
                last_error = ?
            WHERE slot = 0 AND version = ?
            "#,
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(state.active)
            .bind(state.total_chunks as i64)
            .bind(pending_json)
            .bind(&state.generation)
            .bind(&state.started_at)
            .bind(Utc::now().to_rfc3339())
            .bind(&state.last_error)
            .bind(expected_version)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// [`Self::compare_and_set`] on a pooled connection
    pub async fn save(&self, expected_version: i64, state: &RebuildJobState) -> Result<bool> {
        let mut conn = self.db.pool().acquire().await?;
        self.compare_and_set(&mut conn, expected_version, state)
            .await
    }
}
