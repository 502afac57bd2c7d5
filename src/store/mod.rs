//! Durable storage using SQLite
//!
//! This module owns the index database:
//! - The active index table and its shadow generation ([`IndexStore`])
//! - The single-slot rebuild job record ([`JobStateStore`])
//!
//! Both stores share one connection pool so a rebuild step can commit shadow
//! writes and job progress in the same transaction.

mod index;
mod job;
mod schema;

pub use index::*;
pub use job::*;
pub use schema::*;

use crate::config::Config;
use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Index database handle
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the index database named by the config
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file).await
    }

    /// Open (creating if needed) the database at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Begin a transaction on the shared pool
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Connect to the configured database and make sure both stores' tables exist
pub async fn open_stores(config: &Config) -> Result<(IndexStore, JobStateStore)> {
    let db = Database::connect(config).await?;
    let index = IndexStore::new(&db, &config.index);
    let jobs = JobStateStore::new(&db, &config.index.table);

    index.init_schema().await?;
    jobs.init_schema().await?;

    Ok((index, jobs))
}
