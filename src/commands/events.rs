//! Content event hooks: changed, deleted, remove

use super::open_builder;
use crate::builder::{ChangeOutcome, DeleteOutcome, NoopTrigger};
use crate::config::Config;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Event hook result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventReport {
    Changed { id: i64, outcome: ChangeOutcome },
    Deleted { id: i64, outcome: DeleteOutcome },
    Removed { id: i64, removed: bool },
}

/// Content `id` was created or edited
pub async fn cmd_changed(config: &Config, id: i64) -> Result<EventReport> {
    let builder = open_builder(config, Arc::new(NoopTrigger)).await?;
    let outcome = builder.on_content_changed(id).await;
    Ok(EventReport::Changed { id, outcome })
}

/// Content `id` was deleted
pub async fn cmd_deleted(config: &Config, id: i64) -> Result<EventReport> {
    let builder = open_builder(config, Arc::new(NoopTrigger)).await?;
    let outcome = builder.on_content_deleted(id).await;
    Ok(EventReport::Deleted { id, outcome })
}

/// Remove the record for `id` by hand
pub async fn cmd_remove(config: &Config, id: i64) -> Result<EventReport> {
    let builder = open_builder(config, Arc::new(NoopTrigger)).await?;
    let removed = builder.delete_link_from_index(id).await?;
    Ok(EventReport::Removed { id, removed })
}

pub fn print_event(report: &EventReport) {
    match report {
        EventReport::Changed { id, outcome } => match outcome {
            ChangeOutcome::Indexed => println!("✓ Indexed {}", id),
            ChangeOutcome::Skipped(reason) => println!("Skipped {} ({:?})", id, reason),
            ChangeOutcome::Rejected => println!("✗ {} is not a valid content id", id),
            ChangeOutcome::Failed => println!("✗ Could not index {}; see log", id),
        },
        EventReport::Deleted { id, outcome } => match outcome {
            DeleteOutcome::Removed => println!("✓ Removed {}", id),
            DeleteOutcome::Absent => println!("{} was not indexed", id),
            DeleteOutcome::Rejected => println!("✗ {} is not a valid content id", id),
            DeleteOutcome::Failed => println!("✗ Could not remove {}; see log", id),
        },
        EventReport::Removed { id, removed } => {
            if *removed {
                println!("✓ Removed {}", id);
            } else {
                println!("{} was not indexed", id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SkipReason;
    use crate::commands::cmd_init;
    use crate::error::Error;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use tempfile::TempDir;

    async fn setup() -> (Config, TempDir) {
        let tmp = TempDir::new().unwrap();
        cmd_init(Some(tmp.path().to_path_buf()), false).await.unwrap();
        let mut config = Config::load(&tmp.path().join("config.toml")).unwrap();
        config.content.db_path = Some(tmp.path().join("content.db"));

        let options = SqliteConnectOptions::new()
            .filename(tmp.path().join("content.db"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await.unwrap();
        sqlx::query(
            r#"
            CREATE TABLE content (
                id INTEGER PRIMARY KEY,
                content_type TEXT NOT NULL,
                status TEXT NOT NULL,
                locator TEXT
            );
            INSERT INTO content VALUES
                (1, 'post', 'publish', 'https://site.test/hello'),
                (2, 'attachment', 'publish', 'https://site.test/img.png');
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;

        (config, tmp)
    }

    #[tokio::test]
    async fn test_event_hooks() {
        let (config, _tmp) = setup().await;

        assert!(matches!(
            cmd_changed(&config, 1).await.unwrap(),
            EventReport::Changed {
                outcome: ChangeOutcome::Indexed,
                ..
            }
        ));
        assert!(matches!(
            cmd_changed(&config, 2).await.unwrap(),
            EventReport::Changed {
                outcome: ChangeOutcome::Skipped(SkipReason::NotIndexable),
                ..
            }
        ));
        assert!(matches!(
            cmd_deleted(&config, 1).await.unwrap(),
            EventReport::Deleted {
                outcome: DeleteOutcome::Removed,
                ..
            }
        ));
        assert!(matches!(
            cmd_remove(&config, 1).await.unwrap(),
            EventReport::Removed { removed: false, .. }
        ));
        assert!(matches!(
            cmd_remove(&config, -1).await,
            Err(Error::MalformedIdentifier(_))
        ));
    }
}
