//! Rebuild, continue and reset commands

use super::open_builder;
use crate::builder::{
    ChannelTrigger, ContinuationWorker, IndexBuilder, NoopTrigger, RebuildStatus, StartOutcome,
    StepOutcome,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::progress::chunk_progress_bar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Rebuild options
#[derive(Debug, Clone, Default)]
pub struct RebuildOptions {
    /// Run only the first chunk and leave the rest to `continue`
    pub detach: bool,
}

/// Rebuild result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildReport {
    pub started: StartOutcome,
    pub last_step: StepOutcome,
    pub status: RebuildStatus,
}

/// Start a full rebuild and, unless detached, drive it to the swap
pub async fn cmd_rebuild(config: &Config, options: RebuildOptions) -> Result<RebuildReport> {
    if options.detach {
        let builder = open_builder(config, Arc::new(NoopTrigger)).await?;
        let started = builder.start_rebuild().await?;
        let status = builder.status().await?;
        return Ok(RebuildReport {
            last_step: started.step(),
            started,
            status,
        });
    }

    let (trigger, rx) = ChannelTrigger::new();
    let builder = Arc::new(open_builder(config, Arc::new(trigger)).await?);
    let delay = Duration::from_millis(config.rebuild.continuation_delay_ms);
    let worker = ContinuationWorker::spawn(&builder, rx, delay);
    let mut report = worker.subscribe();

    let started = builder.start_rebuild().await?;
    let mut last_step = started.step();

    let status = builder.status().await?;
    let total = status.total_chunks;
    let pb = if last_step.is_done() {
        None
    } else {
        chunk_progress_bar(total, status.processed_chunks())
    };

    while let StepOutcome::Advanced { remaining } = last_step {
        if let Some(pb) = &pb {
            pb.set_position(total.saturating_sub(remaining) as u64);
        }

        if report.changed().await.is_err() {
            warn!("Continuation worker stopped before the rebuild finished");
            break;
        }
        let current = report.borrow_and_update().clone();

        if let Some(error) = current.last_error {
            if let Some(pb) = &pb {
                pb.abandon_with_message("failed");
            }
            worker.shutdown();
            return Err(step_failure(&builder, error).await);
        }
        if let Some(step) = current.last_step {
            last_step = step;
        }
    }

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }
    worker.shutdown();

    if last_step == StepOutcome::Raced {
        info!("Another process is driving this rebuild");
    }

    let status = builder.status().await?;
    Ok(RebuildReport {
        started,
        last_step,
        status,
    })
}

/// Turn a worker's failure report back into a typed error. A swap failure
/// leaves the slot idle with the cause recorded.
async fn step_failure(builder: &IndexBuilder, reported: String) -> Error {
    match builder.status().await {
        Ok(status) if !status.active => match status.last_error {
            Some(recorded) => Error::SwapFailure(recorded),
            None => Error::Other(reported),
        },
        Ok(_) => Error::Other(format!(
            "Rebuild step failed: {}; run 'permadex continue' to retry",
            reported
        )),
        Err(e) => e,
    }
}

/// Continue result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinueReport {
    pub step: StepOutcome,
    pub status: RebuildStatus,
}

/// Run one continuation step
pub async fn cmd_continue(config: &Config) -> Result<ContinueReport> {
    let builder = open_builder(config, Arc::new(NoopTrigger)).await?;
    let step = builder.continue_rebuild().await?;
    let status = builder.status().await?;
    Ok(ContinueReport { step, status })
}

/// Reset result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetReport {
    /// Whether a rebuild was in progress
    pub abandoned: bool,
    pub status: RebuildStatus,
}

/// Abandon any in-progress rebuild
pub async fn cmd_reset(config: &Config) -> Result<ResetReport> {
    let builder = open_builder(config, Arc::new(NoopTrigger)).await?;
    let abandoned = builder.reset_rebuild().await?;
    let status = builder.status().await?;
    Ok(ResetReport { abandoned, status })
}

pub fn print_step(step: &StepOutcome) {
    match step {
        StepOutcome::Idle => println!("No rebuild in progress"),
        StepOutcome::Advanced { remaining } => {
            println!("⏳ Chunk indexed, {} remaining", remaining)
        }
        StepOutcome::Swapped { records } => {
            println!("✓ Rebuild complete, {} records live", records)
        }
        StepOutcome::Raced => println!("Step already handled by another continuation"),
    }
}

pub fn print_rebuild_report(report: &RebuildReport) {
    match &report.started {
        StartOutcome::Started {
            generation,
            total_chunks,
            ..
        } => println!(
            "Started rebuild {} ({} chunks)",
            generation, total_chunks
        ),
        StartOutcome::Resumed { .. } => println!("Resumed the rebuild already in progress"),
    }
    print_step(&report.last_step);

    if report.status.active {
        println!(
            "  {}/{} chunks done; run 'permadex continue' to advance",
            report.status.processed_chunks(),
            report.status.total_chunks
        );
    }
}

pub fn print_continue(report: &ContinueReport) {
    print_step(&report.step);
}

pub fn print_reset(report: &ResetReport) {
    if report.abandoned {
        println!("✓ Rebuild abandoned; the active index is unchanged");
    } else {
        println!("No rebuild was in progress");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{cmd_init, cmd_status};
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use tempfile::TempDir;

    async fn setup(items: i64, chunk_size: usize) -> (Config, TempDir) {
        let tmp = TempDir::new().unwrap();
        cmd_init(Some(tmp.path().to_path_buf()), false).await.unwrap();
        let mut config = Config::load(&tmp.path().join("config.toml")).unwrap();
        config.content.db_path = Some(tmp.path().join("content.db"));
        config.rebuild.chunk_size = chunk_size;

        let options = SqliteConnectOptions::new()
            .filename(tmp.path().join("content.db"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await.unwrap();
        sqlx::query(
            "CREATE TABLE content (id INTEGER PRIMARY KEY, content_type TEXT NOT NULL, \
             status TEXT NOT NULL, locator TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();
        for id in 1..=items {
            sqlx::query("INSERT INTO content VALUES (?, 'post', 'publish', ?)")
                .bind(id)
                .bind(format!("https://site.test/{}", id))
                .execute(&pool)
                .await
                .unwrap();
        }
        pool.close().await;

        (config, tmp)
    }

    #[tokio::test]
    async fn test_rebuild_runs_to_completion() {
        let (config, _tmp) = setup(9, 2).await;

        let report = cmd_rebuild(&config, RebuildOptions::default()).await.unwrap();
        assert_eq!(report.last_step, StepOutcome::Swapped { records: 9 });
        assert!(!report.status.active);
        assert_eq!(report.status.indexed_records, 9);
    }

    #[tokio::test]
    async fn test_rebuild_reports_swap_failure() {
        let (config, _tmp) = setup(5, 2).await;
        let (index, _jobs) = crate::commands::open_index(&config).await.unwrap();
        // A table squatting on the retired name makes the final rename fail
        sqlx::query("CREATE TABLE resolver_index_retired (x INTEGER)")
            .execute(index.database().pool())
            .await
            .unwrap();
        index.database().close().await;

        let result = cmd_rebuild(&config, RebuildOptions::default()).await;
        assert!(matches!(result, Err(Error::SwapFailure(_))));

        let status = cmd_status(&config).await.unwrap();
        assert!(!status.rebuild.active);
        assert!(status.rebuild.last_error.is_some());
        assert_eq!(status.rebuild.indexed_records, 0);
    }

    #[tokio::test]
    async fn test_detached_rebuild_is_continued_externally() {
        let (config, _tmp) = setup(5, 2).await;

        let report = cmd_rebuild(&config, RebuildOptions { detach: true })
            .await
            .unwrap();
        assert_eq!(report.last_step, StepOutcome::Advanced { remaining: 2 });
        assert!(report.status.active);
        assert_eq!(report.status.indexed_records, 0);

        assert_eq!(
            cmd_continue(&config).await.unwrap().step,
            StepOutcome::Advanced { remaining: 1 }
        );
        assert_eq!(
            cmd_continue(&config).await.unwrap().step,
            StepOutcome::Swapped { records: 5 }
        );
        assert_eq!(cmd_continue(&config).await.unwrap().step, StepOutcome::Idle);

        let status = cmd_status(&config).await.unwrap();
        assert_eq!(status.rebuild.indexed_records, 5);
    }

    #[tokio::test]
    async fn test_reset_abandons_detached_rebuild() {
        let (config, _tmp) = setup(5, 1).await;

        cmd_rebuild(&config, RebuildOptions { detach: true })
            .await
            .unwrap();
        let report = cmd_reset(&config).await.unwrap();
        assert!(report.abandoned);
        assert!(!report.status.active);
        assert_eq!(report.status.indexed_records, 0);

        assert!(!cmd_reset(&config).await.unwrap().abandoned);
    }
}
