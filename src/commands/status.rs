//! Status command implementation

use super::open_index;
use crate::builder::{rebuild_status, RebuildStatus};
use crate::config::Config;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub content_db_path: String,
    pub index_table: String,
    pub chunk_size: usize,
    pub rebuild: RebuildStatus,
}

/// Get index and rebuild status
pub async fn cmd_status(config: &Config) -> Result<StatusInfo> {
    info!("Getting status");

    let (index, jobs) = open_index(config).await?;
    let rebuild = rebuild_status(&index, &jobs).await?;

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        content_db_path: config.content_db_path().display().to_string(),
        index_table: config.index.table.clone(),
        chunk_size: config.rebuild.chunk_size,
        rebuild,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 permadex Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Index database: {}", status.db_path);
    println!("Content database: {}", status.content_db_path);
    println!("\nIndex:");
    println!("  Table: {}", status.index_table);
    println!("  Records: {}", status.rebuild.indexed_records);

    println!("\nRebuild:");
    print_rebuild_status(&status.rebuild);
    println!("  Chunk size: {}", status.chunk_size);
}

/// Print the rebuild part of the status
pub fn print_rebuild_status(rebuild: &RebuildStatus) {
    if rebuild.active {
        println!(
            "  State: ⏳ Running ({}/{} chunks done, {} remaining)",
            rebuild.processed_chunks(),
            rebuild.total_chunks,
            rebuild.remaining_chunks
        );
        if let Some(generation) = &rebuild.generation {
            println!("  Generation: {}", generation);
        }
        if let Some(started_at) = &rebuild.started_at {
            println!("  Started: {}", started_at);
        }
    } else {
        println!("  State: ✓ Idle");
    }

    println!("  Last update: {}", rebuild.updated_at);
    if let Some(error) = &rebuild.last_error {
        println!("  Last error: ✗ {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cmd_init;
    use crate::error::Error;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_status_requires_init() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));

        assert!(matches!(
            cmd_status(&config).await,
            Err(Error::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_status_after_init() {
        let tmp = TempDir::new().unwrap();
        cmd_init(Some(tmp.path().to_path_buf()), false).await.unwrap();
        let config = Config::load(&tmp.path().join("config.toml")).unwrap();

        let status = cmd_status(&config).await.unwrap();
        assert!(!status.rebuild.active);
        assert_eq!(status.rebuild.indexed_records, 0);
        assert_eq!(status.chunk_size, 250);
        assert_eq!(status.index_table, "resolver_index");
    }
}
