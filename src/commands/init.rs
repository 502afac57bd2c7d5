//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::open_stores;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Where `init` put things
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitInfo {
    pub config_path: String,
    pub db_path: String,
    pub content_db_path: String,
    pub index_table: String,
}

/// Write a default config and create the index schema
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<InitInfo> {
    let mut config = Config::default();
    config.init_paths(base_dir);

    if config.paths.config_file.exists() && !force {
        return Err(Error::AlreadyInitialized(
            config.paths.config_file.display().to_string(),
        ));
    }

    config.save()?;

    let (index, _jobs) = open_stores(&config).await?;
    info!("Created database at {:?}", config.paths.db_file);
    index.database().close().await;

    Ok(InitInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        content_db_path: config.content_db_path().display().to_string(),
        index_table: config.index.table.clone(),
    })
}

pub fn print_init(info: &InitInfo) {
    println!("✓ permadex initialized");
    println!("  Config: {}", info.config_path);
    println!("  Index database: {}", info.db_path);
    println!("  Index table: {}", info.index_table);
    println!("\nNext steps:");
    println!("  1. Point [content].db_path at the host content database");
    println!("     (currently {})", info.content_db_path);
    println!("  2. Build the index: permadex rebuild");
}
