//! CLI commands implementation

pub mod events;
pub mod init;
pub mod lookup;
pub mod rebuild;
pub mod status;

pub use events::*;
pub use init::*;
pub use lookup::*;
pub use rebuild::*;
pub use status::*;

use crate::builder::{ContinuationTrigger, IndexBuilder};
use crate::config::Config;
use crate::content::SqliteContentSource;
use crate::error::{Error, Result};
use crate::store::{open_stores, IndexStore, JobStateStore};
use std::sync::Arc;

/// Open the index stores, refusing to create a database outside `init`
pub async fn open_index(config: &Config) -> Result<(IndexStore, JobStateStore)> {
    if !config.paths.db_file.exists() {
        return Err(Error::NotInitialized);
    }
    open_stores(config).await
}

/// Builder wired to the configured host content database
pub async fn open_builder(
    config: &Config,
    trigger: Arc<dyn ContinuationTrigger>,
) -> Result<IndexBuilder> {
    let (index, jobs) = open_index(config).await?;
    let source = Arc::new(SqliteContentSource::connect(config));
    Ok(IndexBuilder::from_config(config, index, jobs, source, trigger))
}
