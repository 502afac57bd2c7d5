//! Index builder
//!
//! Keeps the index in step with content in two ways:
//! - Incremental hooks (`on_content_changed`, `on_content_deleted`) called by
//!   the host whenever a single item changes.
//! - A full rebuild that fills a shadow table chunk by chunk and swaps it in
//!   when the queue is exhausted.
//!
//! # Rebuild state machine
//!
//! ```text
//! Idle --start_rebuild--> Starting --> Running --(queue empty)--> Swapping --> Idle
//!                                       ^   |
//!                                       +---+ continue_rebuild (one chunk per call)
//! ```
//!
//! All progress lives in the job record, never in memory: any process can run
//! the next step, and a crash simply leaves the record where the last
//! committed step put it.

mod trigger;

pub use trigger::*;

use crate::config::Config;
use crate::content::{ContentId, ContentItem, ContentSource};
use crate::error::{Error, Result};
use crate::store::{IndexStore, IndexTable, JobStateStore, RebuildJobState, StoredJob};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Why an incremental change left the index alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The content type is not in the indexable set
    NotIndexable,
    /// The content is gone or not published
    NotFound,
}

/// Result of `on_content_changed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOutcome {
    Indexed,
    Skipped(SkipReason),
    /// The identifier was malformed
    Rejected,
    /// The store refused the write; already logged
    Failed,
}

/// Result of `on_content_deleted`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Removed,
    /// Nothing was indexed under that id
    Absent,
    Rejected,
    Failed,
}

/// Result of one `continue_rebuild` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepOutcome {
    /// No rebuild in progress
    Idle,
    /// One chunk committed, more pending
    Advanced { remaining: usize },
    /// The rebuilt index is live
    Swapped { records: u64 },
    /// Another continuation committed this step first
    Raced,
}

impl StepOutcome {
    /// Nothing left for this rebuild to do
    pub fn is_done(&self) -> bool {
        matches!(self, StepOutcome::Idle | StepOutcome::Swapped { .. })
    }
}

/// Result of `start_rebuild`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    /// A new rebuild was accepted and its first step run
    Started {
        generation: String,
        total_chunks: usize,
        step: StepOutcome,
    },
    /// A rebuild was already running; it was continued instead
    Resumed { step: StepOutcome },
}

impl StartOutcome {
    pub fn step(&self) -> StepOutcome {
        match self {
            StartOutcome::Started { step, .. } | StartOutcome::Resumed { step } => *step,
        }
    }
}

/// Snapshot of rebuild progress as last persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildStatus {
    pub active: bool,
    pub total_chunks: usize,
    pub remaining_chunks: usize,
    pub generation: Option<String>,
    pub started_at: Option<String>,
    pub updated_at: String,
    pub last_error: Option<String>,
    pub indexed_records: u64,
}

impl RebuildStatus {
    pub fn processed_chunks(&self) -> usize {
        self.total_chunks - self.remaining_chunks
    }
}

/// Read rebuild status straight from the stores
pub async fn rebuild_status(index: &IndexStore, jobs: &JobStateStore) -> Result<RebuildStatus> {
    let job = jobs.load().await?;
    let indexed_records = index.count().await?;

    Ok(RebuildStatus {
        active: job.state.active,
        total_chunks: job.state.total_chunks,
        remaining_chunks: job.state.remaining_chunks(),
        generation: job.state.generation,
        started_at: job.state.started_at,
        updated_at: job.updated_at,
        last_error: job.state.last_error,
        indexed_records,
    })
}

/// Orchestrates incremental updates and full rebuilds
pub struct IndexBuilder {
    index: IndexStore,
    jobs: JobStateStore,
    source: Arc<dyn ContentSource>,
    trigger: Arc<dyn ContinuationTrigger>,
    chunk_size: usize,
}

impl IndexBuilder {
    pub fn new(
        index: IndexStore,
        jobs: JobStateStore,
        source: Arc<dyn ContentSource>,
        trigger: Arc<dyn ContinuationTrigger>,
        chunk_size: usize,
    ) -> Self {
        Self {
            index,
            jobs,
            source,
            trigger,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Builder using the configured chunk size
    pub fn from_config(
        config: &Config,
        index: IndexStore,
        jobs: JobStateStore,
        source: Arc<dyn ContentSource>,
        trigger: Arc<dyn ContinuationTrigger>,
    ) -> Self {
        Self::new(index, jobs, source, trigger, config.rebuild.chunk_size)
    }

    pub fn index(&self) -> &IndexStore {
        &self.index
    }

    pub fn jobs(&self) -> &JobStateStore {
        &self.jobs
    }

    // ===== Incremental path =====

    /// Content `raw_id` was created or edited.
    ///
    /// Unpublished or non-indexable content is ignored, never removed: only
    /// deletion events remove entries. Store errors are logged, not raised,
    /// so the host's save does not fail because of indexing.
    pub async fn on_content_changed(&self, raw_id: i64) -> ChangeOutcome {
        let id = match ContentId::new(raw_id) {
            Ok(id) => id,
            Err(e) => {
                debug!(error = %e, "Ignoring change event");
                return ChangeOutcome::Rejected;
            }
        };

        let item = match self.resolve_indexable(id).await {
            Ok(item) => item,
            Err(Error::NotIndexable(content_type)) => {
                debug!(id = %id, content_type = %content_type, "Content type not indexable");
                return ChangeOutcome::Skipped(SkipReason::NotIndexable);
            }
            Err(Error::ContentNotFound(_)) => {
                debug!(id = %id, "Content does not resolve; leaving index as is");
                return ChangeOutcome::Skipped(SkipReason::NotFound);
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Could not resolve changed content");
                return ChangeOutcome::Failed;
            }
        };

        if let Err(e) = self.index.upsert(id, &item.locator).await {
            error!(id = %id, error = %e, "Failed to update index entry");
            return ChangeOutcome::Failed;
        }
        debug!(id = %id, locator = %item.locator, "Indexed content");

        if self.rebuild_active().await {
            if let Err(e) = self
                .index
                .upsert_into(IndexTable::Shadow, id, &item.locator)
                .await
            {
                warn!(id = %id, error = %e, "Could not mirror change into shadow index");
            }
        }

        ChangeOutcome::Indexed
    }

    /// Content `raw_id` was deleted. Malformed ids are ignored.
    pub async fn on_content_deleted(&self, raw_id: i64) -> DeleteOutcome {
        match self.delete_link_from_index(raw_id).await {
            Ok(true) => DeleteOutcome::Removed,
            Ok(false) => DeleteOutcome::Absent,
            Err(Error::MalformedIdentifier(raw)) => {
                debug!(id = %raw, "Ignoring delete event for malformed id");
                DeleteOutcome::Rejected
            }
            Err(e) => {
                error!(id = raw_id, error = %e, "Failed to remove index entry");
                DeleteOutcome::Failed
            }
        }
    }

    /// Remove one entry by hand. Returns whether anything was removed.
    pub async fn delete_link_from_index(&self, raw_id: i64) -> Result<bool> {
        let id = ContentId::new(raw_id)?;
        let removed = self.index.delete(id).await?;

        if self.rebuild_active().await {
            if let Err(e) = self.index.delete_from(IndexTable::Shadow, id).await {
                warn!(id = %id, error = %e, "Could not mirror delete into shadow index");
            }
        }

        if removed {
            info!(id = %id, "Removed index entry");
        }
        Ok(removed)
    }

    async fn resolve_indexable(&self, id: ContentId) -> Result<ContentItem> {
        let item = self
            .source
            .resolve(id)
            .await?
            .ok_or(Error::ContentNotFound(id.get()))?;

        let types = self.source.indexable_types().await?;
        if !types.contains(&item.content_type) {
            return Err(Error::NotIndexable(item.content_type));
        }

        Ok(item)
    }

    async fn rebuild_active(&self) -> bool {
        match self.jobs.load().await {
            Ok(job) => job.state.active,
            Err(e) => {
                warn!(error = %e, "Could not read rebuild state");
                false
            }
        }
    }

    // ===== Full rebuild =====

    /// Start a full rebuild, or continue the one already running.
    ///
    /// Enumerates every indexable id, persists the chunk queue together with
    /// a fresh shadow table, then runs the first step in the caller.
    pub async fn start_rebuild(&self) -> Result<StartOutcome> {
        let current = self.jobs.load().await?;
        if current.state.active {
            info!(
                remaining = current.state.remaining_chunks(),
                "Rebuild already in progress; continuing it"
            );
            let step = self.continue_rebuild().await?;
            return Ok(StartOutcome::Resumed { step });
        }

        let types = self.source.indexable_types().await?;
        let mut ids = self.source.list_indexable_ids(&types).await?;
        ids.sort_unstable();
        ids.dedup();

        let chunks: VecDeque<Vec<ContentId>> =
            ids.chunks(self.chunk_size).map(<[ContentId]>::to_vec).collect();
        let generation = Uuid::new_v4().to_string();
        let state = RebuildJobState::started(chunks, generation.clone());
        let total_chunks = state.total_chunks;

        // Claiming the slot and creating the shadow commit together, so a
        // concurrent start can never wipe a shadow that is already in use.
        let mut tx = self.index.database().begin().await?;
        self.index.create_shadow_in(&mut tx).await?;
        if !self
            .jobs
            .compare_and_set(&mut tx, current.version, &state)
            .await?
        {
            tx.rollback().await?;
            info!("Another rebuild claimed the job slot; continuing it");
            let step = self.continue_rebuild().await?;
            return Ok(StartOutcome::Resumed { step });
        }
        tx.commit().await?;

        info!(
            generation = %generation,
            items = ids.len(),
            chunks = total_chunks,
            chunk_size = self.chunk_size,
            types = ?types,
            "Started index rebuild"
        );

        let step = self.continue_rebuild().await?;
        Ok(StartOutcome::Started {
            generation,
            total_chunks,
            step,
        })
    }

    /// Process the next chunk of the running rebuild.
    ///
    /// Safe to call any number of times, from any process: with no rebuild
    /// running it returns [`StepOutcome::Idle`] and touches nothing.
    pub async fn continue_rebuild(&self) -> Result<StepOutcome> {
        let job = self.jobs.load().await?;
        if !job.state.active {
            debug!("No rebuild in progress");
            return Ok(StepOutcome::Idle);
        }

        let Some(chunk) = job.state.pending_chunks.front().cloned() else {
            // The last chunk committed but the swap never ran
            return self.finish_rebuild(job).await;
        };

        let mut resolved = Vec::with_capacity(chunk.len());
        for id in &chunk {
            match self.source.resolve_locator(*id).await {
                Ok(Some(locator)) => resolved.push((*id, locator)),
                Ok(None) => debug!(id = %id, "Content vanished since enumeration; skipping"),
                Err(e) => warn!(id = %id, error = %e, "Could not resolve content; skipping"),
            }
        }

        let mut next = job.state.clone();
        next.pending_chunks.pop_front();

        let mut tx = self.index.database().begin().await?;
        let mut written = 0usize;
        for (id, locator) in &resolved {
            match self
                .index
                .upsert_in(&mut tx, IndexTable::Shadow, *id, locator)
                .await
            {
                Ok(_) => written += 1,
                Err(e) => warn!(id = %id, error = %e, "Failed to index content; skipping"),
            }
        }

        if !self.jobs.compare_and_set(&mut tx, job.version, &next).await? {
            tx.rollback().await?;
            debug!("Chunk already committed by another continuation");
            return Ok(StepOutcome::Raced);
        }
        tx.commit().await?;

        let remaining = next.remaining_chunks();
        info!(
            chunk = next.total_chunks - remaining,
            of = next.total_chunks,
            written,
            skipped = chunk.len() - written,
            "Indexed rebuild chunk"
        );

        if remaining == 0 {
            let committed = StoredJob {
                version: job.version + 1,
                updated_at: job.updated_at,
                state: next,
            };
            return self.finish_rebuild(committed).await;
        }

        self.trigger.schedule();
        Ok(StepOutcome::Advanced { remaining })
    }

    /// Swap the shadow in and return the slot to idle, in one transaction
    async fn finish_rebuild(&self, job: StoredJob) -> Result<StepOutcome> {
        let mut tx = self.index.database().begin().await?;
        if !self
            .jobs
            .compare_and_set(&mut tx, job.version, &RebuildJobState::idle())
            .await?
        {
            tx.rollback().await?;
            debug!("Swap already handled by another continuation");
            return Ok(StepOutcome::Raced);
        }

        if let Err(e) = self.index.swap_in(&mut tx).await {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback after failed swap did not complete");
            }
            return Err(self.abort_rebuild(job.version, e).await);
        }
        if let Err(e) = tx.commit().await {
            return Err(self
                .abort_rebuild(job.version, Error::SwapFailure(e.to_string()))
                .await);
        }

        let records = self.index.count().await?;
        info!(
            generation = job.state.generation.as_deref().unwrap_or_default(),
            records, "Rebuilt index is live"
        );
        Ok(StepOutcome::Swapped { records })
    }

    /// Abandon a rebuild whose swap failed. The active table was never
    /// touched; the error is recorded in the job slot for operators.
    async fn abort_rebuild(&self, version: i64, cause: Error) -> Error {
        let message = match cause {
            Error::SwapFailure(message) => message,
            other => other.to_string(),
        };
        error!(error = %message, "Swap failed; abandoning rebuild, active index left unchanged");

        match self
            .jobs
            .save(version, &RebuildJobState::failed(message.clone()))
            .await
        {
            Ok(true) => {
                if let Err(e) = self.index.drop_shadow().await {
                    warn!(error = %e, "Could not drop shadow index");
                }
            }
            Ok(false) => warn!("Rebuild state changed while aborting; leaving it as is"),
            Err(e) => warn!(error = %e, "Could not record failed rebuild"),
        }

        Error::SwapFailure(message)
    }

    /// Abandon any rebuild in progress. Returns whether one was running.
    pub async fn reset_rebuild(&self) -> Result<bool> {
        let job = self.jobs.load().await?;
        self.reset_from(job).await
    }

    /// Reset the slot as read at `job`. The shadow is dropped in the same
    /// transaction as the version-guarded job write, so a rebuild started
    /// after `job` was read keeps its shadow.
    async fn reset_from(&self, job: StoredJob) -> Result<bool> {
        let mut tx = self.index.database().begin().await?;
        self.index.drop_shadow_in(&mut tx).await?;
        if !self
            .jobs
            .compare_and_set(&mut tx, job.version, &RebuildJobState::idle())
            .await?
        {
            tx.rollback().await?;
            return Err(Error::JobConflict(
                "the rebuild slot changed during reset; nothing was dropped".to_string(),
            ));
        }
        tx.commit().await?;

        if job.state.active {
            info!(
                generation = job.state.generation.as_deref().unwrap_or_default(),
                remaining = job.state.remaining_chunks(),
                "Rebuild abandoned"
            );
        }
        Ok(job.state.active)
    }

    /// Current rebuild progress
    pub async fn status(&self) -> Result<RebuildStatus> {
        rebuild_status(&self.index, &self.jobs).await
    }
}
