//! Continuation scheduling
//!
//! A rebuild never runs as one long call. After each chunk the builder asks a
//! [`ContinuationTrigger`] to run the next step later; the trigger returns at
//! once and never reports the step's outcome back to the caller.

use super::{IndexBuilder, StepOutcome};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Schedules `continue_rebuild` to run independently of the caller.
///
/// Scheduling may happen any number of times for the same step; the builder
/// re-reads the job record on every step, so extra wake-ups are harmless.
pub trait ContinuationTrigger: Send + Sync {
    fn schedule(&self);
}

/// Trigger for continuations driven from outside the process (cron, the
/// `continue` command, tests that simulate restarts)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTrigger;

impl ContinuationTrigger for NoopTrigger {
    fn schedule(&self) {
        debug!("Continuation left to an external scheduler");
    }
}

/// Trigger feeding a [`ContinuationWorker`] through a channel
#[derive(Debug, Clone)]
pub struct ChannelTrigger {
    tx: mpsc::UnboundedSender<()>,
}

/// Receiving half handed to [`ContinuationWorker::spawn`]
#[derive(Debug)]
pub struct ContinuationReceiver(mpsc::UnboundedReceiver<()>);

impl ChannelTrigger {
    pub fn new() -> (Self, ContinuationReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ContinuationReceiver(rx))
    }
}

impl ContinuationTrigger for ChannelTrigger {
    fn schedule(&self) {
        if self.tx.send(()).is_err() {
            debug!("Continuation worker is gone; wake-up dropped");
        }
    }
}

/// What the worker has done so far
#[derive(Debug, Clone, Default)]
pub struct WorkerReport {
    pub steps: u64,
    pub last_step: Option<StepOutcome>,
    pub last_error: Option<String>,
}

/// Background task running scheduled continuations one at a time
pub struct ContinuationWorker {
    handle: JoinHandle<()>,
    report: watch::Receiver<WorkerReport>,
}

impl ContinuationWorker {
    /// Start the worker. It holds only a weak reference to the builder and
    /// stops once the builder is dropped.
    pub fn spawn(builder: &Arc<IndexBuilder>, rx: ContinuationReceiver, delay: Duration) -> Self {
        let (report_tx, report) = watch::channel(WorkerReport::default());
        let handle = tokio::spawn(run_worker(Arc::downgrade(builder), rx, delay, report_tx));
        Self { handle, report }
    }

    /// Watch step outcomes as they happen
    pub fn subscribe(&self) -> watch::Receiver<WorkerReport> {
        self.report.clone()
    }

    /// Stop processing wake-ups
    pub fn shutdown(self) {
        self.handle.abort();
    }
}

async fn run_worker(
    builder: Weak<IndexBuilder>,
    mut rx: ContinuationReceiver,
    delay: Duration,
    report: watch::Sender<WorkerReport>,
) {
    while rx.0.recv().await.is_some() {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let Some(builder) = builder.upgrade() else {
            break;
        };

        let result = builder.continue_rebuild().await;
        drop(builder);

        match &result {
            Ok(step) => debug!(?step, "Scheduled continuation finished"),
            Err(e) => error!(error = %e, "Scheduled continuation failed"),
        }

        report.send_modify(|r| {
            r.steps += 1;
            match result {
                Ok(step) => {
                    r.last_step = Some(step);
                    r.last_error = None;
                }
                Err(e) => r.last_error = Some(e.to_string()),
            }
        });
    }

    info!("Continuation worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schedule_after_worker_exit_is_silent() {
        let (trigger, rx) = ChannelTrigger::new();
        drop(rx);
        trigger.schedule();
        trigger.schedule();
    }

    #[tokio::test]
    async fn test_channel_delivers_every_wake_up() {
        let (trigger, mut rx) = ChannelTrigger::new();
        trigger.schedule();
        trigger.schedule();

        assert!(rx.0.recv().await.is_some());
        assert!(rx.0.recv().await.is_some());
        assert!(rx.0.try_recv().is_err());
    }
}
