use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use uuid::Uuid;

use crate::services::job_service::{DispatchOutcome, JobService};

/// Producer side of the in-memory dispatch queue.
///
/// Entries are job ids only; the worker re-reads each job before acting, so
/// a stale or duplicated entry is harmless.
#[derive(Clone)]
pub struct DispatchQueue {
    sender: mpsc::UnboundedSender<Uuid>,
}

impl DispatchQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Uuid>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn enqueue(&self, job_id: Uuid) -> Result<(), QueueError> {
        self.sender.send(job_id).map_err(|_| QueueError::Closed)?;
        metrics::gauge!("dispatch_queue_depth").increment(1.0);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

enum Tick {
    Job(Uuid),
    Idle,
    Closed,
    Shutdown,
    ShutdownDropped,
}

/// Sole consumer of the dispatch queue.
///
/// Drains job ids and dispatches them. When no entry arrives within the idle
/// timeout it runs a reconciliation sweep instead; under sustained load a
/// sweep still runs once per idle-timeout period.
pub struct DispatchWorker {
    service: Arc<JobService>,
    receiver: mpsc::UnboundedReceiver<Uuid>,
    idle_timeout: Duration,
}

impl DispatchWorker {
    pub fn new(
        service: Arc<JobService>,
        receiver: mpsc::UnboundedReceiver<Uuid>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            service,
            receiver,
            idle_timeout,
        }
    }

    /// Run until `shutdown` flips to true, its sender drops, or every queue
    /// producer is gone.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(idle_timeout_ms = self.idle_timeout.as_millis() as u64, "Dispatch worker started");
        let mut last_sweep = Instant::now();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let tick = tokio::select! {
                changed = shutdown.changed() => match changed {
                    Ok(()) => Tick::Shutdown,
                    Err(_) => Tick::ShutdownDropped,
                },
                next = tokio::time::timeout(self.idle_timeout, self.receiver.recv()) => match next {
                    Ok(Some(job_id)) => Tick::Job(job_id),
                    Ok(None) => Tick::Closed,
                    Err(_) => Tick::Idle,
                },
            };

            match tick {
                Tick::Job(job_id) => {
                    metrics::gauge!("dispatch_queue_depth").decrement(1.0);
                    self.dispatch_one(job_id).await;
                    if last_sweep.elapsed() >= self.idle_timeout {
                        self.sweep().await;
                        last_sweep = Instant::now();
                    }
                }
                Tick::Idle => {
                    self.sweep().await;
                    last_sweep = Instant::now();
                }
                Tick::Closed => {
                    tracing::info!("Dispatch queue closed");
                    break;
                }
                Tick::Shutdown => {}
                Tick::ShutdownDropped => break,
            }
        }

        tracing::info!("Dispatch worker stopped");
    }

    async fn dispatch_one(&self, job_id: Uuid) {
        match self.service.dispatch(job_id).await {
            Ok(DispatchOutcome::Submitted { .. }) => {
                tracing::debug!(job_id = %job_id, "Dispatch complete");
            }
            Ok(DispatchOutcome::Failed { error }) => {
                tracing::error!(job_id = %job_id, error = %error, "Dispatch failed, job marked failed");
            }
            Ok(DispatchOutcome::Superseded { status, .. }) => {
                tracing::info!(job_id = %job_id, status = %status, "Job finished during dispatch");
            }
            Ok(DispatchOutcome::Skipped(status)) => {
                tracing::debug!(job_id = %job_id, status = %status, "Dispatch skipped");
            }
            Ok(DispatchOutcome::Missing) => {}
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Dispatch aborted");
            }
        }
    }

    async fn sweep(&self) {
        match self.service.reconcile_inflight().await {
            Ok(report) if report.checked > 0 => {
                tracing::debug!(
                    checked = report.checked,
                    completed = report.completed,
                    failed = report.failed,
                    pending = report.pending,
                    errors = report.errors,
                    "Reconciliation sweep finished"
                );
            }
            Ok(_) => tracing::trace!("No in-flight jobs to reconcile"),
            Err(e) => tracing::error!(error = %e, "Reconciliation sweep failed"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("dispatch queue is closed")]
    Closed,
}
