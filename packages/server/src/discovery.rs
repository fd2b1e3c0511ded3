//! In-process re-discovery queue.
//!
//! Pushes are non-blocking; a single background worker drains one job at a
//! time, so at most one re-discovery runs concurrently system-wide. When
//! the bounded channel is full the newest request is dropped with a warning
//! - the monthly scheduler re-requests any dataset whose snapshot is still
//! expired, so nothing is lost for good.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Bound on queued re-discovery requests.
pub const QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct DiscoveryJob {
    pub user_id: Uuid,
    pub dataset_id: Uuid,
    pub requested_at: DateTime<Utc>,
}

impl DiscoveryJob {
    pub fn new(user_id: Uuid, dataset_id: Uuid) -> Self {
        Self {
            user_id,
            dataset_id,
            requested_at: Utc::now(),
        }
    }
}

/// What the worker does with each drained job.
#[async_trait]
pub trait DiscoveryHandler: Send + Sync + 'static {
    async fn rediscover(&self, job: &DiscoveryJob) -> anyhow::Result<()>;
}

/// Producer half. Cheap to clone and share.
#[derive(Clone)]
pub struct DiscoveryQueue {
    tx: mpsc::Sender<DiscoveryJob>,
}

impl DiscoveryQueue {
    /// Non-blocking push. Returns false when the job was dropped because
    /// the queue is full.
    pub fn push(&self, job: DiscoveryJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(
                    dataset_id = %job.dataset_id,
                    "Discovery queue full, dropping request"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(
                    dataset_id = %job.dataset_id,
                    "Discovery worker gone, dropping request"
                );
                false
            }
        }
    }
}

/// Consumer half, driven by [`DiscoveryWorker::run`] on a background task.
pub struct DiscoveryWorker {
    pub(crate) rx: mpsc::Receiver<DiscoveryJob>,
    draining: Arc<AtomicBool>,
}

pub fn discovery_channel() -> (DiscoveryQueue, DiscoveryWorker) {
    discovery_channel_with_capacity(QUEUE_CAPACITY)
}

pub fn discovery_channel_with_capacity(capacity: usize) -> (DiscoveryQueue, DiscoveryWorker) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        DiscoveryQueue { tx },
        DiscoveryWorker {
            rx,
            draining: Arc::new(AtomicBool::new(false)),
        },
    )
}

impl DiscoveryWorker {
    /// Drain jobs one at a time until every producer is dropped.
    ///
    /// Handler failures are logged and never stop the loop.
    pub async fn run<H: DiscoveryHandler>(mut self, handler: H) {
        info!("Discovery worker started");
        while let Some(job) = self.rx.recv().await {
            if self.draining.swap(true, Ordering::SeqCst) {
                warn!("Discovery drain re-entered; skipping overlapping run");
                continue;
            }
            info!(
                dataset_id = %job.dataset_id,
                requested_at = %job.requested_at,
                "Processing re-discovery request"
            );
            if let Err(e) = handler.rediscover(&job).await {
                error!(dataset_id = %job.dataset_id, error = %e, "Re-discovery failed");
            }
            self.draining.store(false, Ordering::SeqCst);
        }
        info!("Discovery worker stopped");
    }
}
