//! Dataset resolution with snapshot reuse.
//!
//! A snapshot younger than 30 days is returned verbatim instead of
//! re-crawling. An expired or missing snapshot queues a non-blocking
//! re-discovery request and the resolver returns immediately.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::discovery::{DiscoveryJob, DiscoveryQueue};
use crate::store::{
    DatasetRecord, DatasetSnapshot, Store, StoreError, StoreResolver, StoreResult,
};

#[derive(Debug)]
pub struct DatasetResolution {
    pub dataset: DatasetRecord,
    /// Present iff a fresh snapshot was reused.
    pub snapshot: Option<DatasetSnapshot>,
    pub should_queue_discovery: bool,
}

/// Resolve a user's dataset, reusing a fresh snapshot when one exists.
///
/// With `dataset_id` absent the user's most recent dataset is used.
pub async fn resolve_dataset(
    resolver: &StoreResolver,
    queue: &DiscoveryQueue,
    user_id: Uuid,
    dataset_id: Option<Uuid>,
) -> StoreResult<DatasetResolution> {
    let store = resolver.resolve().await?;

    let dataset = match dataset_id {
        Some(id) => store.get_dataset(id).await?,
        None => store.get_latest_dataset(user_id).await?,
    }
    .ok_or_else(|| StoreError::NotFound {
        what: match dataset_id {
            Some(id) => format!("dataset {}", id),
            None => format!("datasets for user {}", user_id),
        },
    })?;

    let snapshot = store.get_dataset_snapshot(dataset.id).await?;
    if let Some(snapshot) = snapshot {
        if snapshot.is_fresh(Utc::now()) {
            info!(
                dataset_id = %dataset.id,
                snapshot_id = %snapshot.id,
                expires_at = %snapshot.expires_at,
                "Snapshot still fresh - reusing instead of re-crawling"
            );
            return Ok(DatasetResolution {
                dataset,
                snapshot: Some(snapshot),
                should_queue_discovery: false,
            });
        }
        info!(
            dataset_id = %dataset.id,
            snapshot_id = %snapshot.id,
            expired_at = %snapshot.expires_at,
            "Snapshot expired - queueing re-discovery"
        );
    } else {
        info!(dataset_id = %dataset.id, "No snapshot - queueing re-discovery");
    }

    queue.push(DiscoveryJob::new(user_id, dataset.id));
    Ok(DatasetResolution {
        dataset,
        snapshot: None,
        should_queue_discovery: true,
    })
}
