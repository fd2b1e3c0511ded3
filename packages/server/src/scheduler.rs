//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! The monthly refresh does not crawl directly - it pushes re-discovery
//! requests onto the in-process queue, where the single worker drains them
//! one at a time.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::discovery::{DiscoveryJob, DiscoveryQueue};
use crate::store::{Store, StoreResolver};

/// Start all scheduled tasks
pub async fn start_scheduler(
    resolver: Arc<StoreResolver>,
    queue: DiscoveryQueue,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Monthly refresh - 03:00 on the 1st
    let refresh_job = Job::new_async("0 0 3 1 * *", move |_uuid, _lock| {
        let resolver = resolver.clone();
        let queue = queue.clone();
        Box::pin(async move {
            if let Err(e) = queue_expired_datasets(&resolver, &queue).await {
                error!("Monthly refresh task failed: {}", e);
            }
        })
    })?;
    scheduler.add(refresh_job).await?;

    scheduler.start().await?;
    info!("Scheduler started");
    Ok(scheduler)
}

/// Queue re-discovery for every dataset whose snapshot is expired or absent.
async fn queue_expired_datasets(
    resolver: &StoreResolver,
    queue: &DiscoveryQueue,
) -> Result<()> {
    let store = resolver.resolve().await?;
    let now = Utc::now();
    let mut queued = 0usize;

    for dataset in store.list_datasets().await? {
        let fresh = store
            .get_dataset_snapshot(dataset.id)
            .await?
            .map(|snapshot| snapshot.is_fresh(now))
            .unwrap_or(false);
        if !fresh && queue.push(DiscoveryJob::new(dataset.user_id, dataset.id)) {
            queued += 1;
        }
    }

    info!(queued, "Monthly refresh queued expired datasets");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::discovery_channel;
    use crate::store::{DatasetRecord, DatasetSnapshot, LocalStore, Store};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_only_expired_datasets_are_queued() {
        let store = Arc::new(LocalStore::new(
            std::env::temp_dir().join(format!("leadgrid-scheduler-{}", Uuid::new_v4())),
        ));
        let resolver = Arc::new(StoreResolver::new(None, store.clone()));
        let (queue, mut worker) = discovery_channel();

        let user_id = Uuid::new_v4();
        let stale = DatasetRecord {
            id: Uuid::new_v4(),
            user_id,
            name: "stale".to_string(),
            created_at: Utc::now(),
        };
        let fresh = DatasetRecord {
            id: Uuid::new_v4(),
            user_id,
            name: "fresh".to_string(),
            created_at: Utc::now(),
        };
        store.upsert_dataset(&stale).await.unwrap();
        store.upsert_dataset(&fresh).await.unwrap();
        store
            .create_dataset_snapshot(&DatasetSnapshot::new(
                fresh.id,
                user_id,
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        queue_expired_datasets(&resolver, &queue).await.unwrap();
        drop(queue);

        let queued = worker.rx.recv().await.unwrap();
        assert_eq!(queued.dataset_id, stale.id);
        assert!(worker.rx.recv().await.is_none());
    }
}
