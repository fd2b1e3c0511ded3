//! Re-discovery handler: re-crawls a dataset and freezes a new snapshot.
//!
//! Runs on the discovery worker, so at most one refresh is in flight at any
//! time. The plan applied here is the deployment's refresh plan - plan
//! bookkeeping per user lives outside this system.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crawler::{PageFetcher, PlanTier};

use crate::crawl_service::{CrawlService, CrawlTrigger};
use crate::discovery::{DiscoveryHandler, DiscoveryJob};
use crate::store::{DatasetSnapshot, Store, StoreResolver};

pub struct RefreshHandler<F> {
    service: CrawlService<F>,
    resolver: Arc<StoreResolver>,
    plan: PlanTier,
}

impl<F: PageFetcher + 'static> RefreshHandler<F> {
    pub fn new(service: CrawlService<F>, resolver: Arc<StoreResolver>, plan: PlanTier) -> Self {
        Self {
            service,
            resolver,
            plan,
        }
    }
}

#[async_trait]
impl<F: PageFetcher + 'static> DiscoveryHandler for RefreshHandler<F> {
    async fn rediscover(&self, job: &DiscoveryJob) -> anyhow::Result<()> {
        let response = self
            .service
            .crawl_dataset(CrawlTrigger {
                dataset_id: job.dataset_id,
                plan: self.plan,
                max_depth: None,
                pages_limit: None,
            })
            .await?;

        // Freeze the refreshed contact rows for the next 30 days
        let (rows, _gate) = self.service.export_rows(job.dataset_id, self.plan).await?;
        let snapshot = DatasetSnapshot::new(
            job.dataset_id,
            job.user_id,
            serde_json::to_value(&rows)?,
        );
        self.resolver
            .resolve()
            .await?
            .create_dataset_snapshot(&snapshot)
            .await?;

        info!(
            dataset_id = %job.dataset_id,
            jobs = response.jobs_created,
            rows = rows.len(),
            snapshot_id = %snapshot.id,
            "Dataset refreshed and snapshotted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BusinessRecord, DatasetRecord, LocalStore, Store};
    use async_trait::async_trait;
    use chrono::Utc;
    use crawler::{CrawlEngine, FetchError, FetchedPage};
    use std::collections::HashMap;
    use std::time::Duration;
    use uuid::Uuid;

    struct MapFetcher {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl PageFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            match self.pages.get(url) {
                Some(html) => Ok(FetchedPage {
                    url: url.to_string(),
                    final_url: url.to_string(),
                    html: html.clone(),
                    status: 200,
                }),
                None => Err(FetchError::Status {
                    status: 404,
                    url: url.to_string(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_rediscovery_crawls_and_snapshots() {
        let store = Arc::new(LocalStore::new(
            std::env::temp_dir().join(format!("leadgrid-refresh-{}", Uuid::new_v4())),
        ));
        let resolver = Arc::new(StoreResolver::new(None, store.clone()));

        let user_id = Uuid::new_v4();
        let dataset = DatasetRecord {
            id: Uuid::new_v4(),
            user_id,
            name: "refresh-me".to_string(),
            created_at: Utc::now(),
        };
        store.upsert_dataset(&dataset).await.unwrap();
        store
            .upsert_businesses(&[BusinessRecord {
                id: Uuid::new_v4(),
                dataset_id: dataset.id,
                name: "Acme".to_string(),
                website_url: Some("https://acme.example".to_string()),
                created_at: Utc::now(),
            }])
            .await
            .unwrap();

        let fetcher = MapFetcher {
            pages: [(
                "https://acme.example/".to_string(),
                "<body>info@acme.example</body>".to_string(),
            )]
            .into_iter()
            .collect(),
        };
        let engine = CrawlEngine::new(fetcher).with_fetch_delay(Duration::ZERO);
        let service = CrawlService::new(resolver.clone(), engine);
        let handler = RefreshHandler::new(service, resolver.clone(), PlanTier::Starter);

        handler
            .rediscover(&DiscoveryJob::new(user_id, dataset.id))
            .await
            .unwrap();

        let snapshot = store
            .get_dataset_snapshot(dataset.id)
            .await
            .unwrap()
            .unwrap();
        assert!(snapshot.is_fresh(Utc::now()));
        let rows = snapshot.data.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0]["emails"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("info@acme.example")));
    }
}
