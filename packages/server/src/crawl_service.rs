//! Crawl orchestration: validation, plan gating, job creation, sequential
//! execution, result persistence through the storage resolver.

use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crawler::{
    apply_crawl_gate, apply_export_gate, CrawlBudget, CrawlEngine, CrawlJob, CrawlRun, ExportGate,
    JobStatus, PageFetcher, PlanTier,
};

use crate::store::{BusinessRecord, ExportRow, Store, StoreError, StoreResolver, StoreResult};

#[derive(Debug, Error)]
pub enum CrawlServiceError {
    /// Rejected before any crawl starts
    #[error("invalid crawl request: {reason}")]
    InvalidInput { reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A crawl request already resolved to a plan tier.
#[derive(Debug, Clone)]
pub struct CrawlTrigger {
    pub dataset_id: Uuid,
    pub plan: PlanTier,
    pub max_depth: Option<usize>,
    pub pages_limit: Option<usize>,
}

/// Trigger response: job bookkeeping plus gating metadata.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlTriggerResponse {
    pub job_ids: Vec<Uuid>,
    pub jobs_created: usize,
    pub max_depth: usize,
    pub pages_limit: usize,
    pub gated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_hint: Option<String>,
}

pub struct CrawlService<F> {
    resolver: Arc<StoreResolver>,
    engine: Arc<CrawlEngine<F>>,
    /// One crawl in flight process-wide, independent of plan.
    crawl_permit: Arc<Semaphore>,
}

impl<F> Clone for CrawlService<F> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            engine: self.engine.clone(),
            crawl_permit: self.crawl_permit.clone(),
        }
    }
}

fn upgrade_hint(plan: PlanTier) -> Option<String> {
    match plan {
        PlanTier::Demo => Some("Upgrade to Starter for deeper crawls".to_string()),
        PlanTier::Starter => Some("Upgrade to Pro for the full crawl budget".to_string()),
        PlanTier::Pro => None,
    }
}

impl<F: PageFetcher + 'static> CrawlService<F> {
    pub fn new(resolver: Arc<StoreResolver>, engine: CrawlEngine<F>) -> Self {
        Self {
            resolver,
            engine: Arc::new(engine),
            crawl_permit: Arc::new(Semaphore::new(1)),
        }
    }

    /// Validate, gate, and create one job per business-with-website.
    async fn prepare(
        &self,
        trigger: &CrawlTrigger,
    ) -> Result<(Vec<(CrawlJob, BusinessRecord)>, CrawlBudget, CrawlTriggerResponse), CrawlServiceError>
    {
        let store = self.resolver.resolve().await?;

        let dataset = store
            .get_dataset(trigger.dataset_id)
            .await?
            .ok_or_else(|| CrawlServiceError::InvalidInput {
                reason: format!("dataset {} not found", trigger.dataset_id),
            })?;

        let businesses: Vec<BusinessRecord> = store
            .list_dataset_businesses(dataset.id)
            .await?
            .into_iter()
            .filter(BusinessRecord::has_website)
            .collect();
        if businesses.is_empty() {
            return Err(CrawlServiceError::InvalidInput {
                reason: format!("dataset {} has no businesses with websites", dataset.id),
            });
        }

        let limits = trigger.plan.limits();
        let gate = apply_crawl_gate(
            trigger.plan,
            trigger.max_depth.unwrap_or(limits.crawl_max_depth),
            trigger.pages_limit,
        );
        let budget = CrawlBudget::new(gate.max_depth, gate.pages_limit);

        let mut jobs = Vec::with_capacity(businesses.len());
        for business in businesses {
            let website = business.website_url.clone().unwrap_or_default();
            let job = CrawlJob::new(business.id, website, gate.pages_limit);
            store.create_crawl_job(dataset.id, &job).await?;
            jobs.push((job, business));
        }

        let response = CrawlTriggerResponse {
            job_ids: jobs.iter().map(|(job, _)| job.id).collect(),
            jobs_created: jobs.len(),
            max_depth: gate.max_depth,
            pages_limit: gate.pages_limit,
            gated: gate.gated,
            gate_reason: gate.gated.then(|| {
                format!(
                    "requested depth {} / pages {:?} exceed the {} plan limits",
                    gate.original_depth, gate.original_pages_limit, trigger.plan
                )
            }),
            upgrade_hint: if gate.gated {
                upgrade_hint(trigger.plan)
            } else {
                None
            },
        };

        info!(
            dataset_id = %dataset.id,
            jobs = response.jobs_created,
            max_depth = gate.max_depth,
            pages_limit = gate.pages_limit,
            gated = gate.gated,
            "Crawl prepared"
        );

        Ok((jobs, budget, response))
    }

    /// Prepare, re-resolving the storage backend once if the cached one has
    /// silently died since the last operation.
    async fn prepare_with_retry(
        &self,
        trigger: &CrawlTrigger,
    ) -> Result<(Vec<(CrawlJob, BusinessRecord)>, CrawlBudget, CrawlTriggerResponse), CrawlServiceError>
    {
        match self.prepare(trigger).await {
            Err(CrawlServiceError::Store(e)) => {
                warn!(error = %e, "Prepare failed, re-resolving storage backend");
                self.resolver.recheck().await?;
                self.prepare(trigger).await
            }
            other => other,
        }
    }

    /// Create jobs and return immediately; crawls run on a background task.
    pub async fn trigger_crawl(
        &self,
        trigger: CrawlTrigger,
    ) -> Result<CrawlTriggerResponse, CrawlServiceError> {
        let (jobs, budget, response) = self.prepare_with_retry(&trigger).await?;

        let service = self.clone();
        let dataset_id = trigger.dataset_id;
        tokio::spawn(async move {
            service.run_jobs(dataset_id, jobs, budget).await;
        });

        Ok(response)
    }

    /// Run the whole dataset crawl inline. Used by the discovery worker and
    /// the monthly scheduler, which want completion before snapshotting.
    pub async fn crawl_dataset(
        &self,
        trigger: CrawlTrigger,
    ) -> Result<CrawlTriggerResponse, CrawlServiceError> {
        let (jobs, budget, response) = self.prepare_with_retry(&trigger).await?;
        self.run_jobs(trigger.dataset_id, jobs, budget).await;
        Ok(response)
    }

    async fn run_jobs(
        &self,
        dataset_id: Uuid,
        jobs: Vec<(CrawlJob, BusinessRecord)>,
        budget: CrawlBudget,
    ) {
        for (job, business) in jobs {
            let job_id = job.id;
            if let Err(e) = self.run_one(dataset_id, job, &business, budget).await {
                error!(job_id = %job_id, error = %e, "Crawl job failed");
            }
        }
    }

    async fn run_one(
        &self,
        dataset_id: Uuid,
        mut job: CrawlJob,
        business: &BusinessRecord,
        budget: CrawlBudget,
    ) -> anyhow::Result<()> {
        let _permit = self
            .crawl_permit
            .acquire()
            .await
            .context("crawl permit closed")?;

        job.status = JobStatus::Running;
        job.attempts += 1;
        self.update_job(dataset_id, &job).await;

        let website = business.website_url.clone().unwrap_or_default();
        match self
            .engine
            .crawl(business.id, dataset_id, &website, budget)
            .await
        {
            Ok(run) => {
                job.pages_crawled = run.result.pages_visited;
                job.status = if run.result.pages_visited > 0 {
                    JobStatus::Success
                } else {
                    JobStatus::Failed
                };
                self.persist_run(dataset_id, &job, &run)
                    .await
                    .context("Failed to persist crawl result")?;
            }
            Err(e) => {
                warn!(
                    business_id = %business.id,
                    website = %website,
                    error = %e,
                    "Crawl rejected before fetching"
                );
                job.status = JobStatus::Failed;
            }
        }

        self.update_job(dataset_id, &job).await;
        Ok(())
    }

    /// Persist through the resolver; on a backend error, re-probe and retry
    /// once against whatever backend resolution now yields.
    async fn persist_run(
        &self,
        dataset_id: Uuid,
        job: &CrawlJob,
        run: &CrawlRun,
    ) -> Result<(), StoreError> {
        match self.try_persist(dataset_id, job, run).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Persist failed, re-resolving storage backend");
                self.resolver.recheck().await?;
                self.try_persist(dataset_id, job, run).await
            }
        }
    }

    async fn try_persist(
        &self,
        dataset_id: Uuid,
        job: &CrawlJob,
        run: &CrawlRun,
    ) -> StoreResult<()> {
        let store = self.resolver.resolve().await?;
        for page in &run.pages {
            store.save_page(dataset_id, job.id, page).await?;
        }
        store.save_contacts(dataset_id, &run.result).await?;
        store.upsert_crawl_result(&run.result).await?;
        Ok(())
    }

    /// Job-status writes are bookkeeping - log failures, never abort the
    /// crawl over them.
    async fn update_job(&self, dataset_id: Uuid, job: &CrawlJob) {
        let update = async {
            self.resolver
                .resolve()
                .await?
                .update_crawl_job(dataset_id, job)
                .await
        };
        if let Err(e) = update.await {
            warn!(job_id = %job.id, error = %e, "Failed to update crawl job");
        }
    }

    /// Export rows for a dataset, gated and watermarked by plan.
    pub async fn export_rows(
        &self,
        dataset_id: Uuid,
        plan: PlanTier,
    ) -> Result<(Vec<ExportRow>, ExportGate), CrawlServiceError> {
        let store = self.resolver.resolve().await?;
        // Fetch one row past the cap so gating can tell "at the cap" from
        // "over the cap"
        let mut rows = store
            .get_export_rows(dataset_id, plan.limits().export_max_rows + 1)
            .await?;
        let gate = apply_export_gate(plan, rows.len());
        rows.truncate(gate.rows);
        Ok((rows, gate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::store::{DatasetRecord, LocalStore, Store};
    use crawler::{CrawlStatus, FetchError, FetchedPage};

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

    fn acme_fetcher() -> MapFetcher {
        let pages = [
            (
                "https://acme.example/",
                r#"<body>info@acme.example <a href="/contact">c</a></body>"#,
            ),
            ("https://acme.example/contact", "<body>+30 210 123 4567</body>"),
        ];
        MapFetcher {
            pages: pages
                .into_iter()
                .map(|(url, html)| (url.to_string(), html.to_string()))
                .collect(),
        }
    }

    async fn service_with_dataset(
        fetcher: MapFetcher,
    ) -> (CrawlService<MapFetcher>, Uuid, Vec<BusinessRecord>) {
        let store = Arc::new(LocalStore::new(
            std::env::temp_dir().join(format!("leadgrid-crawl-service-{}", Uuid::new_v4())),
        ));
        let resolver = Arc::new(StoreResolver::new(None, store.clone()));

        let dataset = DatasetRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "athens-test".to_string(),
            created_at: Utc::now(),
        };
        store.upsert_dataset(&dataset).await.unwrap();

        let businesses = vec![
            BusinessRecord {
                id: Uuid::new_v4(),
                dataset_id: dataset.id,
                name: "Acme".to_string(),
                website_url: Some("https://acme.example".to_string()),
                created_at: Utc::now(),
            },
            BusinessRecord {
                id: Uuid::new_v4(),
                dataset_id: dataset.id,
                name: "No Site SA".to_string(),
                website_url: None,
                created_at: Utc::now(),
            },
        ];
        store.upsert_businesses(&businesses).await.unwrap();

        let engine = CrawlEngine::new(fetcher).with_fetch_delay(Duration::ZERO);
        let service = CrawlService::new(resolver, engine);
        (service, dataset.id, businesses)
    }

    #[tokio::test]
    async fn test_crawl_dataset_persists_results() {
        let (service, dataset_id, businesses) = service_with_dataset(acme_fetcher()).await;

        let response = service
            .crawl_dataset(CrawlTrigger {
                dataset_id,
                plan: PlanTier::Starter,
                max_depth: Some(1),
                pages_limit: Some(10),
            })
            .await
            .unwrap();

        // Only the business with a website got a job
        assert_eq!(response.jobs_created, 1);
        assert!(!response.gated);

        let (rows, gate) = service
            .export_rows(dataset_id, PlanTier::Starter)
            .await
            .unwrap();
        assert_eq!(gate.watermark, "STARTER");
        let acme = rows
            .iter()
            .find(|r| r.business_id == businesses[0].id)
            .unwrap();
        assert_eq!(acme.crawl_status, CrawlStatus::Completed);
        assert_eq!(acme.emails, vec!["info@acme.example"]);
        assert_eq!(acme.phones, vec!["+302101234567"]);
    }

    #[tokio::test]
    async fn test_gating_metadata_on_demo_plan() {
        let (service, dataset_id, _) = service_with_dataset(acme_fetcher()).await;

        let response = service
            .crawl_dataset(CrawlTrigger {
                dataset_id,
                plan: PlanTier::Demo,
                max_depth: Some(5),
                pages_limit: Some(100),
            })
            .await
            .unwrap();

        assert!(response.gated);
        assert_eq!(response.max_depth, 1);
        assert_eq!(response.pages_limit, 5);
        assert!(response.gate_reason.is_some());
        assert!(response
            .upgrade_hint
            .as_deref()
            .unwrap()
            .contains("Starter"));
    }

    #[tokio::test]
    async fn test_unknown_dataset_rejected() {
        let (service, _, _) = service_with_dataset(acme_fetcher()).await;

        let err = service
            .crawl_dataset(CrawlTrigger {
                dataset_id: Uuid::new_v4(),
                plan: PlanTier::Pro,
                max_depth: None,
                pages_limit: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlServiceError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_dataset_without_websites_rejected() {
        let store = Arc::new(LocalStore::new(
            std::env::temp_dir().join(format!("leadgrid-no-sites-{}", Uuid::new_v4())),
        ));
        let resolver = Arc::new(StoreResolver::new(None, store.clone()));
        let dataset = DatasetRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "empty".to_string(),
            created_at: Utc::now(),
        };
        store.upsert_dataset(&dataset).await.unwrap();

        let engine = CrawlEngine::new(MapFetcher {
            pages: HashMap::new(),
        })
        .with_fetch_delay(Duration::ZERO);
        let service = CrawlService::new(resolver, engine);

        let err = service
            .crawl_dataset(CrawlTrigger {
                dataset_id: dataset.id,
                plan: PlanTier::Pro,
                max_depth: None,
                pages_limit: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlServiceError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_repeat_crawl_keeps_first_discovered_at() {
        let (service, dataset_id, businesses) = service_with_dataset(acme_fetcher()).await;
        let trigger = CrawlTrigger {
            dataset_id,
            plan: PlanTier::Starter,
            max_depth: Some(1),
            pages_limit: None,
        };

        service.crawl_dataset(trigger.clone()).await.unwrap();
        let (rows, _) = service
            .export_rows(dataset_id, PlanTier::Starter)
            .await
            .unwrap();
        let first_seen = rows
            .iter()
            .find(|r| r.business_id == businesses[0].id)
            .unwrap()
            .first_discovered_at
            .unwrap();

        service.crawl_dataset(trigger).await.unwrap();
        let (rows, _) = service
            .export_rows(dataset_id, PlanTier::Starter)
            .await
            .unwrap();
        let still_first = rows
            .iter()
            .find(|r| r.business_id == businesses[0].id)
            .unwrap()
            .first_discovered_at
            .unwrap();

        assert_eq!(still_first, first_seen);
    }
}
