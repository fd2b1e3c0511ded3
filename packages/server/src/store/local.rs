//! Filesystem-backed fallback storage.
//!
//! One JSON document per dataset for businesses and contacts, a
//! per-crawl-job file under `crawl/`, an `index.json` mapping business to
//! crawl status, and a `.local-persistence/datasets.json` document for
//! dataset records and snapshots. Every write goes through a temp file and
//! an atomic rename so a crash never leaves a half-written document.

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

use crawler::{ContactHit, CrawlJob, CrawlResult, CrawlStatus, PageVisit};

use super::postgres::dedup_values;
use super::{
    BusinessRecord, CrawlResultRecord, DatasetRecord, DatasetSnapshot, ExportRow, Store,
    StoreError, StoreResult,
};

/// Dataset records and snapshots kept in one document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistenceDoc {
    datasets: Vec<DatasetRecord>,
    snapshots: Vec<DatasetSnapshot>,
}

/// Per-crawl-job document: the job plus its page log.
#[derive(Debug, Serialize, Deserialize)]
struct CrawlJobDoc {
    dataset_id: Uuid,
    job: CrawlJob,
    pages: Vec<PageVisit>,
}

/// One flattened contact row in `contacts.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContactRow {
    business_id: Uuid,
    kind: String,
    value: String,
    source_url: String,
    context: Option<String>,
}

pub struct LocalStore {
    root: PathBuf,
    /// Serializes writers; readers rely on rename atomicity.
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn persistence_path(&self) -> PathBuf {
        self.root.join(".local-persistence").join("datasets.json")
    }

    fn dataset_dir(&self, dataset_id: Uuid) -> PathBuf {
        self.root.join("datasets").join(dataset_id.to_string())
    }

    fn job_path(&self, dataset_id: Uuid, job_id: Uuid) -> PathBuf {
        self.dataset_dir(dataset_id)
            .join("crawl")
            .join(format!("{}.json", job_id))
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> StoreResult<Option<T>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_json_atomic<T: Serialize>(&self, path: &Path, value: &T) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_persistence(&self) -> StoreResult<PersistenceDoc> {
        Ok(self
            .read_json(&self.persistence_path())
            .await?
            .unwrap_or_default())
    }

    async fn read_results(
        &self,
        dataset_id: Uuid,
    ) -> StoreResult<HashMap<Uuid, CrawlResultRecord>> {
        Ok(self
            .read_json(&self.dataset_dir(dataset_id).join("results.json"))
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl Store for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn health_check(&self) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|_| StoreError::Unhealthy { backend: "local" })?;
        Ok(())
    }

    async fn upsert_dataset(&self, dataset: &DatasetRecord) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_persistence().await?;
        match doc.datasets.iter_mut().find(|d| d.id == dataset.id) {
            Some(existing) => *existing = dataset.clone(),
            None => doc.datasets.push(dataset.clone()),
        }
        self.write_json_atomic(&self.persistence_path(), &doc).await
    }

    async fn get_dataset(&self, dataset_id: Uuid) -> StoreResult<Option<DatasetRecord>> {
        let doc = self.read_persistence().await?;
        Ok(doc.datasets.into_iter().find(|d| d.id == dataset_id))
    }

    async fn get_latest_dataset(&self, user_id: Uuid) -> StoreResult<Option<DatasetRecord>> {
        let doc = self.read_persistence().await?;
        Ok(doc
            .datasets
            .into_iter()
            .filter(|d| d.user_id == user_id)
            .max_by_key(|d| d.created_at))
    }

    async fn list_datasets(&self) -> StoreResult<Vec<DatasetRecord>> {
        Ok(self.read_persistence().await?.datasets)
    }

    async fn upsert_businesses(&self, businesses: &[BusinessRecord]) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let by_dataset = businesses.iter().fold(
            HashMap::<Uuid, Vec<&BusinessRecord>>::new(),
            |mut acc, b| {
                acc.entry(b.dataset_id).or_default().push(b);
                acc
            },
        );
        for (dataset_id, incoming) in by_dataset {
            let path = self.dataset_dir(dataset_id).join("businesses.json");
            let mut existing: Vec<BusinessRecord> =
                self.read_json(&path).await?.unwrap_or_default();
            for business in incoming {
                match existing.iter_mut().find(|b| b.id == business.id) {
                    Some(slot) => *slot = business.clone(),
                    None => existing.push(business.clone()),
                }
            }
            self.write_json_atomic(&path, &existing).await?;
        }
        Ok(())
    }

    async fn list_dataset_businesses(&self, dataset_id: Uuid) -> StoreResult<Vec<BusinessRecord>> {
        Ok(self
            .read_json(&self.dataset_dir(dataset_id).join("businesses.json"))
            .await?
            .unwrap_or_default())
    }

    async fn create_dataset_snapshot(&self, snapshot: &DatasetSnapshot) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read_persistence().await?;
        doc.snapshots.push(snapshot.clone());
        self.write_json_atomic(&self.persistence_path(), &doc).await
    }

    async fn get_dataset_snapshot(
        &self,
        dataset_id: Uuid,
    ) -> StoreResult<Option<DatasetSnapshot>> {
        let doc = self.read_persistence().await?;
        Ok(doc
            .snapshots
            .into_iter()
            .filter(|s| s.dataset_id == dataset_id)
            .max_by_key(|s| s.created_at))
    }

    async fn create_crawl_job(&self, dataset_id: Uuid, job: &CrawlJob) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let doc = CrawlJobDoc {
            dataset_id,
            job: job.clone(),
            pages: Vec::new(),
        };
        self.write_json_atomic(&self.job_path(dataset_id, job.id), &doc)
            .await
    }

    async fn update_crawl_job(&self, dataset_id: Uuid, job: &CrawlJob) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.job_path(dataset_id, job.id);
        let mut doc: CrawlJobDoc = self.read_json(&path).await?.unwrap_or(CrawlJobDoc {
            dataset_id,
            job: job.clone(),
            pages: Vec::new(),
        });
        doc.job = job.clone();
        self.write_json_atomic(&path, &doc).await
    }

    async fn save_page(&self, dataset_id: Uuid, job_id: Uuid, page: &PageVisit) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.job_path(dataset_id, job_id);
        let mut doc: CrawlJobDoc = self.read_json(&path).await?.ok_or_else(|| {
            StoreError::NotFound {
                what: format!("crawl job {}", job_id),
            }
        })?;
        doc.pages.push(page.clone());
        self.write_json_atomic(&path, &doc).await
    }

    async fn upsert_crawl_result(&self, result: &CrawlResult) -> StoreResult<CrawlResultRecord> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let results_path = self.dataset_dir(result.dataset_id).join("results.json");
        let mut results = self.read_results(result.dataset_id).await?;

        let created_at = results
            .get(&result.business_id)
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        let record = CrawlResultRecord {
            result: result.clone(),
            created_at,
            updated_at: now,
        };
        results.insert(result.business_id, record.clone());
        self.write_json_atomic(&results_path, &results).await?;

        // Keep the business -> status index in step
        let index_path = self.dataset_dir(result.dataset_id).join("index.json");
        let index: HashMap<Uuid, CrawlStatus> = results
            .iter()
            .map(|(id, r)| (*id, r.result.crawl_status))
            .collect();
        self.write_json_atomic(&index_path, &index).await?;

        Ok(record)
    }

    async fn get_crawl_result(
        &self,
        business_id: Uuid,
        dataset_id: Uuid,
    ) -> StoreResult<Option<CrawlResultRecord>> {
        let results = self.read_results(dataset_id).await?;
        Ok(results.get(&business_id).cloned())
    }

    async fn save_contacts(&self, dataset_id: Uuid, result: &CrawlResult) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.dataset_dir(dataset_id).join("contacts.json");
        let mut rows: Vec<ContactRow> = self.read_json(&path).await?.unwrap_or_default();
        rows.retain(|row| row.business_id != result.business_id);

        let to_row = |kind: &str, hit: &ContactHit| ContactRow {
            business_id: result.business_id,
            kind: kind.to_string(),
            value: hit.value.clone(),
            source_url: hit.source_url.clone(),
            context: hit.context.clone(),
        };
        rows.extend(result.emails.iter().map(|h| to_row("email", h)));
        rows.extend(result.phones.iter().map(|h| to_row("phone", h)));

        self.write_json_atomic(&path, &rows).await
    }

    async fn get_export_rows(&self, dataset_id: Uuid, limit: usize) -> StoreResult<Vec<ExportRow>> {
        let businesses = self.list_dataset_businesses(dataset_id).await?;
        let results = self.read_results(dataset_id).await?;

        Ok(businesses
            .into_iter()
            .take(limit)
            .map(|business| {
                let record = results.get(&business.id);
                ExportRow {
                    business_id: business.id,
                    business_name: business.name,
                    website_url: business.website_url,
                    emails: record
                        .map(|r| dedup_values(r.result.emails.clone()))
                        .unwrap_or_default(),
                    phones: record
                        .map(|r| dedup_values(r.result.phones.clone()))
                        .unwrap_or_default(),
                    contact_page: record
                        .and_then(|r| r.result.contact_pages.first().cloned()),
                    crawl_status: record
                        .map(|r| r.result.crawl_status)
                        .unwrap_or(CrawlStatus::NotCrawled),
                    first_discovered_at: record.map(|r| r.created_at),
                }
            })
            .collect())
    }
}
