//! Storage contract implemented by the primary (Postgres) and local
//! fallback (filesystem JSON) backends.
//!
//! Callers never pick a backend themselves - they go through the
//! [`resolver::StoreResolver`], which hands out whichever backend last
//! passed a health check.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crawler::{CrawlJob, CrawlResult, PageVisit};

pub mod local;
pub mod postgres;
pub mod resolver;

pub use local::LocalStore;
pub use postgres::PostgresStore;
pub use resolver::StoreResolver;

/// Days a dataset snapshot stays reusable.
pub const SNAPSHOT_TTL_DAYS: i64 = 30;

/// Errors from storage backends and the resolver.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A backend failed its health probe
    #[error("storage backend unhealthy: {backend}")]
    Unhealthy { backend: &'static str },

    /// Neither the primary nor the fallback backend is reachable
    #[error("no storage backend available")]
    Unavailable,

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A dataset of businesses owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One business inside a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessRecord {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub name: String,
    pub website_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BusinessRecord {
    pub fn has_website(&self) -> bool {
        self.website_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }

    /// Import a business from the legacy integer-keyed tables, mapping its
    /// ID through the reversible hex-padding transform so every result row
    /// shares one key type.
    pub fn from_legacy(
        legacy_id: u64,
        dataset_id: Uuid,
        name: impl Into<String>,
        website_url: Option<String>,
    ) -> Option<Self> {
        Some(Self {
            id: crate::ids::uuid_from_legacy_id(legacy_id)?,
            dataset_id,
            name: name.into(),
            website_url,
            created_at: Utc::now(),
        })
    }
}

/// A frozen copy of a dataset's businesses and contacts.
///
/// A snapshot younger than [`SNAPSHOT_TTL_DAYS`] is reused verbatim instead
/// of re-crawling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl DatasetSnapshot {
    pub fn new(dataset_id: Uuid, user_id: Uuid, data: serde_json::Value) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            dataset_id,
            user_id,
            created_at,
            expires_at: created_at + Duration::days(SNAPSHOT_TTL_DAYS),
            data,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// A stored crawl result with its bookkeeping timestamps.
///
/// `created_at` is set on first insert and never changes afterwards - it
/// backs "first discovered at" reporting across monthly refreshes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResultRecord {
    #[serde(flatten)]
    pub result: CrawlResult,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A flattened row for the export surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRow {
    pub business_id: Uuid,
    pub business_name: String,
    pub website_url: Option<String>,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub contact_page: Option<String>,
    pub crawl_status: crawler::CrawlStatus,
    pub first_discovered_at: Option<DateTime<Utc>>,
}

/// Uniform storage contract.
#[async_trait]
pub trait Store: Send + Sync {
    fn name(&self) -> &'static str;

    async fn health_check(&self) -> StoreResult<()>;

    // Datasets
    async fn upsert_dataset(&self, dataset: &DatasetRecord) -> StoreResult<()>;
    async fn get_dataset(&self, dataset_id: Uuid) -> StoreResult<Option<DatasetRecord>>;
    async fn get_latest_dataset(&self, user_id: Uuid) -> StoreResult<Option<DatasetRecord>>;
    async fn list_datasets(&self) -> StoreResult<Vec<DatasetRecord>>;

    // Businesses
    async fn upsert_businesses(&self, businesses: &[BusinessRecord]) -> StoreResult<()>;
    async fn list_dataset_businesses(&self, dataset_id: Uuid) -> StoreResult<Vec<BusinessRecord>>;

    // Snapshots
    async fn create_dataset_snapshot(&self, snapshot: &DatasetSnapshot) -> StoreResult<()>;
    /// Latest snapshot for a dataset, fresh or not.
    async fn get_dataset_snapshot(&self, dataset_id: Uuid)
        -> StoreResult<Option<DatasetSnapshot>>;

    // Crawl jobs and pages
    async fn create_crawl_job(&self, dataset_id: Uuid, job: &CrawlJob) -> StoreResult<()>;
    async fn update_crawl_job(&self, dataset_id: Uuid, job: &CrawlJob) -> StoreResult<()>;
    async fn save_page(&self, dataset_id: Uuid, job_id: Uuid, page: &PageVisit) -> StoreResult<()>;

    // Crawl results
    /// Idempotent write keyed on `(business_id, dataset_id)`. Overwrites
    /// every field except the original `created_at`, atomically from the
    /// reader's perspective.
    async fn upsert_crawl_result(&self, result: &CrawlResult) -> StoreResult<CrawlResultRecord>;
    async fn get_crawl_result(
        &self,
        business_id: Uuid,
        dataset_id: Uuid,
    ) -> StoreResult<Option<CrawlResultRecord>>;
    /// Flattened contact rows per dataset, for the export surface.
    async fn save_contacts(&self, dataset_id: Uuid, result: &CrawlResult) -> StoreResult<()>;

    // Export
    async fn get_export_rows(&self, dataset_id: Uuid, limit: usize) -> StoreResult<Vec<ExportRow>>;
}
