//! Domain records produced and consumed by the crawl engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome classification for a whole crawl.
///
/// `NotCrawled` is the pre-crawl default; the engine itself only ever
/// produces `Partial` or `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    NotCrawled,
    Partial,
    Completed,
}

/// Lifecycle of a single crawl job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Failed,
}

/// A unit of crawl work for one business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub id: Uuid,
    pub business_id: Uuid,
    pub website_url: String,
    pub status: JobStatus,
    pub pages_limit: usize,
    pub pages_crawled: usize,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl CrawlJob {
    pub fn new(business_id: Uuid, website_url: impl Into<String>, pages_limit: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            business_id,
            website_url: website_url.into(),
            status: JobStatus::Queued,
            pages_limit,
            pages_crawled: 0,
            attempts: 0,
            created_at: Utc::now(),
        }
    }
}

/// One extracted email or phone candidate with provenance.
///
/// The same normalized value found on two pages is kept as two hits -
/// provenance matters more than dedup at this stage; export logic dedups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactHit {
    pub value: String,
    pub source_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ContactHit {
    pub fn new(value: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            source_url: source_url.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Social profile links keyed by platform, first hit per platform wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facebook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube: Option<String>,
}

impl SocialLinks {
    pub fn is_empty(&self) -> bool {
        self.facebook.is_none()
            && self.instagram.is_none()
            && self.linkedin.is_none()
            && self.twitter.is_none()
            && self.youtube.is_none()
    }

    /// Fill any platform this map is still missing from `other`.
    pub fn merge(&mut self, other: SocialLinks) {
        if self.facebook.is_none() {
            self.facebook = other.facebook;
        }
        if self.instagram.is_none() {
            self.instagram = other.instagram;
        }
        if self.linkedin.is_none() {
            self.linkedin = other.linkedin;
        }
        if self.twitter.is_none() {
            self.twitter = other.twitter;
        }
        if self.youtube.is_none() {
            self.youtube = other.youtube;
        }
    }
}

/// A non-fatal page-level failure recorded during a crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageError {
    pub url: String,
    pub reason: String,
}

/// One fetch attempt made during a crawl, for the per-job page log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageVisit {
    pub url: String,
    pub depth: usize,
    pub ok: bool,
    pub fetched_at: DateTime<Utc>,
}

/// The authoritative crawl outcome for one `(business_id, dataset_id)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub business_id: Uuid,
    pub dataset_id: Uuid,
    pub website_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pages_visited: usize,
    pub crawl_status: CrawlStatus,
    pub emails: Vec<ContactHit>,
    pub phones: Vec<ContactHit>,
    pub contact_pages: Vec<String>,
    pub social: SocialLinks,
    pub errors: Vec<PageError>,
}

impl CrawlResult {
    pub fn new(business_id: Uuid, dataset_id: Uuid, website_url: impl Into<String>) -> Self {
        Self {
            business_id,
            dataset_id,
            website_url: website_url.into(),
            started_at: Utc::now(),
            finished_at: None,
            pages_visited: 0,
            crawl_status: CrawlStatus::NotCrawled,
            emails: Vec::new(),
            phones: Vec::new(),
            contact_pages: Vec::new(),
            social: SocialLinks::default(),
            errors: Vec::new(),
        }
    }

    /// True if the crawl collected anything worth exporting.
    pub fn has_contacts(&self) -> bool {
        !self.emails.is_empty() || !self.phones.is_empty() || !self.social.is_empty()
    }
}
