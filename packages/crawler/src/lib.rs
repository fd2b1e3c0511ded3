//! Bounded contact-crawling library.
//!
//! Crawls one business website breadth-first within strict depth/page
//! budgets, extracts contact information (emails, phones, social links,
//! contact pages) and returns a single [`CrawlResult`] per run. Persistence
//! and plan bookkeeping live in the server crate; this library only needs a
//! [`PageFetcher`] to talk to the network, which keeps the traversal fully
//! testable against scripted site graphs.
//!
//! # Modules
//!
//! - [`urls`] - canonicalization, domain scoping, skip rules, seed URLs
//! - [`extract`] - heuristic contact extraction and page classification
//! - [`fetcher`] - `PageFetcher` trait + reqwest implementation
//! - [`engine`] - the BFS crawl loop and its safety caps
//! - [`plan`] - subscription-tier limits and the crawl/export gates

pub mod engine;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod plan;
pub mod types;
pub mod urls;

pub use engine::{CrawlBudget, CrawlEngine, CrawlRun, MAX_PAGES_HARD_CAP, WALL_CLOCK_TIMEOUT};
pub use error::{CrawlError, FetchError};
pub use extract::{ContactExtractor, PageContacts};
pub use fetcher::{FetchedPage, HttpFetcher, PageFetcher};
pub use plan::{apply_crawl_gate, apply_export_gate, CrawlGate, ExportGate, PlanLimits, PlanTier};
pub use types::{
    ContactHit, CrawlJob, CrawlResult, CrawlStatus, JobStatus, PageError, PageVisit, SocialLinks,
};
