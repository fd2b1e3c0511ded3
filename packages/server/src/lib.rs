//! Server core: storage resolution, dataset snapshots, discovery requeue,
//! crawl orchestration and the HTTP trigger surface.

pub mod config;
pub mod crawl_service;
pub mod datasets;
pub mod discovery;
pub mod http;
pub mod ids;
pub mod refresh;
pub mod scheduler;
pub mod store;

pub use config::Config;
pub use crawl_service::{CrawlService, CrawlServiceError, CrawlTrigger, CrawlTriggerResponse};
pub use datasets::{resolve_dataset, DatasetResolution};
pub use discovery::{
    discovery_channel, DiscoveryHandler, DiscoveryJob, DiscoveryQueue, DiscoveryWorker,
};
pub use ids::{legacy_id_from_uuid, uuid_from_legacy_id};
pub use refresh::RefreshHandler;
pub use store::{
    BusinessRecord, CrawlResultRecord, DatasetRecord, DatasetSnapshot, ExportRow, LocalStore,
    PostgresStore, Store, StoreError, StoreResolver,
};
