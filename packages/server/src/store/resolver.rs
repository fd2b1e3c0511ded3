//! Primary/fallback storage resolution with cached health checks.
//!
//! State machine: unresolved -> probe primary -> healthy => cache primary,
//! unhealthy => probe fallback => cache fallback. The cached selection is
//! reused until a re-probe fails, at which point the cache is cleared and
//! resolution restarts from the primary. Callers pay for a health check
//! only when the cache is stale or absent, never on every operation.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{Store, StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selected {
    Primary,
    Fallback,
}

pub struct StoreResolver {
    primary: Option<Arc<dyn Store>>,
    fallback: Arc<dyn Store>,
    cached: RwLock<Option<Selected>>,
}

impl StoreResolver {
    /// Created once at process start; `primary` is absent when no database
    /// is configured (local-only deployments).
    pub fn new(primary: Option<Arc<dyn Store>>, fallback: Arc<dyn Store>) -> Self {
        Self {
            primary,
            fallback,
            cached: RwLock::new(None),
        }
    }

    fn select(&self, selected: Selected) -> Arc<dyn Store> {
        match selected {
            Selected::Primary => self
                .primary
                .clone()
                .unwrap_or_else(|| self.fallback.clone()),
            Selected::Fallback => self.fallback.clone(),
        }
    }

    /// The backend all storage calls should go through right now.
    ///
    /// A briefly-stale cached selection is acceptable - the next re-probe
    /// corrects it.
    pub async fn resolve(&self) -> StoreResult<Arc<dyn Store>> {
        if let Some(selected) = *self.cached.read().await {
            return Ok(self.select(selected));
        }

        if let Some(primary) = &self.primary {
            match primary.health_check().await {
                Ok(()) => {
                    info!(backend = primary.name(), "Primary store healthy");
                    *self.cached.write().await = Some(Selected::Primary);
                    return Ok(primary.clone());
                }
                Err(e) => {
                    warn!(
                        backend = primary.name(),
                        error = %e,
                        "Primary store unhealthy, probing fallback"
                    );
                }
            }
        }

        match self.fallback.health_check().await {
            Ok(()) => {
                info!(backend = self.fallback.name(), "Using fallback store");
                *self.cached.write().await = Some(Selected::Fallback);
                Ok(self.fallback.clone())
            }
            Err(e) => {
                warn!(backend = self.fallback.name(), error = %e, "Fallback store unhealthy");
                Err(StoreError::Unavailable)
            }
        }
    }

    /// Drop the cached selection; the next `resolve` starts from the
    /// primary probe again.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    /// Re-probe the cached backend and re-resolve if it has gone unhealthy.
    ///
    /// Called after a storage operation fails, and by the health surface.
    pub async fn recheck(&self) -> StoreResult<Arc<dyn Store>> {
        let cached = *self.cached.read().await;
        if let Some(selected) = cached {
            let store = self.select(selected);
            if let Err(e) = store.health_check().await {
                warn!(backend = store.name(), error = %e, "Cached store failed re-probe");
                self.invalidate().await;
            }
        }
        self.resolve().await
    }

    /// Name of the currently cached backend, if any.
    pub async fn selected_backend(&self) -> Option<&'static str> {
        let cached = *self.cached.read().await;
        cached.map(|selected| self.select(selected).name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use uuid::Uuid;

    use crate::store::{
        BusinessRecord, CrawlResultRecord, DatasetRecord, DatasetSnapshot, ExportRow,
    };
    use crawler::{CrawlJob, CrawlResult, PageVisit};

    /// Store whose health can be flipped; records probe counts.
    struct FlakyStore {
        label: &'static str,
        healthy: AtomicBool,
        probes: AtomicUsize,
    }

    impl FlakyStore {
        fn new(label: &'static str, healthy: bool) -> Arc<Self> {
            Arc::new(Self {
                label,
                healthy: AtomicBool::new(healthy),
                probes: AtomicUsize::new(0),
            })
        }

        fn set_healthy(&self, healthy: bool) {
            self.healthy.store(healthy, Ordering::SeqCst);
        }

        fn probe_count(&self) -> usize {
            self.probes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Store for FlakyStore {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn health_check(&self) -> StoreResult<()> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(StoreError::Unhealthy {
                    backend: self.label,
                })
            }
        }

        async fn upsert_dataset(&self, _: &DatasetRecord) -> StoreResult<()> {
            Ok(())
        }
        async fn get_dataset(&self, _: Uuid) -> StoreResult<Option<DatasetRecord>> {
            Ok(None)
        }
        async fn get_latest_dataset(&self, _: Uuid) -> StoreResult<Option<DatasetRecord>> {
            Ok(None)
        }
        async fn list_datasets(&self) -> StoreResult<Vec<DatasetRecord>> {
            Ok(vec![])
        }
        async fn upsert_businesses(&self, _: &[BusinessRecord]) -> StoreResult<()> {
            Ok(())
        }
        async fn list_dataset_businesses(&self, _: Uuid) -> StoreResult<Vec<BusinessRecord>> {
            Ok(vec![])
        }
        async fn create_dataset_snapshot(&self, _: &DatasetSnapshot) -> StoreResult<()> {
            Ok(())
        }
        async fn get_dataset_snapshot(&self, _: Uuid) -> StoreResult<Option<DatasetSnapshot>> {
            Ok(None)
        }
        async fn create_crawl_job(&self, _: Uuid, _: &CrawlJob) -> StoreResult<()> {
            Ok(())
        }
        async fn update_crawl_job(&self, _: Uuid, _: &CrawlJob) -> StoreResult<()> {
            Ok(())
        }
        async fn save_page(&self, _: Uuid, _: Uuid, _: &PageVisit) -> StoreResult<()> {
            Ok(())
        }
        async fn upsert_crawl_result(&self, result: &CrawlResult) -> StoreResult<CrawlResultRecord> {
            Ok(CrawlResultRecord {
                result: result.clone(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
        }
        async fn get_crawl_result(
            &self,
            _: Uuid,
            _: Uuid,
        ) -> StoreResult<Option<CrawlResultRecord>> {
            Ok(None)
        }
        async fn save_contacts(&self, _: Uuid, _: &CrawlResult) -> StoreResult<()> {
            Ok(())
        }
        async fn get_export_rows(&self, _: Uuid, _: usize) -> StoreResult<Vec<ExportRow>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_healthy_primary_is_cached() {
        let primary = FlakyStore::new("primary", true);
        let fallback = FlakyStore::new("fallback", true);
        let resolver = StoreResolver::new(Some(primary.clone()), fallback.clone());

        assert_eq!(resolver.resolve().await.unwrap().name(), "primary");
        resolver.resolve().await.unwrap();
        resolver.resolve().await.unwrap();

        // Only the first resolve probed; the cache served the rest
        assert_eq!(primary.probe_count(), 1);
        assert_eq!(fallback.probe_count(), 0);
    }

    #[tokio::test]
    async fn test_unhealthy_primary_fails_over() {
        let primary = FlakyStore::new("primary", false);
        let fallback = FlakyStore::new("fallback", true);
        let resolver = StoreResolver::new(Some(primary.clone()), fallback.clone());

        assert_eq!(resolver.resolve().await.unwrap().name(), "fallback");
        assert_eq!(resolver.selected_backend().await, Some("fallback"));

        // Operations on the resolved store work without caller-visible errors
        let store = resolver.resolve().await.unwrap();
        let result = CrawlResult::new(Uuid::new_v4(), Uuid::new_v4(), "https://acme.example");
        store.upsert_crawl_result(&result).await.unwrap();
    }

    #[tokio::test]
    async fn test_recovery_after_recheck() {
        let primary = FlakyStore::new("primary", false);
        let fallback = FlakyStore::new("fallback", true);
        let resolver = StoreResolver::new(Some(primary.clone()), fallback.clone());

        assert_eq!(resolver.resolve().await.unwrap().name(), "fallback");

        // Primary comes back, then the fallback dies: the re-probe clears
        // the cache and resolution restarts from the primary
        primary.set_healthy(true);
        fallback.set_healthy(false);
        assert_eq!(resolver.recheck().await.unwrap().name(), "primary");
        assert_eq!(resolver.selected_backend().await, Some("primary"));
    }

    #[tokio::test]
    async fn test_both_backends_down_is_explicit() {
        let primary = FlakyStore::new("primary", false);
        let fallback = FlakyStore::new("fallback", false);
        let resolver = StoreResolver::new(Some(primary), fallback);

        assert!(matches!(
            resolver.resolve().await,
            Err(StoreError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_no_primary_goes_straight_to_fallback() {
        let fallback = FlakyStore::new("fallback", true);
        let resolver = StoreResolver::new(None, fallback.clone());
        assert_eq!(resolver.resolve().await.unwrap().name(), "fallback");
        assert_eq!(fallback.probe_count(), 1);
    }
}
