//! Bounded breadth-first crawl engine.
//!
//! One invocation crawls one website: fetch page, extract contacts and
//! links, enqueue same-domain links, stop when the frontier drains or a
//! budget runs out. Per-page failures are recorded and never abort the
//! traversal.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{CrawlError, Result};
use crate::extract::{extract_links, ContactExtractor};
use crate::fetcher::PageFetcher;
use crate::types::{CrawlResult, CrawlStatus, PageError, PageVisit};
use crate::urls::{canonical_host, canonicalize, generate_seed_urls, should_skip_path};

/// Absolute page cap per crawl. Overrides any caller-requested limit and
/// cannot be raised by any plan.
pub const MAX_PAGES_HARD_CAP: usize = 50;

/// Hard wall-clock limit for one crawl. A crawl cut off here returns a
/// `Partial` result with whatever was accumulated.
pub const WALL_CLOCK_TIMEOUT: Duration = Duration::from_secs(120);

/// Pause between fetches to stay polite to small business servers.
const FETCH_DELAY: Duration = Duration::from_millis(100);

/// Already-gated crawl parameters. Produced by the plan gate; the engine
/// never re-derives limits itself.
#[derive(Debug, Clone, Copy)]
pub struct CrawlBudget {
    pub max_depth: usize,
    pub pages_limit: usize,
}

impl CrawlBudget {
    pub fn new(max_depth: usize, pages_limit: usize) -> Self {
        Self {
            max_depth,
            pages_limit,
        }
    }
}

/// A finished crawl: the persistable result plus the per-job page log.
#[derive(Debug, Clone)]
pub struct CrawlRun {
    pub result: CrawlResult,
    pub pages: Vec<PageVisit>,
}

pub struct CrawlEngine<F> {
    fetcher: F,
    extractor: ContactExtractor,
    fetch_delay: Duration,
    wall_clock: Duration,
}

impl<F: PageFetcher> CrawlEngine<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            extractor: ContactExtractor::new(),
            fetch_delay: FETCH_DELAY,
            wall_clock: WALL_CLOCK_TIMEOUT,
        }
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn with_wall_clock(mut self, limit: Duration) -> Self {
        self.wall_clock = limit.min(WALL_CLOCK_TIMEOUT);
        self
    }

    /// Crawl one website within the given budget.
    ///
    /// Errors only on an unusable seed URL; every per-page failure is
    /// absorbed into `result.errors`.
    pub async fn crawl(
        &self,
        business_id: Uuid,
        dataset_id: Uuid,
        website_url: &str,
        budget: CrawlBudget,
    ) -> Result<CrawlRun> {
        let seed = canonicalize(website_url).ok_or_else(|| CrawlError::InvalidUrl {
            url: website_url.to_string(),
        })?;
        canonical_host(&seed).ok_or_else(|| CrawlError::NoHost {
            url: website_url.to_string(),
        })?;

        let seeds = generate_seed_urls(website_url);
        let homepage = seeds.first().cloned().unwrap_or_else(|| seed.clone());
        // The root and the submitted URL are depth 0; guessed contact/about
        // probes count as one hop from the homepage, like the links that
        // would have led to them.
        let seed_depth = |url: &str| -> usize {
            if url == homepage || url == seed {
                0
            } else {
                1
            }
        };

        info!(
            url = %seed,
            max_depth = budget.max_depth,
            pages_limit = budget.pages_limit,
            seeds = seeds.len(),
            "Starting crawl"
        );

        let mut result = CrawlResult::new(business_id, dataset_id, seed.clone());
        let mut pages: Vec<PageVisit> = Vec::new();
        let mut visited: HashSet<String> = seeds.iter().cloned().collect();
        let mut frontier: VecDeque<(String, usize)> = seeds
            .iter()
            .map(|url| (url.clone(), seed_depth(url)))
            .collect();

        let pages_limit = budget.pages_limit.min(MAX_PAGES_HARD_CAP);
        let started = Instant::now();
        let mut budget_hit = false;
        let mut timed_out = false;
        let mut homepage_ok = false;

        while let Some((url, depth)) = frontier.pop_front() {
            if depth > budget.max_depth {
                continue;
            }
            if result.pages_visited >= pages_limit {
                budget_hit = true;
                break;
            }
            let remaining = self.wall_clock.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                timed_out = true;
            }

            let fetched = if timed_out {
                None
            } else {
                match tokio::time::timeout(remaining, self.fetcher.fetch(&url)).await {
                    Ok(Ok(page)) => Some(page),
                    Ok(Err(e)) => {
                        warn!(url = %url, error = %e, "Page fetch failed");
                        result.errors.push(PageError {
                            url: url.clone(),
                            reason: e.to_string(),
                        });
                        pages.push(PageVisit {
                            url: url.clone(),
                            depth,
                            ok: false,
                            fetched_at: chrono::Utc::now(),
                        });
                        None
                    }
                    Err(_) => {
                        timed_out = true;
                        None
                    }
                }
            };

            if timed_out {
                result.errors.push(PageError {
                    url: url.clone(),
                    reason: "crawl wall-clock timeout".to_string(),
                });
                break;
            }

            let Some(page) = fetched else {
                continue;
            };

            result.pages_visited += 1;
            pages.push(PageVisit {
                url: url.clone(),
                depth,
                ok: true,
                fetched_at: chrono::Utc::now(),
            });
            if url == homepage {
                homepage_ok = true;
            }

            let contacts = self.extractor.extract(&url, &page.html);
            result.emails.extend(contacts.emails);
            result.phones.extend(contacts.phones);
            result.social.merge(contacts.social);
            if contacts.is_contact_page && !result.contact_pages.contains(&url) {
                result.contact_pages.push(url.clone());
            }

            if depth < budget.max_depth {
                let Ok(base) = Url::parse(&page.final_url).or_else(|_| Url::parse(&url)) else {
                    continue;
                };
                for link in extract_links(&page.html, &base) {
                    let Some(canonical) = canonicalize(&link) else {
                        continue;
                    };
                    if visited.contains(&canonical) {
                        continue;
                    }
                    if canonical_host(&canonical) != canonical_host(&seed) {
                        continue;
                    }
                    let skip = Url::parse(&canonical)
                        .map(|u| should_skip_path(u.path()))
                        .unwrap_or(true);
                    if skip {
                        continue;
                    }
                    visited.insert(canonical.clone());
                    frontier.push_back((canonical, depth + 1));
                }
            }

            if !frontier.is_empty() && !self.fetch_delay.is_zero() {
                tokio::time::sleep(self.fetch_delay).await;
            }
        }

        result.finished_at = Some(chrono::Utc::now());
        result.crawl_status = if timed_out || budget_hit {
            CrawlStatus::Partial
        } else if homepage_ok {
            CrawlStatus::Completed
        } else {
            CrawlStatus::Partial
        };

        info!(
            url = %seed,
            pages_visited = result.pages_visited,
            emails = result.emails.len(),
            phones = result.phones.len(),
            errors = result.errors.len(),
            status = ?result.crawl_status,
            "Crawl finished"
        );

        Ok(CrawlRun { result, pages })
    }
}
