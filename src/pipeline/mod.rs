//! Refresh orchestration: registry lookup → freshness gate → fetch →
//! extract → upsert → status write → read-back.
//!
//! One sequential pass per source. Parallelism exists only across sources
//! (refresh-all fans out under a semaphore); there is no locking around the
//! freshness check, so two concurrent refreshes of the same source may both
//! scrape. The upsert key makes that harmless.

use crate::config::AppConfig;
use crate::extractor;
use crate::fetcher::{FirecrawlFetcher, PageFetcher};
use crate::models::ListingRecord;
use crate::sources;
use crate::status;
use crate::storage::Repository;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

// ── Error taxonomy ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RefreshError {
    /// Caller error; nothing was mutated.
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// Caller/config error; nothing was mutated.
    #[error("scraping API key not configured (set FIRECRAWL_API_KEY)")]
    MissingApiKey,

    /// Upstream fetch failed; recorded into the source's status row.
    #[error("fetch failed for {source}: {message}")]
    Fetch { source: String, message: String },

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

// ── Outcomes ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RefreshOutcome {
    pub listings: Vec<ListingRecord>,
    /// True when the TTL gate short-circuited the scrape.
    pub cached: bool,
}

#[derive(Debug, Default)]
pub struct RefreshAllStats {
    pub scraped: usize,
    pub cached: usize,
    pub listings: usize,
    pub errors: usize,
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

pub struct Pipeline {
    config: AppConfig,
    repo: Arc<Repository>,
    fetcher: Arc<dyn PageFetcher>,
}

impl Pipeline {
    pub fn new(config: AppConfig, repo: Arc<Repository>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { config, repo, fetcher }
    }

    /// Wire up the production pipeline: open the store, apply migrations,
    /// build the scraping-API client. A missing API key is rejected here,
    /// before any state is touched.
    pub fn from_config(config: AppConfig) -> Result<Self, RefreshError> {
        let api_key = config
            .fetcher
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(RefreshError::MissingApiKey)?;

        let repo = Repository::open(&config.storage.db_path).map_err(RefreshError::Storage)?;
        if config.storage.run_migrations {
            repo.run_migrations().map_err(RefreshError::Storage)?;
        }

        let fetcher =
            FirecrawlFetcher::new(&config.fetcher, api_key).map_err(RefreshError::Storage)?;

        Ok(Self::new(config, Arc::new(repo), Arc::new(fetcher)))
    }

    /// Refresh one source, serving from the store when still fresh.
    pub async fn refresh(&self, source_id: &str, force: bool) -> Result<RefreshOutcome, RefreshError> {
        let cfg = sources::config_for(source_id)
            .ok_or_else(|| RefreshError::UnknownSource(source_id.to_string()))?;

        let now = Utc::now().naive_utc();
        let last_scraped_at = self
            .repo
            .get_status(cfg.name)
            .map_err(RefreshError::Storage)?
            .and_then(|s| s.last_scraped_at);

        if !status::should_scrape(force, last_scraped_at, now) {
            info!("{}: fresh within TTL, serving stored listings", cfg.name);
            let listings = self.read_back(cfg.name)?;
            return Ok(RefreshOutcome { listings, cached: true });
        }

        self.repo.mark_scraping(cfg.name).map_err(RefreshError::Storage)?;
        info!("{}: scraping {}", cfg.name, cfg.search_url);

        let page = match self.fetcher.fetch(cfg.search_url).await {
            Ok(page) => page,
            Err(e) => {
                let message = format!("{:#}", e);
                if let Err(se) = self.repo.mark_error(cfg.name, &message) {
                    warn!("{}: could not record scrape error: {:#}", cfg.name, se);
                }
                return Err(RefreshError::Fetch { source: cfg.name.to_string(), message });
            }
        };

        let mut rng = StdRng::from_os_rng();
        let records = extractor::extract(&page, cfg, now, &mut rng);

        // Zero extracted listings is a successful (if empty) scrape.
        let written = self.repo.upsert_listings(&records).map_err(RefreshError::Storage)?;
        self.repo
            .mark_completed(cfg.name, records.len())
            .map_err(RefreshError::Storage)?;
        info!("{}: {} listings extracted, {} rows written", cfg.name, records.len(), written);

        let listings = self.read_back(cfg.name)?;
        Ok(RefreshOutcome { listings, cached: false })
    }

    /// Refresh every registered source, a few at a time. Per-source failures
    /// are counted, not propagated; order across sources is not guaranteed.
    pub async fn refresh_all(self: Arc<Self>, force: bool) -> RefreshAllStats {
        let sem = Arc::new(Semaphore::new(self.config.pipeline.concurrency.max(1)));
        let mut handles = Vec::new();

        for cfg in sources::all() {
            let pipeline = Arc::clone(&self);
            let sem = Arc::clone(&sem);
            let name = cfg.name;

            handles.push((name, tokio::spawn(async move {
                let _permit = sem.acquire().await.map_err(|e| RefreshError::Storage(e.into()))?;
                pipeline.refresh(name, force).await
            })));
        }

        let mut stats = RefreshAllStats::default();
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(outcome)) => {
                    if outcome.cached {
                        stats.cached += 1;
                    } else {
                        stats.scraped += 1;
                    }
                    stats.listings += outcome.listings.len();
                }
                Ok(Err(e)) => {
                    warn!("{}: {}", name, e);
                    stats.errors += 1;
                }
                Err(e) => {
                    error!("Task panic for {}: {}", name, e);
                    stats.errors += 1;
                }
            }
        }

        stats
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    fn read_back(&self, source: &str) -> Result<Vec<ListingRecord>, RefreshError> {
        self.repo
            .read_fresh(Some(source), self.config.pipeline.read_limit)
            .map_err(RefreshError::Storage)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FetchedPage, ScrapeStatus};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFetcher {
        page: FetchedPage,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn with_markdown(markdown: &str) -> Arc<Self> {
            Arc::new(Self {
                page: FetchedPage { markdown: markdown.to_string(), ..Default::default() },
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.page.clone())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl PageFetcher for FailingFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedPage> {
            bail!("Scraping API returned HTTP 502: bad gateway")
        }
    }

    fn pipeline_with(fetcher: Arc<dyn PageFetcher>) -> Pipeline {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        Pipeline::new(AppConfig::default(), Arc::new(repo), fetcher)
    }

    const BMW_PAGE: &str = "BMW 320d Touring\n24.500 €\n98.000 km\n2019 m.\n";

    #[tokio::test]
    async fn refresh_scrapes_and_persists() {
        let fetcher = StubFetcher::with_markdown(BMW_PAGE);
        let pipeline = pipeline_with(fetcher.clone());

        let outcome = pipeline.refresh("autoplius", false).await.unwrap();
        assert!(!outcome.cached);
        assert_eq!(outcome.listings.len(), 1);
        assert_eq!(outcome.listings[0].brand, "BMW");

        let st = pipeline.repository().get_status("autoplius").unwrap().unwrap();
        assert_eq!(st.status, ScrapeStatus::Completed);
        assert_eq!(st.last_listing_count, Some(1));
    }

    #[tokio::test]
    async fn second_refresh_within_ttl_served_from_store() {
        let fetcher = StubFetcher::with_markdown(BMW_PAGE);
        let pipeline = pipeline_with(fetcher.clone());

        let first = pipeline.refresh("autoplius", false).await.unwrap();
        let second = pipeline.refresh("autoplius", false).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.listings.len(), 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_ttl() {
        let fetcher = StubFetcher::with_markdown(BMW_PAGE);
        let pipeline = pipeline_with(fetcher.clone());

        pipeline.refresh("autoplius", false).await.unwrap();
        let forced = pipeline.refresh("autoplius", true).await.unwrap();

        assert!(!forced.cached);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_source_rejected_without_state() {
        let pipeline = pipeline_with(StubFetcher::with_markdown(BMW_PAGE));

        let err = pipeline.refresh("craigslist", false).await.unwrap_err();
        assert!(matches!(err, RefreshError::UnknownSource(_)));
        assert!(pipeline.repository().list_statuses().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_recorded_as_error_status() {
        let pipeline = pipeline_with(Arc::new(FailingFetcher));

        let err = pipeline.refresh("autoplius", false).await.unwrap_err();
        assert!(matches!(err, RefreshError::Fetch { .. }));

        let st = pipeline.repository().get_status("autoplius").unwrap().unwrap();
        assert_eq!(st.status, ScrapeStatus::Error);
        assert!(st.last_error.unwrap().contains("502"));
        // A failed scrape never updates the freshness timestamp.
        assert!(st.last_scraped_at.is_none());
    }

    #[tokio::test]
    async fn empty_extraction_is_success() {
        let pipeline = pipeline_with(StubFetcher::with_markdown("nieko idomaus cia nera\n"));

        let outcome = pipeline.refresh("autoplius", false).await.unwrap();
        assert!(outcome.listings.is_empty());
        assert!(!outcome.cached);

        let st = pipeline.repository().get_status("autoplius").unwrap().unwrap();
        assert_eq!(st.status, ScrapeStatus::Completed);
        assert_eq!(st.last_listing_count, Some(0));
    }

    #[tokio::test]
    async fn refresh_all_counts_outcomes() {
        let pipeline = Arc::new(pipeline_with(StubFetcher::with_markdown(BMW_PAGE)));

        let stats = pipeline.refresh_all(false).await;
        assert_eq!(stats.scraped, crate::sources::all().count());
        assert_eq!(stats.errors, 0);
        assert!(stats.listings >= stats.scraped);
    }
}
