use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::config::HarvestConfig;
use crate::crawler::{CategoryCrawler, CrawlSummary};
use crate::error::{self, CycleError, NavigationError};
use crate::models::Category;
use crate::parser;
use crate::reconciler::{CategoryReconciler, dedup_by_slug};
use crate::traits::{CategoryStore, PageFetcher, ProductPageSource, ProductStore};

/// Tally of one scrape cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub categories_parsed: usize,
    pub categories_crawled: usize,
    pub categories_failed: usize,
    pub categories_skipped: usize,
    pub pages_failed: u32,
    pub products_saved: usize,
    pub cancelled: bool,
}

impl CycleReport {
    fn record(&mut self, category: &Category, outcome: Result<CrawlSummary, NavigationError>) {
        match outcome {
            Ok(summary) => {
                info!(
                    category = %category.name,
                    pages = summary.total_pages,
                    pages_failed = summary.pages_failed,
                    products = summary.products_saved,
                    "category scraped"
                );
                self.categories_crawled += 1;
                self.pages_failed += summary.pages_failed;
                self.products_saved += summary.products_saved;
                self.cancelled |= summary.cancelled;
            }
            Err(e) if e.is_cancelled() => {
                info!(category = %category.name, "category cancelled");
                self.cancelled = true;
            }
            Err(e) => {
                error!(category = %category.name, error = %error::report(&e), "scrape category failed");
                self.categories_failed += 1;
            }
        }
    }
}

/// Drives scrape cycles: one immediately, then one per interval tick.
#[derive(Clone)]
pub struct Harvester {
    fetcher: Arc<dyn PageFetcher>,
    reconciler: Arc<CategoryReconciler>,
    products: Arc<dyn ProductStore>,
    details: Option<Arc<dyn ProductPageSource>>,
    config: HarvestConfig,
}

impl Harvester {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        categories: Arc<dyn CategoryStore>,
        products: Arc<dyn ProductStore>,
        config: HarvestConfig,
    ) -> Self {
        Self {
            fetcher,
            reconciler: Arc::new(CategoryReconciler::new(categories)),
            products,
            details: None,
            config,
        }
    }

    /// Fills product descriptions from detail pages during every crawl.
    pub fn with_descriptions(mut self, details: Arc<dyn ProductPageSource>) -> Self {
        self.details = Some(details);
        self
    }

    /// Runs cycles until `cancel` fires. A cycle in progress is finished first.
    pub async fn run(&self, cancel: &CancellationToken) {
        info!(
            interval = ?self.config.period(),
            workers = self.config.worker_slots(),
            "starting scraper"
        );

        let mut ticker = tokio::time::interval(self.config.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.run_cycle(cancel).await {
                error!(error = %error::report(&e), "scrape cycle aborted");
            }
        }

        info!("scraper stopped");
    }

    /// Runs a single cycle. The fetcher session is stopped on every exit path.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport, CycleError> {
        info!("scrape cycle started");

        let result = match self.fetcher.start().await {
            Ok(()) => self.harvest(cancel).await,
            Err(e) => Err(e.into()),
        };
        self.fetcher.stop().await;

        if let Ok(report) = &result {
            info!(
                parsed = report.categories_parsed,
                crawled = report.categories_crawled,
                failed = report.categories_failed,
                skipped = report.categories_skipped,
                pages_failed = report.pages_failed,
                products = report.products_saved,
                cancelled = report.cancelled,
                "scrape cycle completed"
            );
        }

        result
    }

    async fn harvest(&self, cancel: &CancellationToken) -> Result<CycleReport, CycleError> {
        let html = self
            .fetcher
            .fetch_main_page(cancel)
            .await
            .map_err(CycleError::LandingPage)?;

        let parsed = parser::parse_categories(&html);
        info!(count = parsed.len(), "categories parsed");

        let slug_to_id = self.reconciler.reconcile(&parsed).await?;

        let mut report = CycleReport {
            categories_parsed: parsed.len(),
            ..CycleReport::default()
        };

        let crawler = Arc::new(self.crawler());
        let semaphore = Arc::new(Semaphore::new(self.config.worker_slots()));
        let mut workers = JoinSet::new();

        for category in dedup_by_slug(&parsed) {
            let Some(&category_id) = slug_to_id.get(&category.slug) else {
                warn!(category = %category.name, slug = %category.slug, "category has no persisted id");
                report.categories_skipped += 1;
                continue;
            };

            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("cycle cancelled, no further categories launched");
                    report.cancelled = true;
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let crawler = crawler.clone();
            let cancel = cancel.clone();
            let span = info_span!("category", name = %category.name, slug = %category.slug);

            workers.spawn(
                async move {
                    let _permit = permit;
                    let outcome = crawler.crawl(&cancel, &category, category_id).await;
                    (category, outcome)
                }
                .instrument(span),
            );
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((category, outcome)) => report.record(&category, outcome),
                Err(e) => {
                    error!(error = %e, "category worker panicked");
                    report.categories_failed += 1;
                }
            }
        }

        Ok(report)
    }

    fn crawler(&self) -> CategoryCrawler {
        let crawler = CategoryCrawler::new(
            self.fetcher.clone(),
            self.products.clone(),
            self.config.markdown,
        );

        match &self.details {
            Some(details) => crawler.with_descriptions(details.clone()),
            None => crawler,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use async_trait::async_trait;
    use sqlx::Row;

    use super::*;
    use crate::database::Database;
    use crate::error::StoreError;
    use crate::models::PersistedCategory;
    use crate::testing::{RecordingProductStore, ScriptedFetcher, landing_page, listing_page};

    fn config(workers: usize) -> HarvestConfig {
        HarvestConfig {
            interval: Duration::from_secs(600),
            workers,
            markdown: 1000,
            fetch_descriptions: false,
        }
    }

    #[tokio::test]
    async fn end_to_end_cycle() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .main_page(landing_page(&[
                    ("Phones", "/phones/"),
                    ("Tablets", "/tablets/"),
                    ("Phones (sale)", "/phones/"),
                ]))
                .page("/phones/", 1, listing_page(&[("", "Ghost", "9 990")], 2))
                .page("/phones/", 2, listing_page(&[("42", "Phone", "40 780 —")], 2))
                .page("/tablets/", 1, listing_page(&[], 1)),
        );
        let db = Arc::new(Database::in_memory().await.unwrap());

        let report = Harvester::new(fetcher.clone(), db.clone(), db.clone(), config(5))
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.categories_crawled, 2);
        assert_eq!(report.products_saved, 1);

        let categories = db.get_all_categories().await.unwrap();
        assert_eq!(categories.len(), 2);

        let rows = sqlx::query("SELECT external_id, original_price, price FROM products")
            .fetch_all(db.pool())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String, _>("external_id"), "42");
        assert_eq!(rows[0].get::<i64, _>("original_price"), 40_780);
        assert_eq!(rows[0].get::<i64, _>("price"), 39_780);

        assert_eq!(fetcher.starts.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_category_does_not_fail_cycle() {
        let fetcher = ScriptedFetcher::new()
            .main_page(landing_page(&[("Phones", "/phones/"), ("Tablets", "/tablets/")]))
            .page("/tablets/", 1, listing_page(&[("1", "Tablet", "12 000")], 1));
        let db = Arc::new(Database::in_memory().await.unwrap());
        let products = Arc::new(RecordingProductStore::default());

        let report = Harvester::new(Arc::new(fetcher), db, products.clone(), config(2))
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.categories_failed, 1);
        assert_eq!(report.categories_crawled, 1);
        assert_eq!(products.products()[0].price, 11_000);
    }

    #[tokio::test]
    async fn single_worker_crawls_every_category() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .main_page(landing_page(&[("A", "/a/"), ("B", "/b/"), ("C", "/c/")]))
                .page("/a/", 1, listing_page(&[], 1))
                .page("/b/", 1, listing_page(&[], 1))
                .page("/c/", 1, listing_page(&[], 1)),
        );
        let db = Arc::new(Database::in_memory().await.unwrap());
        let products = Arc::new(RecordingProductStore::default());

        let report = Harvester::new(fetcher.clone(), db, products, config(1))
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.categories_crawled, 3);
        let mut paths: Vec<_> = fetcher.calls().into_iter().map(|(path, _)| path).collect();
        paths.sort();
        assert_eq!(paths, ["/a/", "/b/", "/c/"]);
    }

    #[tokio::test]
    async fn start_failure_still_stops_session() {
        let fetcher = Arc::new(ScriptedFetcher::new().failing_start());
        let db = Arc::new(Database::in_memory().await.unwrap());

        let err = Harvester::new(fetcher.clone(), db.clone(), db, config(5))
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CycleError::FetchInit(_)));
        assert_eq!(fetcher.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn landing_page_failure_aborts_before_reconcile() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let db = Arc::new(Database::in_memory().await.unwrap());

        let err = Harvester::new(fetcher.clone(), db.clone(), db.clone(), config(5))
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CycleError::LandingPage(_)));
        assert!(db.get_all_categories().await.unwrap().is_empty());
        assert_eq!(fetcher.stops.load(Ordering::SeqCst), 1);
    }

    /// Persists categories but never reports one slug back
    struct ForgetfulStore {
        inner: Database,
        forgotten: &'static str,
    }

    #[async_trait]
    impl CategoryStore for ForgetfulStore {
        async fn upsert_categories(&self, categories: &[Category]) -> Result<(), StoreError> {
            self.inner.upsert_categories(categories).await
        }

        async fn get_all_categories(&self) -> Result<Vec<PersistedCategory>, StoreError> {
            let mut all = self.inner.get_all_categories().await?;
            all.retain(|category| category.slug != self.forgotten);
            Ok(all)
        }
    }

    #[tokio::test]
    async fn unresolved_category_is_skipped() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .main_page(landing_page(&[("Phones", "/phones/"), ("Tablets", "/tablets/")]))
                .page("/phones/", 1, listing_page(&[], 1))
                .page("/tablets/", 1, listing_page(&[], 1)),
        );
        let store = Arc::new(ForgetfulStore {
            inner: Database::in_memory().await.unwrap(),
            forgotten: "tablets",
        });
        let products = Arc::new(RecordingProductStore::default());

        let report = Harvester::new(fetcher.clone(), store, products, config(5))
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.categories_skipped, 1);
        assert_eq!(report.categories_crawled, 1);
        assert_eq!(fetcher.calls(), [("/phones/".to_string(), 1)]);
    }

    #[tokio::test]
    async fn cancellation_stops_launching_categories() {
        let cancel = CancellationToken::new();
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .main_page(landing_page(&[("A", "/a/"), ("B", "/b/"), ("C", "/c/")]))
                .page("/a/", 1, listing_page(&[], 1))
                .page("/b/", 1, listing_page(&[], 1))
                .page("/c/", 1, listing_page(&[], 1))
                .cancel_after("/a/", 1, cancel.clone()),
        );
        let db = Arc::new(Database::in_memory().await.unwrap());
        let products = Arc::new(RecordingProductStore::default());

        // A single slot forces each launch to wait for the previous crawl.
        let report = Harvester::new(fetcher.clone(), db, products, config(1))
            .run_cycle(&cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(fetcher.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_exits_once_cancelled() {
        let cancel = CancellationToken::new();
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .main_page(landing_page(&[("Phones", "/phones/")]))
                .page("/phones/", 1, listing_page(&[], 1))
                .cancel_after("/phones/", 1, cancel.clone()),
        );
        let db = Arc::new(Database::in_memory().await.unwrap());

        tokio::time::timeout(
            Duration::from_secs(5),
            Harvester::new(fetcher.clone(), db.clone(), db, config(5)).run(&cancel),
        )
        .await
        .unwrap();

        assert_eq!(fetcher.starts.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_interval_and_unbounded_workers_still_run() {
        let cancel = CancellationToken::new();
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .main_page(landing_page(&[("Phones", "/phones/")]))
                .page("/phones/", 1, listing_page(&[], 1))
                .cancel_after("/phones/", 1, cancel.clone()),
        );
        let db = Arc::new(Database::in_memory().await.unwrap());
        let config = HarvestConfig {
            interval: Duration::ZERO,
            workers: usize::MAX,
            ..config(5)
        };

        tokio::time::timeout(
            Duration::from_secs(5),
            Harvester::new(fetcher.clone(), db.clone(), db, config).run(&cancel),
        )
        .await
        .unwrap();

        assert_eq!(fetcher.starts.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn run_with_cancelled_token_never_starts_a_cycle() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let fetcher = Arc::new(ScriptedFetcher::new());
        let db = Arc::new(Database::in_memory().await.unwrap());

        Harvester::new(fetcher.clone(), db.clone(), db, config(5))
            .run(&cancel)
            .await;

        assert_eq!(fetcher.starts.load(Ordering::SeqCst), 0);
    }
}
