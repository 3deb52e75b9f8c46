//! Feed aggregation loop for gator.
//!
//! Each tick picks the feed with the oldest watermark, fetches it, stores
//! its items and advances the watermark. Ticks run strictly one after the
//! other with a fixed sleep in between, until the shutdown signal fires.

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::datetime::normalize_pub_date;
use crate::db::Database;
use crate::feed::fetcher::{FeedFetcher, FetchError};
use crate::feed::repository::{FeedRepository, PostRepository};
use crate::feed::types::{Feed, NewPost, ParsedItem, UpsertOutcome};
use crate::GatorError;

/// Where the aggregator is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    /// Waiting to select the next feed.
    Idle,
    /// Fetching the selected feed.
    Fetching,
    /// Storing the fetched items.
    Ingesting,
    /// Advancing the feed's watermark.
    Watermarking,
    /// Waiting for the next tick.
    Sleeping,
}

/// Loop-owned state threaded through every tick.
#[derive(Debug)]
pub struct AggregatorContext {
    state: AggregatorState,
    ticks: u64,
    shutdown: watch::Receiver<bool>,
}

impl AggregatorContext {
    /// Create a context listening on the given shutdown signal.
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            state: AggregatorState::Idle,
            ticks: 0,
            shutdown,
        }
    }

    /// Current state.
    pub fn state(&self) -> AggregatorState {
        self.state
    }

    /// Number of ticks started so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Whether shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolve once shutdown is requested.
    ///
    /// Never resolves if the sender is dropped without signalling.
    pub async fn cancelled(&mut self) {
        if self.shutdown.wait_for(|&stop| stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    fn transition(&mut self, next: AggregatorState) {
        debug!("Aggregator state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Summary of a tick that fetched and ingested a feed.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// The feed that was processed.
    pub feed: Feed,
    /// Posts stored for the first time.
    pub inserted: usize,
    /// Items whose URL was already stored.
    pub duplicates: usize,
    /// Items dropped because of a bad date, missing link or store failure.
    pub skipped: usize,
    /// Whether the watermark update touched the feed row.
    pub watermarked: bool,
}

impl TickReport {
    fn new(feed: Feed) -> Self {
        Self {
            feed,
            inserted: 0,
            duplicates: 0,
            skipped: 0,
            watermarked: false,
        }
    }
}

/// Result of a single tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// There are no feeds to fetch.
    NoFeeds,
    /// Selecting the next feed failed.
    SelectionFailed(GatorError),
    /// The feed could not be fetched; its watermark is unchanged.
    FetchFailed {
        /// The feed that failed.
        feed: Feed,
        /// Why it failed.
        error: FetchError,
    },
    /// Shutdown was requested before ingestion started.
    Cancelled,
    /// The feed was fetched and ingested.
    Completed(TickReport),
}

/// Periodic feed aggregator.
pub struct Aggregator {
    db: Database,
    fetcher: FeedFetcher,
    interval: Duration,
}

impl Aggregator {
    /// Create a new aggregator that sleeps `interval` between ticks.
    pub fn new(db: Database, fetcher: FeedFetcher, interval: Duration) -> Self {
        Self {
            db,
            fetcher,
            interval,
        }
    }

    /// Run ticks until shutdown is requested.
    ///
    /// Returns the number of ticks that were started.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> u64 {
        info!("Collecting feeds every {:?}", self.interval);

        let mut ctx = AggregatorContext::new(shutdown);

        loop {
            if let TickOutcome::Cancelled = self.tick(&mut ctx).await {
                break;
            }

            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            ctx.transition(AggregatorState::Idle);
        }

        info!("Aggregator stopped after {} tick(s)", ctx.ticks);
        ctx.ticks
    }

    /// Process the next feed once.
    ///
    /// Shutdown is honoured before selection and while fetching. Once
    /// ingestion has started it always runs to the watermark update.
    pub async fn tick(&self, ctx: &mut AggregatorContext) -> TickOutcome {
        if ctx.is_cancelled() {
            return TickOutcome::Cancelled;
        }
        ctx.ticks += 1;

        let feeds = FeedRepository::new(self.db.pool());

        let feed = match feeds.next_to_fetch().await {
            Ok(feed) => feed,
            Err(GatorError::NoFeeds) => {
                info!("No feeds to fetch");
                ctx.transition(AggregatorState::Sleeping);
                return TickOutcome::NoFeeds;
            }
            Err(e) => {
                error!("Failed to select next feed: {}", e);
                ctx.transition(AggregatorState::Sleeping);
                return TickOutcome::SelectionFailed(e);
            }
        };

        ctx.transition(AggregatorState::Fetching);
        debug!("Fetching feed '{}' from {}", feed.name, feed.url);

        let fetched = tokio::select! {
            biased;
            _ = ctx.cancelled() => None,
            result = self.fetcher.fetch(&feed.url) => Some(result),
        };

        let parsed = match fetched {
            None => {
                info!("Shutdown requested while fetching feed '{}'", feed.name);
                ctx.transition(AggregatorState::Idle);
                return TickOutcome::Cancelled;
            }
            Some(Err(e)) => {
                warn!("Failed to fetch feed '{}' ({}): {}", feed.name, feed.url, e);
                ctx.transition(AggregatorState::Sleeping);
                return TickOutcome::FetchFailed { feed, error: e };
            }
            Some(Ok(parsed)) => parsed,
        };

        ctx.transition(AggregatorState::Ingesting);
        let mut report = self.ingest(&feed, &parsed.items).await;

        ctx.transition(AggregatorState::Watermarking);
        match feeds.mark_fetched(&feed.id, Utc::now()).await {
            Ok(updated) => {
                if !updated {
                    warn!("Watermark for feed '{}' was not advanced", feed.name);
                }
                report.watermarked = updated;
            }
            Err(e) => error!("Failed to mark feed '{}' fetched: {}", feed.name, e),
        }

        info!(
            "Feed '{}' collected: {} new, {} duplicate, {} skipped",
            feed.name, report.inserted, report.duplicates, report.skipped
        );

        ctx.transition(AggregatorState::Sleeping);
        TickOutcome::Completed(report)
    }

    /// Store the items of a fetched feed in document order.
    ///
    /// A bad item is logged and skipped; the rest are still stored.
    pub(crate) async fn ingest(&self, feed: &Feed, items: &[ParsedItem]) -> TickReport {
        let posts = PostRepository::new(self.db.pool());
        let mut report = TickReport::new(feed.clone());

        for item in items {
            if item.link.is_empty() {
                warn!("Skipping item '{}' in feed '{}': no link", item.title, feed.name);
                report.skipped += 1;
                continue;
            }

            let mut new_post = NewPost::new(&feed.id, &item.link, &item.title)
                .with_description(&item.description);

            if let Some(raw) = &item.pub_date {
                match normalize_pub_date(raw) {
                    Ok(published_at) => new_post = new_post.with_published_at(published_at),
                    Err(e) => {
                        warn!("Skipping {}: {}", item.link, e);
                        report.skipped += 1;
                        continue;
                    }
                }
            }

            match posts.upsert(&new_post).await {
                UpsertOutcome::Inserted(post) => {
                    info!("Stored post: {}", post.title);
                    report.inserted += 1;
                }
                UpsertOutcome::AlreadyExists => {
                    debug!("Post already stored: {}", item.link);
                    report.duplicates += 1;
                }
                UpsertOutcome::Failed(e) => {
                    error!("Failed to store post {}: {}", item.link, e);
                    report.skipped += 1;
                }
            }
        }

        report
    }
}

#[cfg(all(test, feature = "sqlite", not(feature = "postgres")))]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::db::UserRepository;
    use crate::feed::types::NewFeed;

    async fn setup() -> (Database, Aggregator) {
        let db = Database::open_in_memory().await.unwrap();
        let fetcher = FeedFetcher::new(&FetchConfig::default()).unwrap();
        let aggregator = Aggregator::new(db.clone(), fetcher, Duration::from_secs(3600));
        (db, aggregator)
    }

    async fn create_feed(db: &Database) -> Feed {
        create_feed_at(db, "https://feed.example/rss").await
    }

    async fn create_feed_at(db: &Database, url: &str) -> Feed {
        let user = UserRepository::new(db.pool()).create("kahya").await.unwrap();
        FeedRepository::new(db.pool())
            .create(&NewFeed::new("Test", url, &user.id))
            .await
            .unwrap()
    }

    /// Make inserts of one post URL fail with a non-unique database error.
    async fn fail_inserts_of(db: &Database, url: &str) {
        sqlx::raw_sql(&format!(
            "CREATE TRIGGER fail_post_insert BEFORE INSERT ON posts \
             WHEN NEW.url = '{url}' \
             BEGIN SELECT RAISE(ABORT, 'insert rejected'); END;"
        ))
        .execute(db.pool())
        .await
        .unwrap();
    }

    fn item(link: &str, pub_date: Option<&str>) -> ParsedItem {
        ParsedItem {
            title: format!("Title of {link}"),
            link: link.to_string(),
            description: String::new(),
            pub_date: pub_date.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_context_starts_idle() {
        let (_tx, rx) = watch::channel(false);
        let ctx = AggregatorContext::new(rx);
        assert_eq!(ctx.state(), AggregatorState::Idle);
        assert_eq!(ctx.ticks(), 0);
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_signal() {
        let (tx, rx) = watch::channel(false);
        let mut ctx = AggregatorContext::new(rx);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), ctx.cancelled())
            .await
            .unwrap();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_pends_when_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        let mut ctx = AggregatorContext::new(rx);
        drop(tx);

        let result = tokio::time::timeout(Duration::from_millis(50), ctx.cancelled()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tick_without_feeds() {
        let (_db, aggregator) = setup().await;
        let (_tx, rx) = watch::channel(false);
        let mut ctx = AggregatorContext::new(rx);

        let outcome = aggregator.tick(&mut ctx).await;

        assert!(matches!(outcome, TickOutcome::NoFeeds));
        assert_eq!(ctx.state(), AggregatorState::Sleeping);
        assert_eq!(ctx.ticks(), 1);
    }

    #[tokio::test]
    async fn test_tick_cancelled_before_selection() {
        let (db, aggregator) = setup().await;
        let feed = create_feed(&db).await;
        let (tx, rx) = watch::channel(false);
        let mut ctx = AggregatorContext::new(rx);
        tx.send(true).unwrap();

        let outcome = aggregator.tick(&mut ctx).await;

        assert!(matches!(outcome, TickOutcome::Cancelled));
        assert_eq!(ctx.ticks(), 0);
        let stored = FeedRepository::new(db.pool())
            .get_by_id(&feed.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.last_fetched_at.is_none());
    }

    #[tokio::test]
    async fn test_tick_selection_failure() {
        let (db, aggregator) = setup().await;
        let (_tx, rx) = watch::channel(false);
        let mut ctx = AggregatorContext::new(rx);
        db.pool().close().await;

        let outcome = aggregator.tick(&mut ctx).await;

        assert!(matches!(outcome, TickOutcome::SelectionFailed(_)));
        assert_eq!(ctx.state(), AggregatorState::Sleeping);
        assert_eq!(ctx.ticks(), 1);
    }

    #[tokio::test]
    async fn test_ingest_continues_after_store_failure() {
        let (db, aggregator) = setup().await;
        let feed = create_feed(&db).await;
        fail_inserts_of(&db, "https://feed.example/2").await;

        let items = vec![
            item("https://feed.example/1", None),
            item("https://feed.example/2", None),
            item("https://feed.example/3", None),
        ];
        let report = aggregator.ingest(&feed, &items).await;

        assert_eq!(report.inserted, 2);
        assert_eq!(report.duplicates, 0);
        assert_eq!(report.skipped, 1);

        let posts = PostRepository::new(db.pool());
        assert_eq!(posts.count_by_url("https://feed.example/1").await.unwrap(), 1);
        assert_eq!(posts.count_by_url("https://feed.example/2").await.unwrap(), 0);
        assert_eq!(posts.count_by_url("https://feed.example/3").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tick_watermarks_after_store_failure() {
        let server = httpmock::MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/feed.xml");
                then.status(200)
                    .header("content-type", "application/rss+xml")
                    .body(concat!(
                        r#"<?xml version="1.0"?><rss version="2.0"><channel>"#,
                        "<title>Test</title><link>https://feed.example</link><description>d</description>",
                        "<item><title>One</title><link>https://feed.example/1</link></item>",
                        "<item><title>Two</title><link>https://feed.example/2</link></item>",
                        "<item><title>Three</title><link>https://feed.example/3</link></item>",
                        "</channel></rss>"
                    ));
            })
            .await;

        let (db, aggregator) = setup().await;
        let feed = create_feed_at(&db, &server.url("/feed.xml")).await;
        fail_inserts_of(&db, "https://feed.example/2").await;
        let (_tx, rx) = watch::channel(false);
        let mut ctx = AggregatorContext::new(rx);

        let outcome = aggregator.tick(&mut ctx).await;

        let report = match outcome {
            TickOutcome::Completed(report) => report,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 1);
        assert!(report.watermarked);
        assert_eq!(ctx.state(), AggregatorState::Sleeping);

        let stored = FeedRepository::new(db.pool())
            .get_by_id(&feed.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_ingest_skips_bad_date() {
        let (db, aggregator) = setup().await;
        let feed = create_feed(&db).await;

        let items = vec![
            item("https://feed.example/1", Some("Sun, 03 Dec 2023 00:00:00 +0000")),
            item("https://feed.example/2", Some("yesterday-ish")),
            item("https://feed.example/3", Some("Mon, 04 Dec 2023 10:30:00 +0100")),
        ];
        let report = aggregator.ingest(&feed, &items).await;

        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.duplicates, 0);

        let posts = PostRepository::new(db.pool());
        assert_eq!(posts.count_by_url("https://feed.example/1").await.unwrap(), 1);
        assert_eq!(posts.count_by_url("https://feed.example/2").await.unwrap(), 0);
        assert_eq!(posts.count_by_url("https://feed.example/3").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ingest_missing_date_and_link() {
        let (db, aggregator) = setup().await;
        let feed = create_feed(&db).await;

        let items = vec![item("https://feed.example/undated", None), item("", None)];
        let report = aggregator.ingest(&feed, &items).await;

        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped, 1);

        let post = PostRepository::new(db.pool())
            .get_by_url("https://feed.example/undated")
            .await
            .unwrap()
            .unwrap();
        assert!(post.published_at.is_none());
    }

    #[tokio::test]
    async fn test_ingest_counts_duplicates() {
        let (db, aggregator) = setup().await;
        let feed = create_feed(&db).await;
        let items = vec![item("https://feed.example/1", None)];

        aggregator.ingest(&feed, &items).await;
        let report = aggregator.ingest(&feed, &items).await;

        assert_eq!(report.inserted, 0);
        assert_eq!(report.duplicates, 1);
        assert_eq!(
            PostRepository::new(db.pool()).count_by_feed(&feed.id).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_run_stops_when_already_cancelled() {
        let (_db, aggregator) = setup().await;
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        assert_eq!(aggregator.run(rx).await, 0);
    }

    #[tokio::test]
    async fn test_run_stops_during_sleep() {
        let (_db, aggregator) = setup().await;
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let ticks = tokio::time::timeout(Duration::from_secs(5), aggregator.run(rx))
            .await
            .unwrap();
        assert_eq!(ticks, 1);
    }
}
