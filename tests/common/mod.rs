//! Test helpers for integration tests.
//!
//! Provides an in-memory database, seeded users and feeds, an RSS
//! document builder and a mock feed server.

#![allow(dead_code)]

use std::path::PathBuf;

use httpmock::prelude::*;
use tempfile::TempDir;

use gator::config::{Config, FetchConfig};
use gator::feed::{Feed, FeedFetcher, FeedFollowRepository, FeedRepository, NewFeed};
use gator::{Database, State, User, UserRepository};

/// Create an in-memory database with all migrations applied.
pub async fn setup_db() -> Database {
    Database::open_in_memory().await.unwrap()
}

/// Create a user with the given name.
pub async fn create_user(db: &Database, name: &str) -> User {
    UserRepository::new(db.pool()).create(name).await.unwrap()
}

/// Create a feed owned by `user` without fetching it.
pub async fn create_feed(db: &Database, user: &User, name: &str, url: &str) -> Feed {
    let feed = FeedRepository::new(db.pool())
        .create(&NewFeed::new(name, url, &user.id))
        .await
        .unwrap();
    // Keep creation times strictly ordered
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    feed
}

/// Make `user` follow `feed`.
pub async fn follow(db: &Database, user: &User, feed: &Feed) {
    FeedFollowRepository::new(db.pool())
        .create(&user.id, &feed.id)
        .await
        .unwrap();
}

/// Fetch settings with short timeouts for tests.
pub fn test_fetch_config() -> FetchConfig {
    FetchConfig {
        timeout_secs: 5,
        connect_timeout_secs: 2,
        ..FetchConfig::default()
    }
}

/// A fetcher with short timeouts.
pub fn test_fetcher() -> FeedFetcher {
    FeedFetcher::new(&test_fetch_config()).unwrap()
}

/// One `<item>` of a test feed.
pub struct TestItem<'a> {
    pub title: &'a str,
    pub link: &'a str,
    pub pub_date: Option<&'a str>,
}

impl<'a> TestItem<'a> {
    pub fn new(title: &'a str, link: &'a str, pub_date: Option<&'a str>) -> Self {
        Self {
            title,
            link,
            pub_date,
        }
    }
}

/// Build an RSS 2.0 document.
pub fn rss_xml(title: &str, items: &[TestItem<'_>]) -> String {
    let items_xml: String = items
        .iter()
        .map(|item| {
            let date = item
                .pub_date
                .map(|d| format!("<pubDate>{d}</pubDate>"))
                .unwrap_or_default();
            format!(
                "<item><title>{}</title><link>{}</link><description>About {}</description>{}</item>",
                item.title, item.link, item.title, date
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>{title}</title>
    <link>https://example.com/</link>
    <description>Test feed</description>
    {items_xml}
  </channel>
</rss>"#
    )
}

/// Mock server serving feeds.
pub struct FeedServer {
    pub server: MockServer,
}

impl FeedServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start_async().await,
        }
    }

    /// Serve `xml` at `path` and return its URL.
    pub async fn rss(&self, path: &str, xml: &str) -> String {
        self.server
            .mock_async(|when, then| {
                when.method(GET).path(path);
                then.status(200)
                    .header("Content-Type", "application/rss+xml")
                    .body(xml);
            })
            .await;
        self.server.url(path)
    }

    /// Answer `path` with the given status and return its URL.
    pub async fn status(&self, path: &str, status: u16) -> String {
        self.server
            .mock_async(|when, then| {
                when.method(GET).path(path);
                then.status(status).body("error");
            })
            .await;
        self.server.url(path)
    }
}

/// URL on which nothing listens.
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:1/feed.xml";

/// Command state backed by an in-memory database and a temp config file.
pub struct TestState {
    pub state: State,
    pub dir: TempDir,
}

impl TestState {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config_path: PathBuf = dir.path().join(".gatorconfig.toml");
        let config = Config {
            fetch: test_fetch_config(),
            ..Config::default()
        };
        config.save(&config_path).unwrap();

        let state = State::new(config, config_path, setup_db().await).unwrap();
        Self { state, dir }
    }

    /// Run a command and return its output.
    pub async fn run(&mut self, command: gator::Command) -> gator::Result<String> {
        let mut out = Vec::new();
        gator::execute(&mut self.state, command, &mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    /// Re-read the config file from disk.
    pub fn saved_config(&self) -> Config {
        Config::load(&self.state.config_path).unwrap()
    }
}
