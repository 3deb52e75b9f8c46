//! RSS feed fetcher.
//!
//! This module fetches a feed over HTTP and parses it into a
//! [`ParsedFeed`], decoding HTML entities in titles and descriptions.
//! A feed is either parsed whole or rejected; items are never dropped
//! individually because of XML errors.

use std::io::BufReader;
use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use rss::Channel;
use thiserror::Error;

use crate::config::FetchConfig;
use crate::feed::types::{ParsedFeed, ParsedItem};
use crate::{GatorError, Result};

/// Error returned when a feed cannot be retrieved or parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transport failure: DNS, connection, timeout.
    #[error("failed to fetch feed: {0}")]
    Network(String),
    /// The server answered with a non-success status.
    #[error("HTTP error: {0}")]
    Status(u16),
    /// The response body could not be read fully or is too large.
    #[error("failed to read response: {0}")]
    BadBody(String),
    /// The body is not a well-formed RSS channel.
    #[error("failed to parse feed: {0}")]
    Parse(String),
}

/// RSS feed fetcher holding a configured HTTP client.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: Client,
    max_feed_size: u64,
}

impl FeedFetcher {
    /// Create a new fetcher from the fetch configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| GatorError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_feed_size: config.max_feed_size_bytes,
        })
    }

    /// Fetch and parse the feed at the given URL.
    ///
    /// No retries happen here; a failed feed is retried on a later tick.
    pub async fn fetch(&self, url: &str) -> std::result::Result<ParsedFeed, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > self.max_feed_size {
                return Err(FetchError::BadBody(format!(
                    "feed too large: {} bytes (max {} bytes)",
                    content_length, self.max_feed_size
                )));
            }
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Network(e.to_string())
            } else {
                FetchError::BadBody(e.to_string())
            }
        })?;

        if bytes.len() as u64 > self.max_feed_size {
            return Err(FetchError::BadBody(format!(
                "feed too large: {} bytes (max {} bytes)",
                bytes.len(),
                self.max_feed_size
            )));
        }

        parse_feed(&bytes)
    }
}

/// Validate a feed URL before it is stored.
///
/// The URL must be absolute, use http or https, and name a host.
pub fn validate_url(url: &str) -> Result<()> {
    let parsed =
        url::Url::parse(url).map_err(|e| GatorError::Validation(format!("invalid URL: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(GatorError::Validation(format!(
                "unsupported URL scheme: {scheme}"
            )));
        }
    }

    if parsed.host().is_none() {
        return Err(GatorError::Validation("URL has no host".to_string()));
    }

    Ok(())
}

/// Parse RSS bytes into a [`ParsedFeed`].
pub fn parse_feed(bytes: &[u8]) -> std::result::Result<ParsedFeed, FetchError> {
    check_well_formed(bytes)?;

    let channel = Channel::read_from(BufReader::new(bytes))
        .map_err(|e| FetchError::Parse(e.to_string()))?;

    let items = channel
        .items()
        .iter()
        .map(|item| ParsedItem {
            title: unescape(item.title().unwrap_or_default()),
            link: item.link().unwrap_or_default().trim().to_string(),
            description: unescape(item.description().unwrap_or_default()),
            pub_date: item
                .pub_date()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        })
        .collect();

    Ok(ParsedFeed {
        title: unescape(channel.title()),
        link: channel.link().trim().to_string(),
        description: unescape(channel.description()),
        items,
    })
}

/// Reject documents that are not well-formed XML.
///
/// The RSS reader keeps undefined entities such as `&nbsp;` as raw text,
/// so every text node and attribute value is unescaped here first.
fn check_well_formed(bytes: &[u8]) -> std::result::Result<(), FetchError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(text)) => {
                text.unescape()
                    .map_err(|e| FetchError::Parse(e.to_string()))?;
            }
            Ok(Event::Start(start)) | Ok(Event::Empty(start)) => {
                for attr in start.attributes() {
                    attr.map_err(|e| FetchError::Parse(e.to_string()))?
                        .unescape_value()
                        .map_err(|e| FetchError::Parse(e.to_string()))?;
                }
            }
            Ok(Event::Eof) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(FetchError::Parse(e.to_string())),
        }
        buf.clear();
    }
}

/// Decode HTML entities left after XML unescaping (e.g. `&amp;#8217;`).
fn unescape(text: &str) -> String {
    html_escape::decode_html_entities(text.trim()).into_owned()
}
