//! Feed, follow and post types for gator.

use chrono::{DateTime, Utc};

use crate::GatorError;

/// A subscribed RSS feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    /// Feed ID.
    pub id: String,
    /// Display name given when the feed was added.
    pub name: String,
    /// Feed URL (globally unique).
    pub url: String,
    /// User who added the feed.
    pub user_id: String,
    /// When the feed was created.
    pub created_at: DateTime<Utc>,
    /// When the feed was last updated.
    pub updated_at: DateTime<Utc>,
    /// Watermark: when the feed was last fetched, if ever.
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// New feed for creation.
#[derive(Debug, Clone)]
pub struct NewFeed {
    /// Display name.
    pub name: String,
    /// Feed URL.
    pub url: String,
    /// Owning user ID.
    pub user_id: String,
}

impl NewFeed {
    /// Create a new feed.
    pub fn new(name: impl Into<String>, url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            user_id: user_id.into(),
        }
    }
}

/// Feed joined with the name of the user who added it.
#[derive(Debug, Clone)]
pub struct FeedWithOwner {
    /// The feed.
    pub feed: Feed,
    /// Name of the owning user.
    pub user_name: String,
}

/// A follow relationship with the names needed for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFollow {
    /// Follow ID.
    pub id: String,
    /// Following user.
    pub user_id: String,
    /// Followed feed.
    pub feed_id: String,
    /// Name of the following user.
    pub user_name: String,
    /// Name of the followed feed.
    pub feed_name: String,
    /// URL of the followed feed.
    pub feed_url: String,
    /// When the follow was created.
    pub created_at: DateTime<Utc>,
}

/// A stored post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Post ID.
    pub id: String,
    /// Post URL (globally unique).
    pub url: String,
    /// Post title.
    pub title: String,
    /// Post description, HTML entities decoded.
    pub description: Option<String>,
    /// Normalized publication date.
    pub published_at: Option<DateTime<Utc>>,
    /// Feed the post was ingested from.
    pub feed_id: String,
    /// When the post was stored.
    pub created_at: DateTime<Utc>,
    /// When the post was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Post joined with the name of the feed it came from.
#[derive(Debug, Clone)]
pub struct PostWithFeed {
    /// The post.
    pub post: Post,
    /// Name of the source feed.
    pub feed_name: String,
}

/// New post for insertion.
#[derive(Debug, Clone)]
pub struct NewPost {
    /// Feed ID.
    pub feed_id: String,
    /// Post URL.
    pub url: String,
    /// Post title.
    pub title: String,
    /// Post description.
    pub description: Option<String>,
    /// Normalized publication date.
    pub published_at: Option<DateTime<Utc>>,
}

impl NewPost {
    /// Create a new post.
    pub fn new(feed_id: impl Into<String>, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            feed_id: feed_id.into(),
            url: url.into(),
            title: title.into(),
            description: None,
            published_at: None,
        }
    }

    /// Set the description. Blank descriptions are stored as absent.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let desc = description.into();
        self.description = if desc.trim().is_empty() {
            None
        } else {
            Some(desc)
        };
        self
    }

    /// Set the published date.
    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }
}

/// Result of inserting a post keyed by URL.
///
/// A URL that is already stored is a normal outcome, not an error.
#[derive(Debug)]
pub enum UpsertOutcome {
    /// The post was new and has been stored.
    Inserted(Post),
    /// A post with the same URL already exists; nothing was written.
    AlreadyExists,
    /// The write failed for another reason.
    Failed(GatorError),
}

impl UpsertOutcome {
    /// True for both `Inserted` and `AlreadyExists`.
    pub fn is_success(&self) -> bool {
        !matches!(self, UpsertOutcome::Failed(_))
    }
}

/// Parsed feed data from external source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFeed {
    /// Channel title.
    pub title: String,
    /// Channel link.
    pub link: String,
    /// Channel description.
    pub description: String,
    /// Parsed items, in document order.
    pub items: Vec<ParsedItem>,
}

/// Parsed item data from external source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    /// Item title.
    pub title: String,
    /// Link to the original article.
    pub link: String,
    /// Item description.
    pub description: String,
    /// Raw `pubDate` text, if present.
    pub pub_date: Option<String>,
}
