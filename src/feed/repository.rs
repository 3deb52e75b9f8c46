//! Feed, follow and post repositories for gator.

use chrono::{DateTime, Utc};

use super::types::{
    Feed, FeedFollow, FeedWithOwner, NewFeed, NewPost, Post, PostWithFeed, UpsertOutcome,
};
use crate::datetime::{parse_db_timestamp, to_db_timestamp};
use crate::db::{map_unique_violation, new_id, DbPool};
use crate::{GatorError, Result};

const FEED_COLUMNS: &str = "id, name, url, user_id, created_at, updated_at, last_fetched_at";

const POST_COLUMNS: &str =
    "id, url, title, description, published_at, feed_id, created_at, updated_at";

/// Row type for feed from database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedRow {
    id: String,
    name: String,
    url: String,
    user_id: String,
    created_at: String,
    updated_at: String,
    last_fetched_at: Option<String>,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            id: row.id,
            name: row.name,
            url: row.url,
            user_id: row.user_id,
            created_at: parse_db_timestamp(&row.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_db_timestamp(&row.updated_at).unwrap_or_else(Utc::now),
            last_fetched_at: row.last_fetched_at.and_then(|s| parse_db_timestamp(&s)),
        }
    }
}

/// Row type for feed joined with its owner.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedWithOwnerRow {
    #[sqlx(flatten)]
    feed: FeedRow,
    user_name: String,
}

impl From<FeedWithOwnerRow> for FeedWithOwner {
    fn from(row: FeedWithOwnerRow) -> Self {
        FeedWithOwner {
            feed: Feed::from(row.feed),
            user_name: row.user_name,
        }
    }
}

/// Row type for feed follow joined with user and feed names.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedFollowRow {
    id: String,
    user_id: String,
    feed_id: String,
    user_name: String,
    feed_name: String,
    feed_url: String,
    created_at: String,
}

impl From<FeedFollowRow> for FeedFollow {
    fn from(row: FeedFollowRow) -> Self {
        FeedFollow {
            id: row.id,
            user_id: row.user_id,
            feed_id: row.feed_id,
            user_name: row.user_name,
            feed_name: row.feed_name,
            feed_url: row.feed_url,
            created_at: parse_db_timestamp(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Row type for post from database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct PostRow {
    id: String,
    url: String,
    title: String,
    description: Option<String>,
    published_at: Option<String>,
    feed_id: String,
    created_at: String,
    updated_at: String,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            url: row.url,
            title: row.title,
            description: row.description,
            published_at: row.published_at.and_then(|s| parse_db_timestamp(&s)),
            feed_id: row.feed_id,
            created_at: parse_db_timestamp(&row.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_db_timestamp(&row.updated_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Row type for post joined with its feed name.
#[derive(Debug, Clone, sqlx::FromRow)]
struct PostWithFeedRow {
    #[sqlx(flatten)]
    post: PostRow,
    feed_name: String,
}

impl From<PostWithFeedRow> for PostWithFeed {
    fn from(row: PostWithFeedRow) -> Self {
        PostWithFeed {
            post: Post::from(row.post),
            feed_name: row.feed_name,
        }
    }
}

/// Repository for feed operations.
pub struct FeedRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FeedRepository<'a> {
    /// Create a new FeedRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new feed.
    ///
    /// Fails with [`GatorError::AlreadyExists`] if the URL is already stored.
    pub async fn create(&self, feed: &NewFeed) -> Result<Feed> {
        let id = new_id();
        let now = to_db_timestamp(&Utc::now());

        sqlx::query(
            "INSERT INTO feeds (id, name, url, user_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5)",
        )
        .bind(&id)
        .bind(&feed.name)
        .bind(&feed.url)
        .bind(&feed.user_id)
        .bind(&now)
        .execute(self.pool)
        .await
        .map_err(|e| map_unique_violation(e, format!("feed '{}'", feed.url)))?;

        self.get_by_id(&id)
            .await?
            .ok_or_else(|| GatorError::NotFound(format!("feed '{}'", feed.url)))
    }

    /// Get a feed by ID.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Feed>> {
        let row = sqlx::query_as::<_, FeedRow>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(row.map(Feed::from))
    }

    /// Get a feed by URL.
    pub async fn get_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let row = sqlx::query_as::<_, FeedRow>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE url = $1"
        ))
        .bind(url)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(row.map(Feed::from))
    }

    /// List all feeds with the name of the user who added each one,
    /// oldest first.
    pub async fn list_with_owner(&self) -> Result<Vec<FeedWithOwner>> {
        let rows = sqlx::query_as::<_, FeedWithOwnerRow>(
            "SELECT f.id, f.name, f.url, f.user_id, f.created_at, f.updated_at, \
                    f.last_fetched_at, u.name AS user_name \
             FROM feeds f \
             JOIN users u ON u.id = f.user_id \
             ORDER BY f.created_at, f.id",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(FeedWithOwner::from).collect())
    }

    /// Select the feed that should be fetched next.
    ///
    /// Never-fetched feeds come first, then the oldest watermark; ties are
    /// broken by creation time and then id. Returns
    /// [`GatorError::NoFeeds`] when the table is empty.
    pub async fn next_to_fetch(&self) -> Result<Feed> {
        let row = sqlx::query_as::<_, FeedRow>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds \
             ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC, id ASC \
             LIMIT 1"
        ))
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        row.map(Feed::from).ok_or(GatorError::NoFeeds)
    }

    /// Record that a feed was fetched at `at`.
    ///
    /// The watermark never moves backwards; returns false if the feed does
    /// not exist or already carries a later watermark.
    pub async fn mark_fetched(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let at = to_db_timestamp(&at);

        let result = sqlx::query(
            "UPDATE feeds SET last_fetched_at = $1, updated_at = $1 \
             WHERE id = $2 AND (last_fetched_at IS NULL OR last_fetched_at <= $1)",
        )
        .bind(&at)
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Count all feeds.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feeds")
            .fetch_one(self.pool)
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;
        Ok(count)
    }
}

/// Repository for feed follow operations.
pub struct FeedFollowRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FeedFollowRepository<'a> {
    /// Create a new FeedFollowRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Make a user follow a feed.
    ///
    /// Fails with [`GatorError::AlreadyExists`] if the user already
    /// follows it.
    pub async fn create(&self, user_id: &str, feed_id: &str) -> Result<FeedFollow> {
        let id = new_id();
        let now = to_db_timestamp(&Utc::now());

        sqlx::query(
            "INSERT INTO feed_follows (id, user_id, feed_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(feed_id)
        .bind(&now)
        .execute(self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "feed follow"))?;

        let row = sqlx::query_as::<_, FeedFollowRow>(
            "SELECT ff.id, ff.user_id, ff.feed_id, u.name AS user_name, \
                    f.name AS feed_name, f.url AS feed_url, ff.created_at \
             FROM feed_follows ff \
             JOIN users u ON u.id = ff.user_id \
             JOIN feeds f ON f.id = ff.feed_id \
             WHERE ff.id = $1",
        )
        .bind(&id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        row.map(FeedFollow::from)
            .ok_or_else(|| GatorError::NotFound("feed follow".to_string()))
    }

    /// List the follows of a user, in the order they were made.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<FeedFollow>> {
        let rows = sqlx::query_as::<_, FeedFollowRow>(
            "SELECT ff.id, ff.user_id, ff.feed_id, u.name AS user_name, \
                    f.name AS feed_name, f.url AS feed_url, ff.created_at \
             FROM feed_follows ff \
             JOIN users u ON u.id = ff.user_id \
             JOIN feeds f ON f.id = ff.feed_id \
             WHERE ff.user_id = $1 \
             ORDER BY ff.created_at, f.name",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(FeedFollow::from).collect())
    }

    /// Remove a user's follow of the feed with the given URL.
    ///
    /// Returns false if the user was not following it.
    pub async fn delete_by_url(&self, user_id: &str, url: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM feed_follows \
             WHERE user_id = $1 AND feed_id IN (SELECT id FROM feeds WHERE url = $2)",
        )
        .bind(user_id)
        .bind(url)
        .execute(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

/// Repository for post operations.
pub struct PostRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> PostRepository<'a> {
    /// Create a new PostRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a post unless one with the same URL is already stored.
    pub async fn upsert(&self, post: &NewPost) -> UpsertOutcome {
        let id = new_id();
        let now = to_db_timestamp(&Utc::now());
        let published_at = post.published_at.as_ref().map(to_db_timestamp);

        let result = sqlx::query_as::<_, PostRow>(&format!(
            "INSERT INTO posts (id, url, title, description, published_at, feed_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7) \
             ON CONFLICT (url) DO NOTHING \
             RETURNING {POST_COLUMNS}"
        ))
        .bind(&id)
        .bind(&post.url)
        .bind(&post.title)
        .bind(&post.description)
        .bind(&published_at)
        .bind(&post.feed_id)
        .bind(&now)
        .fetch_optional(self.pool)
        .await;

        match result {
            Ok(Some(row)) => UpsertOutcome::Inserted(Post::from(row)),
            Ok(None) => UpsertOutcome::AlreadyExists,
            Err(e) => match map_unique_violation(e, format!("post '{}'", post.url)) {
                GatorError::AlreadyExists(_) => UpsertOutcome::AlreadyExists,
                other => UpsertOutcome::Failed(other),
            },
        }
    }

    /// Get a post by URL.
    pub async fn get_by_url(&self, url: &str) -> Result<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE url = $1"
        ))
        .bind(url)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(row.map(Post::from))
    }

    /// Count posts with the given URL (0 or 1).
    pub async fn count_by_url(&self, url: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE url = $1")
            .bind(url)
            .fetch_one(self.pool)
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;
        Ok(count)
    }

    /// Count posts ingested from a feed.
    pub async fn count_by_feed(&self, feed_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE feed_id = $1")
            .bind(feed_id)
            .fetch_one(self.pool)
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;
        Ok(count)
    }

    /// List the newest posts from the feeds a user follows.
    ///
    /// Posts without a publication date sort after dated ones.
    pub async fn list_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<PostWithFeed>> {
        let rows = sqlx::query_as::<_, PostWithFeedRow>(
            "SELECT p.id, p.url, p.title, p.description, p.published_at, p.feed_id, \
                    p.created_at, p.updated_at, f.name AS feed_name \
             FROM posts p \
             JOIN feeds f ON f.id = p.feed_id \
             JOIN feed_follows ff ON ff.feed_id = p.feed_id \
             WHERE ff.user_id = $1 \
             ORDER BY p.published_at DESC NULLS LAST, p.created_at DESC, p.id \
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(PostWithFeed::from).collect())
    }
}
