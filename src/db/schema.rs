//! Database schema and migrations for gator.
//!
//! This module contains all database migrations that will be applied
//! sequentially when the database is first opened or upgraded. The SQL is
//! kept to the subset shared by SQLite and PostgreSQL: ids are UUID text
//! and timestamps are fixed-width RFC3339 text.

/// Database migrations.
///
/// Each migration is a SQL script that will be executed in order.
/// The schema_version table tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: Users
    r#"
CREATE TABLE users (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
"#,
    // v2: Feeds, owned by the user who added them
    r#"
CREATE TABLE feeds (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    url             TEXT NOT NULL UNIQUE,
    user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    last_fetched_at TEXT
);

CREATE INDEX idx_feeds_user_id ON feeds(user_id);
"#,
    // v3: Feed follows
    r#"
CREATE TABLE feed_follows (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    feed_id     TEXT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE (user_id, feed_id)
);

CREATE INDEX idx_feed_follows_feed_id ON feed_follows(feed_id);
"#,
    // v4: Posts, deduplicated by URL
    r#"
CREATE TABLE posts (
    id           TEXT PRIMARY KEY,
    url          TEXT NOT NULL UNIQUE,
    title        TEXT NOT NULL,
    description  TEXT,
    published_at TEXT,
    feed_id      TEXT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE INDEX idx_posts_feed_id ON posts(feed_id);
CREATE INDEX idx_posts_published_at ON posts(published_at);
"#,
    // v5: Feed selection orders by watermark
    r#"
CREATE INDEX idx_feeds_last_fetched_at ON feeds(last_fetched_at);
"#,
];
