//! Feed aggregation for gator.
//!
//! This module provides feed fetching, storage of feeds, follows and
//! posts, and the periodic aggregation loop.

pub mod aggregator;
pub mod fetcher;
pub mod repository;
pub mod types;

pub use aggregator::{Aggregator, AggregatorContext, AggregatorState, TickOutcome, TickReport};
pub use fetcher::{parse_feed, validate_url, FeedFetcher, FetchError};
pub use repository::{FeedFollowRepository, FeedRepository, PostRepository};
pub use types::{
    Feed, FeedFollow, FeedWithOwner, NewFeed, NewPost, ParsedFeed, ParsedItem, Post,
    PostWithFeed, UpsertOutcome,
};
