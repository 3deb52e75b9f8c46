//! gator - a command-line RSS aggregator
//!
//! Users follow RSS feeds; the `agg` loop fetches one feed per tick and
//! stores its posts, and `browse` shows the newest ones.

pub mod commands;
pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod feed;
pub mod logging;

pub use commands::{execute, Command, State};
pub use config::Config;
pub use db::{Database, User, UserRepository};
pub use error::{GatorError, Result};
pub use feed::{Aggregator, FeedFetcher, FetchError, TickOutcome, TickReport};
