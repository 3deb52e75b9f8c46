//! Command-line commands for gator.
//!
//! Every command writes its user-facing output to the given writer and
//! returns an error for anything that should abort the invocation.

pub mod aggregate;
pub mod browse;
pub mod feeds;
pub mod users;

use std::io::Write;
use std::path::PathBuf;

use clap::Subcommand;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::db::{Database, User, UserRepository};
use crate::feed::FeedFetcher;
use crate::{GatorError, Result};

pub use aggregate::parse_interval;

/// Default number of posts shown by `browse`.
pub const DEFAULT_BROWSE_LIMIT: u32 = 2;

/// Everything a command needs to run.
pub struct State {
    /// Loaded configuration.
    pub config: Config,
    /// Where the configuration is written back to.
    pub config_path: PathBuf,
    /// Database handle.
    pub db: Database,
    /// Shared feed fetcher.
    pub fetcher: FeedFetcher,
}

impl State {
    /// Build the command state from a loaded configuration.
    pub fn new(config: Config, config_path: PathBuf, db: Database) -> Result<Self> {
        let fetcher = FeedFetcher::new(&config.fetch)?;
        Ok(Self {
            config,
            config_path,
            db,
            fetcher,
        })
    }

    /// Persist the configuration.
    fn save_config(&self) -> Result<()> {
        self.config.save(&self.config_path)
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set the current user
    Login {
        /// Name of an existing user
        name: String,
    },
    /// Create a user and make it the current user
    Register {
        /// Name of the new user
        name: String,
    },
    /// List all users
    Users,
    /// Delete all users, feeds, follows and posts
    Reset,
    /// Collect posts from feeds until interrupted
    Agg {
        /// Time between requests, e.g. 1m, 30s, 1h30m
        #[arg(value_parser = parse_interval)]
        interval: Duration,
    },
    /// Add a feed and follow it
    Addfeed {
        /// Display name of the feed
        name: String,
        /// Feed URL
        url: String,
    },
    /// List all feeds
    Feeds,
    /// Follow an existing feed
    Follow {
        /// Feed URL
        url: String,
    },
    /// List the feeds the current user follows
    Following,
    /// Stop following a feed
    Unfollow {
        /// Feed URL
        url: String,
    },
    /// Show the newest posts from followed feeds
    Browse {
        /// Maximum number of posts to show
        #[arg(default_value_t = DEFAULT_BROWSE_LIMIT, value_parser = clap::value_parser!(u32).range(1..))]
        limit: u32,
    },
}

/// Run a single command.
pub async fn execute(state: &mut State, command: Command, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::Login { name } => users::login(state, &name, out).await,
        Command::Register { name } => users::register(state, &name, out).await,
        Command::Users => users::list(state, out).await,
        Command::Reset => users::reset(state, out).await,
        Command::Agg { interval } => {
            let shutdown = shutdown_on_ctrl_c();
            aggregate::agg(state, interval, shutdown, out).await
        }
        Command::Addfeed { name, url } => {
            let user = current_user(state).await?;
            feeds::add_feed(state, &user, &name, &url, out).await
        }
        Command::Feeds => feeds::list(state, out).await,
        Command::Follow { url } => {
            let user = current_user(state).await?;
            feeds::follow(state, &user, &url, out).await
        }
        Command::Following => {
            let user = current_user(state).await?;
            feeds::following(state, &user, out).await
        }
        Command::Unfollow { url } => {
            let user = current_user(state).await?;
            feeds::unfollow(state, &user, &url, out).await
        }
        Command::Browse { limit } => {
            let user = current_user(state).await?;
            browse::browse(state, &user, limit, out).await
        }
    }
}

/// Resolve the logged-in user from the configuration.
pub async fn current_user(state: &State) -> Result<User> {
    let name = state.config.current_user_name.as_deref().ok_or_else(|| {
        GatorError::Validation("no user is logged in; run 'gator login <name>' first".to_string())
    })?;

    UserRepository::new(state.db.pool())
        .get_by_name(name)
        .await?
        .ok_or_else(|| GatorError::NotFound(format!("user '{name}'")))
}

fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = tx.send(true);
        }
    });
    rx
}

/// Validate a user or feed name given on the command line.
fn require_name<'a>(name: &'a str, what: &str) -> Result<&'a str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GatorError::Validation(format!("{what} must not be empty")));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(subcommand)]
        command: Command,
    }

    fn parse(args: &[&str]) -> std::result::Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("gator").chain(args.iter().copied()))
            .map(|cli| cli.command)
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse(&["users"]).unwrap(), Command::Users);
        assert_eq!(parse(&["reset"]).unwrap(), Command::Reset);
        assert_eq!(parse(&["feeds"]).unwrap(), Command::Feeds);
        assert_eq!(parse(&["following"]).unwrap(), Command::Following);
        assert_eq!(
            parse(&["login", "kahya"]).unwrap(),
            Command::Login {
                name: "kahya".to_string()
            }
        );
    }

    #[test]
    fn test_parse_addfeed() {
        assert_eq!(
            parse(&["addfeed", "HN", "https://news.ycombinator.com/rss"]).unwrap(),
            Command::Addfeed {
                name: "HN".to_string(),
                url: "https://news.ycombinator.com/rss".to_string()
            }
        );
        assert!(parse(&["addfeed", "HN"]).is_err());
    }

    #[test]
    fn test_parse_agg_interval() {
        assert_eq!(
            parse(&["agg", "1m30s"]).unwrap(),
            Command::Agg {
                interval: Duration::from_secs(90)
            }
        );
        assert!(parse(&["agg", "soon"]).is_err());
        assert!(parse(&["agg"]).is_err());
    }

    #[test]
    fn test_parse_browse_limit() {
        assert_eq!(
            parse(&["browse"]).unwrap(),
            Command::Browse {
                limit: DEFAULT_BROWSE_LIMIT
            }
        );
        assert_eq!(parse(&["browse", "10"]).unwrap(), Command::Browse { limit: 10 });
        assert!(parse(&["browse", "0"]).is_err());
        assert!(parse(&["browse", "many"]).is_err());
    }

    #[test]
    fn test_unknown_command() {
        assert!(parse(&["help-me"]).is_err());
    }

    #[test]
    fn test_require_name() {
        assert_eq!(require_name("  kahya ", "user name").unwrap(), "kahya");
        assert!(matches!(
            require_name("   ", "user name"),
            Err(GatorError::Validation(_))
        ));
    }
}
