//! Feed commands: addfeed, feeds, follow, following and unfollow.

use std::io::Write;

use tracing::info;

use super::{require_name, State};
use crate::db::User;
use crate::feed::{validate_url, FeedFollowRepository, FeedRepository, NewFeed};
use crate::{GatorError, Result};

/// Add a feed owned by `user` and follow it.
///
/// The URL is fetched once first so that only working feeds are stored.
pub async fn add_feed(
    state: &State,
    user: &User,
    name: &str,
    url: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let name = require_name(name, "feed name")?;
    let url = url.trim();
    validate_url(url)?;

    let parsed = state.fetcher.fetch(url).await?;
    info!(
        "Fetched feed '{}' with {} item(s) from {}",
        parsed.title,
        parsed.items.len(),
        url
    );

    let feed = FeedRepository::new(state.db.pool())
        .create(&NewFeed::new(name, url, &user.id))
        .await?;
    writeln!(out, "Added feed '{}' ({})", feed.name, feed.url)?;

    let follow = FeedFollowRepository::new(state.db.pool())
        .create(&user.id, &feed.id)
        .await?;
    writeln!(out, "User '{}' is now following '{}'", follow.user_name, follow.feed_name)?;
    Ok(())
}

/// List every feed with the user who added it.
pub async fn list(state: &State, out: &mut dyn Write) -> Result<()> {
    let feeds = FeedRepository::new(state.db.pool()).list_with_owner().await?;

    for entry in feeds {
        writeln!(
            out,
            "* {}\t{}\t{}",
            entry.feed.name, entry.feed.url, entry.user_name
        )?;
    }
    Ok(())
}

/// Follow an existing feed by URL.
pub async fn follow(state: &State, user: &User, url: &str, out: &mut dyn Write) -> Result<()> {
    let url = url.trim();
    let feed = FeedRepository::new(state.db.pool())
        .get_by_url(url)
        .await?
        .ok_or_else(|| GatorError::NotFound(format!("feed '{url}'")))?;

    let follow = FeedFollowRepository::new(state.db.pool())
        .create(&user.id, &feed.id)
        .await
        .map_err(|e| match e {
            GatorError::AlreadyExists(_) => {
                GatorError::AlreadyExists(format!("follow of '{}' by '{}'", feed.name, user.name))
            }
            other => other,
        })?;

    writeln!(out, "User '{}' is now following '{}'", follow.user_name, follow.feed_name)?;
    Ok(())
}

/// List the feeds a user follows.
pub async fn following(state: &State, user: &User, out: &mut dyn Write) -> Result<()> {
    let follows = FeedFollowRepository::new(state.db.pool())
        .list_for_user(&user.id)
        .await?;

    for follow in follows {
        writeln!(out, "* {}", follow.feed_name)?;
    }
    Ok(())
}

/// Stop following a feed by URL.
pub async fn unfollow(state: &State, user: &User, url: &str, out: &mut dyn Write) -> Result<()> {
    let url = url.trim();
    let removed = FeedFollowRepository::new(state.db.pool())
        .delete_by_url(&user.id, url)
        .await?;

    if !removed {
        return Err(GatorError::NotFound(format!("follow of '{url}'")));
    }

    writeln!(out, "Unfollowed {url}")?;
    Ok(())
}
