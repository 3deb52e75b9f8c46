//! Browse command.

use std::io::Write;

use super::State;
use crate::datetime::format_listing_date;
use crate::db::User;
use crate::feed::PostRepository;
use crate::Result;

/// Show the newest posts from the feeds a user follows.
pub async fn browse(state: &State, user: &User, limit: u32, out: &mut dyn Write) -> Result<()> {
    let posts = PostRepository::new(state.db.pool())
        .list_for_user(&user.id, i64::from(limit))
        .await?;

    if posts.is_empty() {
        writeln!(out, "No posts yet. Run 'gator agg <interval>' to collect some.")?;
        return Ok(());
    }

    for entry in posts {
        let post = &entry.post;
        writeln!(
            out,
            "{}  {} ({})",
            format_listing_date(post.published_at.as_ref()),
            post.title,
            entry.feed_name
        )?;
        writeln!(out, "    {}", post.url)?;
        if let Some(description) = &post.description {
            writeln!(out, "    {}", summarize(description))?;
        }
    }
    Ok(())
}

const SUMMARY_CHARS: usize = 160;

/// First line of a description, cut to a readable length.
fn summarize(description: &str) -> String {
    let line = description.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if line.chars().count() <= SUMMARY_CHARS {
        return line.to_string();
    }
    let mut cut: String = line.chars().take(SUMMARY_CHARS).collect();
    cut.push_str("...");
    cut
}
