//! User commands: login, register, users and reset.

use std::io::Write;

use tracing::info;

use super::{require_name, State};
use crate::db::UserRepository;
use crate::{GatorError, Result};

/// Make an existing user the current user.
pub async fn login(state: &mut State, name: &str, out: &mut dyn Write) -> Result<()> {
    let name = require_name(name, "user name")?;

    let user = UserRepository::new(state.db.pool())
        .get_by_name(name)
        .await?
        .ok_or_else(|| GatorError::NotFound(format!("user '{name}'")))?;

    state.config.set_current_user(&user.name);
    state.save_config()?;

    info!("Logged in as {}", user.name);
    writeln!(out, "User has been set to '{}'", user.name)?;
    Ok(())
}

/// Create a user and make it the current user.
pub async fn register(state: &mut State, name: &str, out: &mut dyn Write) -> Result<()> {
    let name = require_name(name, "user name")?;

    let user = UserRepository::new(state.db.pool()).create(name).await?;

    state.config.set_current_user(&user.name);
    state.save_config()?;

    info!("Registered user {} ({})", user.name, user.id);
    writeln!(out, "User '{}' was created", user.name)?;
    Ok(())
}

/// List all users, marking the current one.
pub async fn list(state: &State, out: &mut dyn Write) -> Result<()> {
    let users = UserRepository::new(state.db.pool()).list_all().await?;
    let current = state.config.current_user_name.as_deref();

    for user in users {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}

/// Delete every user together with their feeds, follows and posts.
pub async fn reset(state: &State, out: &mut dyn Write) -> Result<()> {
    let deleted = UserRepository::new(state.db.pool()).delete_all().await?;

    info!("Reset database: {} user(s) deleted", deleted);
    writeln!(out, "Deleted {deleted} user(s)")?;
    Ok(())
}
