//! User model for gator.

use chrono::{DateTime, Utc};

use crate::datetime::parse_db_timestamp;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Opaque user ID.
    pub id: String,
    /// Unique user name.
    pub name: String,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Row type for user from database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct UserRow {
    id: String,
    name: String,
    created_at: String,
    updated_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            created_at: parse_db_timestamp(&row.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_db_timestamp(&row.updated_at).unwrap_or_else(Utc::now),
        }
    }
}
