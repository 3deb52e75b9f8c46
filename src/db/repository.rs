//! User repository for gator.
//!
//! This module provides CRUD operations for users in the database.

use chrono::Utc;

use super::user::{User, UserRow};
use super::{map_unique_violation, new_id, DbPool};
use crate::datetime::to_db_timestamp;
use crate::{GatorError, Result};

/// Repository for user CRUD operations.
pub struct UserRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new user.
    ///
    /// Fails with [`GatorError::AlreadyExists`] if the name is taken.
    pub async fn create(&self, name: &str) -> Result<User> {
        let id = new_id();
        let now = to_db_timestamp(&Utc::now());

        sqlx::query("INSERT INTO users (id, name, created_at, updated_at) VALUES ($1, $2, $3, $3)")
            .bind(&id)
            .bind(name)
            .bind(&now)
            .execute(self.pool)
            .await
            .map_err(|e| map_unique_violation(e, format!("user '{name}'")))?;

        self.get_by_id(&id)
            .await?
            .ok_or_else(|| GatorError::NotFound(format!("user '{name}'")))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(row.map(User::from))
    }

    /// Get a user by name.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(row.map(User::from))
    }

    /// List all users ordered by name.
    pub async fn list_all(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users ORDER BY name",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| GatorError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Delete every user. Feeds, follows and posts go with them.
    ///
    /// Returns the number of users deleted.
    pub async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM users")
            .execute(self.pool)
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    /// Count all users.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool)
            .await
            .map_err(|e| GatorError::Database(e.to_string()))?;
        Ok(count)
    }
}
