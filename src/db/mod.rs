//! Database module for gator.
//!
//! This module provides sqlx connection pooling and migration management.
//! The backend is chosen at compile time: SQLite by default, PostgreSQL with
//! the `postgres` feature.

mod repository;
mod schema;
mod user;

pub use repository::UserRepository;
pub use schema::MIGRATIONS;
pub use user::User;

use chrono::Utc;
use sqlx::pool::PoolOptions;
use tracing::{debug, info};

use crate::datetime::to_db_timestamp;
use crate::{GatorError, Result};

#[cfg(not(any(feature = "sqlite", feature = "postgres")))]
compile_error!("either the `sqlite` or the `postgres` feature must be enabled");

/// The sqlx database driver in use.
#[cfg(feature = "postgres")]
pub type Db = sqlx::Postgres;
/// The sqlx database driver in use.
#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
pub type Db = sqlx::Sqlite;

/// Connection pool for the selected backend.
pub type DbPool = sqlx::Pool<Db>;

/// Maximum pooled connections for file/server databases.
const MAX_CONNECTIONS: u32 = 5;

/// Database wrapper owning the pool and applying migrations.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Connect to the database at the given URL and apply pending migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to database");

        let pool = PoolOptions::<Db>::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await
            .map_err(|e| GatorError::DatabaseConnection(e.to_string()))?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Open an in-memory database for testing.
    ///
    /// Uses a single connection that is never recycled, since every SQLite
    /// in-memory connection is a separate database.
    #[cfg(all(feature = "sqlite", not(feature = "postgres")))]
    pub async fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory database");

        let pool = PoolOptions::<Db>::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| GatorError::DatabaseConnection(e.to_string()))?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Get the current schema version (0 when nothing has been applied).
    pub async fn schema_version(&self) -> Result<i64> {
        self.ensure_version_table().await?;

        let version: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
                .fetch_one(&self.pool)
                .await?;

        Ok(version)
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        let current_version = self.schema_version().await?;

        if current_version as usize >= MIGRATIONS.len() {
            debug!("Database is up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            "Migrating database from version {} to {}",
            current_version,
            MIGRATIONS.len()
        );

        // Apply each pending migration in a transaction
        for (i, migration) in MIGRATIONS.iter().enumerate().skip(current_version as usize) {
            let version = (i + 1) as i64;
            debug!("Applying migration v{}", version);

            let mut tx = self.pool.begin().await?;

            sqlx::raw_sql(migration).execute(&mut *tx).await?;

            sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES ($1, $2)")
                .bind(version)
                .bind(to_db_timestamp(&Utc::now()))
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
        }

        info!(
            "Database migration complete (now at version {})",
            MIGRATIONS.len()
        );
        Ok(())
    }

    async fn ensure_version_table(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version     BIGINT PRIMARY KEY,
                applied_at  TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

/// Map an sqlx error, turning unique-constraint violations into
/// [`GatorError::AlreadyExists`] for the given resource description.
pub(crate) fn map_unique_violation(e: sqlx::Error, what: impl Into<String>) -> GatorError {
    let is_unique = e
        .as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false);

    if is_unique {
        GatorError::AlreadyExists(what.into())
    } else {
        GatorError::Database(e.to_string())
    }
}

/// Generate a new opaque row id.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
