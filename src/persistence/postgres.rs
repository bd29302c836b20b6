//! PostgreSQL implementation of the persistence collaborator.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{RowCounter, is_valid_table_name};
use crate::config::RealtimeConfig;
use crate::error::RealtimeError;

/// PostgreSQL-backed row counter using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
    count_sql: String,
}

impl PostgresPersistence {
    /// Creates a persistence layer over an existing pool.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidRequest`] if `blog_table` is not a
    /// plain SQL identifier.
    pub fn new(pool: PgPool, blog_table: &str) -> Result<Self, RealtimeError> {
        if !is_valid_table_name(blog_table) {
            return Err(RealtimeError::InvalidRequest(format!(
                "invalid blog table name: {blog_table}"
            )));
        }
        Ok(Self {
            pool,
            count_sql: format!("SELECT COUNT(*) FROM {blog_table}"),
        })
    }

    /// Opens a connection pool with the configured limits.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Persistence`] if the database is unreachable
    /// and [`RealtimeError::InvalidRequest`] for an invalid table name.
    pub async fn connect(config: &RealtimeConfig) -> Result<Self, RealtimeError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;
        Self::new(pool, &config.blog_table)
    }
}

#[async_trait]
impl RowCounter for PostgresPersistence {
    async fn count_blogs(&self) -> Result<i64, RealtimeError> {
        let count = sqlx::query_scalar::<_, i64>(&self.count_sql)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
