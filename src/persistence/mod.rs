//! Persistence collaborator: the aggregate queries notifications depend on.
//!
//! The backend's relational store is owned by the CRUD services. The fan-out
//! core only needs the live blog count carried by `newblog`, exposed through
//! the [`RowCounter`] trait. The concrete implementation uses
//! `sqlx::PgPool`; [`InMemoryCounter`] stands in for tests.

pub mod postgres;

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use crate::error::RealtimeError;

pub use postgres::PostgresPersistence;

/// Source of the live blog total.
#[async_trait]
pub trait RowCounter: Send + Sync + std::fmt::Debug {
    /// Returns the current number of rows in the blog table.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Persistence`] on database failure.
    async fn count_blogs(&self) -> Result<i64, RealtimeError>;
}

/// Counter held in memory.
#[derive(Debug, Default)]
pub struct InMemoryCounter {
    rows: AtomicI64,
}

impl InMemoryCounter {
    /// Creates a counter seeded with `rows`.
    #[must_use]
    pub fn new(rows: i64) -> Self {
        Self {
            rows: AtomicI64::new(rows),
        }
    }

    /// Overwrites the row count.
    pub fn set(&self, rows: i64) {
        self.rows.store(rows, Ordering::SeqCst);
    }
}

#[async_trait]
impl RowCounter for InMemoryCounter {
    async fn count_blogs(&self) -> Result<i64, RealtimeError> {
        Ok(self.rows.load(Ordering::SeqCst))
    }
}

/// Returns `true` if `name` is a plain SQL identifier, optionally
/// schema-qualified (`schema.table`).
#[must_use]
pub fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').count() <= 2
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
