use sea_orm::DbBackend;
use thiserror::Error;

/// Errors returned by the closure-table APIs.
#[derive(Debug, Error)]
pub enum ClosureTableError {
    #[error("closure-table supports PostgreSQL and SQLite connections only (got {0:?})")]
    UnsupportedBackend(DbBackend),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("node {0} not found")]
    NotFound(String),

    #[error("closure-table invariant violation: {0}")]
    Invariant(String),

    #[error("node {id} was modified concurrently (expected version {expected})")]
    VersionConflict { id: String, expected: i32 },
}

impl ClosureTableError {
    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::Invariant(detail.into())
    }

    pub fn not_found(id: &impl std::fmt::Debug) -> Self {
        Self::NotFound(format!("{id:?}"))
    }
}
