use sea_orm::{
    ConnectionTrait, DatabaseTransaction, DbBackend, Statement, TransactionTrait, Value,
};

use crate::config::AdvisoryLockStrategy;
use crate::error::ClosureTableError;

/// Transaction wrapping a single closure-table mutation.
///
/// Begun from a `DatabaseConnection` this is a top-level transaction; begun from a
/// caller's `DatabaseTransaction` it is a savepoint, leaving the commit boundary
/// with the caller. On PostgreSQL a namespaced strategy also takes a
/// transaction-scoped advisory lock, which serializes writers of the same tree.
pub struct LockedTransaction {
    txn: DatabaseTransaction,
    key: Option<String>,
}

impl LockedTransaction {
    pub async fn acquire<C>(
        strategy: &AdvisoryLockStrategy,
        conn: &C,
    ) -> Result<Self, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let key = match (strategy, conn.get_database_backend()) {
            (AdvisoryLockStrategy::Namespaced(key), DbBackend::Postgres) => {
                Some(key.as_str().to_owned())
            }
            _ => None,
        };

        let txn = conn.begin().await?;

        if let Some(ref key) = key {
            if let Err(err) = acquire_lock(&txn, key).await {
                let _ = txn.rollback().await;
                return Err(err);
            }
        }

        Ok(Self { txn, key })
    }

    pub fn connection(&self) -> &DatabaseTransaction {
        &self.txn
    }

    /// Advisory lock key held by this transaction, if any.
    pub fn lock_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub async fn commit(self) -> Result<(), ClosureTableError> {
        self.txn.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), ClosureTableError> {
        self.txn.rollback().await?;
        Ok(())
    }

    /// Commit when `result` is `Ok`, roll back otherwise, and hand `result` back.
    pub async fn finish<T>(
        self,
        result: Result<T, ClosureTableError>,
    ) -> Result<T, ClosureTableError> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(error = %err, "rolling back closure-table mutation");
                let _ = self.rollback().await;
                Err(err)
            }
        }
    }
}

async fn acquire_lock(txn: &DatabaseTransaction, key: &str) -> Result<(), ClosureTableError> {
    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtext($1), 0)",
        vec![Value::from(key)],
    ))
    .await?;
    Ok(())
}
