use std::sync::Arc;
use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;
use tracing::debug;

use crate::repository::{KeyValueStore, Storage};

mod kv_store;
mod migrate;

/// Key/value store persisted in a `SQLite` database.
///
/// Clones share one connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteStore {
    /// Open a pool on `database_url` with WAL journaling and a busy timeout,
    /// so short writes from several connections wait instead of failing.
    ///
    /// Does not create the `kv_store` table; call [`SqliteStore::migrate`].
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the database cannot be opened or a pragma
    /// is rejected.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        debug!(database_url, "connecting to sqlite");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Bring the `kv_store` schema up to date. Safe to run on every start.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if a migration statement fails.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Open and migrate a `SQLite` key/value store.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the database cannot be opened or
    /// migrated.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let store = SqliteStore::connect(database_url).await?;
        store.migrate().await?;
        let kv: Arc<dyn KeyValueStore> = Arc::new(store);
        Ok(Self { kv })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_can_back_shared_storage() {
        fn assert_kv_store<T: KeyValueStore + Clone + 'static>() {}
        assert_kv_store::<SqliteStore>();
    }

    #[tokio::test]
    async fn connect_does_not_create_schema() {
        let store = SqliteStore::connect("sqlite:file:memdb_unmigrated?mode=memory&cache=shared")
            .await
            .expect("connect");
        let err = store.get("quiz2play-daily-limit").await.unwrap_err();
        assert!(matches!(err, crate::repository::StorageError::Connection(_)));

        store.migrate().await.expect("migrate");
        assert_eq!(store.get("quiz2play-daily-limit").await.unwrap(), None);
    }
}
