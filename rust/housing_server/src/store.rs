//! SQLite storage shared by the audit log and the endpoint counters.
//!
//! The schema is created lazily on first use. Each request works through a
//! [`RequestScope`]: one pooled connection inside one transaction, committed
//! explicitly and rolled back and returned to the pool when dropped.

use crate::error::StorageError;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    Sqlite, SqliteConnection, Transaction,
};
use std::{path::Path, str::FromStr, sync::Arc, time::Duration};
use tokio::sync::OnceCell;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS prediction_log (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT    NOT NULL,
    input     TEXT    NOT NULL,
    output    TEXT    NOT NULL
);
CREATE TABLE IF NOT EXISTS endpoint_counters (
    endpoint TEXT    PRIMARY KEY,
    count    INTEGER NOT NULL DEFAULT 0
);
"#;

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
    schema_ready: Arc<OnceCell<()>>,
}

impl Store {
    /// Opens (creating if missing) the database file at `path`. `:memory:` is accepted.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if path.as_os_str() == ":memory:" {
            return Self::in_memory().await;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        info!("Audit store opened at {}", path.display());
        Ok(Self::from_pool(pool))
    }

    /// A private database that lives as long as the store.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // every connection to :memory: is a separate database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self::from_pool(pool))
    }

    fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<(), StorageError> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
                debug!("Audit schema ready");
                Ok::<(), StorageError>(())
            })
            .await?;
        Ok(())
    }

    /// Acquires a request-scoped handle, creating the schema on first use.
    pub async fn begin(&self) -> Result<RequestScope, StorageError> {
        self.ensure_schema().await?;
        let tx = self.pool.begin().await?;
        Ok(RequestScope { tx })
    }

    /// Read-only access for inspection, also creating the schema on first use.
    pub async fn reader(&self) -> Result<&SqlitePool, StorageError> {
        self.ensure_schema().await?;
        Ok(&self.pool)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// One request's storage handle. Nothing is persisted unless [`commit`](Self::commit) runs.
pub struct RequestScope {
    tx: Transaction<'static, Sqlite>,
}

impl RequestScope {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    pub async fn commit(self) -> Result<(), StorageError> {
        self.tx.commit().await?;
        Ok(())
    }
}
