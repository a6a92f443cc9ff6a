use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

const IN_MEMORY_DB: &str = "sqlite::memory:";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";
const SQLITE_CONSTRAINT_PRIMARY_KEY: &str = "1555";

const CREATE_FIELD_TABLE: &str = "CREATE TABLE IF NOT EXISTS Field (
    name TEXT PRIMARY KEY,
    type TEXT,
    price REAL
)";

const CREATE_BOOKING_TABLE: &str = "CREATE TABLE IF NOT EXISTS Booking (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    field_name TEXT,
    date TEXT,
    start_time TEXT,
    duration INTEGER
)";

/// Persistence context shared by the stores.
///
/// Opened once at startup with [`Database::connect`] and closed at shutdown
/// with [`Database::close`]. Cloning shares the same pool.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
    pub endpoint: String,
}

impl Database {
    pub async fn connect(config: &Config) -> Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        // every connection to an in-memory database gets its own empty database
        let max_connections = if is_in_memory(&config.database_url) {
            1
        } else {
            config.max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let db = Self {
            pool,
            endpoint: config.database_url.clone(),
        };
        db.create_tables().await?;
        info!(
            "Connected to {} ({} connection(s))",
            db.endpoint, max_connections
        );
        Ok(db)
    }

    /// Single-connection in-memory database with the schema in place.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(IN_MEMORY_DB)
            .await?;

        let db = Self {
            pool,
            endpoint: IN_MEMORY_DB.to_owned(),
        };
        db.create_tables().await?;
        Ok(db)
    }

    #[cfg(test)]
    pub async fn for_test() -> Self {
        Self::in_memory().await.unwrap()
    }

    async fn create_tables(&self) -> Result<(), sqlx::Error> {
        sqlx::query(CREATE_FIELD_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_BOOKING_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed {}", self.endpoint);
    }

    pub fn is_duplicate_key(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => {
                db_err.is_unique_violation()
                    || db_err.code().is_some_and(|code| {
                        code == SQLITE_CONSTRAINT_UNIQUE || code == SQLITE_CONSTRAINT_PRIMARY_KEY
                    })
            }
            _ => false,
        }
    }
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}
