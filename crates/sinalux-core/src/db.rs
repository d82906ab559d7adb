use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

pub type DbPool = Pool<Sqlite>;

/// Opens the SQLite pool backing the local store. Connections are never
/// recycled, so an in-memory database lives as long as the pool.
pub async fn connect(config: &StoreConfig) -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(StoreError::Open)?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(StoreError::Open)?;

    tracing::debug!(url = %config.database_url, "local store pool established");
    Ok(pool)
}
