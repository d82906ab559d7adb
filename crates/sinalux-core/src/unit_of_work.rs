//! Atomic group of reads and writes over a declared set of stores.
//!
//! Dropping a `UnitOfWork` without calling [`UnitOfWork::commit`] rolls every
//! write back, so an early `?` return leaves prior state intact.

use serde_json::Value;
use sqlx::{Sqlite, Transaction};

use crate::db::DbPool;
use crate::error::{Result, StoreError};
use crate::schema;

pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    operation: &'static str,
    scope: Vec<&'static str>,
}

impl UnitOfWork {
    pub async fn begin(
        pool: &DbPool,
        operation: &'static str,
        scope: &[&'static str],
    ) -> Result<Self> {
        let tx = pool
            .begin()
            .await
            .map_err(StoreError::aborted(scope.join(","), operation))?;
        tracing::trace!(operation, stores = ?scope, "unit of work started");
        Ok(Self {
            tx,
            operation,
            scope: scope.to_vec(),
        })
    }

    fn ensure_scope(&self, store: &str) -> Result<()> {
        if self.scope.iter().any(|declared| *declared == store) {
            Ok(())
        } else {
            Err(StoreError::OutOfScope {
                store: store.to_string(),
                operation: self.operation,
            })
        }
    }

    pub async fn get(&mut self, store: &str, key: &str) -> Result<Option<Value>> {
        self.ensure_scope(store)?;
        let sql = format!("SELECT value FROM {store} WHERE key = ?");
        let text = sqlx::query_scalar::<_, String>(&sql)
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::aborted(store, self.operation))?;
        text.map(|text| decode(store, key, &text)).transpose()
    }

    /// Every `(key, document)` pair in key order.
    pub async fn all(&mut self, store: &str) -> Result<Vec<(String, Value)>> {
        self.ensure_scope(store)?;
        let sql = format!("SELECT key, value FROM {store} ORDER BY key");
        let rows = sqlx::query_as::<_, (String, String)>(&sql)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(StoreError::aborted(store, self.operation))?;
        decode_rows(store, rows)
    }

    pub async fn by_index(
        &mut self,
        store: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<(String, Value)>> {
        self.ensure_scope(store)?;
        let sql = schema::index_lookup_sql(store, field);
        let rows = sqlx::query_as::<_, (String, String)>(&sql)
            .bind(value)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(StoreError::aborted(store, self.operation))?;
        decode_rows(store, rows)
    }

    /// Replace-on-write upsert by key.
    pub async fn put(&mut self, store: &str, key: &str, document: &Value) -> Result<()> {
        self.ensure_scope(store)?;
        let text = encode(store, key, document)?;
        let sql = format!(
            "INSERT INTO {store} (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value"
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(text)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::aborted(store, self.operation))?;
        Ok(())
    }

    /// Inserts only when `key` is free. Returns whether a row was written.
    pub async fn insert_if_absent(&mut self, store: &str, key: &str, document: &Value) -> Result<bool> {
        self.ensure_scope(store)?;
        let text = encode(store, key, document)?;
        // ON CONFLICT DO NOTHING, unlike INSERT OR IGNORE, still aborts on CHECK violations.
        let sql = format!(
            "INSERT INTO {store} (key, value) VALUES (?, ?) ON CONFLICT(key) DO NOTHING"
        );
        let result = sqlx::query(&sql)
            .bind(key)
            .bind(text)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::aborted(store, self.operation))?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete(&mut self, store: &str, key: &str) -> Result<bool> {
        self.ensure_scope(store)?;
        let sql = format!("DELETE FROM {store} WHERE key = ?");
        let result = sqlx::query(&sql)
            .bind(key)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::aborted(store, self.operation))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear(&mut self, store: &str) -> Result<u64> {
        self.ensure_scope(store)?;
        let sql = format!("DELETE FROM {store}");
        let result = sqlx::query(&sql)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::aborted(store, self.operation))?;
        Ok(result.rows_affected())
    }

    pub async fn commit(self) -> Result<()> {
        let operation = self.operation;
        let stores = self.scope.join(",");
        self.tx
            .commit()
            .await
            .map_err(StoreError::aborted(stores.clone(), operation))?;
        tracing::debug!(operation, stores = %stores, "unit of work committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        let operation = self.operation;
        let stores = self.scope.join(",");
        self.tx
            .rollback()
            .await
            .map_err(StoreError::aborted(stores, operation))
    }
}

fn decode(store: &str, key: &str, text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|source| StoreError::CorruptRecord {
        store: store.to_string(),
        key: key.to_string(),
        source,
    })
}

fn decode_rows(store: &str, rows: Vec<(String, String)>) -> Result<Vec<(String, Value)>> {
    rows.into_iter()
        .map(|(key, text)| {
            let value = decode(store, &key, &text)?;
            Ok((key, value))
        })
        .collect()
}

pub(crate) fn encode(store: &str, key: &str, document: &Value) -> Result<String> {
    serde_json::to_string(document).map_err(|source| StoreError::CorruptRecord {
        store: store.to_string(),
        key: key.to_string(),
        source,
    })
}
