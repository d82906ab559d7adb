//! Ordered, versioned migration steps for the local store.
//!
//! Each step runs in its own transaction together with the version stamp,
//! so an interrupted pass resumes from the last completed step.

use serde::Serialize;
use serde_json::Value;
use sinalux_records::{fields, normalize, CanonicalRecord, EntityKind};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::DbPool;
use crate::error::{Result, StoreError};
use crate::schema::{self, LEGACY_AUDIT_STORE, LEGACY_USERS_STORE, SCHEMA_VERSION, STORES};
use crate::unit_of_work::encode;

const META_TABLE: &str = "store_meta";
const VERSION_KEY: &str = "schema_version";
const OPERATION: &str = "migrate";

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
}

pub const MIGRATIONS: [Migration; 6] = [
    Migration {
        version: 1,
        name: "initial_stores",
    },
    Migration {
        version: 2,
        name: "projects_criteria_attachments",
    },
    Migration {
        version: 3,
        name: "users_store",
    },
    Migration {
        version: 4,
        name: "audit_log_store",
    },
    Migration {
        version: 5,
        name: "error_log_store",
    },
    Migration {
        version: 6,
        name: "backfill_identity",
    },
];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: i64,
    pub to_version: i64,
    pub applied: Vec<&'static str>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

pub struct Migrator<'a> {
    pool: &'a DbPool,
    clock: &'a dyn Clock,
    batch_size: u32,
}

impl<'a> Migrator<'a> {
    pub fn new(pool: &'a DbPool, clock: &'a dyn Clock) -> Self {
        Self {
            pool,
            clock,
            batch_size: 200,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn installed_version(&self) -> Result<i64> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(StoreError::aborted(META_TABLE, OPERATION))?;
        ensure_meta(&mut conn).await?;
        read_version(&mut conn).await
    }

    pub async fn migrate(&self) -> Result<MigrationReport> {
        self.migrate_to(SCHEMA_VERSION).await
    }

    /// Applies every step above the installed version up to `target`.
    pub async fn migrate_to(&self, target: i64) -> Result<MigrationReport> {
        if target > SCHEMA_VERSION {
            return Err(StoreError::Validation(format!(
                "cannot migrate to version {target}; latest known version is {SCHEMA_VERSION}"
            )));
        }

        let installed = self.installed_version().await?;
        if installed > SCHEMA_VERSION {
            return Err(StoreError::SchemaTooNew {
                found: installed,
                supported: SCHEMA_VERSION,
            });
        }

        let mut applied = Vec::new();
        for migration in MIGRATIONS
            .iter()
            .filter(|m| m.version > installed && m.version <= target)
        {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(StoreError::aborted(META_TABLE, OPERATION))?;
            self.apply(&mut tx, migration.version).await?;
            write_version(&mut tx, migration.version).await?;
            tx.commit()
                .await
                .map_err(StoreError::aborted(META_TABLE, OPERATION))?;

            tracing::info!(
                version = migration.version,
                name = migration.name,
                "applied store migration"
            );
            applied.push(migration.name);
        }

        Ok(MigrationReport {
            from_version: installed,
            to_version: installed.max(target),
            applied,
        })
    }

    async fn apply(&self, tx: &mut Transaction<'static, Sqlite>, version: i64) -> Result<()> {
        let conn: &mut SqliteConnection = &mut **tx;
        match version {
            1 => {
                for store in [
                    "equipamentos",
                    LEGACY_USERS_STORE,
                    "vinculos",
                    "medicoes",
                    LEGACY_AUDIT_STORE,
                ] {
                    ensure_store(conn, store).await?;
                }
                Ok(())
            }
            2 => {
                for store in ["obras", "criterios", "anexos"] {
                    ensure_store(conn, store).await?;
                }
                Ok(())
            }
            3 => {
                ensure_store(conn, "users").await?;
                fold_legacy_users(conn).await
            }
            4 => {
                ensure_store(conn, "audit_log").await?;
                fold_legacy_audit(conn).await
            }
            5 => ensure_store(conn, "error_log").await,
            6 => {
                for def in STORES.iter() {
                    ensure_store(conn, def.name).await?;
                    self.backfill(conn, def.name, def.kind).await?;
                }
                Ok(())
            }
            other => Err(StoreError::Validation(format!(
                "no migration step for version {other}"
            ))),
        }
    }

    /// Paged scan filling surrogate ids and stamps; rewrites only rows whose
    /// canonical form differs from what is stored.
    async fn backfill(&self, conn: &mut SqliteConnection, store: &str, kind: EntityKind) -> Result<()> {
        let now = self.clock.now();
        let select = format!("SELECT key, value FROM {store} WHERE key > ? ORDER BY key LIMIT ?");
        let update = format!("UPDATE {store} SET value = ? WHERE key = ?");

        let mut cursor = String::new();
        let mut rewritten = 0usize;
        loop {
            let page = sqlx::query_as::<_, (String, String)>(&select)
                .bind(&cursor)
                .bind(i64::from(self.batch_size))
                .fetch_all(&mut *conn)
                .await
                .map_err(StoreError::aborted(store, OPERATION))?;
            let Some((last_key, _)) = page.last() else {
                break;
            };
            cursor = last_key.clone();

            for (key, text) in page {
                let raw: Value = serde_json::from_str(&text).map_err(|source| {
                    StoreError::CorruptRecord {
                        store: store.to_string(),
                        key: key.clone(),
                        source,
                    }
                })?;
                let mut record = normalize(&raw, kind);
                fill_identity(&mut record, now);
                let canonical = record.to_value().map_err(|source| StoreError::CorruptRecord {
                    store: store.to_string(),
                    key: key.clone(),
                    source,
                })?;
                if canonical == raw {
                    continue;
                }
                sqlx::query(&update)
                    .bind(encode(store, &key, &canonical)?)
                    .bind(&key)
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::aborted(store, OPERATION))?;
                rewritten += 1;
            }
        }

        if rewritten > 0 {
            tracing::info!(store, rewritten, "backfilled identity fields");
        }
        Ok(())
    }
}

/// Fills only what is missing: uuid, created_at, and updated_at (which
/// defaults to created_at).
pub(crate) fn fill_identity(record: &mut CanonicalRecord, now: chrono::DateTime<chrono::Utc>) {
    match record {
        CanonicalRecord::Audit(entry) => {
            entry.created_at.get_or_insert(now);
        }
        CanonicalRecord::Error(entry) => {
            entry.created_at.get_or_insert(now);
        }
        other => {
            if let Some(stamps) = other.stamps_mut() {
                if stamps.uuid.is_empty() {
                    stamps.uuid = Uuid::new_v4().to_string();
                }
                let created = *stamps.created_at.get_or_insert(now);
                stamps.updated_at.get_or_insert(created);
            }
        }
    }
}

async fn ensure_meta(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS store_meta (name TEXT PRIMARY KEY NOT NULL, value INTEGER NOT NULL)",
    )
    .execute(&mut *conn)
    .await
    .map_err(StoreError::aborted(META_TABLE, OPERATION))?;
    Ok(())
}

async fn read_version(conn: &mut SqliteConnection) -> Result<i64> {
    let version = sqlx::query_scalar::<_, i64>("SELECT value FROM store_meta WHERE name = ?")
        .bind(VERSION_KEY)
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::aborted(META_TABLE, OPERATION))?;
    Ok(version.unwrap_or(0))
}

async fn write_version(conn: &mut SqliteConnection, version: i64) -> Result<()> {
    sqlx::query(
        "INSERT INTO store_meta (name, value) VALUES (?, ?) \
         ON CONFLICT(name) DO UPDATE SET value = excluded.value",
    )
    .bind(VERSION_KEY)
    .bind(version)
    .execute(&mut *conn)
    .await
    .map_err(StoreError::aborted(META_TABLE, OPERATION))?;
    Ok(())
}

async fn table_exists(conn: &mut SqliteConnection, name: &str) -> Result<bool> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await
    .map_err(StoreError::aborted(name, OPERATION))?;
    Ok(count > 0)
}

/// Creates the store table and, for current stores, every declared index.
async fn ensure_store(conn: &mut SqliteConnection, name: &str) -> Result<()> {
    sqlx::query(&schema::create_store_sql(name))
        .execute(&mut *conn)
        .await
        .map_err(StoreError::aborted(name, OPERATION))?;

    if let Some(def) = schema::current_store(name) {
        for field in def.indexes {
            sqlx::query(&schema::create_index_sql(name, field))
                .execute(&mut *conn)
                .await
                .map_err(StoreError::aborted(name, OPERATION))?;
        }
    }
    Ok(())
}

async fn legacy_rows(conn: &mut SqliteConnection, store: &str) -> Result<Vec<(String, Value)>> {
    let sql = format!("SELECT key, value FROM {store} ORDER BY rowid");
    let rows = sqlx::query_as::<_, (String, String)>(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(StoreError::aborted(store, OPERATION))?;
    rows.into_iter()
        .map(|(key, text)| {
            let value = serde_json::from_str(&text).map_err(|source| StoreError::CorruptRecord {
                store: store.to_string(),
                key: key.clone(),
                source,
            })?;
            Ok((key, value))
        })
        .collect()
}

/// Copies every row forward with first-write-wins semantics, then drops the
/// legacy table. Nothing is dropped unless every copy succeeded.
async fn fold_into(
    conn: &mut SqliteConnection,
    legacy: &str,
    target: &str,
    rows: Vec<(String, Value)>,
) -> Result<()> {
    let insert = format!(
        "INSERT INTO {target} (key, value) VALUES (?, ?) ON CONFLICT(key) DO NOTHING"
    );
    let total = rows.len();
    let mut copied = 0usize;
    for (key, document) in rows {
        let result = sqlx::query(&insert)
            .bind(&key)
            .bind(encode(target, &key, &document)?)
            .execute(&mut *conn)
            .await
            .map_err(StoreError::aborted(target, OPERATION))?;
        copied += result.rows_affected() as usize;
    }

    sqlx::query(&format!("DROP TABLE {legacy}"))
        .execute(&mut *conn)
        .await
        .map_err(StoreError::aborted(legacy, OPERATION))?;

    tracing::info!(
        legacy,
        target,
        total,
        copied,
        skipped = total - copied,
        "folded legacy store"
    );
    Ok(())
}

async fn fold_legacy_users(conn: &mut SqliteConnection) -> Result<()> {
    if !table_exists(conn, LEGACY_USERS_STORE).await? {
        return Ok(());
    }
    let rows = legacy_rows(conn, LEGACY_USERS_STORE).await?;
    let mut canonical = Vec::with_capacity(rows.len());
    for (row_key, raw) in rows {
        let record = normalize(&raw, EntityKind::User);
        let key = match record.key() {
            "" => row_key,
            key => key.to_string(),
        };
        let document = record.to_value().map_err(|source| StoreError::CorruptRecord {
            store: LEGACY_USERS_STORE.to_string(),
            key: key.clone(),
            source,
        })?;
        canonical.push((key, document));
    }
    fold_into(conn, LEGACY_USERS_STORE, "users", canonical).await
}

/// Legacy audit rows may repeat one logical entry under `audit_id`,
/// `auditId` or `id`; the first row seen per logical id is kept.
async fn fold_legacy_audit(conn: &mut SqliteConnection) -> Result<()> {
    if !table_exists(conn, LEGACY_AUDIT_STORE).await? {
        return Ok(());
    }
    let rows = legacy_rows(conn, LEGACY_AUDIT_STORE).await?;
    let mut canonical = Vec::with_capacity(rows.len());
    for (row_key, raw) in rows {
        let logical_id = fields::text(&raw, &["audit_id", "auditId", "id"]).unwrap_or(row_key);
        let mut record = normalize(&raw, EntityKind::Audit);
        if let CanonicalRecord::Audit(entry) = &mut record {
            entry.audit_id = logical_id.clone();
        }
        let document = record.to_value().map_err(|source| StoreError::CorruptRecord {
            store: LEGACY_AUDIT_STORE.to_string(),
            key: logical_id.clone(),
            source,
        })?;
        canonical.push((logical_id, document));
    }
    fold_into(conn, LEGACY_AUDIT_STORE, "audit_log", canonical).await
}
