use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sinalux_records::{
    Assignment, AssignmentStatus, AuditAction, AuditEntry, EntityKind, ErrorEntry, Record,
    Stamped, Stamps,
};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::audit::derive_audit_id;
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::db::{self, DbPool};
use crate::error::{Result, StoreError};
use crate::migrations::{MigrationReport, Migrator};
use crate::schema::{self, store_def};
use crate::unit_of_work::UnitOfWork;

static SHARED: OnceCell<LocalStore> = OnceCell::const_new();

/// Filters for [`LocalStore::list_audit`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor_user_id: Option<String>,
    pub action: Option<AuditAction>,
}

impl AuditFilter {
    fn matches(&self, entry: &AuditEntry) -> bool {
        self.entity_type
            .as_deref()
            .map_or(true, |v| entry.entity_type == v)
            && self.entity_id.as_deref().map_or(true, |v| entry.entity_id == v)
            && self
                .actor_user_id
                .as_deref()
                .map_or(true, |v| entry.actor_user_id == v)
            && self.action.map_or(true, |v| entry.action == v)
    }
}

/// The local system of record. Cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct LocalStore {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl LocalStore {
    /// Connects and brings the schema up to the current version.
    pub async fn open(config: &StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let pool = db::connect(config).await?;
        let report = Migrator::new(&pool, clock.as_ref())
            .with_batch_size(config.backfill_batch_size)
            .migrate()
            .await?;
        if !report.is_noop() {
            tracing::info!(
                from = report.from_version,
                to = report.to_version,
                steps = report.applied.len(),
                "local store migrated"
            );
        }
        Ok(Self { pool, clock })
    }

    pub async fn in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        Self::open(&StoreConfig::in_memory(), clock).await
    }

    /// Process-wide handle, opened lazily on first access and never closed.
    pub async fn shared(config: &StoreConfig) -> Result<&'static LocalStore> {
        SHARED
            .get_or_try_init(|| async { LocalStore::open(config, Arc::new(SystemClock)).await })
            .await
    }

    /// Wraps an already migrated pool.
    pub fn from_pool(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn migrate(&self) -> Result<MigrationReport> {
        Migrator::new(&self.pool, self.clock.as_ref()).migrate().await
    }

    pub async fn unit_of_work(
        &self,
        operation: &'static str,
        stores: &[&'static str],
    ) -> Result<UnitOfWork> {
        UnitOfWork::begin(&self.pool, operation, stores).await
    }

    pub async fn get_all<T: Record>(&self) -> Result<Vec<T>> {
        let store = T::KIND.store_name();
        let mut uow = self.unit_of_work("get_all", &[store]).await?;
        let rows = uow.all(store).await?;
        uow.commit().await?;
        Ok(rows.iter().map(|(_, raw)| T::normalize(raw)).collect())
    }

    pub async fn get_by_id<T: Record>(&self, key: &str) -> Result<Option<T>> {
        let store = T::KIND.store_name();
        let mut uow = self.unit_of_work("get_by_id", &[store]).await?;
        let raw = uow.get(store, key).await?;
        uow.commit().await?;
        Ok(raw.as_ref().map(T::normalize))
    }

    /// Equality lookup through a declared secondary index.
    pub async fn find_by_index<T: Record>(&self, index: &str, value: &str) -> Result<Vec<T>> {
        let def = store_def(T::KIND);
        if !def.has_index(index) {
            return Err(StoreError::UnknownIndex {
                store: def.name.to_string(),
                index: index.to_string(),
            });
        }
        let mut uow = self.unit_of_work("find_by_index", &[def.name]).await?;
        let rows = uow.by_index(def.name, index, value).await?;
        uow.commit().await?;
        Ok(rows.iter().map(|(_, raw)| T::normalize(raw)).collect())
    }

    /// Upsert by business key. `created_at` and `uuid` survive updates;
    /// `updated_at` is set to now.
    pub async fn save<T: Stamped>(&self, record: T) -> Result<T> {
        let store = T::KIND.store_name();
        let mut uow = self.unit_of_work("save", &[store]).await?;
        let saved = self.save_in(&mut uow, record).await?;
        uow.commit().await?;
        Ok(saved)
    }

    /// Saves every record in one unit of work; any failure writes nothing.
    pub async fn bulk_save<T: Stamped>(&self, records: Vec<T>) -> Result<Vec<T>> {
        let store = T::KIND.store_name();
        let mut uow = self.unit_of_work("bulk_save", &[store]).await?;
        let mut saved = Vec::with_capacity(records.len());
        for record in records {
            saved.push(self.save_in(&mut uow, record).await?);
        }
        uow.commit().await?;
        tracing::debug!(store, count = saved.len(), "bulk save committed");
        Ok(saved)
    }

    async fn save_in<T: Stamped>(&self, uow: &mut UnitOfWork, record: T) -> Result<T> {
        let store = T::KIND.store_name();
        let mut record = canonicalize(record)?;
        let key = record.key().to_string();
        if key.is_empty() {
            return Err(StoreError::Validation(format!(
                "cannot save into `{store}` without a business key"
            )));
        }

        let existing = uow.get(store, &key).await?.map(|raw| T::normalize(&raw));
        stamp_for_save(
            record.stamps_mut(),
            existing.as_ref().map(|e| e.stamps()),
            self.clock.now(),
        );

        let document = to_document(store, &key, &record)?;
        uow.put(store, &key, &document).await?;
        Ok(record)
    }

    /// Removes one record. Returns `false` when the key was absent.
    pub async fn delete<T: Stamped>(&self, key: &str) -> Result<bool> {
        let store = T::KIND.store_name();
        let mut uow = self.unit_of_work("delete", &[store]).await?;
        let removed = uow.delete(store, key).await?;
        uow.commit().await?;
        Ok(removed)
    }

    pub async fn clear<T: Stamped>(&self) -> Result<u64> {
        let store = T::KIND.store_name();
        let mut uow = self.unit_of_work("clear", &[store]).await?;
        let removed = uow.clear(store).await?;
        uow.commit().await?;
        Ok(removed)
    }

    /// Ends an assignment. Does not activate any replacement.
    pub async fn close_assignment(&self, id: &str, end_date: &str) -> Result<Assignment> {
        let store = Assignment::KIND.store_name();
        let mut uow = self.unit_of_work("close_assignment", &[store]).await?;
        let Some(raw) = uow.get(store, id).await? else {
            return Err(StoreError::NotFound {
                store: store.to_string(),
                key: id.to_string(),
            });
        };

        let mut assignment = Assignment::normalize(&raw);
        assignment.status = AssignmentStatus::Encerrado;
        assignment.fim = Some(end_date.to_string());
        let existing = assignment.stamps.clone();
        stamp_for_save(&mut assignment.stamps, Some(&existing), self.clock.now());

        let document = to_document(store, id, &assignment)?;
        uow.put(store, id, &document).await?;
        uow.commit().await?;
        tracing::info!(assignment = id, end_date, "assignment closed");
        Ok(assignment)
    }

    /// The most recently started ATIVO assignment for an equipment, if any.
    pub async fn active_assignment_for(&self, equipment_id: &str) -> Result<Option<Assignment>> {
        let assignments: Vec<Assignment> =
            self.find_by_index("equipamento_id", equipment_id).await?;
        Ok(assignments
            .into_iter()
            .filter(|a| a.status == AssignmentStatus::Ativo)
            .max_by(|a, b| a.inicio.cmp(&b.inicio)))
    }

    /// Inserts the entry unless one with the same id exists, in which case
    /// the stored entry is returned untouched.
    pub async fn record_audit(&self, entry: AuditEntry) -> Result<AuditEntry> {
        let store = AuditEntry::KIND.store_name();
        let mut entry = canonicalize(entry)?;
        let created_at = *entry.created_at.get_or_insert_with(|| self.clock.now());
        if entry.audit_id.is_empty() {
            entry.audit_id = derive_audit_id(&entry, created_at);
        }

        let mut uow = self.unit_of_work("record_audit", &[store]).await?;
        if let Some(raw) = uow.get(store, &entry.audit_id).await? {
            uow.commit().await?;
            tracing::debug!(audit_id = %entry.audit_id, "audit entry already recorded");
            return Ok(AuditEntry::normalize(&raw));
        }

        let document = to_document(store, &entry.audit_id, &entry)?;
        uow.insert_if_absent(store, &entry.audit_id, &document).await?;
        uow.commit().await?;
        Ok(entry)
    }

    /// Append-only error sink.
    pub async fn log_error(&self, entry: ErrorEntry) -> Result<ErrorEntry> {
        let store = ErrorEntry::KIND.store_name();
        let mut entry = canonicalize(entry)?;
        entry.created_at.get_or_insert_with(|| self.clock.now());
        if entry.error_id.is_empty() {
            entry.error_id = Uuid::new_v4().to_string();
        }

        let mut uow = self.unit_of_work("log_error", &[store]).await?;
        let document = to_document(store, &entry.error_id, &entry)?;
        if !uow.insert_if_absent(store, &entry.error_id, &document).await? {
            tracing::warn!(error_id = %entry.error_id, "error entry id already used; kept original");
        }
        uow.commit().await?;
        Ok(entry)
    }

    /// Audit entries matching `filter`, oldest first.
    pub async fn list_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        let mut entries: Vec<AuditEntry> = match filter.entity_type.as_deref() {
            Some(entity_type) => self.find_by_index("entity_type", entity_type).await?,
            None => self.get_all().await?,
        };
        entries.retain(|entry| filter.matches(entry));
        entries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.audit_id.cmp(&b.audit_id))
        });
        Ok(entries)
    }

    pub async fn audit_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEntry>> {
        self.list_audit(&AuditFilter {
            entity_type: Some(entity_type.to_string()),
            entity_id: Some(entity_id.to_string()),
            ..AuditFilter::default()
        })
        .await
    }

    /// Error entries, oldest first.
    pub async fn list_errors(&self) -> Result<Vec<ErrorEntry>> {
        let mut entries: Vec<ErrorEntry> = self.get_all().await?;
        entries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.error_id.cmp(&b.error_id))
        });
        Ok(entries)
    }

    /// Record counts per store, in schema order.
    pub async fn counts(&self) -> Result<Vec<(EntityKind, usize)>> {
        let names = schema::all_store_names();
        let mut uow = self.unit_of_work("counts", &names).await?;
        let mut counts = Vec::with_capacity(names.len());
        for def in schema::STORES.iter() {
            counts.push((def.kind, uow.all(def.name).await?.len()));
        }
        uow.commit().await?;
        Ok(counts)
    }
}

/// Runs the record through its own normalizer so only canonical shape is
/// ever written.
fn canonicalize<T: Record>(record: T) -> Result<T> {
    let value = to_document(T::KIND.store_name(), record.key(), &record)?;
    Ok(T::normalize(&value))
}

fn to_document<T: Record>(store: &str, key: &str, record: &T) -> Result<Value> {
    serde_json::to_value(record).map_err(|source| StoreError::CorruptRecord {
        store: store.to_string(),
        key: key.to_string(),
        source,
    })
}

pub(crate) fn stamp_for_save(stamps: &mut Stamps, existing: Option<&Stamps>, now: DateTime<Utc>) {
    if let Some(existing) = existing {
        if existing.created_at.is_some() {
            stamps.created_at = existing.created_at;
        }
        if !existing.uuid.is_empty() {
            stamps.uuid = existing.uuid.clone();
        }
    }
    if stamps.uuid.is_empty() {
        stamps.uuid = Uuid::new_v4().to_string();
    }
    stamps.created_at.get_or_insert(now);
    stamps.updated_at = Some(now);
}
