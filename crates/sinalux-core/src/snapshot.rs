//! Whole-store export, import and import preview.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sinalux_records::fields::parse_timestamp;
use sinalux_records::{normalize, CanonicalRecord, EntityKind};

use crate::error::{Result, StoreError};
use crate::migrations::fill_identity;
use crate::schema::{all_store_names, SCHEMA_VERSION};
use crate::store::{stamp_for_save, LocalStore};
use crate::unit_of_work::UnitOfWork;

pub const EXPORT_VERSION: u32 = 1;

type RawRecords = Vec<Map<String, Value>>;

fn default_export_version() -> u32 {
    EXPORT_VERSION
}

/// `created_at` is informational; an unreadable value is dropped rather than
/// failing the whole document.
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_timestamp(&value))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default = "default_export_version")]
    pub export_version: u32,
    #[serde(default)]
    pub schema_version: i64,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub equipamentos: RawRecords,
    #[serde(default)]
    pub users: RawRecords,
    /// Legacy spelling of `users`. Exports repeat `users` here for older
    /// readers; on import it is merged after `users` unless it is that copy.
    #[serde(default)]
    pub usuarios: RawRecords,
    #[serde(default)]
    pub vinculos: RawRecords,
    #[serde(default)]
    pub medicoes: RawRecords,
    #[serde(default)]
    pub obras: RawRecords,
    #[serde(default)]
    pub criterios: RawRecords,
    #[serde(default)]
    pub anexos: RawRecords,
    #[serde(default)]
    pub audit_log: RawRecords,
    /// Legacy spelling of `audit_log`; merged after it on import.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auditoria: RawRecords,
    #[serde(default)]
    pub error_log: RawRecords,
}

impl SnapshotDocument {
    /// Shape check only: every collection must be an array of objects.
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|err| StoreError::MalformedSnapshot(err.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| StoreError::MalformedSnapshot(err.to_string()))
    }

    /// Records per kind, in import order.
    fn collections(&self) -> Vec<(EntityKind, Vec<&Map<String, Value>>)> {
        vec![
            (EntityKind::Equipment, self.equipamentos.iter().collect()),
            (EntityKind::User, self.users_with_legacy()),
            (EntityKind::Assignment, self.vinculos.iter().collect()),
            (EntityKind::Measurement, self.medicoes.iter().collect()),
            (EntityKind::Project, self.obras.iter().collect()),
            (EntityKind::Criterion, self.criterios.iter().collect()),
            (EntityKind::Attachment, self.anexos.iter().collect()),
            (
                EntityKind::Audit,
                self.audit_log.iter().chain(self.auditoria.iter()).collect(),
            ),
            (EntityKind::Error, self.error_log.iter().collect()),
        ]
    }

    fn users_with_legacy(&self) -> Vec<&Map<String, Value>> {
        if self.usuarios == self.users {
            return self.users.iter().collect();
        }
        self.users.iter().chain(self.usuarios.iter()).collect()
    }

    fn collection_mut(&mut self, kind: EntityKind) -> &mut RawRecords {
        match kind {
            EntityKind::Equipment => &mut self.equipamentos,
            EntityKind::User => &mut self.users,
            EntityKind::Assignment => &mut self.vinculos,
            EntityKind::Measurement => &mut self.medicoes,
            EntityKind::Project => &mut self.obras,
            EntityKind::Criterion => &mut self.criterios,
            EntityKind::Attachment => &mut self.anexos,
            EntityKind::Audit => &mut self.audit_log,
            EntityKind::Error => &mut self.error_log,
        }
    }

    pub fn record_count(&self) -> usize {
        self.collections().iter().map(|(_, records)| records.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportCounts {
    pub created: usize,
    pub updated: usize,
    /// Repeated keys within the document, and audit/error entries that
    /// already exist.
    pub ignored: usize,
    /// Records without a business key. Any such record aborts an import.
    pub invalid: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub counts: BTreeMap<EntityKind, ImportCounts>,
}

impl ImportReport {
    pub fn get(&self, kind: EntityKind) -> ImportCounts {
        self.counts.get(&kind).copied().unwrap_or_default()
    }

    pub fn total(&self) -> ImportCounts {
        self.counts
            .values()
            .fold(ImportCounts::default(), |acc, c| ImportCounts {
                created: acc.created + c.created,
                updated: acc.updated + c.updated,
                ignored: acc.ignored + c.ignored,
                invalid: acc.invalid + c.invalid,
            })
    }
}

fn check_version(document: &SnapshotDocument) -> Result<()> {
    if document.schema_version > SCHEMA_VERSION {
        return Err(StoreError::SchemaTooNew {
            found: document.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(())
}

fn to_object(record: &CanonicalRecord, store: &str) -> Result<Map<String, Value>> {
    match record.to_value() {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(StoreError::Validation(format!(
            "record `{}` in `{store}` did not serialize to an object",
            record.key()
        ))),
        Err(source) => Err(StoreError::CorruptRecord {
            store: store.to_string(),
            key: record.key().to_string(),
            source,
        }),
    }
}

/// Reads every store inside one unit of work so the snapshot is consistent.
pub async fn export_snapshot(store: &LocalStore) -> Result<SnapshotDocument> {
    let names = all_store_names();
    let mut uow = store.unit_of_work("export_snapshot", &names).await?;

    let mut document = SnapshotDocument {
        export_version: EXPORT_VERSION,
        schema_version: SCHEMA_VERSION,
        created_at: Some(store.now()),
        app_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        ..SnapshotDocument::default()
    };

    for kind in EntityKind::ALL {
        let name = kind.store_name();
        let rows = uow.all(name).await?;
        let collection = document.collection_mut(kind);
        for (_, raw) in rows {
            collection.push(to_object(&normalize(&raw, kind), name)?);
        }
    }
    uow.commit().await?;
    document.usuarios = document.users.clone();

    tracing::info!(records = document.record_count(), "snapshot exported");
    Ok(document)
}

/// Counts what an import would do, without writing anything.
pub async fn build_import_preview(
    store: &LocalStore,
    document: &SnapshotDocument,
) -> Result<ImportReport> {
    check_version(document)?;
    let names = all_store_names();
    let mut uow = store.unit_of_work("build_import_preview", &names).await?;

    let mut report = ImportReport::default();
    for (kind, records) in document.collections() {
        let name = kind.store_name();
        let counts = report.counts.entry(kind).or_default();
        let mut seen = HashSet::new();
        for raw in records {
            let record = normalize(&Value::Object(raw.clone()), kind);
            let key = record.key();
            if key.is_empty() {
                counts.invalid += 1;
            } else if !seen.insert(key.to_string()) {
                counts.ignored += 1;
            } else if uow.get(name, key).await?.is_some() {
                if kind.is_append_only() {
                    counts.ignored += 1;
                } else {
                    counts.updated += 1;
                }
            } else {
                counts.created += 1;
            }
        }
    }
    uow.rollback().await?;
    Ok(report)
}

/// Upserts every record of the document in one unit of work. A failure on
/// any record leaves every store as it was.
pub async fn import_snapshot(
    store: &LocalStore,
    document: &SnapshotDocument,
) -> Result<ImportReport> {
    check_version(document)?;
    let names = all_store_names();
    let mut uow = store.unit_of_work("import_snapshot", &names).await?;
    let now = store.now();

    let mut report = ImportReport::default();
    for (kind, records) in document.collections() {
        let counts = import_collection(&mut uow, kind, records, now).await?;
        if counts != ImportCounts::default() {
            tracing::info!(
                kind = %kind,
                created = counts.created,
                updated = counts.updated,
                ignored = counts.ignored,
                "snapshot collection imported"
            );
        }
        report.counts.insert(kind, counts);
    }
    uow.commit().await?;
    Ok(report)
}

async fn import_collection(
    uow: &mut UnitOfWork,
    kind: EntityKind,
    records: Vec<&Map<String, Value>>,
    now: DateTime<Utc>,
) -> Result<ImportCounts> {
    let name = kind.store_name();
    let mut counts = ImportCounts::default();
    let mut seen = HashSet::new();

    for raw in records {
        let mut record = normalize(&Value::Object(raw.clone()), kind);
        let key = record.key().to_string();
        // An empty key is written anyway; the store's key constraint aborts
        // the whole unit of work.
        if !key.is_empty() && !seen.insert(key.clone()) {
            counts.ignored += 1;
            continue;
        }

        let existing = uow.get(name, &key).await?;
        if kind.is_append_only() {
            fill_identity(&mut record, now);
            let document = Value::Object(to_object(&record, name)?);
            if uow.insert_if_absent(name, &key, &document).await? {
                counts.created += 1;
            } else {
                counts.ignored += 1;
            }
            continue;
        }

        let mut existing_record = existing.as_ref().map(|raw| normalize(raw, kind));
        if let (Some(stamps), Some(previous)) = (
            record.stamps_mut(),
            existing_record.as_mut().and_then(|r| r.stamps_mut()),
        ) {
            // Keep the stored identity when the incoming record lacks one.
            if stamps.uuid.is_empty() || stamps.created_at.is_none() {
                let updated_at = stamps.updated_at;
                stamp_for_save(stamps, Some(&*previous), now);
                stamps.updated_at = updated_at.or(Some(now));
            }
        }
        fill_identity(&mut record, now);

        let document = Value::Object(to_object(&record, name)?);
        uow.put(name, &key, &document).await?;
        if existing.is_some() {
            counts.updated += 1;
        } else {
            counts.created += 1;
        }
    }
    Ok(counts)
}
