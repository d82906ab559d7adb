//! Store and index definitions for the current schema version.

use sinalux_records::EntityKind;

pub const SCHEMA_VERSION: i64 = 6;

/// Deprecated store folded into `users` by migration 3.
pub const LEGACY_USERS_STORE: &str = "usuarios";
/// Deprecated store folded into `audit_log` by migration 4.
pub const LEGACY_AUDIT_STORE: &str = "auditoria";

#[derive(Debug, Clone, Copy)]
pub struct StoreDef {
    pub kind: EntityKind,
    pub name: &'static str,
    /// Non-unique single-field indexes, by canonical field name.
    pub indexes: &'static [&'static str],
}

impl StoreDef {
    pub fn has_index(&self, field: &str) -> bool {
        self.indexes.contains(&field)
    }
}

pub static STORES: [StoreDef; 9] = [
    StoreDef {
        kind: EntityKind::Equipment,
        name: "equipamentos",
        indexes: &["status", "funcao", "uuid"],
    },
    StoreDef {
        kind: EntityKind::User,
        name: "users",
        indexes: &["id_normalized", "role", "status"],
    },
    StoreDef {
        kind: EntityKind::Assignment,
        name: "vinculos",
        indexes: &["equipamento_id", "user_id", "status"],
    },
    StoreDef {
        kind: EntityKind::Measurement,
        name: "medicoes",
        indexes: &["equipamento_id", "user_id", "obra_id", "subtipo"],
    },
    StoreDef {
        kind: EntityKind::Project,
        name: "obras",
        indexes: &["cliente"],
    },
    StoreDef {
        kind: EntityKind::Criterion,
        name: "criterios",
        indexes: &["obra_id", "subtipo"],
    },
    StoreDef {
        kind: EntityKind::Attachment,
        name: "anexos",
        indexes: &["medicao_id"],
    },
    StoreDef {
        kind: EntityKind::Audit,
        name: "audit_log",
        indexes: &["entity_type", "entity_id", "action", "actor_user_id", "created_at"],
    },
    StoreDef {
        kind: EntityKind::Error,
        name: "error_log",
        indexes: &["module", "created_at"],
    },
];

pub fn store_def(kind: EntityKind) -> &'static StoreDef {
    let position = match kind {
        EntityKind::Equipment => 0,
        EntityKind::User => 1,
        EntityKind::Assignment => 2,
        EntityKind::Measurement => 3,
        EntityKind::Project => 4,
        EntityKind::Criterion => 5,
        EntityKind::Attachment => 6,
        EntityKind::Audit => 7,
        EntityKind::Error => 8,
    };
    &STORES[position]
}

pub fn all_store_names() -> Vec<&'static str> {
    STORES.iter().map(|def| def.name).collect()
}

pub(crate) fn current_store(name: &str) -> Option<&'static StoreDef> {
    STORES.iter().find(|def| def.name == name)
}

pub(crate) fn create_store_sql(name: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {name} (\
            key TEXT PRIMARY KEY NOT NULL CHECK (length(key) > 0), \
            value TEXT NOT NULL CHECK (json_valid(value))\
        )"
    )
}

pub(crate) fn index_name(store: &str, field: &str) -> String {
    format!("idx_{store}_{field}")
}

pub(crate) fn create_index_sql(store: &str, field: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {index} ON {store} (json_extract(value, '$.{field}'))",
        index = index_name(store, field)
    )
}

/// Equality lookup through the expression index on `field`.
pub(crate) fn index_lookup_sql(store: &str, field: &str) -> String {
    format!(
        "SELECT key, value FROM {store} WHERE json_extract(value, '$.{field}') = ? ORDER BY key"
    )
}
