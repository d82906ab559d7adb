use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use sinalux_core::audit::SessionContext;
use sinalux_core::clock::{Clock, FixedClock};
use sinalux_core::error::{ErrorClass, StoreError};
use sinalux_core::snapshot::{
    build_import_preview, export_snapshot, import_snapshot, SnapshotDocument,
};
use sinalux_core::store::{AuditFilter, LocalStore};
use sinalux_records::{
    AuditAction, EntityKind, Equipment, Measurement, Project, Record, User,
};

async fn open() -> Result<(LocalStore, Arc<FixedClock>)> {
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap()));
    let store = LocalStore::in_memory(clock.clone()).await?;
    Ok((store, clock))
}

async fn seed(store: &LocalStore) -> Result<()> {
    store
        .bulk_save(vec![
            Equipment::normalize(&json!({"id": "EQ-1", "funcao": "HORIZONTAL", "geometria": "15m"})),
            Equipment::normalize(&json!({"id": "EQ-2", "funcao": "VERTICAL"})),
        ])
        .await?;
    store
        .save(User::normalize(&json!({"id": "ana", "nome": "Ana", "role": "ADMIN"})))
        .await?;
    store
        .save(Project::normalize(&json!({"id": "P1", "nome": "BR-101 lote 2"})))
        .await?;
    store
        .save(Measurement::normalize(&json!({
            "id": "M1", "obra_id": "P1", "equipamento_id": "EQ-1",
            "subtipo": "HORIZONTAL", "leituras": [100, 110, 120],
            "localizacao": {"lat": -23.5, "lng": -46.6}
        })))
        .await?;
    store
        .record_audit(SessionContext::new("ana").audit_entry(
            AuditAction::EntityCreated,
            "equipment",
            "EQ-1",
            "seeded",
        ))
        .await?;
    Ok(())
}

fn sorted_json(document: &SnapshotDocument) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(document)?;
    if let Some(object) = value.as_object_mut() {
        object.remove("created_at");
    }
    Ok(value)
}

#[tokio::test]
async fn export_then_import_reproduces_the_store() -> Result<()> {
    let (source, _) = open().await?;
    seed(&source).await?;
    let exported = export_snapshot(&source).await?;
    assert_eq!(exported.equipamentos.len(), 2);
    assert_eq!(exported.audit_log.len(), 1);
    assert_eq!(exported.record_count(), 6);

    let text = exported.to_json_pretty()?;
    let parsed = SnapshotDocument::from_json(&text)?;

    let (target, _) = open().await?;
    let report = import_snapshot(&target, &parsed).await?;
    assert_eq!(report.total().created, 6);
    assert_eq!(report.total().updated, 0);

    let reexported = export_snapshot(&target).await?;
    assert_eq!(sorted_json(&reexported)?, sorted_json(&exported)?);
    Ok(())
}

#[tokio::test]
async fn export_repeats_users_under_legacy_name() -> Result<()> {
    let (source, _) = open().await?;
    seed(&source).await?;
    let exported = export_snapshot(&source).await?;
    assert_eq!(exported.usuarios, exported.users);

    let value: serde_json::Value = serde_json::from_str(&exported.to_json_pretty()?)?;
    assert_eq!(value["usuarios"][0]["id"], "ana");

    let (target, _) = open().await?;
    let report = import_snapshot(&target, &exported).await?;
    let users = report.get(EntityKind::User);
    assert_eq!(users.created, 1);
    assert_eq!(users.ignored, 0);
    Ok(())
}

#[tokio::test]
async fn audit_log_and_auditoria_are_merged() -> Result<()> {
    let (store, _) = open().await?;
    let document = SnapshotDocument::from_json(
        &json!({
            "audit_log": [{"audit_id": "evt-1", "action": "EXPORT_JSON", "actor_user_id": "ana"}],
            "auditoria": [
                {"audit_id": "evt-1", "acao": "LOGIN", "usuario": "ana"},
                {"audit_id": "evt-2", "acao": "LOGIN", "usuario": "rui"}
            ]
        })
        .to_string(),
    )?;

    let report = import_snapshot(&store, &document).await?;
    let audit = report.get(EntityKind::Audit);
    assert_eq!(audit.created, 2);
    assert_eq!(audit.ignored, 1);

    let entries = store.list_audit(&AuditFilter::default()).await?;
    let first = entries.iter().find(|e| e.audit_id == "evt-1").expect("evt-1");
    assert_eq!(first.action, AuditAction::ExportJson);
    Ok(())
}

#[test]
fn legacy_created_at_formats_are_tolerated() -> Result<()> {
    let millis = SnapshotDocument::from_json(r#"{"created_at": 1717407000000}"#)?;
    assert_eq!(
        millis.created_at,
        Some(Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap())
    );

    let spaced = SnapshotDocument::from_json(r#"{"created_at": "2024-06-03 09:30:00"}"#)?;
    assert_eq!(spaced.created_at, millis.created_at);

    let unreadable = SnapshotDocument::from_json(r#"{"created_at": "ontem", "obras": []}"#)?;
    assert_eq!(unreadable.created_at, None);
    Ok(())
}

#[tokio::test]
async fn import_counts_updates_and_repeated_keys() -> Result<()> {
    let (store, clock) = open().await?;
    seed(&store).await?;
    clock.advance(Duration::hours(1));

    let document = SnapshotDocument::from_json(
        &json!({
            "schema_version": 6,
            "equipamentos": [
                {"id": "EQ-1", "modelo": "updated"},
                {"id": "EQ-3"},
                {"id": "EQ-3", "modelo": "second copy"}
            ],
            "auditoria": [
                {"audit_id": "legacy-1", "acao": "LOGIN", "usuario": "ana"}
            ]
        })
        .to_string(),
    )?;

    let preview = build_import_preview(&store, &document).await?;
    let report = import_snapshot(&store, &document).await?;
    assert_eq!(preview, report);

    let equipment = report.get(EntityKind::Equipment);
    assert_eq!(equipment.created, 1);
    assert_eq!(equipment.updated, 1);
    assert_eq!(equipment.ignored, 1);
    assert_eq!(report.get(EntityKind::Audit).created, 1);

    let eq1: Equipment = store.get_by_id("EQ-1").await?.expect("EQ-1");
    assert_eq!(eq1.modelo, "updated");
    assert!(eq1.stamps.is_complete());
    assert_ne!(eq1.stamps.created_at, eq1.stamps.updated_at);

    let eq3: Equipment = store.get_by_id("EQ-3").await?.expect("EQ-3");
    assert_eq!(eq3.modelo, "");

    // Audit entries are never overwritten by a second import.
    let again = import_snapshot(&store, &document).await?;
    assert_eq!(again.get(EntityKind::Audit).ignored, 1);
    assert_eq!(store.list_audit(&AuditFilter::default()).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn imported_stamps_keep_stored_identity() -> Result<()> {
    let (store, clock) = open().await?;
    let saved = store
        .save(Equipment::normalize(&json!({"id": "EQ-1"})))
        .await?;
    clock.advance(Duration::days(2));

    let document = SnapshotDocument::from_json(
        &json!({"equipamentos": [{"id": "EQ-1", "fabricante": "Delta"}]}).to_string(),
    )?;
    import_snapshot(&store, &document).await?;

    let stored: Equipment = store.get_by_id("EQ-1").await?.expect("EQ-1");
    assert_eq!(stored.stamps.uuid, saved.stamps.uuid);
    assert_eq!(stored.stamps.created_at, saved.stamps.created_at);
    assert_eq!(stored.stamps.updated_at, Some(clock.now()));
    assert_eq!(stored.fabricante, "Delta");
    Ok(())
}

#[tokio::test]
async fn legacy_usuarios_collection_merges_after_users() -> Result<()> {
    let (store, _) = open().await?;
    let document = SnapshotDocument::from_json(
        &json!({
            "users": [{"id": "ana", "nome": "Ana"}],
            "usuarios": [{"matricula": "ana", "nome": "Old Ana"}, {"matricula": "rui"}]
        })
        .to_string(),
    )?;

    let report = import_snapshot(&store, &document).await?;
    let users = report.get(EntityKind::User);
    assert_eq!(users.created, 2);
    assert_eq!(users.ignored, 1);

    let ana: User = store.get_by_id("ana").await?.expect("ana");
    assert_eq!(ana.nome, "Ana");
    assert!(store.get_by_id::<User>("rui").await?.is_some());
    Ok(())
}

#[tokio::test]
async fn record_without_key_aborts_the_whole_import() -> Result<()> {
    let (store, _) = open().await?;
    seed(&store).await?;
    let before = export_snapshot(&store).await?;

    let document = SnapshotDocument::from_json(
        &json!({
            "equipamentos": [{"id": "EQ-9"}],
            "obras": [{"nome": "no key"}]
        })
        .to_string(),
    )?;

    let preview = build_import_preview(&store, &document).await?;
    assert_eq!(preview.get(EntityKind::Project).invalid, 1);
    assert_eq!(preview.get(EntityKind::Equipment).created, 1);

    let err = import_snapshot(&store, &document).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::TransactionAbort);

    let after = export_snapshot(&store).await?;
    assert_eq!(sorted_json(&after)?, sorted_json(&before)?);
    Ok(())
}

#[tokio::test]
async fn preview_does_not_write() -> Result<()> {
    let (store, _) = open().await?;
    let document = SnapshotDocument::from_json(
        &json!({"equipamentos": [{"id": "EQ-1"}, {"id": "EQ-2"}]}).to_string(),
    )?;

    let preview = build_import_preview(&store, &document).await?;
    assert_eq!(preview.get(EntityKind::Equipment).created, 2);
    assert!(store.get_all::<Equipment>().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn newer_snapshots_and_malformed_documents_are_rejected() -> Result<()> {
    let (store, _) = open().await?;

    let newer = SnapshotDocument::from_json(&json!({"schema_version": 7}).to_string())?;
    let err = import_snapshot(&store, &newer).await.unwrap_err();
    assert!(matches!(err, StoreError::SchemaTooNew { found: 7, .. }));
    let err = build_import_preview(&store, &newer).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::SchemaTooNew);

    let err = SnapshotDocument::from_json(r#"{"equipamentos": {"id": "EQ-1"}}"#).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);
    let err = SnapshotDocument::from_json(r#"{"medicoes": [1, 2]}"#).unwrap_err();
    assert!(matches!(err, StoreError::MalformedSnapshot(_)));
    Ok(())
}
