use std::sync::Arc;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use sinalux_core::clock::FixedClock;
use sinalux_core::criteria_manifest::{apply_manifest, parse_manifest, resolve_manifest, ManifestError};
use sinalux_core::store::LocalStore;
use sinalux_records::{ConformityCriterion, MeasurementSubtype, Period};

fn manifest_fixture() -> &'static str {
    r#"
[[criterios]]
id = "dnit-h-ini"
subtipo = "horizontal"
periodo = "inicial"
geometria = "15m"
valor_minimo = 250.0

[[criterios]]
id = "p1-vertical-iii"
obra_id = "P1"
subtipo = "VERTICAL"
classe = "III"
elemento = "  "
valor_minimo = 180
"#
}

#[test]
fn manifest_entries_resolve_to_criteria() -> Result<()> {
    let manifest = parse_manifest(manifest_fixture())?;
    let criteria = resolve_manifest(&manifest)?;
    assert_eq!(criteria.len(), 2);

    let horizontal = &criteria[0];
    assert_eq!(horizontal.subtipo, Some(MeasurementSubtype::Horizontal));
    assert_eq!(horizontal.periodo, Some(Period::Inicial));
    assert_eq!(horizontal.obra_id, None);
    assert_eq!(horizontal.valor_minimo, Some(250.0));

    let vertical = &criteria[1];
    assert_eq!(vertical.obra_id.as_deref(), Some("P1"));
    assert_eq!(vertical.elemento, None);
    assert_eq!(vertical.qualifier_count(), 1);
    Ok(())
}

#[test]
fn unknown_subtype_is_rejected() -> Result<()> {
    let manifest = parse_manifest(
        r#"
[[criterios]]
id = "bad"
subtipo = "pintura"
valor_minimo = 1
"#,
    )?;
    let err = resolve_manifest(&manifest).unwrap_err();
    assert!(matches!(err, ManifestError::Invalid { ref id, .. } if id == "bad"));
    Ok(())
}

#[test]
fn duplicate_ids_are_rejected() -> Result<()> {
    let manifest = parse_manifest(
        r#"
[[criterios]]
id = "dup"
subtipo = "TACHAS"
valor_minimo = 1

[[criterios]]
id = "dup"
subtipo = "TACHAS"
valor_minimo = 2
"#,
    )?;
    assert!(matches!(
        resolve_manifest(&manifest),
        Err(ManifestError::DuplicateId(id)) if id == "dup"
    ));
    Ok(())
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let err = parse_manifest("[[criterios]]\nid = ").unwrap_err();
    assert!(matches!(err, ManifestError::Toml(_)));
}

#[tokio::test]
async fn apply_manifest_upserts_criteria() -> Result<()> {
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()));
    let store = LocalStore::in_memory(clock).await?;

    let manifest = parse_manifest(manifest_fixture())?;
    let summary = apply_manifest(&store, &manifest).await?;
    assert_eq!(summary.criteria_upserted, 2);

    // Applying twice replaces rather than duplicates.
    apply_manifest(&store, &manifest).await?;
    let stored = store.get_all::<ConformityCriterion>().await?;
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|c| c.stamps.is_complete()));

    let scoped: Vec<ConformityCriterion> = store.find_by_index("obra_id", "P1").await?;
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].id, "p1-vertical-iii");
    Ok(())
}
