use serde_json::{json, Value};

use crate::fields::canonical_token;
use crate::model::*;
use crate::normalize::normalize;

fn renormalizes_to_itself(raw: Value, kind: EntityKind) {
    let once = normalize(&raw, kind);
    let value = once.to_value().expect("serializable");
    let twice = normalize(&value, kind);
    assert_eq!(once, twice, "normalize is not idempotent for {kind}");
}

#[test]
fn normalization_is_idempotent_for_every_kind() {
    let samples = [
        (
            EntityKind::Equipment,
            json!({
                "codigo": "EQ-1", "tipo": "horizontal", "geometry": "15m",
                "serie": 42, "status_operacional": "Lab tintas",
                "createdAt": "2024-03-01T10:00:00Z", "uuid": "u-1"
            }),
        ),
        (
            EntityKind::User,
            json!({"matricula": "op-7", "name": "Ana", "perfil": "operador", "ativo": false}),
        ),
        (
            EntityKind::Assignment,
            json!({"vinculo_id": "V1", "equip_id": "EQ-1", "usuario_id": "op-7", "data_inicio": "2024-01-01", "data_fim": "2024-02-01"}),
        ),
        (
            EntityKind::Measurement,
            json!({
                "medicao_id": "M1", "tipo": "legenda", "valores": ["1,5", 2, null, "x"],
                "texto_legenda": "PARE", "gps": {"latitude": -23.5, "longitude": -46.6},
                "legenda_letras": [{"letter": "A", "valores": [1, 2, 3]}, {"valores": [9]}],
                "photos": [{"url": "a.jpg"}, "b.jpg", 3]
            }),
        ),
        (
            EntityKind::Project,
            json!({"obra_id": "OB-1", "name": "BR-101", "km_inicio": "10,5", "estado": "SP"}),
        ),
        (
            EntityKind::Criterion,
            json!({"id": "C1", "tipo": "horizontal", "period": "initial", "minimo": "100"}),
        ),
        (
            EntityKind::Attachment,
            json!({"id": "AX1", "measurement_id": "M1", "size": 1024, "mime": "image/png"}),
        ),
        (
            EntityKind::Audit,
            json!({"auditId": "A1", "acao": "login", "usuario": "op-7", "timestamp": 1_700_000_000_000_i64, "changes": {"a": 1}}),
        ),
        (
            EntityKind::Error,
            json!({"id": "E1", "modulo": "sync", "mensagem": "timeout", "contexto": {"try": 2}}),
        ),
    ];

    for (kind, raw) in samples {
        renormalizes_to_itself(raw, kind);
    }
}

#[test]
fn canonical_field_wins_over_legacy_alias() {
    let raw = json!({"id": "NEW", "codigo": "OLD", "modelo": "RX", "model": "legacy"});
    let record = normalize(&raw, EntityKind::Equipment);
    assert_eq!(record.key(), "NEW");
    let value = record.to_value().unwrap();
    assert_eq!(value["modelo"], "RX");
}

#[test]
fn geometry_is_dropped_unless_horizontal() {
    let vertical = Equipment::normalize_for_test(json!({"id": "E", "funcao": "VERTICAL", "geometria": "30m"}));
    assert_eq!(vertical.geometria, None);

    let horizontal =
        Equipment::normalize_for_test(json!({"id": "E", "funcao": "HORIZONTAL", "geometria": "30m"}));
    assert_eq!(horizontal.geometria.as_deref(), Some("30m"));
}

#[test]
fn unknown_equipment_status_falls_back_to_stand_by() {
    let eq = Equipment::normalize_for_test(json!({"id": "E", "status": "em manutencao"}));
    assert_eq!(eq.status, EquipmentStatus::StandBy);

    let eq = Equipment::normalize_for_test(json!({"id": "E", "status": "lab-tintas"}));
    assert_eq!(eq.status, EquipmentStatus::LabTintas);
}

#[test]
fn readings_keep_only_finite_numbers() {
    let m = Measurement::normalize_for_test(json!({
        "id": "M",
        "leituras": [1, "2,5", "", null, "abc", {"valor": 4}]
    }));
    assert_eq!(m.leituras, vec![1.0, 2.5, 4.0]);
}

#[test]
fn user_identity_is_uppercased_for_lookup() {
    let user = User::normalize_for_test(json!({"login": "maria.silva", "role": "admin"}));
    assert_eq!(user.id, "maria.silva");
    assert_eq!(user.id_normalized, "MARIA.SILVA");
    assert_eq!(user.role, UserRole::Admin);
    assert_eq!(user.status, UserStatus::Ativo);
}

#[test]
fn assignment_status_defaults_from_end_date() {
    let open = Assignment::normalize_for_test(json!({"id": "V", "inicio": "2024-01-01"}));
    assert_eq!(open.status, AssignmentStatus::Ativo);

    let closed =
        Assignment::normalize_for_test(json!({"id": "V", "inicio": "2024-01-01", "fim": "2024-06-01"}));
    assert_eq!(closed.status, AssignmentStatus::Encerrado);
}

#[test]
fn measurement_subtype_falls_back_to_legacy_type() {
    let m = Measurement::normalize_for_test(json!({"id": "M", "tipo": "Legendas"}));
    assert_eq!(m.subtipo, Some(MeasurementSubtype::Legenda));
    assert_eq!(m.tipo_medicao, "Legendas");
}

#[test]
fn non_object_input_yields_empty_record() {
    let record = normalize(&json!("garbage"), EntityKind::Project);
    assert_eq!(record.key(), "");
    assert_eq!(record.kind(), EntityKind::Project);
}

#[test]
fn tokens_fold_accents_and_separators() {
    assert_eq!(canonical_token("  Demonstração "), "DEMONSTRACAO");
    assert_eq!(canonical_token("stand - by"), "STAND_BY");
    assert_eq!(canonical_token("__"), "");
}

trait NormalizeForTest: Record {
    fn normalize_for_test(raw: Value) -> Self {
        Self::normalize(&raw)
    }
}

impl<T: Record> NormalizeForTest for T {}
