//! Record Normalizer: one explicit, total mapping per entity kind from any
//! historical document shape to the canonical record. Canonical field names
//! are listed first in every accessor call so they win over legacy spellings.

use serde::Serialize;
use serde_json::Value;

use crate::fields;
use crate::model::*;

const UUID_KEYS: &[&str] = &["uuid", "_uuid", "guid"];
const CREATED_KEYS: &[&str] = &["created_at", "createdAt", "criado_em", "data_criacao"];
const UPDATED_KEYS: &[&str] = &["updated_at", "updatedAt", "atualizado_em"];

fn stamps(raw: &Value) -> Stamps {
    Stamps {
        uuid: fields::text_or_empty(raw, UUID_KEYS),
        created_at: fields::timestamp(raw, CREATED_KEYS),
        updated_at: fields::timestamp(raw, UPDATED_KEYS),
    }
}

fn normalize_equipment(raw: &Value) -> Equipment {
    let funcao = fields::token(raw, &["funcao", "function", "tipo"])
        .and_then(|t| EquipmentFunction::from_token(&t));
    let geometria = match funcao {
        Some(EquipmentFunction::Horizontal) => fields::text(raw, &["geometria", "geometry"]),
        _ => None,
    };
    let status = fields::token(raw, &["status", "status_operacional", "situacao"])
        .map(|t| EquipmentStatus::from_token(&t))
        .unwrap_or_default();

    Equipment {
        id: fields::text_or_empty(raw, &["id", "codigo", "equipamento_id"]),
        stamps: stamps(raw),
        funcao,
        geometria,
        modelo: fields::text_or_empty(raw, &["modelo", "model"]),
        numero_serie: fields::text_or_empty(raw, &["numero_serie", "serie", "serial"]),
        fabricante: fields::text_or_empty(raw, &["fabricante", "manufacturer"]),
        data_calibracao: fields::text_or_empty(
            raw,
            &["data_calibracao", "calibracao", "calibration_date", "dataCalibracao"],
        ),
        status,
    }
}

fn normalize_user(raw: &Value) -> User {
    let id = fields::text_or_empty(raw, &["id", "user_id", "matricula", "login"]);
    let status = fields::token(raw, &["status"])
        .and_then(|t| UserStatus::from_token(&t))
        .or_else(|| {
            fields::boolean(raw, &["ativo", "active"]).map(|active| {
                if active {
                    UserStatus::Ativo
                } else {
                    UserStatus::Inativo
                }
            })
        })
        .unwrap_or_default();

    User {
        id_normalized: id.to_uppercase(),
        id,
        stamps: stamps(raw),
        nome: fields::text_or_empty(raw, &["nome", "name"]),
        role: fields::token(raw, &["role", "perfil"])
            .map(|t| UserRole::from_token(&t))
            .unwrap_or_default(),
        status,
        password_hash: fields::text_or_empty(raw, &["password_hash", "senha_hash", "hash"]),
        salt: fields::text_or_empty(raw, &["salt", "password_salt"]),
    }
}

fn normalize_assignment(raw: &Value) -> Assignment {
    let fim = fields::text(raw, &["fim", "data_fim", "end_date"]);
    let status = fields::token(raw, &["status"])
        .and_then(|t| AssignmentStatus::from_token(&t))
        .unwrap_or(if fim.is_some() {
            AssignmentStatus::Encerrado
        } else {
            AssignmentStatus::Ativo
        });

    Assignment {
        id: fields::text_or_empty(raw, &["id", "vinculo_id"]),
        stamps: stamps(raw),
        equipamento_id: fields::text_or_empty(
            raw,
            &["equipamento_id", "equip_id", "equipamento"],
        ),
        user_id: fields::text_or_empty(raw, &["user_id", "usuario_id", "usuario"]),
        inicio: fields::text_or_empty(raw, &["inicio", "data_inicio", "start_date"]),
        fim,
        status,
    }
}

fn geo_point(raw: &Value) -> Option<GeoPoint> {
    let source = ["localizacao", "gps", "geo", "location"]
        .iter()
        .filter_map(|key| raw.get(*key))
        .find(|value| value.is_object())
        .unwrap_or(raw);
    Some(GeoPoint {
        lat: fields::number(source, &["lat", "latitude"])?,
        lng: fields::number(source, &["lng", "lon", "longitude"])?,
        accuracy: fields::number(source, &["accuracy", "precisao"]),
    })
}

fn letter_readings(raw: &Value) -> Vec<LetterReadings> {
    fields::array(raw, &["letras", "legenda_letras"])
        .iter()
        .filter_map(|item| {
            let letra = fields::text(item, &["letra", "letter", "caractere"])?;
            Some(LetterReadings {
                letra,
                leituras: fields::numbers(item, &["leituras", "valores", "readings"]),
            })
        })
        .collect()
}

fn photo_refs(raw: &Value) -> Vec<String> {
    fields::array(raw, &["fotos", "photos", "imagens"])
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Object(_) => fields::text(item, &["id", "url", "nome"]),
            _ => None,
        })
        .collect()
}

fn normalize_measurement(raw: &Value) -> Measurement {
    let tipo_medicao = fields::text_or_empty(raw, &["tipo_medicao", "tipo"]);
    let subtipo = fields::token(raw, &["subtipo", "subtype", "tipo_sinalizacao"])
        .and_then(|t| MeasurementSubtype::from_token(&t))
        .or_else(|| MeasurementSubtype::from_token(&fields::canonical_token(&tipo_medicao)));

    Measurement {
        id: fields::text_or_empty(raw, &["id", "medicao_id"]),
        stamps: stamps(raw),
        equipamento_id: fields::text_or_empty(
            raw,
            &["equipamento_id", "equip_id", "equipamento"],
        ),
        user_id: fields::text_or_empty(raw, &["user_id", "usuario_id", "operador_id"]),
        obra_id: fields::text_or_empty(raw, &["obra_id", "obra", "project_id"]),
        tipo_medicao,
        subtipo,
        classe: fields::text(raw, &["classe", "classe_material", "class"]),
        elemento: fields::text(raw, &["elemento", "elemento_via", "posicao"]),
        geometria: fields::text(raw, &["geometria", "geometry"]),
        leituras: fields::numbers(raw, &["leituras", "valores", "readings"]),
        media: fields::number(raw, &["media", "valor_medio", "mean"]),
        legenda_texto: fields::text(raw, &["legenda_texto", "texto_legenda", "legenda"]),
        letras: letter_readings(raw),
        data_medicao: fields::text(raw, &["data_medicao", "data_hora", "data"]),
        data_aplicacao: fields::text(raw, &["data_aplicacao", "aplicacao"]),
        localizacao: geo_point(raw),
        fotos: photo_refs(raw),
    }
}

fn normalize_project(raw: &Value) -> Project {
    Project {
        id: fields::text_or_empty(raw, &["id", "obra_id", "codigo"]),
        stamps: stamps(raw),
        nome: fields::text_or_empty(raw, &["nome", "name"]),
        rodovia: fields::text_or_empty(raw, &["rodovia", "road"]),
        km_inicial: fields::number(raw, &["km_inicial", "km_inicio"]),
        km_final: fields::number(raw, &["km_final", "km_fim"]),
        cidade: fields::text_or_empty(raw, &["cidade", "city"]),
        uf: fields::text_or_empty(raw, &["uf", "estado", "state"]),
        cliente: fields::text_or_empty(raw, &["cliente", "client"]),
        responsavel: fields::text_or_empty(raw, &["responsavel", "responsavel_tecnico"]),
    }
}

fn normalize_criterion(raw: &Value) -> ConformityCriterion {
    ConformityCriterion {
        id: fields::text_or_empty(raw, &["id", "criterio_id"]),
        stamps: stamps(raw),
        obra_id: fields::text(raw, &["obra_id", "obra", "project_id"]),
        subtipo: fields::token(raw, &["subtipo", "subtype", "tipo"])
            .and_then(|t| MeasurementSubtype::from_token(&t)),
        classe: fields::text(raw, &["classe", "class"]),
        elemento: fields::text(raw, &["elemento", "element"]),
        periodo: fields::token(raw, &["periodo", "period"]).and_then(|t| Period::from_token(&t)),
        geometria: fields::text(raw, &["geometria", "geometry"]),
        valor_minimo: fields::number(raw, &["valor_minimo", "minimo", "min_value", "threshold"]),
    }
}

fn normalize_attachment(raw: &Value) -> AttachmentRecord {
    AttachmentRecord {
        id: fields::text_or_empty(raw, &["id", "anexo_id"]),
        stamps: stamps(raw),
        medicao_id: fields::text_or_empty(raw, &["medicao_id", "measurement_id"]),
        nome: fields::text_or_empty(raw, &["nome", "name", "filename"]),
        mime_type: fields::text_or_empty(raw, &["mime_type", "mime", "type"]),
        tamanho: fields::number(raw, &["tamanho", "size"])
            .filter(|size| *size >= 0.0)
            .map(|size| size as u64),
        conteudo: fields::text_or_empty(raw, &["conteudo", "data", "base64"]),
    }
}

fn normalize_audit(raw: &Value) -> AuditEntry {
    AuditEntry {
        audit_id: fields::text_or_empty(raw, &["audit_id", "auditId", "id"]),
        created_at: fields::timestamp(raw, &["created_at", "timestamp", "data"]),
        actor_user_id: fields::text_or_empty(
            raw,
            &["actor_user_id", "user_id", "usuario_id", "usuario"],
        ),
        organization_id: fields::text(raw, &["organization_id", "org_id"]),
        action: fields::token(raw, &["action", "acao"])
            .map(|t| AuditAction::from_token(&t))
            .unwrap_or(AuditAction::Other),
        entity_type: fields::text_or_empty(raw, &["entity_type", "entidade"]),
        entity_id: fields::text_or_empty(raw, &["entity_id", "entidade_id"]),
        summary: fields::text_or_empty(raw, &["summary", "resumo", "descricao"]),
        diff: fields::json(raw, &["diff", "changes"]),
        context: fields::json(raw, &["context", "contexto"]),
    }
}

fn normalize_error(raw: &Value) -> ErrorEntry {
    ErrorEntry {
        error_id: fields::text_or_empty(raw, &["error_id", "id"]),
        created_at: fields::timestamp(raw, &["created_at", "timestamp"]),
        module: fields::text_or_empty(raw, &["module", "modulo"]),
        action: fields::text_or_empty(raw, &["action", "acao"]),
        message: fields::text_or_empty(raw, &["message", "mensagem"]),
        stack: fields::text(raw, &["stack"]),
        context: fields::json(raw, &["context", "contexto"]),
    }
}

macro_rules! stamped_record {
    ($ty:ty, $kind:expr, $normalize:ident) => {
        impl Record for $ty {
            const KIND: EntityKind = $kind;

            fn normalize(raw: &Value) -> Self {
                $normalize(raw)
            }

            fn key(&self) -> &str {
                &self.id
            }
        }

        impl Stamped for $ty {
            fn stamps(&self) -> &Stamps {
                &self.stamps
            }

            fn stamps_mut(&mut self) -> &mut Stamps {
                &mut self.stamps
            }
        }
    };
}

stamped_record!(Equipment, EntityKind::Equipment, normalize_equipment);
stamped_record!(User, EntityKind::User, normalize_user);
stamped_record!(Assignment, EntityKind::Assignment, normalize_assignment);
stamped_record!(Measurement, EntityKind::Measurement, normalize_measurement);
stamped_record!(Project, EntityKind::Project, normalize_project);
stamped_record!(ConformityCriterion, EntityKind::Criterion, normalize_criterion);
stamped_record!(AttachmentRecord, EntityKind::Attachment, normalize_attachment);

impl Record for AuditEntry {
    const KIND: EntityKind = EntityKind::Audit;

    fn normalize(raw: &Value) -> Self {
        normalize_audit(raw)
    }

    fn key(&self) -> &str {
        &self.audit_id
    }
}

impl Record for ErrorEntry {
    const KIND: EntityKind = EntityKind::Error;

    fn normalize(raw: &Value) -> Self {
        normalize_error(raw)
    }

    fn key(&self) -> &str {
        &self.error_id
    }
}

/// A canonical record of any kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CanonicalRecord {
    Equipment(Equipment),
    User(User),
    Assignment(Assignment),
    Measurement(Measurement),
    Project(Project),
    Criterion(ConformityCriterion),
    Attachment(AttachmentRecord),
    Audit(AuditEntry),
    Error(ErrorEntry),
}

impl CanonicalRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            CanonicalRecord::Equipment(_) => EntityKind::Equipment,
            CanonicalRecord::User(_) => EntityKind::User,
            CanonicalRecord::Assignment(_) => EntityKind::Assignment,
            CanonicalRecord::Measurement(_) => EntityKind::Measurement,
            CanonicalRecord::Project(_) => EntityKind::Project,
            CanonicalRecord::Criterion(_) => EntityKind::Criterion,
            CanonicalRecord::Attachment(_) => EntityKind::Attachment,
            CanonicalRecord::Audit(_) => EntityKind::Audit,
            CanonicalRecord::Error(_) => EntityKind::Error,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            CanonicalRecord::Equipment(r) => r.key(),
            CanonicalRecord::User(r) => r.key(),
            CanonicalRecord::Assignment(r) => r.key(),
            CanonicalRecord::Measurement(r) => r.key(),
            CanonicalRecord::Project(r) => r.key(),
            CanonicalRecord::Criterion(r) => r.key(),
            CanonicalRecord::Attachment(r) => r.key(),
            CanonicalRecord::Audit(r) => r.key(),
            CanonicalRecord::Error(r) => r.key(),
        }
    }

    /// Surrogate identity and stamps, for kinds that carry them.
    pub fn stamps_mut(&mut self) -> Option<&mut Stamps> {
        match self {
            CanonicalRecord::Equipment(r) => Some(r.stamps_mut()),
            CanonicalRecord::User(r) => Some(r.stamps_mut()),
            CanonicalRecord::Assignment(r) => Some(r.stamps_mut()),
            CanonicalRecord::Measurement(r) => Some(r.stamps_mut()),
            CanonicalRecord::Project(r) => Some(r.stamps_mut()),
            CanonicalRecord::Criterion(r) => Some(r.stamps_mut()),
            CanonicalRecord::Attachment(r) => Some(r.stamps_mut()),
            CanonicalRecord::Audit(_) | CanonicalRecord::Error(_) => None,
        }
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// `normalize(raw, kind)`: total, pure and idempotent over its own output.
pub fn normalize(raw: &Value, kind: EntityKind) -> CanonicalRecord {
    match kind {
        EntityKind::Equipment => CanonicalRecord::Equipment(normalize_equipment(raw)),
        EntityKind::User => CanonicalRecord::User(normalize_user(raw)),
        EntityKind::Assignment => CanonicalRecord::Assignment(normalize_assignment(raw)),
        EntityKind::Measurement => CanonicalRecord::Measurement(normalize_measurement(raw)),
        EntityKind::Project => CanonicalRecord::Project(normalize_project(raw)),
        EntityKind::Criterion => CanonicalRecord::Criterion(normalize_criterion(raw)),
        EntityKind::Attachment => CanonicalRecord::Attachment(normalize_attachment(raw)),
        EntityKind::Audit => CanonicalRecord::Audit(normalize_audit(raw)),
        EntityKind::Error => CanonicalRecord::Error(normalize_error(raw)),
    }
}
