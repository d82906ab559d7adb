use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every persisted entity kind. Each kind lives in exactly one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Equipment,
    User,
    Assignment,
    Measurement,
    Project,
    Criterion,
    Attachment,
    Audit,
    Error,
}

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Equipment,
        EntityKind::User,
        EntityKind::Assignment,
        EntityKind::Measurement,
        EntityKind::Project,
        EntityKind::Criterion,
        EntityKind::Attachment,
        EntityKind::Audit,
        EntityKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Equipment => "equipment",
            EntityKind::User => "user",
            EntityKind::Assignment => "assignment",
            EntityKind::Measurement => "measurement",
            EntityKind::Project => "project",
            EntityKind::Criterion => "criterion",
            EntityKind::Attachment => "attachment",
            EntityKind::Audit => "audit",
            EntityKind::Error => "error",
        }
    }

    pub fn store_name(&self) -> &'static str {
        match self {
            EntityKind::Equipment => "equipamentos",
            EntityKind::User => "users",
            EntityKind::Assignment => "vinculos",
            EntityKind::Measurement => "medicoes",
            EntityKind::Project => "obras",
            EntityKind::Criterion => "criterios",
            EntityKind::Attachment => "anexos",
            EntityKind::Audit => "audit_log",
            EntityKind::Error => "error_log",
        }
    }

    /// Append-only kinds carry no surrogate uuid / update stamp.
    pub fn is_append_only(&self) -> bool {
        matches!(self, EntityKind::Audit | EntityKind::Error)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A closed record type with one canonical field set.
pub trait Record: Serialize + Clone + fmt::Debug + PartialEq + Send + Sync + Unpin + 'static {
    const KIND: EntityKind;

    /// Total mapping from an arbitrary (possibly legacy-shaped) document.
    fn normalize(raw: &Value) -> Self;

    fn key(&self) -> &str;
}

/// Records that carry surrogate identity and create/update stamps.
pub trait Stamped: Record {
    fn stamps(&self) -> &Stamps;
    fn stamps_mut(&mut self) -> &mut Stamps;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stamps {
    pub uuid: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Stamps {
    pub fn is_complete(&self) -> bool {
        !self.uuid.is_empty() && self.created_at.is_some() && self.updated_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentFunction {
    Horizontal,
    Vertical,
    Tachas,
}

impl EquipmentFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentFunction::Horizontal => "HORIZONTAL",
            EquipmentFunction::Vertical => "VERTICAL",
            EquipmentFunction::Tachas => "TACHAS",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "HORIZONTAL" | "H" => Some(Self::Horizontal),
            "VERTICAL" | "V" => Some(Self::Vertical),
            "TACHAS" | "TACHA" | "TACHINHAS" => Some(Self::Tachas),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentStatus {
    Obra,
    LabTintas,
    Demonstracao,
    Vendido,
    #[default]
    StandBy,
}

impl EquipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentStatus::Obra => "OBRA",
            EquipmentStatus::LabTintas => "LAB_TINTAS",
            EquipmentStatus::Demonstracao => "DEMONSTRACAO",
            EquipmentStatus::Vendido => "VENDIDO",
            EquipmentStatus::StandBy => "STAND_BY",
        }
    }

    /// Unrecognized input falls back to `StandBy`.
    pub fn from_token(token: &str) -> Self {
        match token {
            "OBRA" | "EM_OBRA" => Self::Obra,
            "LAB_TINTAS" | "LABORATORIO_TINTAS" | "LAB" => Self::LabTintas,
            "DEMONSTRACAO" | "DEMO" => Self::Demonstracao,
            "VENDIDO" => Self::Vendido,
            _ => Self::StandBy,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    #[default]
    User,
    Operador,
}

impl UserRole {
    pub fn from_token(token: &str) -> Self {
        match token {
            "ADMIN" | "ADMINISTRADOR" => Self::Admin,
            "OPERADOR" | "OPERATOR" => Self::Operador,
            _ => Self::User,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    #[default]
    Ativo,
    Inativo,
}

impl UserStatus {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "ATIVO" | "ACTIVE" | "TRUE" | "1" => Some(Self::Ativo),
            "INATIVO" | "INACTIVE" | "FALSE" | "0" => Some(Self::Inativo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Ativo,
    Encerrado,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Ativo => "ATIVO",
            AssignmentStatus::Encerrado => "ENCERRADO",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "ATIVO" | "ACTIVE" => Some(Self::Ativo),
            "ENCERRADO" | "CLOSED" | "FINALIZADO" => Some(Self::Encerrado),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeasurementSubtype {
    Horizontal,
    Vertical,
    Tachas,
    Legenda,
}

impl MeasurementSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementSubtype::Horizontal => "HORIZONTAL",
            MeasurementSubtype::Vertical => "VERTICAL",
            MeasurementSubtype::Tachas => "TACHAS",
            MeasurementSubtype::Legenda => "LEGENDA",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "HORIZONTAL" => Some(Self::Horizontal),
            "VERTICAL" | "PLACA" => Some(Self::Vertical),
            "TACHAS" | "TACHA" => Some(Self::Tachas),
            "LEGENDA" | "LEGENDAS" => Some(Self::Legenda),
            _ => None,
        }
    }
}

impl fmt::Display for MeasurementSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Age of a horizontal marking at measurement time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Period {
    Inicial,
    Residual,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Inicial => "INICIAL",
            Period::Residual => "RESIDUAL",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "INICIAL" | "INITIAL" => Some(Self::Inicial),
            "RESIDUAL" => Some(Self::Residual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    EntityCreated,
    EntityUpdated,
    EntityDeleted,
    LoginSuccess,
    LoginFail,
    ImportJson,
    ImportSnapshot,
    ImportCsv,
    ImportXlsx,
    ExportJson,
    ExportCsv,
    PdfGenerated,
    AssignmentDeleted,
    /// Legacy entries whose action no longer maps onto the closed set.
    Other,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::EntityCreated => "ENTITY_CREATED",
            AuditAction::EntityUpdated => "ENTITY_UPDATED",
            AuditAction::EntityDeleted => "ENTITY_DELETED",
            AuditAction::LoginSuccess => "LOGIN_SUCCESS",
            AuditAction::LoginFail => "LOGIN_FAIL",
            AuditAction::ImportJson => "IMPORT_JSON",
            AuditAction::ImportSnapshot => "IMPORT_SNAPSHOT",
            AuditAction::ImportCsv => "IMPORT_CSV",
            AuditAction::ImportXlsx => "IMPORT_XLSX",
            AuditAction::ExportJson => "EXPORT_JSON",
            AuditAction::ExportCsv => "EXPORT_CSV",
            AuditAction::PdfGenerated => "PDF_GENERATED",
            AuditAction::AssignmentDeleted => "ASSIGNMENT_DELETED",
            AuditAction::Other => "OTHER",
        }
    }

    pub fn from_token(token: &str) -> Self {
        match token {
            "ENTITY_CREATED" | "CREATE" | "CREATED" => Self::EntityCreated,
            "ENTITY_UPDATED" | "UPDATE" | "UPDATED" => Self::EntityUpdated,
            "ENTITY_DELETED" | "DELETE" | "DELETED" => Self::EntityDeleted,
            "LOGIN_SUCCESS" | "LOGIN_OK" | "LOGIN" => Self::LoginSuccess,
            "LOGIN_FAIL" | "LOGIN_FAILED" | "LOGIN_ERROR" => Self::LoginFail,
            "IMPORT_JSON" => Self::ImportJson,
            "IMPORT_SNAPSHOT" => Self::ImportSnapshot,
            "IMPORT_CSV" => Self::ImportCsv,
            "IMPORT_XLSX" => Self::ImportXlsx,
            "EXPORT_JSON" => Self::ExportJson,
            "EXPORT_CSV" => Self::ExportCsv,
            "PDF_GENERATED" | "PDF" => Self::PdfGenerated,
            "ASSIGNMENT_DELETED" | "VINCULO_DELETED" | "VINCULO_EXCLUIDO" => {
                Self::AssignmentDeleted
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: String,
    #[serde(flatten)]
    pub stamps: Stamps,
    pub funcao: Option<EquipmentFunction>,
    /// Only meaningful for horizontal retroreflectometers.
    pub geometria: Option<String>,
    pub modelo: String,
    pub numero_serie: String,
    pub fabricante: String,
    pub data_calibracao: String,
    pub status: EquipmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub id_normalized: String,
    #[serde(flatten)]
    pub stamps: Stamps,
    pub nome: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub password_hash: String,
    pub salt: String,
}

/// Custodial link between an equipment and a user ("vínculo").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    #[serde(flatten)]
    pub stamps: Stamps,
    pub equipamento_id: String,
    pub user_id: String,
    pub inicio: String,
    pub fim: Option<String>,
    pub status: AssignmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetterReadings {
    pub letra: String,
    pub leituras: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: String,
    #[serde(flatten)]
    pub stamps: Stamps,
    pub equipamento_id: String,
    pub user_id: String,
    pub obra_id: String,
    pub tipo_medicao: String,
    pub subtipo: Option<MeasurementSubtype>,
    pub classe: Option<String>,
    pub elemento: Option<String>,
    pub geometria: Option<String>,
    /// Finite readings only, in capture order.
    pub leituras: Vec<f64>,
    pub media: Option<f64>,
    pub legenda_texto: Option<String>,
    pub letras: Vec<LetterReadings>,
    pub data_medicao: Option<String>,
    pub data_aplicacao: Option<String>,
    pub localizacao: Option<GeoPoint>,
    pub fotos: Vec<String>,
}

/// Road works contract ("obra").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    #[serde(flatten)]
    pub stamps: Stamps,
    pub nome: String,
    pub rodovia: String,
    pub km_inicial: Option<f64>,
    pub km_final: Option<f64>,
    pub cidade: String,
    pub uf: String,
    pub cliente: String,
    pub responsavel: String,
}

/// Minimum-threshold rule. Every qualifier left as `None` is unconstrained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConformityCriterion {
    pub id: String,
    #[serde(flatten)]
    pub stamps: Stamps,
    pub obra_id: Option<String>,
    pub subtipo: Option<MeasurementSubtype>,
    pub classe: Option<String>,
    pub elemento: Option<String>,
    pub periodo: Option<Period>,
    pub geometria: Option<String>,
    pub valor_minimo: Option<f64>,
}

impl ConformityCriterion {
    /// Number of optional qualifiers this criterion constrains.
    pub fn qualifier_count(&self) -> usize {
        [
            self.classe.is_some(),
            self.elemento.is_some(),
            self.periodo.is_some(),
            self.geometria.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub id: String,
    #[serde(flatten)]
    pub stamps: Stamps,
    pub medicao_id: String,
    pub nome: String,
    pub mime_type: String,
    pub tamanho: Option<u64>,
    /// Base64 payload as captured by the client.
    pub conteudo: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub audit_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub actor_user_id: String,
    pub organization_id: Option<String>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub summary: String,
    pub diff: Value,
    pub context: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub error_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub module: String,
    pub action: String,
    pub message: String,
    pub stack: Option<String>,
    pub context: Value,
}
