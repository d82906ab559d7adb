pub mod fields;
pub mod model;
pub mod normalize;

pub use model::{
    Assignment, AssignmentStatus, AttachmentRecord, AuditAction, AuditEntry, ConformityCriterion,
    EntityKind, Equipment, EquipmentFunction, EquipmentStatus, ErrorEntry, GeoPoint,
    LetterReadings, Measurement, MeasurementSubtype, Period, Project, Record, Stamped, Stamps,
    User, UserRole, UserStatus,
};
pub use normalize::{normalize, CanonicalRecord};

#[cfg(test)]
mod tests;
