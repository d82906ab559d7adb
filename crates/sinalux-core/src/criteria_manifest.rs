use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sinalux_records::{fields, ConformityCriterion, MeasurementSubtype, Period, Stamps};
use thiserror::Error;

use crate::error::StoreError;
use crate::store::LocalStore;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid criteria manifest: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("criterion `{id}`: {reason}")]
    Invalid { id: String, reason: String },

    #[error("criterion id `{0}` appears more than once")]
    DuplicateId(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default, Deserialize)]
pub struct CriteriaManifest {
    #[serde(default)]
    pub criterios: Vec<CriterionEntry>,
}

impl CriteriaManifest {
    pub fn is_empty(&self) -> bool {
        self.criterios.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CriterionEntry {
    pub id: String,
    pub obra_id: Option<String>,
    pub subtipo: String,
    pub classe: Option<String>,
    pub elemento: Option<String>,
    pub periodo: Option<String>,
    pub geometria: Option<String>,
    pub valor_minimo: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ManifestSummary {
    pub criteria_upserted: usize,
}

pub fn parse_manifest(toml_str: &str) -> Result<CriteriaManifest, ManifestError> {
    Ok(toml::from_str(toml_str)?)
}

impl CriterionEntry {
    fn invalid(&self, reason: impl Into<String>) -> ManifestError {
        ManifestError::Invalid {
            id: self.id.clone(),
            reason: reason.into(),
        }
    }

    fn to_criterion(&self) -> Result<ConformityCriterion, ManifestError> {
        if self.id.trim().is_empty() {
            return Err(self.invalid("id must not be empty"));
        }
        if !self.valor_minimo.is_finite() {
            return Err(self.invalid("valor_minimo must be a finite number"));
        }
        let subtipo = MeasurementSubtype::from_token(&fields::canonical_token(&self.subtipo))
            .ok_or_else(|| self.invalid(format!("unknown subtipo `{}`", self.subtipo)))?;
        let periodo = match self.periodo.as_deref() {
            None => None,
            Some(raw) => Some(
                Period::from_token(&fields::canonical_token(raw))
                    .ok_or_else(|| self.invalid(format!("unknown periodo `{raw}`")))?,
            ),
        };

        Ok(ConformityCriterion {
            id: self.id.trim().to_string(),
            stamps: Stamps::default(),
            obra_id: non_blank(&self.obra_id),
            subtipo: Some(subtipo),
            classe: non_blank(&self.classe),
            elemento: non_blank(&self.elemento),
            periodo,
            geometria: non_blank(&self.geometria),
            valor_minimo: Some(self.valor_minimo),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Validates every entry before anything is written.
pub fn resolve_manifest(
    manifest: &CriteriaManifest,
) -> Result<Vec<ConformityCriterion>, ManifestError> {
    let mut seen = HashSet::new();
    manifest
        .criterios
        .iter()
        .map(|entry| {
            let criterion = entry.to_criterion()?;
            if !seen.insert(criterion.id.clone()) {
                return Err(ManifestError::DuplicateId(criterion.id));
            }
            Ok(criterion)
        })
        .collect()
}

/// Upserts every criterion in one unit of work.
pub async fn apply_manifest(
    store: &LocalStore,
    manifest: &CriteriaManifest,
) -> Result<ManifestSummary, ManifestError> {
    let criteria = resolve_manifest(manifest)?;
    let saved = store.bulk_save(criteria).await?;
    tracing::info!(count = saved.len(), "criteria manifest applied");
    Ok(ManifestSummary {
        criteria_upserted: saved.len(),
    })
}
