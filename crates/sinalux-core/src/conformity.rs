use chrono::{DateTime, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde::Serialize;
use sinalux_records::{
    ConformityCriterion, Equipment, Measurement, MeasurementSubtype, Period, Project,
};

use crate::config::{ConfigError, StoreConfig};
use crate::statistics::{compute_statistics, MeasurementStatistics};

pub const REASON_NO_CRITERION: &str = "no criterion configured";
pub const REASON_VALUE_UNAVAILABLE: &str = "representative value unavailable";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConformityStatus {
    Conforme,
    NaoConforme,
    NotEvaluated,
}

impl ConformityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConformityStatus::Conforme => "CONFORME",
            ConformityStatus::NaoConforme => "NAO_CONFORME",
            ConformityStatus::NotEvaluated => "NOT_EVALUATED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConformityResult {
    pub status: ConformityStatus,
    pub threshold: Option<f64>,
    pub reason: Option<String>,
    pub criterion_id: Option<String>,
    pub period: Option<Period>,
    pub statistics: MeasurementStatistics,
}

/// Specificity levels, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    ClassAndElement,
    ClassOnly,
    SubtypeOnly,
    FullyGeneral,
}

const LEVELS: [Level; 4] = [
    Level::ClassAndElement,
    Level::ClassOnly,
    Level::SubtypeOnly,
    Level::FullyGeneral,
];

#[derive(Debug, Clone)]
pub struct Evaluator {
    timezone: Tz,
    initial_period_days: i64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::Sao_Paulo,
            initial_period_days: 15,
        }
    }
}

/// Measurement attributes a criterion is matched against.
struct Subject<'a> {
    project_id: Option<&'a str>,
    subtype: MeasurementSubtype,
    classe: Option<&'a str>,
    elemento: Option<&'a str>,
    period: Option<Period>,
    geometry: Option<&'a str>,
}

impl Evaluator {
    pub fn new(timezone: Tz, initial_period_days: i64) -> Self {
        Self {
            timezone,
            initial_period_days,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.timezone()?, config.initial_period_days))
    }

    /// INICIAL within `initial_period_days` of application, RESIDUAL after.
    /// Only horizontal markings age into periods.
    pub fn period_for(&self, measurement: &Measurement) -> Option<Period> {
        if measurement.subtipo != Some(MeasurementSubtype::Horizontal) {
            return None;
        }
        let applied = self.local_date(measurement.data_aplicacao.as_deref()?)?;
        let measured = self.local_date(measurement.data_medicao.as_deref()?)?;
        let days = (measured - applied).num_days();
        if days <= self.initial_period_days {
            Some(Period::Inicial)
        } else {
            Some(Period::Residual)
        }
    }

    /// Calendar date in the configured zone. Plain dates and naive
    /// timestamps are already local.
    fn local_date(&self, input: &str) -> Option<NaiveDate> {
        let input = input.trim();
        if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
            return Some(date);
        }
        if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
            return Some(parsed.with_timezone(&self.timezone).date_naive());
        }
        ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M", "%d/%m/%Y"]
            .iter()
            .find_map(|format| {
                NaiveDateTime::parse_from_str(input, format)
                    .map(|dt| dt.date())
                    .or_else(|_| NaiveDate::parse_from_str(input, format))
                    .ok()
            })
    }

    /// Most specific applicable criterion. Project-scoped criteria are tried
    /// at every level before global ones; ties within a level go to the
    /// criterion with more qualifiers, then to the lowest id.
    pub fn resolve<'c>(
        &self,
        measurement: &Measurement,
        criteria: &'c [ConformityCriterion],
        project: Option<&Project>,
        equipment: Option<&Equipment>,
    ) -> Option<&'c ConformityCriterion> {
        let subject = Subject {
            project_id: project
                .map(|p| p.id.as_str())
                .or_else(|| Some(measurement.obra_id.as_str()).filter(|id| !id.is_empty())),
            subtype: measurement.subtipo?,
            classe: measurement.classe.as_deref(),
            elemento: measurement.elemento.as_deref(),
            period: self.period_for(measurement),
            geometry: measurement
                .geometria
                .as_deref()
                .or_else(|| equipment.and_then(|e| e.geometria.as_deref())),
        };

        let scoped = |c: &ConformityCriterion| match (c.obra_id.as_deref(), subject.project_id) {
            (Some(criterion_project), Some(project_id)) => criterion_project == project_id,
            _ => false,
        };
        let global = |c: &ConformityCriterion| c.obra_id.is_none();

        for in_scope in [&scoped as &dyn Fn(&ConformityCriterion) -> bool, &global] {
            for level in LEVELS {
                let mut candidates: Vec<&ConformityCriterion> = criteria
                    .iter()
                    .filter(|c| in_scope(*c) && applies(*c, &subject, level))
                    .collect();
                candidates.sort_by(|a, b| {
                    b.qualifier_count()
                        .cmp(&a.qualifier_count())
                        .then_with(|| a.id.cmp(&b.id))
                });
                if let Some(found) = candidates.first() {
                    return Some(*found);
                }
            }
        }
        None
    }

    pub fn evaluate(
        &self,
        measurement: &Measurement,
        criteria: &[ConformityCriterion],
        project: Option<&Project>,
        equipment: Option<&Equipment>,
    ) -> ConformityResult {
        let statistics = compute_statistics(measurement);
        let period = self.period_for(measurement);

        let Some((criterion, threshold)) = self
            .resolve(measurement, criteria, project, equipment)
            .and_then(|c| Some((c, c.valor_minimo?)))
        else {
            return ConformityResult {
                status: ConformityStatus::NotEvaluated,
                threshold: None,
                reason: Some(REASON_NO_CRITERION.to_string()),
                criterion_id: None,
                period,
                statistics,
            };
        };

        let (status, reason) = match statistics.representative_value {
            None => (
                ConformityStatus::NotEvaluated,
                Some(REASON_VALUE_UNAVAILABLE.to_string()),
            ),
            Some(value) if value >= threshold => (ConformityStatus::Conforme, None),
            Some(_) => (ConformityStatus::NaoConforme, None),
        };

        ConformityResult {
            status,
            threshold: Some(threshold),
            reason,
            criterion_id: Some(criterion.id.clone()),
            period,
            statistics,
        }
    }
}

fn same(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Criterion qualifier equals the measurement attribute; an unknown
/// attribute never matches a constrained qualifier.
fn qualifier_matches(qualifier: Option<&str>, attribute: Option<&str>) -> bool {
    match (qualifier, attribute) {
        (Some(q), Some(a)) => same(q, a),
        _ => false,
    }
}

fn applies(criterion: &ConformityCriterion, subject: &Subject<'_>, level: Level) -> bool {
    if criterion.valor_minimo.is_none() || criterion.subtipo != Some(subject.subtype) {
        return false;
    }

    // Period and geometry narrow whenever the criterion sets them.
    if let Some(period) = criterion.periodo {
        if subject.period != Some(period) {
            return false;
        }
    }
    if let Some(geometry) = criterion.geometria.as_deref() {
        if !qualifier_matches(Some(geometry), subject.geometry) {
            return false;
        }
    }

    let classe = criterion.classe.as_deref();
    let elemento = criterion.elemento.as_deref();
    match level {
        Level::ClassAndElement => {
            qualifier_matches(classe, subject.classe) && qualifier_matches(elemento, subject.elemento)
        }
        Level::ClassOnly => qualifier_matches(classe, subject.classe) && elemento.is_none(),
        Level::SubtypeOnly => classe.is_none() && elemento.is_none(),
        Level::FullyGeneral => {
            classe.is_none()
                && elemento.is_none()
                && criterion.periodo.is_none()
                && criterion.geometria.is_none()
        }
    }
}
