use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use polars::prelude::*;
use sinalux_records::{ConformityCriterion, Equipment, Measurement, Project};
use thiserror::Error;

use crate::conformity::Evaluator;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),

    #[error("failed to write report {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One row per measurement with its statistic and conformity outcome.
pub fn conformity_report(
    measurements: &[Measurement],
    criteria: &[ConformityCriterion],
    projects: &[Project],
    equipment: &[Equipment],
    evaluator: &Evaluator,
) -> Result<DataFrame, ReportError> {
    let projects: HashMap<&str, &Project> = projects.iter().map(|p| (p.id.as_str(), p)).collect();
    let equipment: HashMap<&str, &Equipment> =
        equipment.iter().map(|e| (e.id.as_str(), e)).collect();

    let len = measurements.len();
    let mut ids = Vec::with_capacity(len);
    let mut obra_ids = Vec::with_capacity(len);
    let mut equipamento_ids = Vec::with_capacity(len);
    let mut subtypes: Vec<Option<String>> = Vec::with_capacity(len);
    let mut reading_counts: Vec<u32> = Vec::with_capacity(len);
    let mut values: Vec<Option<f64>> = Vec::with_capacity(len);
    let mut thresholds: Vec<Option<f64>> = Vec::with_capacity(len);
    let mut periods: Vec<Option<String>> = Vec::with_capacity(len);
    let mut statuses = Vec::with_capacity(len);
    let mut reasons: Vec<Option<String>> = Vec::with_capacity(len);

    for measurement in measurements {
        let result = evaluator.evaluate(
            measurement,
            criteria,
            projects.get(measurement.obra_id.as_str()).copied(),
            equipment.get(measurement.equipamento_id.as_str()).copied(),
        );

        ids.push(measurement.id.clone());
        obra_ids.push(measurement.obra_id.clone());
        equipamento_ids.push(measurement.equipamento_id.clone());
        subtypes.push(measurement.subtipo.map(|s| s.as_str().to_string()));
        reading_counts.push(u32::try_from(result.statistics.reading_count).unwrap_or(u32::MAX));
        values.push(result.statistics.representative_value);
        thresholds.push(result.threshold);
        periods.push(result.period.map(|p| p.as_str().to_string()));
        statuses.push(result.status.as_str().to_string());
        reasons.push(result.reason);
    }

    let columns: Vec<Column> = vec![
        Series::new("id".into(), ids).into(),
        Series::new("obra_id".into(), obra_ids).into(),
        Series::new("equipamento_id".into(), equipamento_ids).into(),
        Series::new("subtipo".into(), subtypes).into(),
        Series::new("reading_count".into(), reading_counts).into(),
        Series::new("representative_value".into(), values).into(),
        Series::new("threshold".into(), thresholds).into(),
        Series::new("period".into(), periods).into(),
        Series::new("status".into(), statuses).into(),
        Series::new("reason".into(), reasons).into(),
    ];
    Ok(DataFrame::new(columns)?)
}

pub fn write_report_csv(df: &mut DataFrame, path: &Path) -> Result<(), ReportError> {
    let mut file = File::create(path).map_err(|source| ReportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}
