//! Representative value of a measurement's readings.
//!
//! Nothing here fails: missing or insufficient data yields a result whose
//! `representative_value` is `None` and whose rule says why.

use serde::Serialize;
use sinalux_records::{Measurement, MeasurementSubtype};

/// Readings required before the trimmed mean is defined.
pub const MIN_TRIMMED_READINGS: usize = 10;
/// Readings taken per legend letter.
pub const READINGS_PER_LETTER: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum StatisticRule {
    TrimmedMean,
    LetterAverage { letters: usize },
    ArithmeticMean,
    InsufficientReadings { required: usize, found: usize },
    NoValidReadings,
}

impl StatisticRule {
    pub fn describe(&self) -> String {
        match self {
            StatisticRule::TrimmedMean => {
                "trimmed mean (one minimum and one maximum discarded)".to_string()
            }
            StatisticRule::LetterAverage { letters } => {
                format!("average of {letters} per-letter means")
            }
            StatisticRule::ArithmeticMean => "arithmetic mean".to_string(),
            StatisticRule::InsufficientReadings { required, found } => {
                format!("insufficient data: {found} readings, at least {required} required")
            }
            StatisticRule::NoValidReadings => "no valid readings".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LetterMean {
    pub letra: String,
    pub mean: f64,
    pub reading_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementStatistics {
    pub representative_value: Option<f64>,
    pub discarded_min: Option<f64>,
    pub discarded_max: Option<f64>,
    pub reading_count: usize,
    pub rule: StatisticRule,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub letter_means: Vec<LetterMean>,
}

impl MeasurementStatistics {
    fn undefined(reading_count: usize, rule: StatisticRule) -> Self {
        Self {
            representative_value: None,
            discarded_min: None,
            discarded_max: None,
            reading_count,
            rule,
            letter_means: Vec::new(),
        }
    }
}

pub fn compute_statistics(measurement: &Measurement) -> MeasurementStatistics {
    let readings = finite(&measurement.leituras);
    match measurement.subtipo {
        Some(MeasurementSubtype::Horizontal) => trimmed_mean(readings),
        Some(MeasurementSubtype::Legenda) => legend_statistics(measurement, readings),
        _ => arithmetic_mean(&readings),
    }
}

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn trimmed_mean(mut readings: Vec<f64>) -> MeasurementStatistics {
    let count = readings.len();
    if count == 0 {
        return MeasurementStatistics::undefined(0, StatisticRule::NoValidReadings);
    }
    if count < MIN_TRIMMED_READINGS {
        return MeasurementStatistics::undefined(
            count,
            StatisticRule::InsufficientReadings {
                required: MIN_TRIMMED_READINGS,
                found: count,
            },
        );
    }

    readings.sort_by(f64::total_cmp);
    // Exactly one instance of each extreme goes, even when tied.
    let kept = &readings[1..count - 1];
    MeasurementStatistics {
        representative_value: mean(kept),
        discarded_min: readings.first().copied(),
        discarded_max: readings.last().copied(),
        reading_count: count,
        rule: StatisticRule::TrimmedMean,
        letter_means: Vec::new(),
    }
}

fn arithmetic_mean(readings: &[f64]) -> MeasurementStatistics {
    match mean(readings) {
        Some(value) => MeasurementStatistics {
            representative_value: Some(value),
            discarded_min: None,
            discarded_max: None,
            reading_count: readings.len(),
            rule: StatisticRule::ArithmeticMean,
            letter_means: Vec::new(),
        },
        None => MeasurementStatistics::undefined(0, StatisticRule::NoValidReadings),
    }
}

/// Explicit per-letter groups first, then positional groups rebuilt from the
/// legend text, then the plain trimmed mean.
fn legend_statistics(measurement: &Measurement, readings: Vec<f64>) -> MeasurementStatistics {
    let explicit: Vec<(String, Vec<f64>)> = measurement
        .letras
        .iter()
        .map(|group| (group.letra.clone(), finite(&group.leituras)))
        .filter(|(_, values)| !values.is_empty())
        .collect();
    if !explicit.is_empty() {
        return letter_average(explicit);
    }

    let letters: Vec<char> = measurement
        .legenda_texto
        .as_deref()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if !letters.is_empty() && readings.len() >= letters.len() * READINGS_PER_LETTER {
        let groups = letters
            .iter()
            .zip(readings.chunks(READINGS_PER_LETTER))
            .map(|(letter, chunk)| (letter.to_string(), chunk.to_vec()))
            .collect();
        return letter_average(groups);
    }

    trimmed_mean(readings)
}

fn letter_average(groups: Vec<(String, Vec<f64>)>) -> MeasurementStatistics {
    let letter_means: Vec<LetterMean> = groups
        .into_iter()
        .filter_map(|(letra, values)| {
            Some(LetterMean {
                mean: mean(&values)?,
                reading_count: values.len(),
                letra,
            })
        })
        .collect();
    let means: Vec<f64> = letter_means.iter().map(|l| l.mean).collect();

    MeasurementStatistics {
        representative_value: mean(&means),
        discarded_min: None,
        discarded_max: None,
        reading_count: letter_means.iter().map(|l| l.reading_count).sum(),
        rule: StatisticRule::LetterAverage {
            letters: letter_means.len(),
        },
        letter_means,
    }
}
