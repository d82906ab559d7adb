use serde_json::json;
use sinalux_core::statistics::{compute_statistics, StatisticRule};
use sinalux_records::{Measurement, Record};

fn measurement(raw: serde_json::Value) -> Measurement {
    Measurement::normalize(&raw)
}

#[test]
fn horizontal_discards_one_minimum_and_one_maximum() {
    let m = measurement(json!({
        "id": "M1",
        "subtipo": "HORIZONTAL",
        "leituras": [10, 20, 30, 40, 50, 60, 70, 80, 90, 1000]
    }));

    let stats = compute_statistics(&m);
    assert_eq!(stats.rule, StatisticRule::TrimmedMean);
    assert_eq!(stats.discarded_min, Some(10.0));
    assert_eq!(stats.discarded_max, Some(1000.0));
    assert_eq!(stats.representative_value, Some(55.0));
    assert_eq!(stats.reading_count, 10);
}

#[test]
fn horizontal_ties_remove_only_one_instance_of_each_extreme() {
    let m = measurement(json!({
        "id": "M2",
        "subtipo": "HORIZONTAL",
        "leituras": [5, 5, 5, 10, 10, 10, 10, 10, 20, 20]
    }));

    let stats = compute_statistics(&m);
    // Remaining: 5, 5, 10 x5, 20 -> 80 / 8
    assert_eq!(stats.representative_value, Some(10.0));
    assert_eq!(stats.discarded_min, Some(5.0));
    assert_eq!(stats.discarded_max, Some(20.0));
}

#[test]
fn horizontal_with_fewer_than_ten_readings_is_undefined() {
    let m = measurement(json!({
        "id": "M3",
        "subtipo": "HORIZONTAL",
        "leituras": [900, 900, 900, 900, 900, 900, 900, 900, 900]
    }));

    let stats = compute_statistics(&m);
    assert_eq!(stats.representative_value, None);
    assert_eq!(
        stats.rule,
        StatisticRule::InsufficientReadings {
            required: 10,
            found: 9
        }
    );
    assert!(stats.rule.describe().contains("insufficient"));
}

#[test]
fn legend_text_rebuilds_letter_groups_positionally() {
    let m = measurement(json!({
        "id": "M4",
        "subtipo": "LEGENDA",
        "legenda_texto": "AB",
        "leituras": [1, 2, 3, 7, 8, 9]
    }));

    let stats = compute_statistics(&m);
    assert_eq!(stats.rule, StatisticRule::LetterAverage { letters: 2 });
    assert_eq!(stats.letter_means.len(), 2);
    assert_eq!(stats.letter_means[0].letra, "A");
    assert_eq!(stats.letter_means[0].mean, 2.0);
    assert_eq!(stats.letter_means[1].letra, "B");
    assert_eq!(stats.letter_means[1].mean, 8.0);
    assert_eq!(stats.representative_value, Some(5.0));
}

#[test]
fn explicit_letters_weigh_each_letter_equally() {
    let m = measurement(json!({
        "id": "M5",
        "subtipo": "LEGENDA",
        "letras": [
            {"letra": "P", "leituras": [10, 20, 30]},
            {"letra": "A", "leituras": [40]},
            {"letra": "R", "leituras": []}
        ]
    }));

    let stats = compute_statistics(&m);
    // (20 + 40) / 2; the empty group is skipped.
    assert_eq!(stats.representative_value, Some(30.0));
    assert_eq!(stats.rule, StatisticRule::LetterAverage { letters: 2 });
    assert_eq!(stats.reading_count, 4);
}

#[test]
fn legend_without_structure_falls_back_to_trimmed_mean() {
    let m = measurement(json!({
        "id": "M6",
        "subtipo": "LEGENDA",
        "legenda_texto": "PARE",
        "leituras": [1, 2, 3, 4, 5]
    }));

    let stats = compute_statistics(&m);
    assert_eq!(stats.representative_value, None);
    assert!(matches!(stats.rule, StatisticRule::InsufficientReadings { .. }));
}

#[test]
fn vertical_uses_plain_mean() {
    let m = measurement(json!({
        "id": "M7",
        "subtipo": "VERTICAL",
        "leituras": [100, 200, "300", "not a number"]
    }));

    let stats = compute_statistics(&m);
    assert_eq!(stats.rule, StatisticRule::ArithmeticMean);
    assert_eq!(stats.representative_value, Some(200.0));
    assert_eq!(stats.discarded_min, None);
}

#[test]
fn no_readings_is_reported_not_raised() {
    let m = measurement(json!({"id": "M8", "subtipo": "TACHAS", "leituras": []}));
    let stats = compute_statistics(&m);
    assert_eq!(stats.representative_value, None);
    assert_eq!(stats.rule, StatisticRule::NoValidReadings);
    assert_eq!(stats.rule.describe(), "no valid readings");

    let mut direct = m.clone();
    direct.subtipo = None;
    direct.leituras = vec![f64::NAN, f64::INFINITY];
    assert_eq!(compute_statistics(&direct).rule, StatisticRule::NoValidReadings);
}
