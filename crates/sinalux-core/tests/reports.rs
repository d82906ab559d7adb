use anyhow::Result;
use serde_json::json;
use sinalux_core::conformity::Evaluator;
use sinalux_core::reports::{conformity_report, write_report_csv};
use sinalux_records::{ConformityCriterion, Equipment, Measurement, Project, Record};

fn fixtures() -> (Vec<Measurement>, Vec<ConformityCriterion>, Vec<Project>, Vec<Equipment>) {
    let measurements = vec![
        Measurement::normalize(&json!({
            "id": "M1", "obra_id": "P1", "equipamento_id": "EQ-1", "subtipo": "VERTICAL",
            "leituras": [120, 140]
        })),
        Measurement::normalize(&json!({
            "id": "M2", "obra_id": "P1", "equipamento_id": "EQ-1", "subtipo": "HORIZONTAL",
            "leituras": [300, 310]
        })),
        Measurement::normalize(&json!({"id": "M3", "obra_id": "P2", "subtipo": "TACHAS", "leituras": [9]})),
    ];
    let criteria = vec![
        ConformityCriterion::normalize(&json!({"id": "v", "obra_id": "P1", "subtipo": "VERTICAL", "valor_minimo": 100})),
        ConformityCriterion::normalize(&json!({"id": "h", "subtipo": "HORIZONTAL", "valor_minimo": 200})),
    ];
    let projects = vec![Project::normalize(&json!({"id": "P1", "nome": "Lote 1"}))];
    let equipment = vec![Equipment::normalize(&json!({"id": "EQ-1", "funcao": "VERTICAL"}))];
    (measurements, criteria, projects, equipment)
}

#[test]
fn report_has_one_row_per_measurement() -> Result<()> {
    let (measurements, criteria, projects, equipment) = fixtures();
    let df = conformity_report(&measurements, &criteria, &projects, &equipment, &Evaluator::default())?;

    assert_eq!(df.height(), 3);
    assert_eq!(
        df.get_column_names_str(),
        vec![
            "id",
            "obra_id",
            "equipamento_id",
            "subtipo",
            "reading_count",
            "representative_value",
            "threshold",
            "period",
            "status",
            "reason",
        ]
    );

    let status = df.column("status")?.str()?;
    assert_eq!(status.get(0), Some("CONFORME"));
    assert_eq!(status.get(1), Some("NOT_EVALUATED"));
    assert_eq!(status.get(2), Some("NOT_EVALUATED"));

    let values = df.column("representative_value")?.f64()?;
    assert_eq!(values.get(0), Some(130.0));
    assert_eq!(values.get(1), None);

    let thresholds = df.column("threshold")?.f64()?;
    assert_eq!(thresholds.get(1), Some(200.0));
    assert_eq!(thresholds.get(2), None);
    Ok(())
}

#[test]
fn report_is_written_as_csv() -> Result<()> {
    let (measurements, criteria, projects, equipment) = fixtures();
    let mut df =
        conformity_report(&measurements, &criteria, &projects, &equipment, &Evaluator::default())?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("conformidade.csv");
    write_report_csv(&mut df, &path)?;

    let contents = std::fs::read_to_string(&path)?;
    let mut lines = contents.lines();
    assert_eq!(
        lines.next(),
        Some("id,obra_id,equipamento_id,subtipo,reading_count,representative_value,threshold,period,status,reason")
    );
    let first = lines.next().unwrap_or_default();
    assert!(first.starts_with("M1,P1,EQ-1,VERTICAL,2,"), "unexpected row: {first}");
    assert!(first.contains("CONFORME"));
    assert_eq!(lines.count(), 2);
    Ok(())
}

#[test]
fn empty_input_gives_an_empty_frame() -> Result<()> {
    let df = conformity_report(&[], &[], &[], &[], &Evaluator::default())?;
    assert_eq!(df.height(), 0);
    assert_eq!(df.width(), 10);
    Ok(())
}
