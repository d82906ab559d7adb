use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use sinalux_core::audit::SessionContext;
use sinalux_core::config::StoreConfig;
use sinalux_core::conformity::Evaluator;
use sinalux_core::criteria_manifest;
use sinalux_core::error::StoreError;
use sinalux_core::reports;
use sinalux_core::snapshot::{self, ImportReport, SnapshotDocument};
use sinalux_core::store::{AuditFilter, LocalStore};
use sinalux_records::{
    AuditAction, ConformityCriterion, EntityKind, Equipment, ErrorEntry, Measurement, Project,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Offline store for road-marking retroreflectivity surveys", long_about = None)]
struct Cli {
    /// TOML config file (defaults to ./sinalux.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Acting user recorded in audit entries
    #[arg(long, global = true, default_value = "cli")]
    user: String,
    #[arg(long, global = true)]
    organization: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bring the local store up to the current schema version
    Migrate,
    /// Write every store to a JSON snapshot
    Export(ExportArgs),
    /// Load a JSON snapshot into the local store
    Import(ImportArgs),
    /// Upsert conformity criteria from a TOML manifest
    Criteria(CriteriaArgs),
    /// Compute statistics and conformity for one measurement
    Evaluate { measurement_id: String },
    /// Write the conformity report for every measurement as CSV
    Report(ReportArgs),
    /// Close an equipment assignment
    CloseAssignment(CloseAssignmentArgs),
    /// List audit entries
    Audit(AuditArgs),
    /// List logged errors
    Errors,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Output file; stdout when omitted
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ImportArgs {
    file: PathBuf,
    /// Only report what the import would do
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct CriteriaArgs {
    manifest: PathBuf,
}

#[derive(Args, Debug)]
struct ReportArgs {
    #[arg(long, default_value = "conformidade.csv")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct CloseAssignmentArgs {
    id: String,
    /// Calendar date the assignment ended (YYYY-MM-DD)
    #[arg(long)]
    end_date: NaiveDate,
}

#[derive(Args, Debug, Default)]
struct AuditArgs {
    #[arg(long)]
    entity_type: Option<String>,
    #[arg(long)]
    entity_id: Option<String>,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Migrate => "migrate",
            Command::Export(_) => "export",
            Command::Import(_) => "import",
            Command::Criteria(_) => "criteria",
            Command::Evaluate { .. } => "evaluate",
            Command::Report(_) => "report",
            Command::CloseAssignment(_) => "close-assignment",
            Command::Audit(_) => "audit",
            Command::Errors => "errors",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = StoreConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let store = LocalStore::shared(&config)
        .await
        .with_context(|| format!("failed to open local store at {}", config.database_url))?;

    let mut session = SessionContext::new(&cli.user);
    if let Some(organization) = &cli.organization {
        session = session.with_organization(organization);
    }

    let command = cli.command.name();
    let outcome = run(cli.command, store, &config, &session).await;
    if let Err(err) = &outcome {
        record_failure(store, command, err).await;
    }
    outcome
}

async fn run(
    command: Command,
    store: &LocalStore,
    config: &StoreConfig,
    session: &SessionContext,
) -> Result<()> {
    match command {
        Command::Migrate => handle_migrate(store).await,
        Command::Export(args) => handle_export(store, session, args).await,
        Command::Import(args) => handle_import(store, session, args).await,
        Command::Criteria(args) => handle_criteria(store, session, args).await,
        Command::Evaluate { measurement_id } => handle_evaluate(store, config, &measurement_id).await,
        Command::Report(args) => handle_report(store, config, session, args).await,
        Command::CloseAssignment(args) => handle_close_assignment(store, session, args).await,
        Command::Audit(args) => handle_audit(store, args).await,
        Command::Errors => handle_errors(store).await,
    }
}

/// Failures go to the error log; a failure to log is only warned about.
async fn record_failure(store: &LocalStore, command: &str, err: &anyhow::Error) {
    let entry = ErrorEntry {
        error_id: String::new(),
        created_at: None,
        module: "cli".to_string(),
        action: command.to_string(),
        message: format!("{err:#}"),
        stack: None,
        context: failure_context(err),
    };
    if let Err(log_err) = store.log_error(entry).await {
        warn!(error = %log_err, command, "could not record failure in error log");
    }
}

fn failure_context(err: &anyhow::Error) -> serde_json::Value {
    match err.downcast_ref::<StoreError>() {
        Some(store_err) => serde_json::json!({
            "class": format!("{:?}", store_err.class()),
            "store": store_err.store(),
        }),
        None => serde_json::Value::Null,
    }
}

async fn handle_migrate(store: &LocalStore) -> Result<()> {
    let report = store.migrate().await?;
    if report.is_noop() {
        println!("Local store is at schema version {}.", report.to_version);
    } else {
        println!(
            "Migrated local store from version {} to {}: {}",
            report.from_version,
            report.to_version,
            report.applied.join(", ")
        );
    }

    let mut table = Table::new();
    table.set_header(vec!["store", "records"]);
    for (kind, count) in store.counts().await? {
        table.add_row(vec![kind.store_name().to_string(), count.to_string()]);
    }
    println!("{table}");
    Ok(())
}

async fn handle_export(store: &LocalStore, session: &SessionContext, args: ExportArgs) -> Result<()> {
    let document = snapshot::export_snapshot(store).await?;
    let json = document.to_json_pretty()?;

    let target = match &args.out {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("failed to write snapshot to {}", path.display()))?;
            path.display().to_string()
        }
        None => {
            println!("{json}");
            "stdout".to_string()
        }
    };

    store
        .record_audit(session.audit_entry(
            AuditAction::ExportJson,
            "snapshot",
            target.as_str(),
            format!("{} records exported", document.record_count()),
        ))
        .await?;
    info!(destination = %target, records = document.record_count(), "snapshot written");
    Ok(())
}

async fn handle_import(store: &LocalStore, session: &SessionContext, args: ImportArgs) -> Result<()> {
    let document = read_snapshot(&args.file)?;

    if args.dry_run {
        let preview = snapshot::build_import_preview(store, &document).await?;
        println!("{}", import_table(&preview, true));
        return Ok(());
    }

    let report = snapshot::import_snapshot(store, &document)
        .await
        .with_context(|| format!("import of {} was rolled back", args.file.display()))?;
    println!("{}", import_table(&report, false));

    let total = report.total();
    // Re-importing the same snapshot maps onto the same audit entry.
    let mut entry = session.audit_entry_at(
        document.created_at.unwrap_or_else(|| store.now()),
        AuditAction::ImportSnapshot,
        "snapshot",
        args.file.display().to_string(),
        format!(
            "{} created, {} updated, {} ignored",
            total.created, total.updated, total.ignored
        ),
    );
    entry.context = serde_json::to_value(&report)?;
    store.record_audit(entry).await?;
    Ok(())
}

fn read_snapshot(path: &Path) -> Result<SnapshotDocument> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    Ok(SnapshotDocument::from_json(&contents)?)
}

fn import_table(report: &ImportReport, preview: bool) -> Table {
    let mut table = Table::new();
    let mut header = vec!["store", "created", "updated", "ignored"];
    if preview {
        header.push("invalid");
    }
    table.set_header(header);

    for kind in EntityKind::ALL {
        let counts = report.get(kind);
        let mut row = vec![
            kind.store_name().to_string(),
            counts.created.to_string(),
            counts.updated.to_string(),
            counts.ignored.to_string(),
        ];
        if preview {
            row.push(counts.invalid.to_string());
        }
        table.add_row(row);
    }
    table
}

async fn handle_criteria(store: &LocalStore, session: &SessionContext, args: CriteriaArgs) -> Result<()> {
    let contents = std::fs::read_to_string(&args.manifest)
        .with_context(|| format!("failed to read manifest {}", args.manifest.display()))?;
    let manifest = criteria_manifest::parse_manifest(&contents)?;
    if manifest.is_empty() {
        println!("Manifest {} has no criteria.", args.manifest.display());
        return Ok(());
    }

    let summary = criteria_manifest::apply_manifest(store, &manifest).await?;
    store
        .record_audit(session.audit_entry(
            AuditAction::EntityUpdated,
            "criterios",
            args.manifest.display().to_string(),
            format!("{} criteria upserted", summary.criteria_upserted),
        ))
        .await?;
    println!("Upserted {} criteria.", summary.criteria_upserted);
    Ok(())
}

async fn handle_evaluate(store: &LocalStore, config: &StoreConfig, measurement_id: &str) -> Result<()> {
    let measurement: Measurement = store
        .get_by_id(measurement_id)
        .await?
        .with_context(|| format!("measurement `{measurement_id}` not found"))?;
    let criteria = store.get_all::<ConformityCriterion>().await?;
    let project: Option<Project> = store.get_by_id(&measurement.obra_id).await?;
    let equipment: Option<Equipment> = store.get_by_id(&measurement.equipamento_id).await?;

    let evaluator = Evaluator::from_config(config)?;
    let result = evaluator.evaluate(&measurement, &criteria, project.as_ref(), equipment.as_ref());
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn handle_report(
    store: &LocalStore,
    config: &StoreConfig,
    session: &SessionContext,
    args: ReportArgs,
) -> Result<()> {
    let measurements = store.get_all::<Measurement>().await?;
    let criteria = store.get_all::<ConformityCriterion>().await?;
    let projects = store.get_all::<Project>().await?;
    let equipment = store.get_all::<Equipment>().await?;
    let evaluator = Evaluator::from_config(config)?;

    let mut df = reports::conformity_report(&measurements, &criteria, &projects, &equipment, &evaluator)?;
    reports::write_report_csv(&mut df, &args.out)?;

    store
        .record_audit(session.audit_entry(
            AuditAction::ExportCsv,
            "conformity_report",
            args.out.display().to_string(),
            format!("{} measurements reported", df.height()),
        ))
        .await?;
    println!("Wrote {} rows to {}.", df.height(), args.out.display());
    Ok(())
}

async fn handle_close_assignment(
    store: &LocalStore,
    session: &SessionContext,
    args: CloseAssignmentArgs,
) -> Result<()> {
    let end_date = args.end_date.format("%Y-%m-%d").to_string();
    let closed = store.close_assignment(&args.id, &end_date).await?;
    store
        .record_audit(session.audit_entry(
            AuditAction::EntityUpdated,
            "vinculo",
            closed.id.as_str(),
            format!("assignment closed on {end_date}"),
        ))
        .await?;
    println!(
        "Assignment {} for equipment {} closed on {}.",
        closed.id, closed.equipamento_id, end_date
    );
    Ok(())
}

async fn handle_audit(store: &LocalStore, args: AuditArgs) -> Result<()> {
    let filter = AuditFilter {
        entity_type: args.entity_type,
        entity_id: args.entity_id,
        ..AuditFilter::default()
    };
    let entries = store.list_audit(&filter).await?;

    let mut table = Table::new();
    table.set_header(vec!["created_at", "actor", "action", "entity", "summary"]);
    for entry in &entries {
        table.add_row(vec![
            entry.created_at.map(|at| at.to_rfc3339()).unwrap_or_default(),
            entry.actor_user_id.clone(),
            entry.action.to_string(),
            format!("{}/{}", entry.entity_type, entry.entity_id),
            entry.summary.clone(),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn handle_errors(store: &LocalStore) -> Result<()> {
    let errors = store.list_errors().await?;
    if errors.is_empty() {
        println!("No errors logged.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["created_at", "module", "action", "message"]);
    for entry in &errors {
        table.add_row(vec![
            entry.created_at.map(|at| at.to_rfc3339()).unwrap_or_default(),
            entry.module.clone(),
            entry.action.clone(),
            entry.message.clone(),
        ]);
    }
    println!("{table}");
    Ok(())
}
