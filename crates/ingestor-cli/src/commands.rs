use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use bytes::Bytes;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use serde_json::json;
use tokio::io::AsyncReadExt;

use ingestor_digest::{DigestComputer, DEFAULT_CHUNK_SIZE};
use ingestor_pipeline::{
    ActionKind, IngestConfig, IngestOutcome, IngestPipeline, NotificationEnvelope,
    ObjectCreatedEvent, ReconcileReport, Reconciler, StepFailure,
};
use ingestor_records::{JsonFileRecordStore, RecordStore, ScanFilter};
use ingestor_store::{FsObjectStore, ObjectStore};
use ingestor_types::{FileId, FileRecord, FileStatus, Location};

use crate::cli::*;

const CONFIG_FILE: &str = "ingestor.toml";
const RECORDS_FILE: &str = "files.json";
const OBJECTS_DIR: &str = "objects";

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        command,
        root,
        config,
        format,
        ..
    } = cli;
    let open = || Workspace::open(&root, config.as_deref());
    match command {
        Command::Put(args) => cmd_put(&open()?, args, format).await,
        Command::Process(args) => cmd_process(&open()?, args, format).await,
        Command::Handle(args) => cmd_handle(&open()?, args, format).await,
        Command::Reconcile(args) => cmd_reconcile(open()?, args, format).await,
        Command::List(args) => cmd_list(&open()?, args, format).await,
        Command::Show(args) => cmd_show(&open()?, args, format).await,
        Command::Digest(args) => cmd_digest(args, format).await,
    }
}

/// Stores and configuration under one data directory.
struct Workspace {
    config: IngestConfig,
    objects: Arc<FsObjectStore>,
    records: Arc<JsonFileRecordStore>,
}

impl Workspace {
    fn open(root: &Path, config_path: Option<&Path>) -> anyhow::Result<Self> {
        let config = load_config(root, config_path)?;
        let objects = Arc::new(FsObjectStore::new(root.join(OBJECTS_DIR)));
        let records = JsonFileRecordStore::open(root.join(RECORDS_FILE))
            .with_context(|| format!("opening records under {}", root.display()))?;
        Ok(Self {
            config,
            objects,
            records: Arc::new(records),
        })
    }

    fn pipeline(&self) -> anyhow::Result<IngestPipeline> {
        IngestPipeline::new(self.objects.clone(), self.records.clone(), self.config.clone())
            .context("invalid configuration")
    }
}

fn load_config(root: &Path, explicit: Option<&Path>) -> anyhow::Result<IngestConfig> {
    let default_path = root.join(CONFIG_FILE);
    let config = match explicit {
        Some(path) => IngestConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None if default_path.is_file() => IngestConfig::load(&default_path)
            .with_context(|| format!("loading configuration from {}", default_path.display()))?,
        None => IngestConfig::default(),
    }
    .with_env_overrides();
    config.validate().context("invalid configuration")?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_put(ws: &Workspace, args: PutArgs, format: OutputFormat) -> anyhow::Result<()> {
    let data = tokio::fs::read(&args.path)
        .await
        .with_context(|| format!("reading {}", args.path.display()))?;
    let key = match args.key {
        Some(key) => key,
        None => args
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .context("cannot derive a key from the path; pass --key")?,
    };
    let container = args
        .container
        .unwrap_or_else(|| ws.config.raw_container.clone());
    let location = Location::new(container, key);
    let meta = ws
        .objects
        .put(&location, Bytes::from(data), &args.content_type)
        .await
        .with_context(|| format!("uploading to {location}"))?;

    if args.process {
        let event = ObjectCreatedEvent::new(location.container.clone(), location.key.clone())
            .with_size(meta.size)
            .with_entity_tag(meta.entity_tag.clone());
        return process_event(ws, &event, format).await;
    }

    match format {
        OutputFormat::Json => emit_json(&json!({ "location": location, "meta": meta }))?,
        OutputFormat::Text => {
            println!("{} Uploaded {}", "✓".green().bold(), location.to_string().bold());
            println!("  Size: {} bytes, type: {}", meta.size, meta.content_type);
            println!("  ETag: {}", meta.entity_tag.dimmed());
        }
    }
    Ok(())
}

async fn cmd_process(ws: &Workspace, args: ProcessArgs, format: OutputFormat) -> anyhow::Result<()> {
    let container = args
        .container
        .unwrap_or_else(|| ws.config.raw_container.clone());
    let mut event = ObjectCreatedEvent::new(container, args.key);
    event.size = args.size;
    event.entity_tag = args.etag;
    process_event(ws, &event, format).await
}

async fn process_event(
    ws: &Workspace,
    event: &ObjectCreatedEvent,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let result = ws.pipeline()?.process(event).await;
    match format {
        OutputFormat::Json => emit_json(&result_json(&result)?)?,
        OutputFormat::Text => print_result(&result),
    }
    result.map(|_| ()).map_err(anyhow::Error::from)
}

async fn cmd_handle(ws: &Workspace, args: HandleArgs, format: OutputFormat) -> anyhow::Result<()> {
    let text = read_envelope(&args.envelope).await?;
    let envelope = NotificationEnvelope::from_json(&text)?;
    let results = ws.pipeline()?.process_envelope(&envelope).await?;
    let failed = results.iter().filter(|r| r.is_err()).count();

    match format {
        OutputFormat::Json => {
            let values = results
                .iter()
                .map(result_json)
                .collect::<anyhow::Result<Vec<_>>>()?;
            emit_json(&values)?;
        }
        OutputFormat::Text => {
            for result in &results {
                print_result(result);
            }
            println!(
                "\n{} events, {} processed, {} failed",
                results.len(),
                results
                    .iter()
                    .filter(|r| matches!(r, Ok(o) if o.is_processed()))
                    .count(),
                failed
            );
        }
    }
    if failed > 0 {
        bail!("{failed} of {} events failed", results.len());
    }
    Ok(())
}

async fn read_envelope(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("reading envelope from stdin")?;
        return Ok(text);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

async fn cmd_reconcile(
    mut ws: Workspace,
    args: ReconcileArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    if let Some(secs) = args.grace_secs {
        ws.config.reconcile_grace_secs = secs;
    }
    if let Some(limit) = args.limit {
        ws.config.reconcile_batch_limit = limit;
    }
    let reconciler = Reconciler::new(ws.objects.clone(), ws.records.clone(), ws.config.clone())
        .context("invalid configuration")?;
    let report = reconciler.reconcile().await?;

    match format {
        OutputFormat::Json => emit_json(&report)?,
        OutputFormat::Text => print_report(&report),
    }
    let issues = report.issues().count();
    if issues > 0 {
        bail!("reconciliation left {issues} issue(s) unresolved");
    }
    Ok(())
}

async fn cmd_list(ws: &Workspace, args: ListArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut filter = ScanFilter::all()
        .processed_between(args.from, args.to)
        .with_limit(args.limit);
    if let Some(status) = args.status {
        filter = filter.with_status(status);
    }
    let records = ws.records.scan(&filter).await?;

    match format {
        OutputFormat::Json => emit_json(&records)?,
        OutputFormat::Text if records.is_empty() => println!("No records."),
        OutputFormat::Text => {
            for r in &records {
                let when = r
                    .processed_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:<10} {}  {}  {} bytes  {}",
                    status_label(r.status),
                    r.id.to_string().bold(),
                    r.location,
                    r.size,
                    when.dimmed()
                );
            }
        }
    }
    Ok(())
}

async fn cmd_show(ws: &Workspace, args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let id = FileId::parse(&args.id)?;
    let Some(record) = ws.records.get(&id).await? else {
        bail!("no record for {id}");
    };
    match format {
        OutputFormat::Json => emit_json(&record)?,
        OutputFormat::Text => print_record(&record),
    }
    Ok(())
}

async fn cmd_digest(args: DigestArgs, format: OutputFormat) -> anyhow::Result<()> {
    let computer =
        DigestComputer::new(args.algorithm, args.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE))?;
    let file = tokio::fs::File::open(&args.path)
        .await
        .with_context(|| format!("opening {}", args.path.display()))?;
    let size = file.metadata().await?.len();
    let digest = computer.compute(file, Some(size)).await?;

    match format {
        OutputFormat::Json => emit_json(&json!({
            "path": args.path,
            "algorithm": digest.algorithm,
            "hex": digest.hex,
            "bytes": digest.bytes_read,
        }))?,
        OutputFormat::Text => println!("{}  {}", digest.hex, args.path.display()),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn emit_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn result_json(result: &Result<IngestOutcome, StepFailure>) -> anyhow::Result<serde_json::Value> {
    Ok(match result {
        Ok(outcome) => serde_json::to_value(outcome)?,
        Err(failure) => json!({
            "outcome": "failed",
            "step": failure.step,
            "location": failure.location,
            "recordId": failure.record_id,
            "kind": failure.error.kind(),
            "error": failure.error.to_string(),
        }),
    })
}

fn status_label(status: FileStatus) -> ColoredString {
    match status {
        FileStatus::Raw => status.as_str().yellow(),
        FileStatus::Processed => status.as_str().green(),
        FileStatus::Failed => status.as_str().red(),
    }
}

fn print_result(result: &Result<IngestOutcome, StepFailure>) {
    match result {
        Ok(IngestOutcome::Skipped { location, reason }) => {
            println!("{} {} skipped: {}", "-".dimmed(), location, reason);
        }
        Ok(IngestOutcome::Duplicate { id }) => {
            println!("{} {} already recorded", "=".cyan(), id.to_string().bold());
        }
        Ok(IngestOutcome::Processed { record, timings }) => {
            let total: Duration = timings.iter().map(|t| t.elapsed).sum();
            println!(
                "{} {} -> {} ({:?})",
                "✓".green().bold(),
                record.id.to_string().bold(),
                record.location,
                total
            );
            println!("  Checksum: {}", record.checksum.dimmed());
        }
        Err(failure) => {
            println!(
                "{} {} failed at {}: {}",
                "✗".red().bold(),
                failure.location.to_string().bold(),
                failure.step.to_string().yellow(),
                failure.error
            );
            if let Some(id) = &failure.record_id {
                println!("  Record {id} left RAW for reconciliation");
            }
        }
    }
}

fn print_record(r: &FileRecord) {
    println!("{} {}", r.id.to_string().bold(), status_label(r.status));
    println!("  Location: {}", r.location);
    println!("  Size: {} bytes, type: {}", r.size, r.content_type);
    println!("  ETag: {}", r.entity_tag);
    println!("  Checksum: {}", r.checksum);
    println!("  Created: {}", r.created_at.to_rfc3339());
    if let Some(at) = r.processed_at {
        println!("  Processed: {}", at.to_rfc3339());
    }
    if let Some(reason) = &r.failure_reason {
        println!("  Failure: {}", reason.red());
    }
}

fn print_report(report: &ReconcileReport) {
    println!(
        "Examined {} RAW record(s) past the grace period",
        report.examined.to_string().bold()
    );
    for action in &report.actions {
        let kind = match action.kind {
            ActionKind::Conflict | ActionKind::Error => action.kind.as_str().red(),
            ActionKind::MarkedFailed => action.kind.as_str().yellow(),
            _ => action.kind.as_str().green(),
        };
        println!("  {:<16} {}  {}", kind, action.id, action.detail.dimmed());
    }
    if report.actions.is_empty() {
        println!("{} Nothing to repair.", "✓".green().bold());
    }
}
