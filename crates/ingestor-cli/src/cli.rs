use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use ingestor_digest::DigestAlgorithm;
use ingestor_records::DEFAULT_SCAN_LIMIT;
use ingestor_types::FileStatus;

#[derive(Parser)]
#[command(
    name = "ingestor",
    about = "Ingestor: hash, record and relocate uploaded files",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Data directory holding `objects/` and `files.json`
    #[arg(long, global = true, env = "INGESTOR_ROOT", default_value = ".ingestor")]
    pub root: PathBuf,

    /// TOML configuration file [default: <root>/ingestor.toml if present]
    #[arg(short, long, global = true, env = "INGESTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Upload a local file into the raw container
    Put(PutArgs),
    /// Run the pipeline for one object
    Process(ProcessArgs),
    /// Run the pipeline for every entry of a notification envelope
    Handle(HandleArgs),
    /// Repair records left in RAW by failed runs
    Reconcile(ReconcileArgs),
    /// List file records
    List(ListArgs),
    /// Show one file record
    Show(ShowArgs),
    /// Compute the checksum of a local file
    Digest(DigestArgs),
}

#[derive(Args)]
pub struct PutArgs {
    pub path: PathBuf,
    /// Object key [default: the file name]
    #[arg(long)]
    pub key: Option<String>,
    /// Target container [default: the raw container]
    #[arg(long)]
    pub container: Option<String>,
    #[arg(long, default_value = "")]
    pub content_type: String,
    /// Process the object right after uploading it
    #[arg(long)]
    pub process: bool,
}

#[derive(Args)]
pub struct ProcessArgs {
    pub key: String,
    /// Container the object was created in [default: the raw container]
    #[arg(long)]
    pub container: Option<String>,
    /// Size announced by the notifier
    #[arg(long)]
    pub size: Option<u64>,
    /// Entity tag announced by the notifier
    #[arg(long)]
    pub etag: Option<String>,
}

#[derive(Args)]
pub struct HandleArgs {
    /// Envelope JSON file, or `-` for stdin
    pub envelope: PathBuf,
}

#[derive(Args)]
pub struct ReconcileArgs {
    /// Override the grace period, in seconds
    #[arg(long)]
    pub grace_secs: Option<u64>,
    /// Override the batch limit
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long)]
    pub status: Option<FileStatus>,
    /// Processed at or after (RFC 3339)
    #[arg(long)]
    pub from: Option<DateTime<Utc>>,
    /// Processed at or before (RFC 3339)
    #[arg(long)]
    pub to: Option<DateTime<Utc>>,
    #[arg(short = 'n', long, default_value_t = DEFAULT_SCAN_LIMIT)]
    pub limit: usize,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Record id (`file#<key>`) or a bare object key
    pub id: String,
}

#[derive(Args)]
pub struct DigestArgs {
    pub path: PathBuf,
    #[arg(long, default_value = "sha256")]
    pub algorithm: DigestAlgorithm,
    #[arg(long)]
    pub chunk_size: Option<usize>,
}
