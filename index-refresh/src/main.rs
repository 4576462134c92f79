use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use index_refresh::{Dependencies, IndexingError, Settings};
use index_refresh_ingest::{IngestConfig, PoolConfig, SourceSpec, SubmitterConfig};
use index_refresh_shared::IngestMode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "index-refresh")]
#[command(about = "Refresh search indices from object storage and local files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load source files into an index
    Ingest(IngestArgs),
    /// Delete every document of an index that is not serving traffic
    Cleanup {
        /// Index to empty
        #[arg(long)]
        index: String,
    },
    /// Copy a source index into an emptied target index
    Reindex {
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
    },
    /// Atomically move an alias from the source index to the target index
    SwitchAlias {
        #[arg(long)]
        alias: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
    },
}

#[derive(Args)]
struct IngestArgs {
    /// Destination index
    #[arg(long)]
    index: String,

    /// S3 bucket to read from
    #[arg(long, env = "S3_BUCKET")]
    bucket: Option<String>,

    /// Key prefix within the bucket
    #[arg(long, default_value = "")]
    prefix: String,

    /// Local files to read
    #[arg(long, num_args = 1..)]
    local_files: Vec<PathBuf>,

    /// Local folder to scan (not recursive)
    #[arg(long)]
    local_folder: Option<PathBuf>,

    /// Skip files processed by a previous run
    #[arg(long, conflicts_with = "fresh_load")]
    resume: bool,

    /// Empty the index and forget processed files first (default)
    #[arg(long)]
    fresh_load: bool,

    /// Records per bulk request
    #[arg(long, default_value = "10000")]
    batch_size: usize,

    /// Concurrent bulk workers
    #[arg(long, default_value = "4")]
    max_workers: usize,

    /// Bulk request size ceiling in bytes
    #[arg(long, default_value = "10485760")]
    max_request_bytes: usize,

    /// Batch queue capacity (default: twice the worker count)
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Field holding the document id
    #[arg(long, default_value = "id")]
    id_field: String,

    /// Retries for transient bulk failures
    #[arg(long, default_value = "3")]
    max_retries: u32,
}

impl IngestArgs {
    fn mode(&self) -> IngestMode {
        if self.resume {
            IngestMode::Resume
        } else {
            IngestMode::FreshLoad
        }
    }

    fn source_spec(&self) -> SourceSpec {
        SourceSpec {
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            local_files: self.local_files.clone(),
            local_folder: self.local_folder.clone(),
        }
    }

    fn ingest_config(&self) -> IngestConfig {
        let workers = self.max_workers.max(1);
        IngestConfig {
            mode: self.mode(),
            pool: PoolConfig {
                workers,
                queue_capacity: self.queue_capacity.unwrap_or(workers * 2),
                batch_size: self.batch_size,
                max_request_bytes: self.max_request_bytes,
                id_field: self.id_field.clone(),
            },
            submitter: SubmitterConfig {
                max_retries: self.max_retries,
                ..Default::default()
            },
            ..IngestConfig::new(&self.index)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(cli: Cli) -> Result<bool, IndexingError> {
    let settings = Settings::from_env()?;

    if let Commands::Ingest(args) = &cli.command {
        let spec = args.source_spec();
        if spec.is_empty() {
            return Err(IndexingError::config(
                "ingest needs --bucket, --local-files or --local-folder",
            ));
        }
    }

    let deps = Dependencies::new(settings).await?;

    match cli.command {
        Commands::Ingest(args) => {
            let spec = args.source_spec();
            let runner = deps.ingest_runner(spec.bucket.is_some()).await?;
            let summary = runner.run(&args.ingest_config(), &spec).await?;
            Ok(summary.is_clean())
        }
        Commands::Cleanup { index } => {
            let outcome = deps.cleaner().cleanup(&index).await?;
            info!(
                index = %outcome.index,
                documents_deleted = outcome.documents_deleted,
                skipped = outcome.skipped,
                "Cleanup finished"
            );
            Ok(true)
        }
        Commands::Reindex { source, target } => {
            let outcome = deps.reindexer().reindex(&source, &target).await?;
            info!(
                source = %outcome.source,
                target = %outcome.target,
                total = outcome.summary.total,
                created = outcome.summary.created,
                updated = outcome.summary.updated,
                failures = outcome.summary.failures,
                "Reindex finished"
            );
            Ok(true)
        }
        Commands::SwitchAlias {
            alias,
            source,
            target,
        } => {
            let outcome = deps.alias_switcher().switch(&alias, &source, &target).await?;
            info!(
                alias = %outcome.alias,
                previous_index = %outcome.previous_index,
                current_index = %outcome.current_index,
                target_documents = outcome.target_report.document_count,
                "Alias switched"
            );
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("Completed with failed files, see the summary above");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}
