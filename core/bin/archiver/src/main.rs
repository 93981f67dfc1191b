use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Context as _;
use archiver_config::load_config;
use archiver_node::Archiver;
use archiver_object_store::{ArchiveStore, S3Store};
use clap::{Parser, ValueEnum};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "archiver",
    version,
    about = "Archive PostgreSQL audit tables to S3-compatible storage",
    long_about = "Moves rows older than the retention window from PostgreSQL audit tables into \
                  compressed, checksummed objects in an S3-compatible store, then deletes the \
                  verified rows from the source."
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, short)]
    config: PathBuf,

    /// Count what would be archived without uploading or deleting anything.
    #[arg(long)]
    dry_run: bool,

    /// Process only the named database.
    #[arg(long)]
    database: Option<String>,

    /// Process only the named table (combine with --database).
    #[arg(long)]
    table: Option<String>,

    /// Shortcut for --log-level debug.
    #[arg(long, short)]
    verbose: bool,

    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Console)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Console,
    Json,
}

const EXIT_OK: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::error!("archival failed: {err:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn init_logging(cli: &Cli) {
    let directives = if cli.verbose {
        "debug"
    } else {
        cli.log_level.as_str()
    };
    let filter = EnvFilter::try_new(directives)
        .or_else(|_| EnvFilter::try_new("info"))
        .expect("static fallback filter");
    match cli.log_format {
        LogFormat::Console => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

async fn run(cli: &Cli) -> anyhow::Result<u8> {
    let mut config = load_config(&cli.config)
        .with_context(|| format!("cannot load config from {}", cli.config.display()))?;

    if !config.filter(cli.database.as_deref(), cli.table.as_deref()) {
        tracing::warn!("No databases/tables to process after filtering");
        return Ok(EXIT_OK);
    }

    if cli.dry_run {
        tracing::info!("DRY RUN MODE - no changes will be made");
    }

    let s3 = S3Store::new(&config.s3).await.context("cannot build S3 client")?;
    s3.validate_bucket()
        .await
        .with_context(|| format!("bucket {} is not usable", config.s3.bucket))?;
    let store = ArchiveStore::new(
        Arc::new(s3),
        config.s3.bucket.clone(),
        config.s3.prefix.clone(),
        config.s3.requests_per_second,
        config.s3.max_retries,
        std::env::temp_dir().join("audit_archiver_uploads"),
    );

    let (stop_sender, stop_receiver) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, finishing the in-flight batch");
            let _ = stop_sender.send(true);
        }
    });

    let archiver = Archiver::new(Arc::new(config), store, cli.dry_run);
    let stats = archiver.run(stop_receiver).await?;

    match cli.log_format {
        LogFormat::Console => println!("{}", stats.summary()),
        LogFormat::Json => println!(
            "{}",
            serde_json::to_string(&stats).context("stats serialization")?
        ),
    }

    if stats.interrupted {
        Ok(EXIT_INTERRUPTED)
    } else if stats.has_failures() {
        Ok(EXIT_ERROR)
    } else {
        Ok(EXIT_OK)
    }
}
