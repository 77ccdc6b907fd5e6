//! repocat command-line entry point.

use anyhow::Context;
use clap::Parser;
use repocat::config::RepocatConfig;
use repocat::error::Error;
use repocat::logging;
use repocat::service::Ingestor;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "repocat",
    version,
    about = "Fetch a repository and concatenate its files into one artifact"
)]
struct Cli {
    /// Repository URL to ingest
    url: String,

    /// Access token for private repositories
    #[arg(long, env = "REPOCAT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Additional ignore pattern (gitignore syntax; repeatable)
    #[arg(short = 'i', long = "ignore", value_name = "PATTERN")]
    ignore: Vec<String>,

    /// Path to a configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only check the repository and report its file count and size
    #[arg(long)]
    pre_check: bool,

    /// Print the full statistics payload as JSON
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = RepocatConfig::load(cli.config.as_deref()).context("loading configuration")?;
    logging::init(&config.logging).context("initializing logging")?;

    let mut service = Ingestor::new(config).context("starting ingestion service")?;
    let result = run(&service, &cli).await;
    service.shutdown().await;

    result.map_err(|err| {
        if let Some(hint) = remediation(&err) {
            anyhow::Error::new(err).context(hint)
        } else {
            anyhow::Error::new(err)
        }
    })
}

async fn run(service: &Ingestor, cli: &Cli) -> Result<(), Error> {
    if cli.pre_check {
        let summary = service.pre_check(&cli.url, cli.token.as_deref()).await?;
        println!(
            "{}: {} files, {:.2} KB",
            summary.source.display_name(),
            summary.file_count,
            summary.size_kb
        );
        return Ok(());
    }

    let outcome = service
        .ingest(&cli.url, cli.token.as_deref(), &cli.ignore)
        .await?;

    let stats = &outcome.statistics.file_stats;
    println!("Artifact: {}", outcome.artifact_path.display());
    println!(
        "Files: {} processed, {} skipped ({}){}",
        stats.processed_files,
        stats.skipped_files,
        human_size(stats.total_size),
        if outcome.from_cache { " [cached]" } else { "" }
    );
    if cli.stats {
        println!("{}", serde_json::to_string_pretty(&outcome.statistics.to_json()).unwrap_or_default());
    }
    Ok(())
}

/// User-facing hints per error kind.
fn remediation(err: &Error) -> Option<&'static str> {
    match err {
        Error::InvalidSource { .. } => {
            Some("expected format: https://host/owner/repository[/path/to/directory]")
        }
        Error::AuthenticationRequired => {
            Some("provide an access token with --token for private repositories")
        }
        Error::RateLimited => Some("retry later or provide an access token to raise the limit"),
        Error::SubdirectoryMissing { .. } => {
            Some("check that the path exists on the default branch")
        }
        _ => None,
    }
}

fn human_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
