use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use geoferry_bucket::{S3BucketStore, S3Config};
use geoferry_core::enrich::run_enrichment;
use geoferry_core::import::run_import;
use geoferry_core::jobs::{EnrichmentJob, ImportJob};
use geoferry_raster::{HttpRasterClient, RasterConfig};
use geoferry_warehouse::{HttpWarehouseClient, WarehouseConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Geoferry geospatial pipeline CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the enrichment pipeline described by a TOML job file
    Enrich {
        #[arg(long)]
        job: PathBuf,
    },
    /// Import a vector file into a warehouse table
    Import {
        #[arg(long)]
        job: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    if let Err(err) = run().await {
        let message = format!("{err:#}");
        eprintln!("{}", serde_json::json!({ "error": message }));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Enrich { job } => {
            let job = load_enrichment_job(&job)?;
            let warehouse = warehouse_from_env()?;
            let bucket = bucket_from_env(&job.bucket).await?;
            let raster = raster_from_env()?;

            let receipt = run_enrichment(&warehouse, &bucket, &raster, &job).await?;
            info!(
                destination = %receipt.destination_table,
                shards = receipt.staged_shards,
                "enrichment finished"
            );
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        Command::Import { job } => {
            let job = load_import_job(&job)?;
            let warehouse = warehouse_from_env()?;

            let receipt = run_import(&warehouse, &job).await?;
            info!(tables = receipt.tables.len(), "import finished");
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
    }

    Ok(())
}

fn load_enrichment_job(path: &Path) -> Result<EnrichmentJob> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("could not read job file {}", path.display()))?;
    EnrichmentJob::from_toml(&content)
        .with_context(|| format!("invalid enrichment job in {}", path.display()))
}

fn load_import_job(path: &Path) -> Result<ImportJob> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("could not read job file {}", path.display()))?;
    ImportJob::from_toml(&content)
        .with_context(|| format!("invalid import job in {}", path.display()))
}

fn warehouse_from_env() -> Result<HttpWarehouseClient> {
    let endpoint = std::env::var("GEOFERRY_WAREHOUSE_ENDPOINT")
        .context("GEOFERRY_WAREHOUSE_ENDPOINT must be set")?;
    let project = std::env::var("GEOFERRY_WAREHOUSE_PROJECT")
        .context("GEOFERRY_WAREHOUSE_PROJECT must be set")?;

    Ok(HttpWarehouseClient::new(WarehouseConfig {
        endpoint,
        project,
        api_token: std::env::var("GEOFERRY_WAREHOUSE_TOKEN").ok(),
        request_timeout: request_timeout_from_env()?,
    }))
}

fn raster_from_env() -> Result<HttpRasterClient> {
    let endpoint = std::env::var("GEOFERRY_RASTER_ENDPOINT")
        .context("GEOFERRY_RASTER_ENDPOINT must be set")?;

    Ok(HttpRasterClient::new(RasterConfig {
        endpoint,
        api_token: std::env::var("GEOFERRY_RASTER_TOKEN").ok(),
        request_timeout: request_timeout_from_env()?,
    }))
}

async fn bucket_from_env(bucket: &str) -> Result<S3BucketStore> {
    let config = S3Config {
        bucket: bucket.to_string(),
        region: std::env::var("GEOFERRY_S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        endpoint: std::env::var("GEOFERRY_S3_ENDPOINT_URL").ok(),
        access_key_id: std::env::var("GEOFERRY_S3_ACCESS_KEY_ID").ok(),
        secret_access_key: std::env::var("GEOFERRY_S3_SECRET_ACCESS_KEY").ok(),
        force_path_style: std::env::var("GEOFERRY_S3_FORCE_PATH_STYLE")
            .map(|value| value == "true" || value == "1")
            .unwrap_or(false),
    };

    S3BucketStore::new(config)
        .await
        .context("failed to build S3 object store")
}

fn request_timeout_from_env() -> Result<Duration> {
    match std::env::var("GEOFERRY_REQUEST_TIMEOUT_SECS") {
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .context("GEOFERRY_REQUEST_TIMEOUT_SECS must be an integer")?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(Duration::from_secs(30)),
    }
}
