//! The enrichment pipeline: warehouse table → staged CSV shards → raster
//! service table asset → region reduction → enriched table back in the
//! warehouse. Five remote calls, each bounded by the shared poll loop.

use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::jobs::EnrichmentJob;
use crate::poll::{classify_job, classify_operation, classify_task, wait_until_done};
use geoferry_bucket::{object_url, BucketStore};
use geoferry_raster::{
    ExportDisposition, ImageExpression, RasterService, Reducer, ReduceRegionsRequest,
};
use geoferry_warehouse::{export_statement, TableRef, WarehouseJobs};

pub const STEP_EXPORT: &str = "warehouse-export";
pub const STEP_LIST: &str = "staging-listing";
pub const STEP_INGEST: &str = "table-ingestion";
pub const STEP_REDUCE: &str = "reduce-regions";
pub const STEP_TABLE_EXPORT: &str = "table-export";

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: &'static str,
    pub elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct EnrichmentReceipt {
    pub staging_suffix: String,
    pub staged_shards: usize,
    pub asset_id: String,
    pub collection: String,
    pub destination_table: String,
    pub steps: Vec<StepOutcome>,
    pub finished_at: String,
}

/// Run the pipeline with a fresh staging suffix.
pub async fn run_enrichment(
    warehouse: &dyn WarehouseJobs,
    bucket: &dyn BucketStore,
    raster: &dyn RasterService,
    job: &EnrichmentJob,
) -> Result<EnrichmentReceipt> {
    let suffix = Uuid::new_v4().simple().to_string();
    run_enrichment_with_suffix(warehouse, bucket, raster, job, &suffix).await
}

/// The suffix is injectable so tests can pin the staging locations.
pub async fn run_enrichment_with_suffix(
    warehouse: &dyn WarehouseJobs,
    bucket: &dyn BucketStore,
    raster: &dyn RasterService,
    job: &EnrichmentJob,
    suffix: &str,
) -> Result<EnrichmentReceipt> {
    let source = TableRef::parse(&job.source_table)?;
    let destination = TableRef::parse(&job.destination_table)?;
    let reducer = Reducer::from_name(&job.reducer)?;
    let expression = ImageExpression::parse(&job.image_expression)?;
    let disposition = export_disposition(job.overwrite, job.append)?;

    let staging_prefix = format!("{}/{}/", job.staging_prefix.trim_matches('/'), suffix);
    let staging_uri = object_url(&job.bucket, &staging_prefix);
    let asset_id = format!("{}/{}", job.asset_root.trim_end_matches('/'), suffix);

    let mut steps = Vec::new();

    // Step 1: export the source table to staged CSV shards.
    let started = Instant::now();
    let sql = export_statement(&source, &staging_uri, true);
    let export_job = warehouse.start_query(&sql).await?;
    wait_until_done(STEP_EXPORT, &job.timeouts.export.config(), || {
        let id = export_job.clone();
        async move { classify_job(warehouse.job_status(&id).await?, STEP_EXPORT) }
    })
    .await?;
    push_step(&mut steps, STEP_EXPORT, started);
    info!(job_id = %export_job, table = %source, "exported source table to staging");

    // Step 2: find the shards the export produced.
    let started = Instant::now();
    let staged_urls: Vec<String> = bucket
        .list_prefix(&staging_prefix)
        .await?
        .into_iter()
        .filter(|key| key.ends_with(".csv"))
        .map(|key| object_url(&job.bucket, &key))
        .collect();
    if staged_urls.is_empty() {
        return Err(PipelineError::Validation(format!(
            "no CSV shards found under {staging_uri}"
        )));
    }
    push_step(&mut steps, STEP_LIST, started);
    info!(shards = staged_urls.len(), prefix = %staging_uri, "listed staged shards");

    // Step 3: ingest the shards as a table asset.
    let started = Instant::now();
    let operation = raster
        .start_table_ingestion(&asset_id, &staged_urls, true)
        .await?;
    wait_until_done(STEP_INGEST, &job.timeouts.ingest.config(), || {
        let id = operation.clone();
        async move { classify_operation(raster.operation_status(&id).await?, STEP_INGEST) }
    })
    .await?;
    push_step(&mut steps, STEP_INGEST, started);
    info!(operation = %operation, asset = %asset_id, "ingested table asset");

    // Step 4: reduce the raster over the asset's regions.
    let started = Instant::now();
    let collection = raster
        .reduce_regions(&ReduceRegionsRequest {
            asset_id: asset_id.clone(),
            expression,
            band: job.band.clone(),
            reducer,
            scale: job.scale,
            tile_scale: job.tile_scale,
        })
        .await?;
    push_step(&mut steps, STEP_REDUCE, started);
    info!(collection = %collection, reducer = reducer.as_str(), "reduced regions");

    // Step 5: export the enriched collection into the warehouse.
    let started = Instant::now();
    let task = raster
        .start_table_export(&collection, &destination.to_string(), disposition)
        .await?;
    wait_until_done(STEP_TABLE_EXPORT, &job.timeouts.table_export.config(), || {
        let id = task.clone();
        async move { classify_task(raster.task_status(&id).await?, STEP_TABLE_EXPORT) }
    })
    .await?;
    push_step(&mut steps, STEP_TABLE_EXPORT, started);
    info!(task = %task, table = %destination, "exported enriched table");

    Ok(EnrichmentReceipt {
        staging_suffix: suffix.to_string(),
        staged_shards: staged_urls.len(),
        asset_id,
        collection: collection.to_string(),
        destination_table: destination.to_string(),
        steps,
        finished_at: Utc::now().to_rfc3339(),
    })
}

fn export_disposition(overwrite: bool, append: bool) -> Result<ExportDisposition> {
    match (overwrite, append) {
        (true, true) => Err(PipelineError::Validation(
            "overwrite and append are mutually exclusive".to_string(),
        )),
        (true, false) => Ok(ExportDisposition::Overwrite),
        (false, true) => Ok(ExportDisposition::Append),
        (false, false) => Ok(ExportDisposition::Create),
    }
}

fn push_step(steps: &mut Vec<StepOutcome>, step: &'static str, started: Instant) {
    steps.push(StepOutcome {
        step,
        elapsed_ms: started.elapsed().as_millis() as u64,
    });
}
