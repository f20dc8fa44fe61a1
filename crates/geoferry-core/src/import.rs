//! The vector import utility: fetch a payload, read its layers, normalize
//! geometry, and load each layer into a warehouse table through polled jobs.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::fetch::fetch_source;
use crate::jobs::ImportJob;
use crate::poll::{classify_job, wait_until_done, PollConfig};
use geoferry_vector::{normalize::normalize_layer, read_source, wkb, Layer};
use geoferry_warehouse::{TableRef, WarehouseJobs, WriteDisposition};

pub const STEP_LOAD: &str = "table-load";
pub const STEP_REWRITE: &str = "spherical-rewrite";

const GEOMETRY_COLUMN: &str = "geom";
const WKB_COLUMN: &str = "geom_wkb";
const TEMP_SUFFIX: &str = "temp";

#[derive(Debug, Clone, Serialize)]
pub struct CreatedTable {
    pub layer: String,
    pub destination_table: String,
    pub feature_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ImportReceipt {
    pub source: String,
    pub tables: Vec<CreatedTable>,
    pub finished_at: String,
}

pub async fn run_import(warehouse: &dyn WarehouseJobs, job: &ImportJob) -> Result<ImportReceipt> {
    let destination = TableRef::parse(&job.destination_table)?;
    let disposition = if job.append {
        WriteDisposition::Append
    } else {
        WriteDisposition::Truncate
    };
    if job.ensure_spherical && job.append {
        return Err(PipelineError::Validation(
            "spherical mode always rebuilds the table; append is not supported".to_string(),
        ));
    }

    let (file_name, bytes) = fetch_source(&job.source).await?;
    let dataset = read_source(&file_name, &bytes)?;
    info!(source = %job.source, layers = dataset.layers.len(), "read vector dataset");

    let plans: Vec<(Layer, TableRef)> = match &job.layer {
        Some(name) => {
            let layer = dataset.find_layer(name).cloned().ok_or_else(|| {
                PipelineError::Validation(format!(
                    "layer '{}' not found; available: {}",
                    name,
                    dataset.layer_names().join(", ")
                ))
            })?;
            vec![(layer, destination.clone())]
        }
        None if dataset.layers.len() > 1 => dataset
            .layers
            .iter()
            .map(|layer| (layer.clone(), destination.with_suffix(&layer.name)))
            .collect(),
        None => {
            let layer = dataset
                .layers
                .first()
                .cloned()
                .ok_or_else(|| PipelineError::Validation("dataset has no layers".to_string()))?;
            vec![(layer, destination.clone())]
        }
    };

    let poll = job.load.config();
    let mut tables = Vec::new();
    for (mut layer, table) in plans {
        let report = normalize_layer(&mut layer)?;
        if report.dropped_geometries > 0 {
            warn!(
                layer = %layer.name,
                dropped = report.dropped_geometries,
                "dropped unrepairable geometries"
            );
        }

        let feature_count = layer.features.len();
        import_layer(warehouse, &layer, &table, job.ensure_spherical, disposition, &poll).await?;
        info!(layer = %layer.name, table = %table, rows = feature_count, "loaded layer");

        tables.push(CreatedTable {
            layer: layer.name,
            destination_table: table.to_string(),
            feature_count,
        });
    }

    Ok(ImportReceipt {
        source: job.source.clone(),
        tables,
        finished_at: Utc::now().to_rfc3339(),
    })
}

async fn import_layer(
    warehouse: &dyn WarehouseJobs,
    layer: &Layer,
    table: &TableRef,
    ensure_spherical: bool,
    disposition: WriteDisposition,
    poll: &PollConfig,
) -> Result<()> {
    let geometry_column = if ensure_spherical {
        WKB_COLUMN
    } else {
        GEOMETRY_COLUMN
    };
    let rows = layer_rows(layer, geometry_column)?;
    if rows.is_empty() {
        // Nothing to load; the table is still recorded in the receipt.
        return Ok(());
    }

    if ensure_spherical {
        let staging = table.with_suffix(TEMP_SUFFIX);
        run_load(warehouse, &staging, &rows, WriteDisposition::Truncate, poll).await?;

        let rewrite = spherical_rewrite_statement(table, &staging);
        let job_id = warehouse.start_query(&rewrite).await?;
        wait_until_done(STEP_REWRITE, poll, || {
            let id = job_id.clone();
            async move { classify_job(warehouse.job_status(&id).await?, STEP_REWRITE) }
        })
        .await?;
    } else {
        run_load(warehouse, table, &rows, disposition, poll).await?;
    }

    Ok(())
}

async fn run_load(
    warehouse: &dyn WarehouseJobs,
    table: &TableRef,
    rows: &[Value],
    disposition: WriteDisposition,
    poll: &PollConfig,
) -> Result<()> {
    let job_id = warehouse.start_load(table, rows, disposition).await?;
    wait_until_done(STEP_LOAD, poll, || {
        let id = job_id.clone();
        async move { classify_job(warehouse.job_status(&id).await?, STEP_LOAD) }
    })
    .await
}

fn layer_rows(layer: &Layer, geometry_column: &str) -> Result<Vec<Value>> {
    let mut rows = Vec::with_capacity(layer.features.len());

    for feature in &layer.features {
        if feature.properties.contains_key(geometry_column) {
            return Err(PipelineError::Validation(format!(
                "layer '{}' has a property named '{}', which collides with the geometry column",
                layer.name, geometry_column
            )));
        }

        let mut row: Map<String, Value> = feature.properties.clone();
        let geometry = match &feature.geometry {
            Some(geometry) if geometry_column == WKB_COLUMN => {
                Value::from(wkb::encode_hex(geometry))
            }
            Some(geometry) => Value::from(geometry.to_geojson_string()),
            None => Value::Null,
        };
        row.insert(geometry_column.to_string(), geometry);
        rows.push(Value::Object(row));
    }

    Ok(rows)
}

/// Rebuild the destination from staged WKB, turning it into geography values
/// server-side, then drop the staging table.
fn spherical_rewrite_statement(table: &TableRef, staging: &TableRef) -> String {
    format!(
        "CREATE OR REPLACE TABLE `{table}` CLUSTER BY {GEOMETRY_COLUMN} AS\nSELECT * EXCEPT ({WKB_COLUMN}),\n  ST_GEOGFROMWKB(FROM_HEX({WKB_COLUMN}), planar => true, make_valid => true) AS {GEOMETRY_COLUMN}\nFROM `{staging}`;\nDROP TABLE `{staging}`"
    )
}
