use thiserror::Error;

use geoferry_bucket::BucketError;
use geoferry_raster::RasterError;
use geoferry_vector::VectorError;
use geoferry_warehouse::WarehouseError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("step '{step}' timed out after {seconds} seconds")]
    Timeout { step: &'static str, seconds: u64 },

    #[error("step '{step}' failed remotely: {message}")]
    Remote { step: &'static str, message: String },

    #[error("step '{step}' saw unexpected state '{state}'")]
    UnexpectedState { step: &'static str, state: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("object store error: {0}")]
    Bucket(#[from] BucketError),

    #[error("raster service error: {0}")]
    Raster(#[from] RasterError),

    #[error("vector data error: {0}")]
    Vector(#[from] VectorError),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("job file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
