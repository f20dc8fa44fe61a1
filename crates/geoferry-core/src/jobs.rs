//! Job descriptions loaded from TOML files.

use serde::Deserialize;

use crate::error::Result;
use crate::poll::PollConfig;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PollSettings {
    pub timeout_secs: u64,
    pub interval_secs: u64,
}

impl PollSettings {
    pub const fn new(timeout_secs: u64, interval_secs: u64) -> Self {
        Self {
            timeout_secs,
            interval_secs,
        }
    }

    pub fn config(&self) -> PollConfig {
        PollConfig::from_secs(self.timeout_secs, self.interval_secs)
    }
}

/// Per-step poll bounds for the enrichment pipeline. Defaults match the
/// services' usual job latencies; the final table export is the slow one.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct EnrichmentTimeouts {
    pub export: PollSettings,
    pub ingest: PollSettings,
    pub table_export: PollSettings,
}

impl Default for EnrichmentTimeouts {
    fn default() -> Self {
        Self {
            export: PollSettings::new(300, 2),
            ingest: PollSettings::new(300, 3),
            table_export: PollSettings::new(600, 10),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentJob {
    /// Fully-qualified `project.dataset.table` to enrich.
    pub source_table: String,
    /// Fully-qualified destination for the enriched rows.
    pub destination_table: String,
    /// Bucket used to stage the CSV export between services.
    pub bucket: String,
    /// Asset namespace the staged table is ingested under.
    pub asset_root: String,
    /// Server-side expression binding `image`.
    pub image_expression: String,
    pub band: String,
    pub reducer: String,
    #[serde(default = "default_scale")]
    pub scale: u32,
    #[serde(default = "default_tile_scale")]
    pub tile_scale: u32,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub append: bool,
    #[serde(default = "default_staging_prefix")]
    pub staging_prefix: String,
    #[serde(default)]
    pub timeouts: EnrichmentTimeouts,
}

fn default_scale() -> u32 {
    30
}

fn default_tile_scale() -> u32 {
    2
}

fn default_staging_prefix() -> String {
    "warehouse-exports".to_string()
}

impl EnrichmentJob {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportJob {
    /// Local path or HTTP(S) URL of the vector payload.
    pub source: String,
    pub destination_table: String,
    /// Stage WKB and rewrite it server-side into geography values.
    #[serde(default)]
    pub ensure_spherical: bool,
    /// Load only this layer; omitted means every layer.
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub append: bool,
    #[serde(default = "default_load_settings")]
    pub load: PollSettings,
}

fn default_load_settings() -> PollSettings {
    PollSettings::new(300, 2)
}

impl ImportJob {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
