//! Client for the warehouse jobs API: submit SQL statement and load jobs,
//! then poll their status until a terminal state.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub endpoint: String,
    pub project: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9080".to_string(),
            project: "default".to_string(),
            api_token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("request to warehouse failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("warehouse returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("could not decode warehouse response: {0}")]
    Decode(String),

    #[error("invalid table reference '{0}': expected project.dataset.table")]
    InvalidTable(String),
}

/// Identifier handed back when a job is submitted; opaque to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Done,
    Other(String),
}

impl JobState {
    pub fn from_wire(state: &str) -> Self {
        match state {
            "PENDING" => JobState::Pending,
            "RUNNING" => JobState::Running,
            "DONE" => JobState::Done,
            other => JobState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Done => "DONE",
            JobState::Other(state) => state,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobStatus {
    pub state: JobState,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDisposition {
    Truncate,
    Append,
}

impl WriteDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteDisposition::Truncate => "WRITE_TRUNCATE",
            WriteDisposition::Append => "WRITE_APPEND",
        }
    }
}

/// A fully-qualified `project.dataset.table` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    project: String,
    dataset: String,
    table: String,
}

impl TableRef {
    pub fn parse(raw: &str) -> Result<Self, WarehouseError> {
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() != 3 || parts.iter().any(|part| part.is_empty()) {
            return Err(WarehouseError::InvalidTable(raw.to_string()));
        }
        if parts
            .iter()
            .any(|part| part.chars().any(char::is_whitespace))
        {
            return Err(WarehouseError::InvalidTable(raw.to_string()));
        }
        Ok(Self {
            project: parts[0].to_string(),
            dataset: parts[1].to_string(),
            table: parts[2].to_string(),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// New reference with `suffix` appended to the table name. Used for
    /// per-layer destinations and staging tables.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            project: self.project.clone(),
            dataset: self.dataset.clone(),
            table: format!("{}_{}", self.table, suffix),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// Build the statement that exports a whole table as headered CSV shards
/// under `uri` (the trailing `*` lets the warehouse shard freely).
pub fn export_statement(table: &TableRef, uri_prefix: &str, overwrite: bool) -> String {
    format!(
        "EXPORT DATA\n  OPTIONS (\n    uri = '{uri_prefix}*.csv',\n    format = 'CSV',\n    overwrite = {overwrite},\n    header = true\n  ) AS\nSELECT * FROM `{table}`"
    )
}

#[async_trait]
pub trait WarehouseJobs: Send + Sync {
    async fn start_query(&self, sql: &str) -> Result<JobId, WarehouseError>;
    async fn start_load(
        &self,
        table: &TableRef,
        rows: &[Value],
        disposition: WriteDisposition,
    ) -> Result<JobId, WarehouseError>;
    async fn job_status(&self, job: &JobId) -> Result<JobStatus, WarehouseError>;
}

#[derive(Serialize)]
struct QueryJobRequest<'a> {
    query: &'a str,
}

#[derive(Serialize)]
struct LoadJobRequest<'a> {
    rows: &'a [Value],
    write_disposition: &'static str,
}

#[derive(Deserialize)]
struct JobSubmitted {
    job_id: String,
}

#[derive(Deserialize)]
struct JobStatusWire {
    state: String,
    #[serde(default)]
    error_result: Option<JobErrorWire>,
}

#[derive(Deserialize)]
struct JobErrorWire {
    message: String,
}

#[derive(Clone)]
pub struct HttpWarehouseClient {
    http: reqwest::Client,
    config: WarehouseConfig,
}

impl HttpWarehouseClient {
    pub fn new(config: WarehouseConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn jobs_url(&self) -> String {
        format!(
            "{}/projects/{}/jobs",
            self.config.endpoint.trim_end_matches('/'),
            self.config.project
        )
    }

    fn job_url(&self, job: &JobId) -> String {
        format!("{}/{}", self.jobs_url(), job)
    }

    fn load_url(&self, table: &TableRef) -> String {
        format!(
            "{}/projects/{}/datasets/{}/tables/{}/load",
            self.config.endpoint.trim_end_matches('/'),
            table.project(),
            table.dataset(),
            table.table()
        )
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.timeout(self.config.request_timeout);
        match &self.config.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, WarehouseError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(WarehouseError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl WarehouseJobs for HttpWarehouseClient {
    async fn start_query(&self, sql: &str) -> Result<JobId, WarehouseError> {
        let request = self
            .apply_auth(self.http.post(self.jobs_url()))
            .json(&QueryJobRequest { query: sql });
        let response = Self::check_status(request.send().await?).await?;
        let submitted: JobSubmitted = response
            .json()
            .await
            .map_err(|err| WarehouseError::Decode(err.to_string()))?;
        Ok(JobId(submitted.job_id))
    }

    async fn start_load(
        &self,
        table: &TableRef,
        rows: &[Value],
        disposition: WriteDisposition,
    ) -> Result<JobId, WarehouseError> {
        let request = self
            .apply_auth(self.http.post(self.load_url(table)))
            .json(&LoadJobRequest {
                rows,
                write_disposition: disposition.as_str(),
            });
        let response = Self::check_status(request.send().await?).await?;
        let submitted: JobSubmitted = response
            .json()
            .await
            .map_err(|err| WarehouseError::Decode(err.to_string()))?;
        Ok(JobId(submitted.job_id))
    }

    async fn job_status(&self, job: &JobId) -> Result<JobStatus, WarehouseError> {
        let request = self.apply_auth(self.http.get(self.job_url(job)));
        let response = Self::check_status(request.send().await?).await?;
        let wire: JobStatusWire = response
            .json()
            .await
            .map_err(|err| WarehouseError::Decode(err.to_string()))?;
        Ok(JobStatus {
            state: JobState::from_wire(&wire.state),
            error: wire.error_result.map(|err| err.message),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ref_parses_three_part_names() {
        let table = TableRef::parse("analytics.land_cover.plots").unwrap();
        assert_eq!(table.project(), "analytics");
        assert_eq!(table.dataset(), "land_cover");
        assert_eq!(table.table(), "plots");
        assert_eq!(table.to_string(), "analytics.land_cover.plots");
    }

    #[test]
    fn table_ref_rejects_malformed_names() {
        for raw in [
            "plots",
            "dataset.plots",
            "a.b.c.d",
            "a..c",
            ".b.c",
            "a.b.",
            "a.b.c d",
        ] {
            let err = TableRef::parse(raw).unwrap_err();
            assert!(matches!(err, WarehouseError::InvalidTable(_)), "{raw}");
        }
    }

    #[test]
    fn with_suffix_extends_only_the_table_name() {
        let table = TableRef::parse("p.d.t").unwrap();
        assert_eq!(table.with_suffix("roads").to_string(), "p.d.t_roads");
        assert_eq!(table.with_suffix("temp").to_string(), "p.d.t_temp");
    }

    #[test]
    fn export_statement_renders_uri_format_and_flags() {
        let table = TableRef::parse("p.d.plots").unwrap();
        let sql = export_statement(&table, "s3://staging/exports/abc/", true);
        assert!(sql.contains("uri = 's3://staging/exports/abc/*.csv'"));
        assert!(sql.contains("format = 'CSV'"));
        assert!(sql.contains("overwrite = true"));
        assert!(sql.contains("header = true"));
        assert!(sql.ends_with("SELECT * FROM `p.d.plots`"));

        let sql = export_statement(&table, "s3://staging/exports/abc/", false);
        assert!(sql.contains("overwrite = false"));
    }

    #[test]
    fn job_state_round_trips_known_states_and_keeps_unknown() {
        assert_eq!(JobState::from_wire("PENDING"), JobState::Pending);
        assert_eq!(JobState::from_wire("RUNNING"), JobState::Running);
        assert_eq!(JobState::from_wire("DONE"), JobState::Done);
        assert_eq!(
            JobState::from_wire("SUSPENDED"),
            JobState::Other("SUSPENDED".to_string())
        );
        assert_eq!(JobState::Other("SUSPENDED".into()).as_str(), "SUSPENDED");
    }

    #[test]
    fn write_disposition_maps_to_wire_names() {
        assert_eq!(WriteDisposition::Truncate.as_str(), "WRITE_TRUNCATE");
        assert_eq!(WriteDisposition::Append.as_str(), "WRITE_APPEND");
    }
}
