//! Client for the raster analysis service: table ingestion operations,
//! region reduction, and table export tasks.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod reducer;

pub use reducer::Reducer;

#[derive(Debug, Clone)]
pub struct RasterConfig {
    pub endpoint: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9090".to_string(),
            api_token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("request to raster service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("raster service returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("could not decode raster service response: {0}")]
    Decode(String),

    #[error("reducer '{name}' is not supported; choose one of: {supported}")]
    UnknownReducer { name: String, supported: String },

    #[error("invalid image expression: {0}")]
    InvalidExpression(String),
}

/// Server-side raster expression. The service contract requires the
/// expression to bind a variable named `image`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageExpression(String);

impl ImageExpression {
    pub fn parse(raw: &str) -> Result<Self, RasterError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RasterError::InvalidExpression(
                "expression is empty".to_string(),
            ));
        }
        if !trimmed.starts_with("image=") {
            return Err(RasterError::InvalidExpression(format!(
                "expression must assign to 'image', got '{trimmed}'"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationId(pub String);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct OperationStatus {
    pub done: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Other(String),
}

impl TaskState {
    pub fn from_wire(state: &str) -> Self {
        match state {
            "PENDING" => TaskState::Pending,
            "RUNNING" => TaskState::Running,
            "COMPLETED" => TaskState::Completed,
            "FAILED" => TaskState::Failed,
            other => TaskState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Running => "RUNNING",
            TaskState::Completed => "COMPLETED",
            TaskState::Failed => "FAILED",
            TaskState::Other(state) => state,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Running)
    }
}

#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub state: TaskState,
    pub error_message: Option<String>,
}

/// Handle to a server-side feature collection produced by an enrichment call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionHandle(pub String);

impl fmt::Display for CollectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportDisposition {
    Create,
    Overwrite,
    Append,
}

impl ExportDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportDisposition::Create => "create",
            ExportDisposition::Overwrite => "overwrite",
            ExportDisposition::Append => "append",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReduceRegionsRequest {
    pub asset_id: String,
    pub expression: ImageExpression,
    pub band: String,
    pub reducer: Reducer,
    pub scale: u32,
    pub tile_scale: u32,
}

#[async_trait]
pub trait RasterService: Send + Sync {
    /// Start ingesting CSV objects into a table asset. One source entry per
    /// URL, UTF-8 charset, request id derived from a fresh UUID.
    async fn start_table_ingestion(
        &self,
        asset_id: &str,
        source_urls: &[String],
        allow_overwrite: bool,
    ) -> Result<OperationId, RasterError>;

    async fn operation_status(&self, operation: &OperationId)
        -> Result<OperationStatus, RasterError>;

    /// Synchronous enrichment call; returns a handle to the reduced collection.
    async fn reduce_regions(
        &self,
        request: &ReduceRegionsRequest,
    ) -> Result<CollectionHandle, RasterError>;

    async fn start_table_export(
        &self,
        collection: &CollectionHandle,
        destination_table: &str,
        disposition: ExportDisposition,
    ) -> Result<TaskId, RasterError>;

    async fn task_status(&self, task: &TaskId) -> Result<TaskStatus, RasterError>;
}

#[derive(Serialize)]
struct IngestionSource<'a> {
    uris: [&'a str; 1],
    charset: &'static str,
}

#[derive(Serialize)]
struct IngestionRequest<'a> {
    name: &'a str,
    request_id: String,
    allow_overwrite: bool,
    sources: Vec<IngestionSource<'a>>,
}

#[derive(Deserialize)]
struct OperationSubmitted {
    operation_id: String,
}

#[derive(Deserialize)]
struct OperationStatusWire {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<RemoteErrorWire>,
}

#[derive(Deserialize)]
struct RemoteErrorWire {
    message: String,
}

#[derive(Serialize)]
struct ReduceRegionsWire<'a> {
    asset_id: &'a str,
    expression: &'a str,
    band: &'a str,
    reducer: &'static str,
    scale: u32,
    tile_scale: u32,
}

#[derive(Deserialize)]
struct CollectionCreated {
    collection_id: String,
}

#[derive(Serialize)]
struct ExportRequest<'a> {
    collection_id: &'a str,
    destination_table: &'a str,
    disposition: &'static str,
}

#[derive(Deserialize)]
struct TaskSubmitted {
    task_id: String,
}

#[derive(Deserialize)]
struct TaskStatusWire {
    state: String,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Clone)]
pub struct HttpRasterClient {
    http: reqwest::Client,
    config: RasterConfig,
}

impl HttpRasterClient {
    pub fn new(config: RasterConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.timeout(self.config.request_timeout);
        match &self.config.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RasterError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(RasterError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RasterService for HttpRasterClient {
    async fn start_table_ingestion(
        &self,
        asset_id: &str,
        source_urls: &[String],
        allow_overwrite: bool,
    ) -> Result<OperationId, RasterError> {
        let body = IngestionRequest {
            name: asset_id,
            request_id: format!("import-task-{}", Uuid::new_v4()),
            allow_overwrite,
            sources: source_urls
                .iter()
                .map(|url| IngestionSource {
                    uris: [url.as_str()],
                    charset: "UTF-8",
                })
                .collect(),
        };
        let request = self
            .apply_auth(self.http.post(self.url("tables:ingest")))
            .json(&body);
        let response = Self::check_status(request.send().await?).await?;
        let submitted: OperationSubmitted = response
            .json()
            .await
            .map_err(|err| RasterError::Decode(err.to_string()))?;
        Ok(OperationId(submitted.operation_id))
    }

    async fn operation_status(
        &self,
        operation: &OperationId,
    ) -> Result<OperationStatus, RasterError> {
        let url = self.url(&format!("operations/{operation}"));
        let request = self.apply_auth(self.http.get(url));
        let response = Self::check_status(request.send().await?).await?;
        let wire: OperationStatusWire = response
            .json()
            .await
            .map_err(|err| RasterError::Decode(err.to_string()))?;
        Ok(OperationStatus {
            done: wire.done,
            error: wire.error.map(|err| err.message),
        })
    }

    async fn reduce_regions(
        &self,
        request: &ReduceRegionsRequest,
    ) -> Result<CollectionHandle, RasterError> {
        let body = ReduceRegionsWire {
            asset_id: &request.asset_id,
            expression: request.expression.as_str(),
            band: &request.band,
            reducer: request.reducer.as_str(),
            scale: request.scale,
            tile_scale: request.tile_scale,
        };
        let request = self
            .apply_auth(self.http.post(self.url("collections:reduce")))
            .json(&body);
        let response = Self::check_status(request.send().await?).await?;
        let created: CollectionCreated = response
            .json()
            .await
            .map_err(|err| RasterError::Decode(err.to_string()))?;
        Ok(CollectionHandle(created.collection_id))
    }

    async fn start_table_export(
        &self,
        collection: &CollectionHandle,
        destination_table: &str,
        disposition: ExportDisposition,
    ) -> Result<TaskId, RasterError> {
        let body = ExportRequest {
            collection_id: &collection.0,
            destination_table,
            disposition: disposition.as_str(),
        };
        let request = self
            .apply_auth(self.http.post(self.url("tables:export")))
            .json(&body);
        let response = Self::check_status(request.send().await?).await?;
        let submitted: TaskSubmitted = response
            .json()
            .await
            .map_err(|err| RasterError::Decode(err.to_string()))?;
        Ok(TaskId(submitted.task_id))
    }

    async fn task_status(&self, task: &TaskId) -> Result<TaskStatus, RasterError> {
        let url = self.url(&format!("tasks/{task}"));
        let request = self.apply_auth(self.http.get(url));
        let response = Self::check_status(request.send().await?).await?;
        let wire: TaskStatusWire = response
            .json()
            .await
            .map_err(|err| RasterError::Decode(err.to_string()))?;
        Ok(TaskStatus {
            state: TaskState::from_wire(&wire.state),
            error_message: wire.error_message,
        })
    }
}
