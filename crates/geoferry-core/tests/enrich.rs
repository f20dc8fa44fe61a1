use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use geoferry_bucket::MemoryBucketStore;
use geoferry_core::enrich::{run_enrichment_with_suffix, STEP_EXPORT, STEP_TABLE_EXPORT};
use geoferry_core::error::PipelineError;
use geoferry_core::jobs::{EnrichmentJob, EnrichmentTimeouts};
use geoferry_raster::{
    CollectionHandle, OperationId, OperationStatus, RasterError, RasterService,
    ReduceRegionsRequest, Reducer, TaskId, TaskState, TaskStatus,
};
use geoferry_warehouse::{
    JobId, JobState, JobStatus, TableRef, WarehouseError, WarehouseJobs, WriteDisposition,
};

const SUFFIX: &str = "a1b2c3d4";

struct MockWarehouse {
    submitted: Mutex<Vec<String>>,
    statuses: Mutex<VecDeque<JobStatus>>,
}

impl MockWarehouse {
    fn with_statuses(statuses: Vec<JobStatus>) -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            statuses: Mutex::new(statuses.into()),
        }
    }

    fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl WarehouseJobs for MockWarehouse {
    async fn start_query(&self, sql: &str) -> Result<JobId, WarehouseError> {
        self.submitted.lock().unwrap().push(sql.to_string());
        Ok(JobId("job-1".to_string()))
    }

    async fn start_load(
        &self,
        _table: &TableRef,
        _rows: &[serde_json::Value],
        _disposition: WriteDisposition,
    ) -> Result<JobId, WarehouseError> {
        panic!("the enrichment pipeline never loads rows directly");
    }

    async fn job_status(&self, _job: &JobId) -> Result<JobStatus, WarehouseError> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(JobStatus {
                state: JobState::Done,
                error: None,
            }))
    }
}

#[derive(Default)]
struct MockRaster {
    ingests: Mutex<Vec<(String, Vec<String>, bool)>>,
    operation_statuses: Mutex<VecDeque<OperationStatus>>,
    reduces: Mutex<Vec<ReduceRegionsRequest>>,
    exports: Mutex<Vec<(String, String, &'static str)>>,
    task_statuses: Mutex<VecDeque<TaskStatus>>,
}

impl MockRaster {
    fn with_statuses(operations: Vec<OperationStatus>, tasks: Vec<TaskStatus>) -> Self {
        Self {
            operation_statuses: Mutex::new(operations.into()),
            task_statuses: Mutex::new(tasks.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl RasterService for MockRaster {
    async fn start_table_ingestion(
        &self,
        asset_id: &str,
        source_urls: &[String],
        allow_overwrite: bool,
    ) -> Result<OperationId, RasterError> {
        self.ingests.lock().unwrap().push((
            asset_id.to_string(),
            source_urls.to_vec(),
            allow_overwrite,
        ));
        Ok(OperationId("operations/op-1".to_string()))
    }

    async fn operation_status(
        &self,
        _operation: &OperationId,
    ) -> Result<OperationStatus, RasterError> {
        Ok(self
            .operation_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(OperationStatus {
                done: true,
                error: None,
            }))
    }

    async fn reduce_regions(
        &self,
        request: &ReduceRegionsRequest,
    ) -> Result<CollectionHandle, RasterError> {
        self.reduces.lock().unwrap().push(request.clone());
        Ok(CollectionHandle("collections/reduced-1".to_string()))
    }

    async fn start_table_export(
        &self,
        collection: &CollectionHandle,
        destination_table: &str,
        disposition: geoferry_raster::ExportDisposition,
    ) -> Result<TaskId, RasterError> {
        self.exports.lock().unwrap().push((
            collection.to_string(),
            destination_table.to_string(),
            disposition.as_str(),
        ));
        Ok(TaskId("task-1".to_string()))
    }

    async fn task_status(&self, _task: &TaskId) -> Result<TaskStatus, RasterError> {
        Ok(self
            .task_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TaskStatus {
                state: TaskState::Completed,
                error_message: None,
            }))
    }
}

fn job() -> EnrichmentJob {
    EnrichmentJob {
        source_table: "demo.land.plots".to_string(),
        destination_table: "demo.land.plots_enriched".to_string(),
        bucket: "staging".to_string(),
        asset_root: "projects/demo/assets/enrich".to_string(),
        image_expression: "image=collection('GlobalOilPalm/v1').mosaic()".to_string(),
        band: "classification".to_string(),
        reducer: "sum".to_string(),
        scale: 100,
        tile_scale: 2,
        overwrite: true,
        append: false,
        staging_prefix: "warehouse-exports".to_string(),
        timeouts: EnrichmentTimeouts::default(),
    }
}

fn staged_bucket() -> MemoryBucketStore {
    MemoryBucketStore::with_objects([
        (
            format!("warehouse-exports/{SUFFIX}/part-000.csv"),
            Bytes::from_static(b"id,geom\n"),
        ),
        (
            format!("warehouse-exports/{SUFFIX}/part-001.csv"),
            Bytes::from_static(b"id,geom\n"),
        ),
        (
            format!("warehouse-exports/{SUFFIX}/manifest.json"),
            Bytes::from_static(b"{}"),
        ),
    ])
}

#[tokio::test(start_paused = true)]
async fn happy_path_runs_every_step_in_order() {
    let warehouse = MockWarehouse::with_statuses(vec![
        JobStatus {
            state: JobState::Running,
            error: None,
        },
        JobStatus {
            state: JobState::Done,
            error: None,
        },
    ]);
    let bucket = staged_bucket();
    let raster = MockRaster::with_statuses(
        vec![
            OperationStatus {
                done: false,
                error: None,
            },
            OperationStatus {
                done: true,
                error: None,
            },
        ],
        vec![
            TaskStatus {
                state: TaskState::Running,
                error_message: None,
            },
            TaskStatus {
                state: TaskState::Completed,
                error_message: None,
            },
        ],
    );

    let receipt = run_enrichment_with_suffix(&warehouse, &bucket, &raster, &job(), SUFFIX)
        .await
        .unwrap();

    // The export statement targets the staged prefix for this run.
    let submitted = warehouse.submitted();
    assert_eq!(submitted.len(), 1);
    assert!(submitted[0].contains(&format!("s3://staging/warehouse-exports/{SUFFIX}/*.csv")));
    assert!(submitted[0].ends_with("SELECT * FROM `demo.land.plots`"));

    // Only the CSV shards reach the ingestion call.
    let ingests = raster.ingests.lock().unwrap().clone();
    assert_eq!(ingests.len(), 1);
    let (asset_id, urls, allow_overwrite) = &ingests[0];
    assert_eq!(asset_id, &format!("projects/demo/assets/enrich/{SUFFIX}"));
    assert!(*allow_overwrite);
    assert_eq!(
        urls,
        &vec![
            format!("s3://staging/warehouse-exports/{SUFFIX}/part-000.csv"),
            format!("s3://staging/warehouse-exports/{SUFFIX}/part-001.csv"),
        ]
    );

    let reduces = raster.reduces.lock().unwrap();
    assert_eq!(reduces.len(), 1);
    assert_eq!(reduces[0].reducer, Reducer::Sum);
    assert_eq!(reduces[0].band, "classification");
    assert_eq!(reduces[0].scale, 100);

    let exports = raster.exports.lock().unwrap();
    assert_eq!(
        exports[0],
        (
            "collections/reduced-1".to_string(),
            "demo.land.plots_enriched".to_string(),
            "overwrite"
        )
    );

    assert_eq!(receipt.staging_suffix, SUFFIX);
    assert_eq!(receipt.staged_shards, 2);
    assert_eq!(receipt.collection, "collections/reduced-1");
    assert_eq!(receipt.destination_table, "demo.land.plots_enriched");
    let steps: Vec<&str> = receipt.steps.iter().map(|outcome| outcome.step).collect();
    assert_eq!(
        steps,
        vec![
            "warehouse-export",
            "staging-listing",
            "table-ingestion",
            "reduce-regions",
            "table-export"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn export_job_failure_surfaces_as_a_remote_error() {
    let warehouse = MockWarehouse::with_statuses(vec![JobStatus {
        state: JobState::Done,
        error: Some("quota exceeded".to_string()),
    }]);
    let bucket = staged_bucket();
    let raster = MockRaster::default();

    let err = run_enrichment_with_suffix(&warehouse, &bucket, &raster, &job(), SUFFIX)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Remote {
            step: STEP_EXPORT,
            message,
        } if message == "quota exceeded"
    ));
    assert!(raster.ingests.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn empty_staging_listing_is_a_validation_error() {
    let warehouse = MockWarehouse::with_statuses(Vec::new());
    let bucket = MemoryBucketStore::new();
    let raster = MockRaster::default();

    let err = run_enrichment_with_suffix(&warehouse, &bucket, &raster, &job(), SUFFIX)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Validation(message)
            if message.contains(&format!("warehouse-exports/{SUFFIX}/"))
    ));
}

#[tokio::test(start_paused = true)]
async fn failed_export_task_reports_the_message_or_a_placeholder() {
    let warehouse = MockWarehouse::with_statuses(Vec::new());
    let bucket = staged_bucket();
    let raster = MockRaster::with_statuses(
        Vec::new(),
        vec![TaskStatus {
            state: TaskState::Failed,
            error_message: None,
        }],
    );

    let err = run_enrichment_with_suffix(&warehouse, &bucket, &raster, &job(), SUFFIX)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Remote {
            step: STEP_TABLE_EXPORT,
            message,
        } if message == "unknown error"
    ));
}

#[tokio::test(start_paused = true)]
async fn out_of_protocol_task_state_aborts_the_run() {
    let warehouse = MockWarehouse::with_statuses(Vec::new());
    let bucket = staged_bucket();
    let raster = MockRaster::with_statuses(
        Vec::new(),
        vec![TaskStatus {
            state: TaskState::Other("CANCEL_REQUESTED".to_string()),
            error_message: None,
        }],
    );

    let err = run_enrichment_with_suffix(&warehouse, &bucket, &raster, &job(), SUFFIX)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::UnexpectedState { state, .. } if state == "CANCEL_REQUESTED"
    ));
}

#[tokio::test]
async fn conflicting_dispositions_fail_before_any_remote_call() {
    let warehouse = MockWarehouse::with_statuses(Vec::new());
    let bucket = MemoryBucketStore::new();
    let raster = MockRaster::default();

    let mut conflicted = job();
    conflicted.append = true;

    let err = run_enrichment_with_suffix(&warehouse, &bucket, &raster, &conflicted, SUFFIX)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Validation(_)));
    assert!(warehouse.submitted().is_empty());
}

#[tokio::test]
async fn unknown_reducers_are_rejected_up_front() {
    let warehouse = MockWarehouse::with_statuses(Vec::new());
    let bucket = MemoryBucketStore::new();
    let raster = MockRaster::default();

    let mut bad = job();
    bad.reducer = "mode".to_string();

    let err = run_enrichment_with_suffix(&warehouse, &bucket, &raster, &bad, SUFFIX)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Raster(RasterError::UnknownReducer { .. })
    ));
    assert!(warehouse.submitted().is_empty());
}
