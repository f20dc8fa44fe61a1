use std::collections::VecDeque;
use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use geoferry_core::error::PipelineError;
use geoferry_core::import::run_import;
use geoferry_core::jobs::{ImportJob, PollSettings};
use geoferry_warehouse::{
    JobId, JobState, JobStatus, TableRef, WarehouseError, WarehouseJobs, WriteDisposition,
};

const POINTS: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [12.5, 41.9]}, "properties": {"name": "roma"}},
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [2.35, 48.86]}, "properties": {"name": "paris"}}
    ]
}"#;

const EMPTY: &str = r#"{"type": "FeatureCollection", "features": []}"#;

#[derive(Default)]
struct MockWarehouse {
    loads: Mutex<Vec<(String, Vec<Value>, &'static str)>>,
    queries: Mutex<Vec<String>>,
    statuses: Mutex<VecDeque<JobStatus>>,
}

#[async_trait]
impl WarehouseJobs for MockWarehouse {
    async fn start_query(&self, sql: &str) -> Result<JobId, WarehouseError> {
        self.queries.lock().unwrap().push(sql.to_string());
        Ok(JobId(format!(
            "query-{}",
            self.queries.lock().unwrap().len()
        )))
    }

    async fn start_load(
        &self,
        table: &TableRef,
        rows: &[Value],
        disposition: WriteDisposition,
    ) -> Result<JobId, WarehouseError> {
        let mut loads = self.loads.lock().unwrap();
        loads.push((table.to_string(), rows.to_vec(), disposition.as_str()));
        Ok(JobId(format!("load-{}", loads.len())))
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

fn job_for(source: &str) -> ImportJob {
    ImportJob {
        source: source.to_string(),
        destination_table: "demo.land.imported".to_string(),
        ensure_spherical: false,
        layer: None,
        append: false,
        load: PollSettings::new(300, 2),
    }
}

fn write_fixture(suffix: &str, content: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

fn build_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut buffer);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buffer.into_inner()
}

#[tokio::test]
async fn single_layer_loads_into_the_destination_table() {
    let fixture = write_fixture(".geojson", POINTS.as_bytes());
    let warehouse = MockWarehouse::default();

    let receipt = run_import(&warehouse, &job_for(fixture.path().to_str().unwrap()))
        .await
        .unwrap();

    let loads = warehouse.loads.lock().unwrap();
    assert_eq!(loads.len(), 1);
    let (table, rows, disposition) = &loads[0];
    assert_eq!(table, "demo.land.imported");
    assert_eq!(*disposition, "WRITE_TRUNCATE");
    assert_eq!(rows.len(), 2);

    let first = rows[0].as_object().unwrap();
    assert_eq!(first.get("name"), Some(&Value::from("roma")));
    assert!(first
        .get("geom")
        .and_then(Value::as_str)
        .unwrap()
        .contains("\"Point\""));

    assert_eq!(receipt.tables.len(), 1);
    assert_eq!(receipt.tables[0].feature_count, 2);
    assert_eq!(receipt.tables[0].destination_table, "demo.land.imported");
}

#[tokio::test]
async fn multi_layer_archives_create_one_table_per_layer() {
    let bytes = build_archive(&[("roads.geojson", POINTS), ("stops.csv", "lon,lat,id\n1,2,7\n")]);
    let fixture = write_fixture(".zip", &bytes);
    let warehouse = MockWarehouse::default();

    let receipt = run_import(&warehouse, &job_for(fixture.path().to_str().unwrap()))
        .await
        .unwrap();

    let loads = warehouse.loads.lock().unwrap();
    let tables: Vec<&str> = loads.iter().map(|(table, _, _)| table.as_str()).collect();
    assert_eq!(tables, vec!["demo.land.imported_roads", "demo.land.imported_stops"]);

    assert_eq!(receipt.tables.len(), 2);
    assert_eq!(receipt.tables[0].layer, "roads");
    assert_eq!(receipt.tables[1].layer, "stops");
    assert_eq!(receipt.tables[1].feature_count, 1);
}

#[tokio::test]
async fn explicit_layer_selection_targets_the_destination_directly() {
    let bytes = build_archive(&[("roads.geojson", POINTS), ("stops.csv", "lon,lat\n1,2\n")]);
    let fixture = write_fixture(".zip", &bytes);
    let warehouse = MockWarehouse::default();

    let mut job = job_for(fixture.path().to_str().unwrap());
    job.layer = Some("stops".to_string());

    let receipt = run_import(&warehouse, &job).await.unwrap();

    let loads = warehouse.loads.lock().unwrap();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].0, "demo.land.imported");
    assert_eq!(receipt.tables[0].layer, "stops");
}

#[tokio::test]
async fn missing_layer_selection_lists_what_is_available() {
    let bytes = build_archive(&[("roads.geojson", POINTS), ("stops.csv", "lon,lat\n1,2\n")]);
    let fixture = write_fixture(".zip", &bytes);
    let warehouse = MockWarehouse::default();

    let mut job = job_for(fixture.path().to_str().unwrap());
    job.layer = Some("rivers".to_string());

    let err = run_import(&warehouse, &job).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Validation(message)
            if message.contains("rivers") && message.contains("roads") && message.contains("stops")
    ));
    assert!(warehouse.loads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn spherical_mode_stages_wkb_and_rewrites_server_side() {
    let fixture = write_fixture(".geojson", POINTS.as_bytes());
    let warehouse = MockWarehouse::default();

    let mut job = job_for(fixture.path().to_str().unwrap());
    job.ensure_spherical = true;

    let receipt = run_import(&warehouse, &job).await.unwrap();

    let loads = warehouse.loads.lock().unwrap();
    assert_eq!(loads.len(), 1);
    let (table, rows, disposition) = &loads[0];
    assert_eq!(table, "demo.land.imported_temp");
    assert_eq!(*disposition, "WRITE_TRUNCATE");
    let staged = rows[0].as_object().unwrap();
    let hex = staged.get("geom_wkb").and_then(Value::as_str).unwrap();
    assert!(hex.starts_with("0101000000"));
    assert!(!staged.contains_key("geom"));

    let queries = warehouse.queries.lock().unwrap();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("CREATE OR REPLACE TABLE `demo.land.imported`"));
    assert!(queries[0].contains("ST_GEOGFROMWKB(FROM_HEX(geom_wkb)"));
    assert!(queries[0].contains("DROP TABLE `demo.land.imported_temp`"));

    assert_eq!(receipt.tables[0].feature_count, 2);
}

#[tokio::test]
async fn empty_layers_are_recorded_without_a_load_job() {
    let fixture = write_fixture(".geojson", EMPTY.as_bytes());
    let warehouse = MockWarehouse::default();

    let receipt = run_import(&warehouse, &job_for(fixture.path().to_str().unwrap()))
        .await
        .unwrap();

    assert!(warehouse.loads.lock().unwrap().is_empty());
    assert_eq!(receipt.tables.len(), 1);
    assert_eq!(receipt.tables[0].feature_count, 0);
}

#[tokio::test]
async fn append_is_rejected_in_spherical_mode() {
    let fixture = write_fixture(".geojson", POINTS.as_bytes());
    let warehouse = MockWarehouse::default();

    let mut job = job_for(fixture.path().to_str().unwrap());
    job.ensure_spherical = true;
    job.append = true;

    let err = run_import(&warehouse, &job).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
    assert!(warehouse.loads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn append_flag_switches_the_load_disposition() {
    let fixture = write_fixture(".geojson", POINTS.as_bytes());
    let warehouse = MockWarehouse::default();

    let mut job = job_for(fixture.path().to_str().unwrap());
    job.append = true;

    run_import(&warehouse, &job).await.unwrap();

    let loads = warehouse.loads.lock().unwrap();
    assert_eq!(loads[0].2, "WRITE_APPEND");
}
