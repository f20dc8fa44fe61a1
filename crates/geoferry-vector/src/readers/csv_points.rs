use serde_json::{Map, Value};

use crate::errors::VectorError;
use crate::model::{Crs, Feature, Geometry, Layer};

use super::VectorReader;

/// Reads point data from CSV with longitude/latitude columns. Header match
/// is case-insensitive over the usual aliases.
pub struct CsvPointsReader;

const READER: &str = "csv_points";

const LON_ALIASES: [&str; 3] = ["lon", "lng", "longitude"];
const LAT_ALIASES: [&str; 2] = ["lat", "latitude"];

impl VectorReader for CsvPointsReader {
    fn name(&self) -> &'static str {
        READER
    }

    fn read(&self, layer_name: &str, content: &str) -> Result<Layer, VectorError> {
        let mut reader = csv::Reader::from_reader(content.as_bytes());
        let headers = reader
            .headers()
            .map_err(|err| VectorError::FormatMismatch {
                reader: READER,
                reason: format!("could not read CSV headers: {err}"),
            })?
            .clone();

        let lon_index = find_column(&headers, &LON_ALIASES);
        let lat_index = find_column(&headers, &LAT_ALIASES);
        let (lon_index, lat_index) = match (lon_index, lat_index) {
            (Some(lon), Some(lat)) => (lon, lat),
            _ => {
                return Err(VectorError::FormatMismatch {
                    reader: READER,
                    reason: "no longitude/latitude columns in header".to_string(),
                });
            }
        };

        let mut features = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|source| VectorError::Csv {
                reader: READER,
                source,
            })?;

            let lon = parse_ordinate(&record, lon_index, index)?;
            let lat = parse_ordinate(&record, lat_index, index)?;

            let mut properties = Map::new();
            for (column, value) in headers.iter().zip(record.iter()) {
                if column == &headers[lon_index] || column == &headers[lat_index] {
                    continue;
                }
                properties.insert(column.to_string(), parse_value(value));
            }

            features.push(Feature {
                geometry: Some(Geometry::Point([lon, lat])),
                properties,
            });
        }

        Ok(Layer {
            name: layer_name.to_string(),
            crs: Crs::Wgs84,
            features,
        })
    }
}

fn find_column(headers: &csv::StringRecord, aliases: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|header| aliases.contains(&header.trim().to_ascii_lowercase().as_str()))
}

fn parse_ordinate(
    record: &csv::StringRecord,
    index: usize,
    row_index: usize,
) -> Result<f64, VectorError> {
    let raw = record.get(index).unwrap_or_default();
    raw.trim().parse().map_err(|_| VectorError::DataRow {
        reader: READER,
        row_index: row_index + 1,
        message: format!("'{raw}' is not a coordinate"),
    })
}

/// Columns keep their most specific JSON type: integer, then float, then text.
fn parse_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        if float.is_finite() {
            return Value::from(float);
        }
    }
    Value::from(trimmed)
}
