use geojson::GeoJson;
use serde_json::Map;

use crate::errors::VectorError;
use crate::model::{Crs, Feature, Geometry, Layer};

use super::geojson::convert_feature;
use super::VectorReader;

/// Reads newline-delimited GeoJSON: one Feature or Geometry per line.
pub struct GeoJsonSeqReader;

const READER: &str = "geojson_seq";

impl VectorReader for GeoJsonSeqReader {
    fn name(&self) -> &'static str {
        READER
    }

    fn read(&self, layer_name: &str, content: &str) -> Result<Layer, VectorError> {
        let mut features = Vec::new();
        let mut saw_line = false;

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let parsed: GeoJson = match line.parse() {
                Ok(parsed) => parsed,
                // The first line decides whether this is a sequence at all;
                // later failures mean a corrupt sequence.
                Err(err) if !saw_line => {
                    return Err(VectorError::FormatMismatch {
                        reader: READER,
                        reason: format!("first line is not GeoJSON: {err}"),
                    });
                }
                Err(err) => {
                    return Err(VectorError::DataRow {
                        reader: READER,
                        row_index: index + 1,
                        message: err.to_string(),
                    });
                }
            };
            saw_line = true;

            match parsed {
                GeoJson::Feature(feature) => features.push(convert_feature(feature)?),
                GeoJson::Geometry(geometry) => features.push(Feature {
                    geometry: Some(Geometry::from_geojson(&geometry.value)?),
                    properties: Map::new(),
                }),
                GeoJson::FeatureCollection(_) => {
                    return Err(VectorError::FormatMismatch {
                        reader: READER,
                        reason: "line payloads must be features, not collections".to_string(),
                    });
                }
            }
        }

        if features.is_empty() {
            return Err(VectorError::FormatMismatch {
                reader: READER,
                reason: "payload contained no feature lines".to_string(),
            });
        }

        Ok(Layer {
            name: layer_name.to_string(),
            crs: Crs::Wgs84,
            features,
        })
    }
}
