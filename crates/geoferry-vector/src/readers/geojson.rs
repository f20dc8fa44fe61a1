use geojson::GeoJson;
use serde_json::Map;

use crate::errors::VectorError;
use crate::model::{Crs, Feature, Geometry, Layer};

use super::VectorReader;

/// Reads a whole-document GeoJSON payload: a FeatureCollection, a single
/// Feature, or a bare Geometry.
pub struct GeoJsonReader;

const READER: &str = "geojson";

impl VectorReader for GeoJsonReader {
    fn name(&self) -> &'static str {
        READER
    }

    fn read(&self, layer_name: &str, content: &str) -> Result<Layer, VectorError> {
        let trimmed = content.trim_start();
        if !trimmed.starts_with('{') {
            return Err(VectorError::FormatMismatch {
                reader: READER,
                reason: "payload does not start with a JSON object".to_string(),
            });
        }

        let geojson: GeoJson = content.parse().map_err(|err| VectorError::FormatMismatch {
            reader: READER,
            reason: format!("not valid GeoJSON: {err}"),
        })?;

        let (crs, features) = match geojson {
            GeoJson::FeatureCollection(collection) => {
                let crs = declared_crs(collection.foreign_members.as_ref())?;
                let features = collection
                    .features
                    .into_iter()
                    .map(convert_feature)
                    .collect::<Result<Vec<_>, _>>()?;
                (crs, features)
            }
            GeoJson::Feature(feature) => {
                let crs = declared_crs(feature.foreign_members.as_ref())?;
                (crs, vec![convert_feature(feature)?])
            }
            GeoJson::Geometry(geometry) => {
                let crs = declared_crs(geometry.foreign_members.as_ref())?;
                let converted = Geometry::from_geojson(&geometry.value)?;
                (
                    crs,
                    vec![Feature {
                        geometry: Some(converted),
                        properties: Map::new(),
                    }],
                )
            }
        };

        Ok(Layer {
            name: layer_name.to_string(),
            crs,
            features,
        })
    }
}

pub(super) fn convert_feature(feature: geojson::Feature) -> Result<Feature, VectorError> {
    let geometry = feature
        .geometry
        .as_ref()
        .map(|geometry| Geometry::from_geojson(&geometry.value))
        .transpose()?;
    Ok(Feature {
        geometry,
        properties: feature.properties.unwrap_or_default(),
    })
}

/// Legacy `crs` member: `{"type": "name", "properties": {"name": "..."}}`.
/// Absent means WGS84 per the GeoJSON spec; a declared but unsupported CRS
/// is a hard error, not a format mismatch.
fn declared_crs(
    foreign_members: Option<&Map<String, serde_json::Value>>,
) -> Result<Crs, VectorError> {
    let Some(members) = foreign_members else {
        return Ok(Crs::Wgs84);
    };
    let Some(crs) = members.get("crs") else {
        return Ok(Crs::Wgs84);
    };
    let name = crs
        .get("properties")
        .and_then(|properties| properties.get("name"))
        .and_then(|name| name.as_str())
        .ok_or_else(|| VectorError::UnsupportedCrs(crs.to_string()))?;
    Crs::parse(name)
}
