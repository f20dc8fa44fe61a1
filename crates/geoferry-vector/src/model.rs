use geojson::{GeoJson, Value as GeoJsonValue};
use serde_json::Map;

use crate::errors::VectorError;

/// A 2-D position. Z and M ordinates are dropped at parse time.
pub type Position = [f64; 2];

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Convert from a GeoJSON geometry value, truncating every position to
    /// two ordinates.
    pub fn from_geojson(value: &GeoJsonValue) -> Result<Self, VectorError> {
        fn position(raw: &[f64]) -> Result<Position, VectorError> {
            if raw.len() < 2 {
                return Err(VectorError::InvalidGeometry(format!(
                    "position has {} ordinates, need at least 2",
                    raw.len()
                )));
            }
            Ok([raw[0], raw[1]])
        }

        fn line(raw: &[Vec<f64>]) -> Result<Vec<Position>, VectorError> {
            raw.iter().map(|p| position(p)).collect()
        }

        fn rings(raw: &[Vec<Vec<f64>>]) -> Result<Vec<Vec<Position>>, VectorError> {
            raw.iter().map(|ring| line(ring)).collect()
        }

        match value {
            GeoJsonValue::Point(p) => Ok(Geometry::Point(position(p)?)),
            GeoJsonValue::MultiPoint(points) => Ok(Geometry::MultiPoint(line(points)?)),
            GeoJsonValue::LineString(points) => Ok(Geometry::LineString(line(points)?)),
            GeoJsonValue::MultiLineString(lines) => Ok(Geometry::MultiLineString(rings(lines)?)),
            GeoJsonValue::Polygon(polygon) => Ok(Geometry::Polygon(rings(polygon)?)),
            GeoJsonValue::MultiPolygon(polygons) => Ok(Geometry::MultiPolygon(
                polygons.iter().map(|p| rings(p)).collect::<Result<_, _>>()?,
            )),
            GeoJsonValue::GeometryCollection(_) => Err(VectorError::InvalidGeometry(
                "GeometryCollection is not supported".to_string(),
            )),
        }
    }

    pub fn to_geojson(&self) -> geojson::Geometry {
        fn line(points: &[Position]) -> Vec<Vec<f64>> {
            points.iter().map(|p| vec![p[0], p[1]]).collect()
        }

        fn rings(rings: &[Vec<Position>]) -> Vec<Vec<Vec<f64>>> {
            rings.iter().map(|ring| line(ring)).collect()
        }

        let value = match self {
            Geometry::Point(p) => GeoJsonValue::Point(vec![p[0], p[1]]),
            Geometry::MultiPoint(points) => GeoJsonValue::MultiPoint(line(points)),
            Geometry::LineString(points) => GeoJsonValue::LineString(line(points)),
            Geometry::MultiLineString(lines) => GeoJsonValue::MultiLineString(rings(lines)),
            Geometry::Polygon(polygon) => GeoJsonValue::Polygon(rings(polygon)),
            Geometry::MultiPolygon(polygons) => {
                GeoJsonValue::MultiPolygon(polygons.iter().map(|p| rings(p)).collect())
            }
        };
        geojson::Geometry::new(value)
    }

    /// Canonical GeoJSON text for loading into a warehouse column.
    pub fn to_geojson_string(&self) -> String {
        GeoJson::Geometry(self.to_geojson()).to_string()
    }
}

/// Coordinate reference systems the import path understands. Anything else
/// declared by a source file is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Crs {
    #[default]
    Wgs84,
    WebMercator,
}

impl Crs {
    pub fn parse(declared: &str) -> Result<Self, VectorError> {
        let normalized = declared.trim().to_ascii_uppercase();
        let code = normalized
            .rsplit([':', ';'])
            .next()
            .unwrap_or(normalized.as_str());
        match code {
            "4326" | "CRS84" | "WGS84" => Ok(Crs::Wgs84),
            "3857" | "900913" => Ok(Crs::WebMercator),
            _ => Err(VectorError::UnsupportedCrs(declared.to_string())),
        }
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Feature {
    /// GeoJSON allows null geometry; such features still carry properties.
    pub geometry: Option<Geometry>,
    pub properties: Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub crs: Crs,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone)]
pub struct VectorDataset {
    pub layers: Vec<Layer>,
}

impl VectorDataset {
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.name.as_str()).collect()
    }

    pub fn find_layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.name == name)
    }
}
