//! Geometry cleanup applied to every layer before it is loaded: reprojection
//! into EPSG:4326, ring repair, and coordinate bounds checks.

use std::f64::consts::FRAC_PI_2;

use crate::errors::VectorError;
use crate::model::{Crs, Geometry, Layer, Position};

const EARTH_RADIUS_M: f64 = 6_378_137.0;
const BOUNDS_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub reprojected: bool,
    pub closed_rings: usize,
    pub dropped_parts: usize,
    pub dropped_geometries: usize,
}

/// Normalize a layer in place. On success the layer is WGS84 with every
/// ring closed and every position inside lon/lat bounds.
pub fn normalize_layer(layer: &mut Layer) -> Result<NormalizeReport, VectorError> {
    let mut report = NormalizeReport::default();

    if layer.crs == Crs::WebMercator {
        report.reprojected = true;
    }

    for feature in &mut layer.features {
        let Some(geometry) = feature.geometry.take() else {
            continue;
        };

        let geometry = if layer.crs == Crs::WebMercator {
            map_positions(geometry, mercator_to_wgs84)
        } else {
            geometry
        };

        match repair(geometry, &mut report) {
            Some(repaired) => {
                check_bounds(&repaired)?;
                feature.geometry = Some(repaired);
            }
            None => report.dropped_geometries += 1,
        }
    }

    layer.crs = Crs::Wgs84;
    Ok(report)
}

/// Closed-form spherical inverse of the Web-Mercator projection.
pub fn mercator_to_wgs84(position: Position) -> Position {
    let lon = (position[0] / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (position[1] / EARTH_RADIUS_M).exp().atan() - FRAC_PI_2).to_degrees();
    [lon, lat]
}

fn map_positions(geometry: Geometry, f: impl Fn(Position) -> Position + Copy) -> Geometry {
    match geometry {
        Geometry::Point(p) => Geometry::Point(f(p)),
        Geometry::MultiPoint(points) => Geometry::MultiPoint(map_line(points, f)),
        Geometry::LineString(points) => Geometry::LineString(map_line(points, f)),
        Geometry::MultiLineString(lines) => Geometry::MultiLineString(map_lines(lines, f)),
        Geometry::Polygon(rings) => Geometry::Polygon(map_lines(rings, f)),
        Geometry::MultiPolygon(polygons) => Geometry::MultiPolygon(
            polygons
                .into_iter()
                .map(|rings| map_lines(rings, f))
                .collect(),
        ),
    }
}

fn map_line(line: Vec<Position>, f: impl Fn(Position) -> Position + Copy) -> Vec<Position> {
    line.into_iter().map(f).collect()
}

fn map_lines(
    lines: Vec<Vec<Position>>,
    f: impl Fn(Position) -> Position + Copy,
) -> Vec<Vec<Position>> {
    lines.into_iter().map(|line| map_line(line, f)).collect()
}

/// Drop consecutive duplicate positions, close open rings, and throw away
/// degenerate parts. Returns `None` when nothing usable remains.
fn repair(geometry: Geometry, report: &mut NormalizeReport) -> Option<Geometry> {
    match geometry {
        Geometry::Point(p) => Some(Geometry::Point(p)),
        Geometry::MultiPoint(points) => {
            if points.is_empty() {
                None
            } else {
                Some(Geometry::MultiPoint(points))
            }
        }
        Geometry::LineString(points) => {
            repair_line(points, report).map(Geometry::LineString)
        }
        Geometry::MultiLineString(lines) => {
            let repaired: Vec<_> = lines
                .into_iter()
                .filter_map(|line| repair_line(line, report))
                .collect();
            if repaired.is_empty() {
                None
            } else {
                Some(Geometry::MultiLineString(repaired))
            }
        }
        Geometry::Polygon(rings) => repair_polygon(rings, report).map(Geometry::Polygon),
        Geometry::MultiPolygon(polygons) => {
            let repaired: Vec<_> = polygons
                .into_iter()
                .filter_map(|rings| repair_polygon(rings, report))
                .collect();
            if repaired.is_empty() {
                None
            } else {
                Some(Geometry::MultiPolygon(repaired))
            }
        }
    }
}

fn dedup_consecutive(points: Vec<Position>) -> Vec<Position> {
    let mut out: Vec<Position> = Vec::with_capacity(points.len());
    for point in points {
        if out.last() != Some(&point) {
            out.push(point);
        }
    }
    out
}

fn repair_line(points: Vec<Position>, report: &mut NormalizeReport) -> Option<Vec<Position>> {
    let deduped = dedup_consecutive(points);
    if deduped.len() < 2 {
        report.dropped_parts += 1;
        return None;
    }
    Some(deduped)
}

fn repair_ring(points: Vec<Position>, report: &mut NormalizeReport) -> Option<Vec<Position>> {
    let mut ring = dedup_consecutive(points);
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
        if first != last {
            ring.push(first);
            report.closed_rings += 1;
        }
    }
    if ring.len() < 4 {
        report.dropped_parts += 1;
        return None;
    }
    Some(ring)
}

fn repair_polygon(
    rings: Vec<Vec<Position>>,
    report: &mut NormalizeReport,
) -> Option<Vec<Vec<Position>>> {
    let mut iter = rings.into_iter();
    let exterior = repair_ring(iter.next()?, report)?;

    let mut repaired = vec![exterior];
    repaired.extend(iter.filter_map(|ring| repair_ring(ring, report)));
    Some(repaired)
}

fn check_bounds(geometry: &Geometry) -> Result<(), VectorError> {
    each_position(geometry, &mut |position| {
        let [lon, lat] = *position;
        if lon.abs() > 180.0 + BOUNDS_EPSILON || lat.abs() > 90.0 + BOUNDS_EPSILON {
            return Err(VectorError::OutOfBounds { lon, lat });
        }
        Ok(())
    })
}

fn each_position(
    geometry: &Geometry,
    f: &mut impl FnMut(&Position) -> Result<(), VectorError>,
) -> Result<(), VectorError> {
    match geometry {
        Geometry::Point(p) => f(p),
        Geometry::MultiPoint(points) | Geometry::LineString(points) => {
            points.iter().try_for_each(f)
        }
        Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
            lines.iter().flatten().try_for_each(f)
        }
        Geometry::MultiPolygon(polygons) => {
            polygons.iter().flatten().flatten().try_for_each(f)
        }
    }
}
