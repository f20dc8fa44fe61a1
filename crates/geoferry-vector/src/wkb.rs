//! Little-endian ISO well-known-binary encoding, used to stage geometry for
//! the warehouse's spherical rewrite path.

use std::fmt::Write as _;

use crate::model::{Geometry, Position};

const LITTLE_ENDIAN: u8 = 0x01;

const TYPE_POINT: u32 = 1;
const TYPE_LINESTRING: u32 = 2;
const TYPE_POLYGON: u32 = 3;
const TYPE_MULTIPOINT: u32 = 4;
const TYPE_MULTILINESTRING: u32 = 5;
const TYPE_MULTIPOLYGON: u32 = 6;

pub fn encode(geometry: &Geometry) -> Vec<u8> {
    let mut buf = Vec::new();
    write_geometry(&mut buf, geometry);
    buf
}

/// Lowercase hex rendering, suitable for `FROM_HEX` in a SQL rewrite.
pub fn encode_hex(geometry: &Geometry) -> String {
    let bytes = encode(geometry);
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(hex, "{byte:02x}").expect("writing to a String cannot fail");
    }
    hex
}

fn write_geometry(buf: &mut Vec<u8>, geometry: &Geometry) {
    match geometry {
        Geometry::Point(p) => {
            write_header(buf, TYPE_POINT);
            write_position(buf, p);
        }
        Geometry::LineString(points) => {
            write_header(buf, TYPE_LINESTRING);
            write_line(buf, points);
        }
        Geometry::Polygon(rings) => {
            write_header(buf, TYPE_POLYGON);
            write_u32(buf, rings.len() as u32);
            for ring in rings {
                write_line(buf, ring);
            }
        }
        Geometry::MultiPoint(points) => {
            write_header(buf, TYPE_MULTIPOINT);
            write_u32(buf, points.len() as u32);
            for point in points {
                write_header(buf, TYPE_POINT);
                write_position(buf, point);
            }
        }
        Geometry::MultiLineString(lines) => {
            write_header(buf, TYPE_MULTILINESTRING);
            write_u32(buf, lines.len() as u32);
            for line in lines {
                write_header(buf, TYPE_LINESTRING);
                write_line(buf, line);
            }
        }
        Geometry::MultiPolygon(polygons) => {
            write_header(buf, TYPE_MULTIPOLYGON);
            write_u32(buf, polygons.len() as u32);
            for rings in polygons {
                write_header(buf, TYPE_POLYGON);
                write_u32(buf, rings.len() as u32);
                for ring in rings {
                    write_line(buf, ring);
                }
            }
        }
    }
}

fn write_header(buf: &mut Vec<u8>, type_code: u32) {
    buf.push(LITTLE_ENDIAN);
    write_u32(buf, type_code);
}

fn write_line(buf: &mut Vec<u8>, points: &[Position]) {
    write_u32(buf, points.len() as u32);
    for point in points {
        write_position(buf, point);
    }
}

fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn write_position(buf: &mut Vec<u8>, position: &Position) {
    buf.extend_from_slice(&position[0].to_le_bytes());
    buf.extend_from_slice(&position[1].to_le_bytes());
}
