use std::io::{Cursor, Read};

use once_cell::sync::Lazy;
use zip::ZipArchive;

use crate::errors::{ReaderAttempt, VectorError};
use crate::model::{Layer, VectorDataset};

mod csv_points;
mod geojson;
mod geojson_seq;

pub use csv_points::CsvPointsReader;
pub use geojson::GeoJsonReader;
pub use geojson_seq::GeoJsonSeqReader;

pub trait VectorReader: Send + Sync {
    fn name(&self) -> &'static str;
    fn read(&self, layer_name: &str, content: &str) -> Result<Layer, VectorError>;
}

static READERS: Lazy<Vec<&'static dyn VectorReader>> = Lazy::new(|| {
    vec![
        &GeoJsonReader as &dyn VectorReader,
        &GeoJsonSeqReader as &dyn VectorReader,
        &CsvPointsReader as &dyn VectorReader,
    ]
});

pub fn all_readers() -> &'static [&'static dyn VectorReader] {
    READERS.as_slice()
}

pub fn read_layer(layer_name: &str, content: &str) -> Result<Layer, VectorError> {
    read_with_readers(layer_name, content, all_readers())
}

pub fn read_with_readers(
    layer_name: &str,
    content: &str,
    readers: &[&dyn VectorReader],
) -> Result<Layer, VectorError> {
    let mut attempts = Vec::new();

    for reader in readers {
        match reader.read(layer_name, content) {
            Ok(layer) => return Ok(layer),
            Err(VectorError::FormatMismatch { reason, .. }) => {
                attempts.push(ReaderAttempt::new(reader.name(), reason));
            }
            Err(err) => return Err(err),
        }
    }

    Err(VectorError::NoMatchingReader { attempts })
}

const VECTOR_EXTENSIONS: [&str; 5] = ["geojson", "json", "ndjson", "geojsonl", "csv"];

/// Read a source payload into a dataset. Zip archives contribute one layer
/// per vector entry, named after the entry stem; anything else is a single
/// layer named after the file stem.
pub fn read_source(file_name: &str, bytes: &[u8]) -> Result<VectorDataset, VectorError> {
    if bytes.starts_with(b"PK\x03\x04") {
        return read_archive(bytes);
    }

    let content = std::str::from_utf8(bytes).map_err(|_| {
        VectorError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "file contents were not valid UTF-8",
        ))
    })?;
    let layer = read_layer(&stem(file_name), content)?;
    Ok(VectorDataset {
        layers: vec![layer],
    })
}

fn read_archive(bytes: &[u8]) -> Result<VectorDataset, VectorError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut layers = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let entry_name = entry.name().to_string();
        if !has_vector_extension(&entry_name) {
            continue;
        }

        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        layers.push(read_layer(&stem(&entry_name), &content)?);
    }

    if layers.is_empty() {
        return Err(VectorError::EmptyArchive);
    }

    Ok(VectorDataset { layers })
}

fn has_vector_extension(name: &str) -> bool {
    name.rsplit('.')
        .next()
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VECTOR_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn stem(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => base.to_string(),
    }
}
