//! Source resolution for the import utility: local paths are read directly,
//! URLs are streamed to a temp file first so large payloads never sit in a
//! response body.

use std::io::Write;

use tempfile::Builder;
use tracing::info;

use crate::error::Result;

/// Returns the payload bytes together with the source file name (used for
/// layer naming and archive detection).
pub async fn fetch_source(source: &str) -> Result<(String, Vec<u8>)> {
    if source.starts_with("http://") || source.starts_with("https://") {
        download(source).await
    } else {
        let bytes = tokio::fs::read(source).await?;
        Ok((file_name_of(source), bytes))
    }
}

async fn download(url: &str) -> Result<(String, Vec<u8>)> {
    let file_name = file_name_of(url);
    let suffix = match file_name.rsplit_once('.') {
        Some((_, ext)) => format!(".{ext}"),
        None => String::new(),
    };

    let mut response = reqwest::get(url).await?.error_for_status()?;
    let mut staged = Builder::new().suffix(&suffix).tempfile()?;
    let mut written = 0usize;
    while let Some(chunk) = response.chunk().await? {
        staged.write_all(&chunk)?;
        written += chunk.len();
    }
    staged.flush()?;
    info!(url, bytes = written, "downloaded source payload");

    let bytes = std::fs::read(staged.path())?;
    Ok((file_name, bytes))
}

fn file_name_of(source: &str) -> String {
    let trimmed = source
        .split(['?', '#'])
        .next()
        .unwrap_or(source)
        .trim_end_matches('/');
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    if name.is_empty() {
        "download".to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::file_name_of;

    #[test]
    fn file_name_strips_path_query_and_fragment() {
        assert_eq!(
            file_name_of("https://example.com/europe/albania.shp.zip?token=abc#frag"),
            "albania.shp.zip"
        );
        assert_eq!(file_name_of("/data/parcels.geojson"), "parcels.geojson");
        assert_eq!(file_name_of("https://example.com/"), "example.com");
    }
}
