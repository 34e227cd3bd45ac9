// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use bytes::Bytes;
use url::Url;

use crate::error::FeedError;
use crate::http::HttpClient;

use super::normalize::{Normalized, normalize};
use super::parse::parse_raw_feed;

/// Fetch raw feed bytes from a URL (without parsing)
pub async fn fetch_feed_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<Bytes, FeedError> {
    let fetch_failed = |e| FeedError::FetchFailed {
        url: url.to_string(),
        source: e,
    };

    let response = client.get_stream(url).await.map_err(fetch_failed)?;
    if !response.is_success() {
        return Err(FeedError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    response.bytes().await.map_err(fetch_failed)
}

/// Read raw feed bytes from a local file (without parsing)
pub fn read_feed_file(path: &Path) -> Result<Vec<u8>, FeedError> {
    std::fs::read(path).map_err(|e| FeedError::FileReadFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Parse and normalize feed bytes into the canonical model
pub fn parse_podcast(xml_bytes: &[u8]) -> Result<Normalized, FeedError> {
    let raw = parse_raw_feed(xml_bytes)?;
    Ok(normalize(&raw))
}

/// Fetch, parse and normalize a podcast feed from a URL
///
/// Normalization issues are logged as warnings, they never fail the fetch.
pub async fn fetch_podcast<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<Normalized, FeedError> {
    let feed_url = Url::parse(url)?;
    let bytes = fetch_feed_bytes(client, feed_url.as_str()).await?;

    let mut normalized = parse_podcast(&bytes)?;
    normalized.podcast.url = feed_url.to_string();
    log_issues(&normalized);

    Ok(normalized)
}

/// Parse and normalize a podcast feed from a local file
pub fn read_podcast_file(path: &Path) -> Result<Normalized, FeedError> {
    let bytes = read_feed_file(path)?;

    let mut normalized = parse_podcast(&bytes)?;
    normalized.podcast.url = file_path_to_url(path).to_string();
    log_issues(&normalized);

    Ok(normalized)
}

fn log_issues(normalized: &Normalized) {
    for issue in &normalized.issues {
        tracing::warn!(feed = %normalized.podcast.url, "{}", issue);
    }
}

/// Construct a file:// URL for a local file path
fn file_path_to_url(path: &Path) -> String {
    std::path::absolute(path)
        .ok()
        .and_then(|absolute| Url::from_file_path(absolute).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| format!("file://{}", path.display()))
}

/// Determine if a string is a URL or a file path
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}
