// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors that can occur when fetching or parsing RSS feeds
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Feed request to {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to read feed file {path}: {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed RSS feed: {0}")]
    Malformed(#[from] rss::Error),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Errors that can occur while searching for podcasts
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid search query: {0}")]
    InvalidQuery(String),

    #[error("Search request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Search backend error: {0}")]
    Backend(String),
}

/// Errors raised by the external encoder process
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Failed to start encoder {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoder exited unsuccessfully: {0}")]
    Exit(ExitStatus),

    #[error("Encoder pipe failed: {0}")]
    Pipe(#[source] std::io::Error),
}

/// Errors surfaced by the streaming proxy, one per HTTP failure class
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("only GET allowed")]
    MethodNotAllowed,

    #[error("upstream request failed: {0}")]
    Upstream(#[source] reqwest::Error),

    #[error("upstream returned HTTP {0}")]
    UpstreamStatus(u16),

    #[error("upstream did not respond within {0:?}")]
    Timeout(std::time::Duration),

    #[error("transcode failed: {0}")]
    Process(#[from] TranscodeError),
}

/// Errors in the startup configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unsupported database connection string '{0}'")]
    UnsupportedDsn(String),

    #[error("Invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}
