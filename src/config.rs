// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;

use crate::error::ConfigError;
use crate::search::SearchBackendKind;

/// Process configuration, read once at startup
///
/// Every setting has a default and can be overridden from the environment.
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "ADDR", default_value = "0.0.0.0:8080")]
    pub addr: SocketAddr,

    /// Longest stall allowed between two chunks of a streamed body
    #[arg(long, env = "IDLE_TIMEOUT", default_value = "60s", value_parser = parse_duration)]
    pub idle_timeout: Duration,

    /// Time allowed to obtain upstream response headers
    #[arg(long, env = "READ_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub read_timeout: Duration,

    /// Time allowed to stream an entire response body
    #[arg(long, env = "WRITE_TIMEOUT", default_value = "10m", value_parser = parse_duration)]
    pub write_timeout: Duration,

    /// Time allowed for in-flight requests to finish on shutdown
    #[arg(long, env = "WAIT_TIMEOUT", default_value = "20m", value_parser = parse_duration)]
    pub wait_timeout: Duration,

    /// Path to an ffmpeg executable
    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    pub ffmpeg_path: PathBuf,

    /// Preferred search backend
    #[arg(long, env = "SEARCH_BACKEND", value_enum, default_value_t)]
    pub search_backend: SearchBackendKind,

    /// Directory of static web app files served on `/`
    #[arg(long, env = "APP")]
    pub app: Option<PathBuf>,

    /// Database connection string (in-memory store when unset)
    #[arg(short = 'D', long, env = "DATABASE")]
    pub database: Option<String>,

    /// How long complete `/get` responses are reused (0s disables caching)
    #[arg(long, env = "CACHE_TTL", default_value = "5m", value_parser = parse_duration)]
    pub cache_ttl: Duration,

    /// Largest body kept in the response cache
    #[arg(long, env = "CACHE_MAX_ENTRY_BYTES", default_value_t = 1024 * 1024)]
    pub cache_max_entry_bytes: usize,
}

impl Config {
    /// The web app directory, checked to exist
    pub fn app_dir(&self) -> Result<Option<&Path>, ConfigError> {
        match self.app.as_deref() {
            Some(dir) if !dir.is_dir() => Err(ConfigError::NotADirectory(dir.to_path_buf())),
            dir => Ok(dir),
        }
    }

    /// Storage selected by the `database` connection string
    pub fn storage(&self) -> Result<StorageConfig, ConfigError> {
        StorageConfig::parse(self.database.as_deref())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            idle_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10 * 60),
            wait_timeout: Duration::from_secs(20 * 60),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            search_backend: SearchBackendKind::default(),
            app: None,
            database: None,
            cache_ttl: Duration::from_secs(5 * 60),
            cache_max_entry_bytes: 1024 * 1024,
        }
    }
}

/// Parse a humane duration such as `15s`, `1m30s` or `250ms`
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidDuration {
            value: value.to_string(),
            reason: "empty".to_string(),
        });
    }

    humantime::parse_duration(trimmed).map_err(|e| ConfigError::InvalidDuration {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Storage driver chosen from a connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// Process-local store
    Memory,
    /// Embedded database at the given path
    Sqlite(String),
    /// Server database, connection string kept verbatim
    Postgres(String),
}

impl StorageConfig {
    pub fn parse(dsn: Option<&str>) -> Result<Self, ConfigError> {
        let dsn = match dsn.map(str::trim) {
            None | Some("") => return Ok(Self::Memory),
            Some(dsn) => dsn,
        };

        if dsn.starts_with("postgres://") {
            return Ok(Self::Postgres(dsn.to_string()));
        }

        match dsn.split_once(':') {
            Some(("sqlite" | "sqlite3", path)) => Ok(Self::Sqlite(path.to_string())),
            _ => Err(ConfigError::UnsupportedDsn(dsn.to_string())),
        }
    }

    /// Driver name used in log output
    pub fn driver(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite(_) => "sqlite3",
            Self::Postgres(_) => "postgres",
        }
    }
}
