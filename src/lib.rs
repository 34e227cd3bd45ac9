// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod config;
pub mod error;
pub mod feed;
pub mod http;
pub mod model;
pub mod proxy;
pub mod search;
pub mod server;
pub mod store;
pub mod transcode;

#[cfg(test)]
mod test_support;

// Re-export main types for convenience
pub use config::{Config, StorageConfig};
pub use error::{ConfigError, FeedError, ProxyError, SearchError, TranscodeError};
pub use feed::{NormalizeIssue, Normalized, fetch_podcast, is_url, parse_podcast, read_podcast_file};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use model::{Episode, Image, Podcast, Version};
pub use proxy::{ProxyService, StreamTimeouts, router};
pub use search::{SearchBackend, SearchBackendKind, SearchClient};
pub use store::{MemoryStore, PodcastRepository};
pub use transcode::Transcoder;
