// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, HeaderValue};
use serde::Deserialize;
use url::Url;

use crate::error::SearchError;
use crate::http::HttpResponse;
use crate::model::{Image, Podcast};

use super::{SearchBackend, validate_query};

const SEARCH_ENDPOINT: &str = "https://itunes.apple.com/search";

/// Search backend for the iTunes Search API
#[derive(Debug, Clone)]
pub struct ItunesSearch {
    endpoint: String,
}

impl ItunesSearch {
    pub fn new() -> Self {
        Self::with_endpoint(SEARCH_ENDPOINT)
    }

    /// Point the backend at a different endpoint, e.g. a local mirror
    pub fn with_endpoint(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
        }
    }
}

impl Default for ItunesSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    results: Option<Vec<SearchResult>>,
}

/// One catalog entry; any field may be missing or `null`
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SearchResult {
    collection_name: Option<String>,
    feed_url: Option<String>,
    artwork_url30: Option<String>,
    artwork_url60: Option<String>,
    artwork_url100: Option<String>,
    artwork_url600: Option<String>,
    release_date: Option<DateTime<Utc>>,
}

fn trimmed(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or_default().trim()
}

impl SearchResult {
    /// Highest resolution artwork wins
    fn artwork(&self) -> &str {
        [
            &self.artwork_url600,
            &self.artwork_url100,
            &self.artwork_url60,
            &self.artwork_url30,
        ]
        .into_iter()
        .map(trimmed)
        .find(|url| !url.is_empty())
        .unwrap_or_default()
    }

    fn into_podcast(self) -> Podcast {
        Podcast {
            title: trimmed(&self.collection_name).to_string(),
            url: trimmed(&self.feed_url).to_string(),
            image: Image::new(self.artwork(), ""),
            published_at: self.release_date,
            ..Podcast::default()
        }
    }
}

#[async_trait]
impl SearchBackend for ItunesSearch {
    fn name(&self) -> &'static str {
        "itunes"
    }

    fn build_request(&self, query: &str) -> Result<reqwest::Request, SearchError> {
        validate_query(query)?;

        let url = Url::parse_with_params(&self.endpoint, &[("entity", "podcast"), ("term", query)])
            .map_err(|e| SearchError::Backend(format!("invalid search endpoint: {}", e)))?;

        let mut request = reqwest::Request::new(reqwest::Method::GET, url);
        request
            .headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(request)
    }

    async fn parse_response(&self, response: HttpResponse) -> Result<Vec<Podcast>, SearchError> {
        if response.status != 200 {
            return Err(SearchError::Backend(format!(
                "search returned HTTP {}",
                response.status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SearchError::Backend(format!("error reading response: {}", e)))?;

        let results: SearchResults = serde_json::from_slice(&body)
            .map_err(|e| SearchError::Backend(format!("error decoding JSON: {}", e)))?;

        Ok(results
            .results
            .unwrap_or_default()
            .into_iter()
            .map(SearchResult::into_podcast)
            .collect())
    }
}
