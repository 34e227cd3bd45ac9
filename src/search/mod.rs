// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Podcast search over pluggable catalog backends.
//!
//! A backend knows how to turn a free-text query into an HTTP request and how
//! to map the backend's response back into [`Podcast`] values. The backend is
//! picked once at startup from [`SearchBackendKind`]; [`SearchClient`] does the
//! transport and never needs to know which backend it is driving.

mod itunes;

use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;

use crate::error::SearchError;
use crate::http::{HttpClient, HttpResponse};
use crate::model::Podcast;

pub use itunes::ItunesSearch;

/// Longest accepted query, in characters
pub const MAX_QUERY_LENGTH: usize = 255;

/// Capability set every search backend provides
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Build the outgoing request, validating the query first
    fn build_request(&self, query: &str) -> Result<reqwest::Request, SearchError>;

    /// Map the backend's response into podcasts
    ///
    /// Results are returned as-is; entries without a feed URL are kept and
    /// left for the caller to filter.
    async fn parse_response(&self, response: HttpResponse) -> Result<Vec<Podcast>, SearchError>;
}

/// Known search backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SearchBackendKind {
    #[default]
    Itunes,
}

impl SearchBackendKind {
    /// Instantiate the backend for this kind
    pub fn backend(self) -> Arc<dyn SearchBackend> {
        match self {
            Self::Itunes => Arc::new(ItunesSearch::new()),
        }
    }
}

/// Validate a query against the shared length rules
pub(crate) fn validate_query(query: &str) -> Result<(), SearchError> {
    if query.is_empty() {
        return Err(SearchError::InvalidQuery("query cannot be blank".to_string()));
    }
    if query.chars().count() > MAX_QUERY_LENGTH {
        return Err(SearchError::InvalidQuery(format!(
            "query cannot be longer than {} characters",
            MAX_QUERY_LENGTH
        )));
    }
    Ok(())
}

/// Runs searches against one backend
pub struct SearchClient<C> {
    backend: Arc<dyn SearchBackend>,
    client: C,
}

impl<C: HttpClient> SearchClient<C> {
    pub fn new(backend: Arc<dyn SearchBackend>, client: C) -> Self {
        Self { backend, client }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Search for podcasts matching a free-text query
    pub async fn search(&self, query: &str) -> Result<Vec<Podcast>, SearchError> {
        let request = self.backend.build_request(query)?;
        let url = request.url().to_string();

        tracing::debug!(backend = self.backend.name(), %url, "searching");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|source| SearchError::Transport { url, source })?;

        self.backend.parse_response(response).await
    }
}
