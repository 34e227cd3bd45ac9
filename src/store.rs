// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::model::Podcast;

/// Storage of ingested podcasts, keyed by feed URL
#[async_trait]
pub trait PodcastRepository: Send + Sync {
    /// Every stored podcast, in insertion order
    async fn podcasts(&self) -> Vec<Podcast>;

    /// The podcast whose feed URL matches `url`
    async fn find_podcast(&self, url: &str) -> Option<Podcast>;

    /// Store a podcast, replacing any previous one with the same feed URL
    ///
    /// Returns the stored podcast's id. A replaced podcast keeps its id.
    async fn save_podcast(&self, podcast: Podcast) -> String;
}

/// Podcasts held in process memory
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    podcasts: Arc<RwLock<Vec<Podcast>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PodcastRepository for MemoryStore {
    async fn podcasts(&self) -> Vec<Podcast> {
        self.podcasts.read().await.clone()
    }

    async fn find_podcast(&self, url: &str) -> Option<Podcast> {
        self.podcasts
            .read()
            .await
            .iter()
            .find(|p| p.url == url)
            .cloned()
    }

    async fn save_podcast(&self, mut podcast: Podcast) -> String {
        let mut podcasts = self.podcasts.write().await;

        if let Some(existing) = podcasts.iter_mut().find(|p| p.url == podcast.url) {
            podcast.id = existing.id.clone();
            *existing = podcast;
            return existing.id.clone();
        }

        if podcast.id.is_empty() {
            podcast.id = Uuid::new_v4().to_string();
        }
        let id = podcast.id.clone();
        podcasts.push(podcast);
        id
    }
}

/// Open the repository selected by `storage`
///
/// Database drivers are not linked into this binary; selecting one logs a
/// warning and keeps podcasts in memory.
pub fn open(storage: &StorageConfig) -> Arc<dyn PodcastRepository> {
    match storage {
        StorageConfig::Memory => {
            tracing::debug!("using in-memory podcast store");
        }
        StorageConfig::Sqlite(_) | StorageConfig::Postgres(_) => {
            tracing::warn!(
                driver = storage.driver(),
                "database driver not available, falling back to in-memory store"
            );
        }
    }
    Arc::new(MemoryStore::new())
}
