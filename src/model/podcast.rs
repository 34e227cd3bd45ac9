// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::image::{Image, Version};

/// Canonical podcast, produced by feed normalization or by a search backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Podcast {
    /// Assigned by the storage layer, empty until stored
    pub id: String,
    /// Feed URL
    pub url: String,
    pub title: String,
    pub language: String,
    pub description: String,
    /// `None` when the source date was missing or unparseable
    pub published_at: Option<DateTime<Utc>>,
    pub image: Image,
    /// In source item order; always empty for search results
    pub episodes: Vec<Episode>,
}

/// A single episode of a podcast
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub title: String,
    pub description: String,
    pub published_at: Option<DateTime<Utc>>,
    pub image: Image,
    pub versions: Vec<Version>,
}
