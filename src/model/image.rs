// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

/// Artwork attached to a podcast or an episode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    #[serde(rename = "src")]
    pub url: String,
    pub title: String,
    /// Derived from the URL's file extension, empty if unrecognized
    #[serde(rename = "type")]
    pub mime_type: String,
}

impl Image {
    /// Build an image from an untrimmed URL and title
    pub fn new(url: &str, title: &str) -> Self {
        let url = url.trim();
        Self {
            url: url.to_string(),
            title: title.trim().to_string(),
            mime_type: mime_type_of(url),
        }
    }
}

/// One deliverable rendition of an episode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub url: String,
    /// Declared type, kept verbatim
    #[serde(rename = "type")]
    pub mime_type: String,
}

impl Version {
    pub fn new(url: &str, mime_type: &str) -> Self {
        Self {
            url: url.trim().to_string(),
            mime_type: mime_type.trim().to_string(),
        }
    }
}

/// Infer a MIME type from the file extension of a URL or path
///
/// Query strings and fragments are ignored when the input is an absolute URL.
/// Unknown or missing extensions yield an empty string.
pub fn mime_type_of(url: &str) -> String {
    let url = url.trim();
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    };

    Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| mime_guess::from_ext(ext).first_raw())
        .map(String::from)
        .unwrap_or_default()
}
