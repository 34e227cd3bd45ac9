// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};

use crate::model::{Episode, Image, Podcast, Version};

use super::parse::{RawFeed, RawItem};

/// RFC 1123 with a numeric zone, e.g. "Mon, 02 Jan 2006 15:04:05 -0700"
const RFC1123Z: &str = "%a, %d %b %Y %H:%M:%S %z";

/// A non-fatal problem found while normalizing a feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeIssue {
    /// A publication date could not be parsed and was dropped
    InvalidDate {
        /// Where the date was found, e.g. "channel" or "item 3"
        location: String,
        value: String,
        reason: String,
    },
}

impl std::fmt::Display for NormalizeIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDate {
                location,
                value,
                reason,
            } => write!(f, "invalid pubDate '{}' in {}: {}", value, location, reason),
        }
    }
}

/// A normalized podcast together with the issues encountered on the way
#[derive(Debug, Clone)]
pub struct Normalized {
    pub podcast: Podcast,
    pub issues: Vec<NormalizeIssue>,
}

/// Convert a raw feed into the canonical model
///
/// Never fails: unparseable dates become `None` and are reported in
/// `issues`, the rest of the feed is still converted.
pub(crate) fn normalize(raw: &RawFeed) -> Normalized {
    let mut issues = Vec::new();

    let published_at = parse_date(&raw.pub_date, "channel", &mut issues);
    let episodes = raw
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| normalize_item(item, index, &mut issues))
        .collect();

    let podcast = Podcast {
        id: String::new(),
        url: String::new(),
        title: raw.title.trim().to_string(),
        language: raw.language.trim().to_string(),
        description: raw.description.trim().to_string(),
        published_at,
        image: Image::new(&raw.image.url, &raw.image.title),
        episodes,
    };

    Normalized { podcast, issues }
}

fn normalize_item(item: &RawItem, index: usize, issues: &mut Vec<NormalizeIssue>) -> Episode {
    let location = format!("item {}", index + 1);

    Episode {
        title: item.title.trim().to_string(),
        description: item.description.trim().to_string(),
        published_at: parse_date(&item.pub_date, &location, issues),
        image: Image::new(&item.image.url, &item.image.title),
        versions: vec![Version::new(&item.enclosure.url, &item.enclosure.mime_type)],
    }
}

/// Parse an RFC 1123 date into UTC; empty input is treated as absent
fn parse_date(value: &str, location: &str, issues: &mut Vec<NormalizeIssue>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    match DateTime::parse_from_str(value, RFC1123Z) {
        Ok(date) => Some(date.with_timezone(&Utc)),
        Err(e) => {
            issues.push(NormalizeIssue::InvalidDate {
                location: location.to_string(),
                value: value.to_string(),
                reason: e.to_string(),
            });
            None
        }
    }
}
