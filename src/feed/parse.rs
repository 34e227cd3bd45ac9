// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::FeedError;

/// Loosely-typed mirror of an RSS channel, all values kept as raw strings
#[derive(Debug, Clone, Default)]
pub(crate) struct RawFeed {
    pub title: String,
    pub language: String,
    pub description: String,
    pub pub_date: String,
    pub image: RawImage,
    pub items: Vec<RawItem>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RawItem {
    pub title: String,
    pub description: String,
    pub pub_date: String,
    pub enclosure: RawEnclosure,
    pub image: RawImage,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RawEnclosure {
    pub url: String,
    pub length: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RawImage {
    pub url: String,
    pub title: String,
}

/// Decode RSS feed XML bytes into a raw feed
///
/// Missing optional elements become empty strings. Only structurally invalid
/// XML is rejected.
pub(crate) fn parse_raw_feed(xml_bytes: &[u8]) -> Result<RawFeed, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    let image = channel
        .image()
        .map(|img| RawImage {
            url: img.url().to_string(),
            title: img.title().to_string(),
        })
        .or_else(|| {
            channel
                .itunes_ext()
                .and_then(|ext| ext.image())
                .map(|url| RawImage {
                    url: url.to_string(),
                    title: String::new(),
                })
        })
        .unwrap_or_default();

    Ok(RawFeed {
        title: channel.title().to_string(),
        language: channel.language().unwrap_or_default().to_string(),
        description: channel.description().to_string(),
        pub_date: channel.pub_date().unwrap_or_default().to_string(),
        image,
        items: channel.items().iter().map(parse_item).collect(),
    })
}

fn parse_item(item: &rss::Item) -> RawItem {
    let enclosure = item
        .enclosure()
        .map(|enc| RawEnclosure {
            url: enc.url().to_string(),
            length: enc.length().to_string(),
            mime_type: enc.mime_type().to_string(),
        })
        .unwrap_or_default();

    let image = item
        .itunes_ext()
        .and_then(|ext| ext.image())
        .map(|url| RawImage {
            url: url.to_string(),
            title: String::new(),
        })
        .unwrap_or_default();

    RawItem {
        title: item.title().unwrap_or_default().to_string(),
        description: item.description().unwrap_or_default().to_string(),
        pub_date: item.pub_date().unwrap_or_default().to_string(),
        enclosure,
        image,
    }
}
