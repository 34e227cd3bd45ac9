// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures::Stream;

use crate::http::ByteStream;

/// A complete upstream body kept for reuse
#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// Upstream status, always 2xx
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
    stored_at: Instant,
}

/// Concurrent cache of small upstream responses, keyed by upstream URI
///
/// Entries are sharded, so lookups for different URIs never contend on a
/// single lock.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    entries: Arc<DashMap<String, CachedResponse>>,
    ttl: Duration,
    max_entry_bytes: usize,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entry_bytes: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
            max_entry_bytes,
        }
    }

    /// Fresh entry for `key`, evicting it if expired
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        if let Some(entry) = self.entries.get(key)
            && entry.stored_at.elapsed() < self.ttl
        {
            return Some(entry.clone());
        }

        self.entries
            .remove_if(key, |_, entry| entry.stored_at.elapsed() >= self.ttl);
        None
    }

    /// Store a complete body, dropping every expired entry first
    pub fn insert(&self, key: &str, status: u16, content_type: Option<String>, body: Bytes) {
        self.evict_expired();
        if body.len() > self.max_entry_bytes {
            return;
        }
        self.entries.insert(
            key.to_string(),
            CachedResponse {
                status,
                content_type,
                body,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn evict_expired(&self) {
        self.entries
            .retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
    }

    /// Whether a body of the announced length may end up cached
    pub fn accepts(&self, content_length: Option<u64>) -> bool {
        content_length.is_none_or(|len| len <= self.max_entry_bytes as u64)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pass `body` through unchanged, storing it once it completes cleanly
    pub fn tee(
        &self,
        key: &str,
        status: u16,
        content_type: Option<String>,
        body: ByteStream,
    ) -> ByteStream {
        Box::pin(CachingStream {
            inner: body,
            buffer: Some(BytesMut::new()),
            cache: self.clone(),
            key: key.to_string(),
            status,
            content_type,
        })
    }
}

struct CachingStream {
    inner: ByteStream,
    /// `None` once the body is known to be uncacheable
    buffer: Option<BytesMut>,
    cache: ResponseCache,
    key: String,
    status: u16,
    content_type: Option<String>,
}

impl Stream for CachingStream {
    type Item = Result<Bytes, reqwest::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(buffer) = &mut this.buffer {
                    if buffer.len() + chunk.len() > this.cache.max_entry_bytes {
                        this.buffer = None;
                    } else {
                        buffer.extend_from_slice(&chunk);
                    }
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.buffer = None;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if let Some(buffer) = this.buffer.take() {
                    this.cache.insert(
                        &this.key,
                        this.status,
                        this.content_type.take(),
                        buffer.freeze(),
                    );
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
