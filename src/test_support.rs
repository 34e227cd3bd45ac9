// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fakes shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::http::{ByteStream, HttpClient, HttpResponse};

/// Sets its flag when dropped
struct CloseFlag(Arc<AtomicBool>);

impl Drop for CloseFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A body stream that flips `closed` once it is dropped
///
/// With `never_ends` the stream stays pending after the given chunks.
pub(crate) fn tracked_stream(
    chunks: Vec<&'static str>,
    closed: Arc<AtomicBool>,
    never_ends: bool,
) -> ByteStream {
    let guard = CloseFlag(closed);
    let tail: ByteStream = if never_ends {
        Box::pin(futures::stream::pending())
    } else {
        Box::pin(futures::stream::empty())
    };

    Box::pin(
        futures::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))))
            .chain(tail)
            .map(move |item| {
                let _ = &guard;
                item
            }),
    )
}

/// Poll `condition` for up to two seconds
pub(crate) async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Upstream fake answering every request with the same body
pub(crate) struct FakeUpstream {
    pub status: u16,
    pub content_type: Option<&'static str>,
    pub chunks: Vec<&'static str>,
    pub never_ends: bool,
    /// Set once the last handed-out body has been dropped
    pub closed: Arc<AtomicBool>,
    pub requests: AtomicUsize,
}

impl FakeUpstream {
    pub fn ok(body: &'static str) -> Self {
        Self {
            status: 200,
            content_type: Some("text/plain"),
            chunks: vec![body],
            never_ends: false,
            closed: Arc::new(AtomicBool::new(false)),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for FakeUpstream {
    async fn get_stream(&self, _url: &str) -> Result<HttpResponse, reqwest::Error> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.closed.store(false, Ordering::SeqCst);

        let content_length = if self.never_ends {
            None
        } else {
            Some(self.chunks.iter().map(|c| c.len() as u64).sum())
        };

        Ok(HttpResponse {
            status: self.status,
            content_type: self.content_type.map(String::from),
            content_length,
            body: tracked_stream(self.chunks.clone(), self.closed.clone(), self.never_ends),
        })
    }

    async fn execute(&self, request: reqwest::Request) -> Result<HttpResponse, reqwest::Error> {
        self.get_stream(request.url().as_str()).await
    }
}
