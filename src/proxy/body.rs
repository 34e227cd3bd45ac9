// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::BoxError;
use bytes::Bytes;
use futures::Stream;
use tokio::time::{Instant, Sleep};

/// Response body with a stall limit and an overall deadline
///
/// Yields an error and ends when the inner stream stalls for longer than
/// `idle`, runs past `write`, or fails. Every such ending is logged with
/// the upstream URI.
pub(crate) struct TimedBody<S> {
    inner: S,
    uri: String,
    idle: Duration,
    idle_timer: Pin<Box<Sleep>>,
    deadline: Pin<Box<Sleep>>,
    bytes_sent: u64,
    done: bool,
}

impl<S> TimedBody<S> {
    pub(crate) fn new(inner: S, uri: &str, idle: Duration, write: Duration) -> Self {
        Self {
            inner,
            uri: uri.to_string(),
            idle,
            idle_timer: Box::pin(tokio::time::sleep(idle)),
            deadline: Box::pin(tokio::time::sleep(write)),
            bytes_sent: 0,
            done: false,
        }
    }

    fn abort(&mut self, error: BoxError) -> Poll<Option<Result<Bytes, BoxError>>> {
        self.done = true;
        tracing::warn!(
            uri = %self.uri,
            bytes_sent = self.bytes_sent,
            error = %error,
            "✗ stream aborted"
        );
        Poll::Ready(Some(Err(error)))
    }
}

impl<S, E> Stream for TimedBody<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<BoxError>,
{
    type Item = Result<Bytes, BoxError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }

        if this.deadline.as_mut().poll(cx).is_ready() {
            return this.abort(io::Error::new(io::ErrorKind::TimedOut, "write deadline exceeded").into());
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes_sent += chunk.len() as u64;
                let next_stall = Instant::now() + this.idle;
                this.idle_timer.as_mut().reset(next_stall);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => this.abort(e.into()),
            Poll::Ready(None) => {
                this.done = true;
                tracing::debug!(uri = %this.uri, bytes_sent = this.bytes_sent, "stream complete");
                Poll::Ready(None)
            }
            Poll::Pending => {
                if this.idle_timer.as_mut().poll(cx).is_ready() {
                    return this.abort(io::Error::new(io::ErrorKind::TimedOut, "body stalled").into());
                }
                Poll::Pending
            }
        }
    }
}
