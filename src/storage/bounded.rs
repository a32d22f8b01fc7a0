// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Upload body capped at its declared length.
//!
//! Whatever the connection carries beyond the declared `Content-Length` is
//! never handed to the store: chunks are clipped to the remaining allowance
//! and the stream ends as soon as the allowance reaches zero. A body that
//! ends early simply yields fewer bytes; [`BoundedStream::produced`] tells the
//! caller how many actually came through.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::Stream;

pub struct BoundedStream<S> {
    inner: S,
    limit: u64,
    remaining: u64,
}

impl<S> BoundedStream<S> {
    pub fn new(inner: S, limit: u64) -> Self {
        Self {
            inner,
            limit,
            remaining: limit,
        }
    }

    /// Bytes handed out so far.
    pub fn produced(&self) -> u64 {
        self.limit - self.remaining
    }
}

impl<S, E> Stream for BoundedStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.remaining == 0 {
            return Poll::Ready(None);
        }
        match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
            Some(Ok(mut chunk)) => {
                let allowance = usize::try_from(this.remaining).unwrap_or(usize::MAX);
                chunk.truncate(allowance);
                this.remaining -= chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            other => Poll::Ready(other),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.remaining == 0 {
            return (0, Some(0));
        }
        let (_, upper) = self.inner.size_hint();
        (0, upper)
    }
}
