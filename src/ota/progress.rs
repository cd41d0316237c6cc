//! Byte-level upload progress.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::fs::File;
use tokio_util::bytes::Bytes;
use tokio_util::io::ReaderStream;

use crate::config::UPLOAD_CHUNK_SIZE;
use crate::traits::ProgressFn;

/// Turns a running byte count into percentages.
///
/// Reports `sent * 100 / total` clamped to 0..=100, only when the value
/// changes, never going backwards. [`finish`](Self::finish) always reports
/// 100 exactly once.
pub struct ProgressTracker {
    total: u64,
    sent: u64,
    last: Option<u8>,
    callback: ProgressFn,
}

impl ProgressTracker {
    /// Creating a tracker reports 0.
    pub fn new(total: u64, callback: ProgressFn) -> Self {
        let mut tracker = Self {
            total,
            sent: 0,
            last: None,
            callback,
        };
        tracker.emit(0);
        tracker
    }

    /// Count `bytes` more as sent.
    pub fn advance(&mut self, bytes: u64) {
        self.sent = self.sent.saturating_add(bytes);
        let percent = if self.total == 0 {
            0
        } else {
            (self.sent.saturating_mul(100) / self.total).min(100) as u8
        };
        self.emit(percent);
    }

    /// The source is exhausted.
    pub fn finish(&mut self) {
        self.emit(100);
    }

    fn emit(&mut self, percent: u8) {
        if let Some(last) = self.last {
            if percent <= last {
                return;
            }
        }
        self.last = Some(percent);
        (self.callback)(percent);
    }
}

/// File stream that reports through a [`ProgressTracker`] as chunks are
/// handed to the HTTP body.
pub struct ProgressStream {
    inner: ReaderStream<File>,
    tracker: ProgressTracker,
}

impl ProgressStream {
    pub fn new(file: File, total: u64, callback: ProgressFn) -> Self {
        Self {
            inner: ReaderStream::with_capacity(file, UPLOAD_CHUNK_SIZE),
            tracker: ProgressTracker::new(total, callback),
        }
    }
}

impl Stream for ProgressStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.tracker.advance(chunk.len() as u64);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                this.tracker.finish();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}
