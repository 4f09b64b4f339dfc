//! # Channel Facade
//!
//! Thin wrappers over the bounded async channels that connect graph
//! nodes. The engine never hands out raw channel endpoints: stage
//! functions receive a [`Sender`] acquired from a forker and a
//! [`Receiver`] taken from a joiner, and everything else stays inside
//! the connectors.
//!
//! A capacity of zero creates a rendezvous channel: a send completes
//! only when a receiver takes the value. Any larger capacity buffers
//! that many elements before senders block.

use futures::Stream;
use kanal::{AsyncReceiver, AsyncSender};
use std::fmt;

/// Creates a bounded channel of the given capacity.
pub(crate) fn bounded<T>(capacity: usize) -> (AsyncSender<T>, AsyncReceiver<T>) {
  kanal::bounded_async(capacity)
}

/// Write end of a node's output.
///
/// Dropping the sender is how a stage says "no more items": the drop
/// releases the sender's slot in the owning joiner or forker, and once
/// every sender of a channel is gone the downstream receiver drains the
/// remaining items and observes end-of-stream. A release hook, when
/// present, runs exactly once, even if the owning task panics.
pub struct Sender<T> {
  tx: AsyncSender<T>,
  release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl<T> Sender<T> {
  pub(crate) fn new(tx: AsyncSender<T>) -> Self {
    Self { tx, release: None }
  }

  pub(crate) fn with_release(tx: AsyncSender<T>, release: impl FnOnce() + Send + Sync + 'static) -> Self {
    Self {
      tx,
      release: Some(Box::new(release)),
    }
  }

  /// Sends one value, waiting for buffer space (or, on an unbuffered
  /// channel, for a receiver).
  ///
  /// # Panics
  ///
  /// Panics if the channel is already closed. That can only happen
  /// through an engine bug or a consumer task that was torn down while
  /// producers were still running.
  pub async fn send(&self, value: T) {
    if self.tx.send(value).await.is_err() {
      panic!("send on a closed pipeline channel");
    }
  }
}

impl<T> Drop for Sender<T> {
  fn drop(&mut self) {
    if let Some(release) = self.release.take() {
      release();
    }
  }
}

impl<T> fmt::Debug for Sender<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Sender").finish_non_exhaustive()
  }
}

/// Read end of a node's input.
pub struct Receiver<T> {
  rx: AsyncReceiver<T>,
}

impl<T> Receiver<T> {
  pub(crate) fn new(rx: AsyncReceiver<T>) -> Self {
    Self { rx }
  }

  /// Receives the next value, or `None` once every upstream sender has
  /// been released and the buffer is drained.
  pub async fn recv(&self) -> Option<T> {
    self.rx.recv().await.ok()
  }

  /// Adapts the receiver into a [`Stream`] that ends when the input
  /// closes.
  pub fn into_stream(self) -> impl Stream<Item = T> {
    async_stream::stream! {
      while let Some(item) = self.recv().await {
        yield item;
      }
    }
  }
}

impl<T> fmt::Debug for Receiver<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Receiver").finish_non_exhaustive()
  }
}
