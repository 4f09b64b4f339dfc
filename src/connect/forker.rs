use crate::channel::{bounded, Sender};
use crate::connect::Joiner;
use tracing::trace;

/// Fan-out connector: duplicates every produced item to each downstream
/// joiner, in list order.
///
/// With a single downstream the forker is a degenerate adapter and each
/// acquired sender goes straight to the joiner. With several
/// downstreams the forker owns an intermediate channel (capacity taken
/// from the first joiner) and a driver task that receives one item at a
/// time and pushes it to every downstream in order; a slow downstream
/// therefore backpressures the rest.
///
/// Producers signal completion by dropping their acquired senders.
/// Once the forker itself and every sender are gone, the driver drains
/// the intermediate channel and releases the downstream joiners in list
/// order, which propagates the close.
pub struct Forker<T: Clone + Send + 'static> {
  inner: ForkerInner<T>,
}

enum ForkerInner<T: Clone + Send + 'static> {
  Single(Joiner<T>),
  Fanout(kanal::AsyncSender<T>),
}

impl<T: Clone + Send + 'static> Forker<T> {
  /// Builds a forker over the given downstream joiners.
  ///
  /// # Panics
  ///
  /// Panics on an empty list; a node with no downstream cannot run.
  pub fn fork(mut joiners: Vec<Joiner<T>>) -> Self {
    match joiners.len() {
      0 => panic!("cannot fork into zero joiners"),
      1 => Forker {
        inner: ForkerInner::Single(joiners.remove(0)),
      },
      n => {
        let (tx, rx) = bounded::<T>(joiners[0].buffer_len());
        let handles: Vec<Sender<T>> = joiners.iter().map(Joiner::acquire_sender).collect();
        tokio::spawn(async move {
          while let Ok(item) = rx.recv().await {
            for handle in &handles {
              handle.send(item.clone()).await;
            }
          }
          trace!(downstreams = n, "fan-out drained, releasing downstream senders");
          // release in list order
          for handle in handles {
            drop(handle);
          }
        });
        Forker {
          inner: ForkerInner::Fanout(tx),
        }
      }
    }
  }

  /// Hands out one sender. A node acquires one per producer function;
  /// all of them must be acquired before any producer starts running.
  pub fn acquire_sender(&self) -> Sender<T> {
    match &self.inner {
      ForkerInner::Single(joiner) => joiner.acquire_sender(),
      ForkerInner::Fanout(tx) => Sender::new(tx.clone()),
    }
  }
}
