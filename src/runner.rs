//! # Runner
//!
//! The handle returned by a successful build. [`Runner::start`]
//! launches the source nodes (each of which lazily starts everything it
//! reaches), and [`Runner::done`] yields a broadcast signal that fires
//! once every sink has drained.
//!
//! There is no stop and no cancellation: termination happens naturally
//! when the source functions return, releasing their senders and
//! cascading channel closes down the graph.

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::debug;

/// Start-side view of a source node, held by the runner in declaration
/// order.
pub(crate) trait GraphStart: Send + Sync {
  fn start(&self);
}

/// A running (or ready-to-run) pipeline graph.
pub struct Runner {
  starts: Vec<Arc<dyn GraphStart>>,
  finals: Vec<DoneSignal>,
  started: AtomicBool,
}

impl Runner {
  pub(crate) fn new(starts: Vec<Arc<dyn GraphStart>>, finals: Vec<DoneSignal>) -> Self {
    Self {
      starts,
      finals,
      started: AtomicBool::new(false),
    }
  }

  /// Starts every source node, in declaration order. Must be called
  /// from within a tokio runtime.
  ///
  /// # Panics
  ///
  /// Panics when called a second time; a drained graph cannot be
  /// restarted.
  pub fn start(&self) {
    if self.started.swap(true, Ordering::SeqCst) {
      panic!("pipeline runner started twice");
    }
    debug!(starts = self.starts.len(), "starting pipeline");
    for start in &self.starts {
      start.start();
    }
  }

  /// Returns a signal that fires after every final node's consumer has
  /// returned. Each call spawns a fresh watcher; the returned signal is
  /// `Clone` and may be awaited by any number of waiters.
  pub fn done(&self) -> DoneSignal {
    let finals = self.finals.clone();
    let (fire, fired) = oneshot::channel();
    tokio::spawn(async move {
      for done in finals {
        done.await;
      }
      debug!("pipeline drained");
      let _ = fire.send(());
    });
    DoneSignal::new(fired)
  }
}

/// Broadcast completion signal. Fires exactly once and stays fired; a
/// dropped signal source counts as fired, so a consumer task that dies
/// cannot wedge its waiters.
#[derive(Clone)]
pub struct DoneSignal {
  fired: Shared<BoxFuture<'static, ()>>,
}

impl DoneSignal {
  pub(crate) fn new(fired: oneshot::Receiver<()>) -> Self {
    let fut: BoxFuture<'static, ()> = async move {
      let _ = fired.await;
    }
    .boxed();
    Self {
      fired: fut.shared(),
    }
  }
}

impl Future for DoneSignal {
  type Output = ();

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
    Pin::new(&mut self.get_mut().fired).poll(cx)
  }
}
