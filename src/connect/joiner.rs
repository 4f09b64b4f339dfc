use crate::channel::{bounded, Receiver, Sender};
use kanal::AsyncReceiver;
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Fan-in connector: merges any number of concurrent producers into the
/// single receive stream consumed by one node.
///
/// The first acquired sender writes straight into the main channel.
/// Every later producer gets its own channel of the same capacity plus
/// a forwarding task that moves its items into the main channel. The
/// main channel is closed exactly once, when the last
/// outstanding sender is released; the consumer's receive loop then
/// terminates after draining whatever is still buffered.
///
/// Cloning a `Joiner` clones cheap handles onto the same channel and
/// sender count.
#[derive(Clone)]
pub struct Joiner<T: Clone + Send + 'static> {
  buffer_len: usize,
  rx: AsyncReceiver<T>,
  gate: Arc<SenderGate<T>>,
}

struct SenderGate<T> {
  state: Mutex<GateState<T>>,
}

struct GateState<T> {
  active: usize,
  main: Option<kanal::AsyncSender<T>>,
}

impl<T: Clone + Send + 'static> Joiner<T> {
  pub fn new(buffer_len: usize) -> Self {
    let (tx, rx) = bounded(buffer_len);
    Self {
      buffer_len,
      rx,
      gate: Arc::new(SenderGate {
        state: Mutex::new(GateState {
          active: 0,
          main: Some(tx),
        }),
      }),
    }
  }

  pub fn buffer_len(&self) -> usize {
    self.buffer_len
  }

  /// Read side of the merged stream. Stable for the joiner's lifetime.
  pub fn receiver(&self) -> Receiver<T> {
    Receiver::new(self.rx.clone())
  }

  /// Registers one more producer and returns its sender handle.
  ///
  /// Dropping the handle releases the producer's slot; when the count
  /// returns to zero the main channel closes. Acquires and the last
  /// release are serialized by a mutex, so the count can never touch
  /// zero while another acquire is in flight.
  ///
  /// # Panics
  ///
  /// Panics when called after the joiner has already closed, i.e. after
  /// the count returned to zero once. Producers must be wired before
  /// the existing ones run out.
  pub fn acquire_sender(&self) -> Sender<T> {
    let mut gate = self.gate.state.lock().unwrap();
    let main = gate
      .main
      .as_ref()
      .expect("acquiring a sender on an already closed joiner")
      .clone();
    gate.active += 1;
    trace!(active = gate.active, "joiner sender acquired");
    if gate.active == 1 {
      let released = Arc::clone(&self.gate);
      return Sender::with_release(main, move || released.release());
    }
    let (tx, rx) = bounded(self.buffer_len);
    let released = Arc::clone(&self.gate);
    tokio::spawn(async move {
      while let Ok(item) = rx.recv().await {
        main
          .send(item)
          .await
          .expect("joiner main channel closed while a sender was still active");
      }
      released.release();
    });
    Sender::new(tx)
  }
}

impl<T> SenderGate<T> {
  fn release(&self) {
    let mut gate = self.state.lock().unwrap();
    gate.active -= 1;
    trace!(active = gate.active, "joiner sender released");
    if gate.active == 0 {
      // dropping the stored sender closes the main channel once the
      // remaining buffered items are drained
      gate.main = None;
    }
  }
}
