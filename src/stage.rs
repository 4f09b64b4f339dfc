//! # Stage Declarations
//!
//! A stage is the user-supplied behaviour of one node, wrapped so the
//! builder can store it until build time: one or more producer
//! functions for a start node, a transform for a middle, a consumer for
//! a final. The placeholder constructors cover the two "do nothing"
//! conventions:
//!
//! - [`bypass`] rewires: the middle slot disappears from the running
//!   graph and its upstreams connect directly to its downstreams, with
//!   no extra task and no extra channel.
//! - [`ignore_start`] / [`ignore_middle`] / [`ignore_final`] run: they
//!   produce nothing or drain their input and discard it.
//!
//! These are different behaviours; a bypass forwards the stream, an
//! ignored middle swallows it.

use crate::channel::{Receiver, Sender};
use crate::connect::Joiner;
use futures::future::BoxFuture;
use std::future::Future;

pub(crate) type BoxStartFn<O> = Box<dyn FnOnce(Sender<O>) -> BoxFuture<'static, ()> + Send>;
pub(crate) type BoxMiddleFn<I, O> =
  Box<dyn FnOnce(Receiver<I>, Sender<O>) -> BoxFuture<'static, ()> + Send>;
pub(crate) type BoxFinalFn<I> = Box<dyn FnOnce(Receiver<I>) -> BoxFuture<'static, ()> + Send>;

/// Declaration of a start node: one or more producer functions.
///
/// All producers of one node share the node's fan-out and run
/// concurrently; the node's output closes when the last of them
/// returns.
pub struct StartStage<O: Clone + Send + 'static> {
  pub(crate) funs: Vec<BoxStartFn<O>>,
}

impl<O: Clone + Send + 'static> StartStage<O> {
  pub fn new<F, Fut>(fun: F) -> Self
  where
    F: FnOnce(Sender<O>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    Self {
      funs: vec![box_start_fn(fun)],
    }
  }

  /// Adds another producer function to the same node.
  pub fn and<F, Fut>(mut self, fun: F) -> Self
  where
    F: FnOnce(Sender<O>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self.funs.push(box_start_fn(fun));
    self
  }
}

fn box_start_fn<O, F, Fut>(fun: F) -> BoxStartFn<O>
where
  O: Clone + Send + 'static,
  F: FnOnce(Sender<O>) -> Fut + Send + 'static,
  Fut: Future<Output = ()> + Send + 'static,
{
  Box::new(move |sender| Box::pin(fun(sender)))
}

/// Declaration of a middle node: a transform from a stream of `I` to a
/// stream of `O`, or a bypass.
pub struct MiddleStage<I: Clone + Send + 'static, O: Clone + Send + 'static> {
  pub(crate) kind: MiddleKind<I, O>,
  pub(crate) buffer_len: Option<usize>,
}

pub(crate) enum MiddleKind<I: Clone + Send + 'static, O: Clone + Send + 'static> {
  Transform(BoxMiddleFn<I, O>),
  // the witness is the identity; only `bypass::<T>()` can build this
  // variant, with I == O
  Bypass(fn(Joiner<O>) -> Joiner<I>),
}

impl<I: Clone + Send + 'static, O: Clone + Send + 'static> MiddleStage<I, O> {
  pub fn new<F, Fut>(fun: F) -> Self
  where
    F: FnOnce(Receiver<I>, Sender<O>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    Self {
      kind: MiddleKind::Transform(Box::new(move |input, output| Box::pin(fun(input, output)))),
      buffer_len: None,
    }
  }

  /// Overrides the builder's default capacity for this node's input
  /// channel.
  pub fn with_buffer_len(mut self, buffer_len: usize) -> Self {
    self.buffer_len = Some(buffer_len);
    self
  }
}

/// Declaration of a final node: a consumer of a stream of `I`.
pub struct FinalStage<I: Clone + Send + 'static> {
  pub(crate) fun: BoxFinalFn<I>,
  pub(crate) buffer_len: Option<usize>,
}

impl<I: Clone + Send + 'static> FinalStage<I> {
  pub fn new<F, Fut>(fun: F) -> Self
  where
    F: FnOnce(Receiver<I>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    Self {
      fun: Box::new(move |input| Box::pin(fun(input))),
      buffer_len: None,
    }
  }

  /// Overrides the builder's default capacity for this node's input
  /// channel.
  pub fn with_buffer_len(mut self, buffer_len: usize) -> Self {
    self.buffer_len = Some(buffer_len);
    self
  }
}

/// Placeholder middle that splices its upstreams directly onto its
/// downstreams at build time.
///
/// The bypassed slot has no task and no channels. It can only stand in
/// a `Middle<T, T>` slot: a middle that changes its element type has
/// nothing to forward, and such a bypass does not typecheck.
pub fn bypass<T: Clone + Send + 'static>() -> MiddleStage<T, T> {
  MiddleStage {
    kind: MiddleKind::Bypass(|joiner| joiner),
    buffer_len: None,
  }
}

/// Placeholder start that produces nothing and releases its output
/// immediately.
pub fn ignore_start<O: Clone + Send + 'static>() -> StartStage<O> {
  StartStage::new(|_output| async {})
}

/// Placeholder middle that drains its input and emits nothing. Unlike
/// [`bypass`] it keeps its node, so it still needs a downstream, which
/// only ever observes the close.
pub fn ignore_middle<I: Clone + Send + 'static, O: Clone + Send + 'static>() -> MiddleStage<I, O> {
  MiddleStage::new(|input: Receiver<I>, _output| async move {
    while input.recv().await.is_some() {}
  })
}

/// Placeholder final that drains its input and signals done as soon as
/// the input closes.
pub fn ignore_final<I: Clone + Send + 'static>() -> FinalStage<I> {
  FinalStage::new(|input: Receiver<I>| async move {
    while input.recv().await.is_some() {}
  })
}
