//! # Node Variants
//!
//! A graph vertex is one of three user-visible kinds, held in typed
//! slots inside the user's node map:
//!
//! - [`Start<O>`]: source, output only.
//! - [`Middle<I, O>`]: transform, input and output.
//! - [`Final<I>`]: sink, input only.
//!
//! A fourth kind, the bypass, hides behind `Middle<T, T>` when the slot
//! was declared with [`bypass`](crate::bypass): it owns no task and no
//! channels, and during graph resolution its downstreams' inputs stand
//! in for its own.
//!
//! Nodes start lazily. `Runner::start` starts the sources; each node,
//! before spawning its own task, collects the input joiners of its
//! downstreams and recursively starts whichever of them is not running
//! yet. Starting is idempotent for middles and finals, and a diamond
//! (two upstreams sharing a downstream) starts the shared node once.

use crate::channel::Sender;
use crate::connect::{Forker, Joiner};
use crate::error::{StructureProblem, StructureProblemKind};
use crate::runner::{DoneSignal, GraphStart};
use crate::stage::{BoxFinalFn, BoxMiddleFn, BoxStartFn};
use std::any::type_name;
use std::mem;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::trace;

/// Graph-resolution view of a node that can receive elements of type
/// `T`. Upstream nodes use it to collect input joiners and to start
/// their downstreams; user code never calls it directly.
pub trait InletNode<T: Clone + Send + 'static>: Send + Sync {
  /// Whether the node's task (for a bypass, every task behind it) has
  /// been started.
  fn is_started(&self) -> bool;
  /// Starts the node. Idempotent.
  fn start(&self);
  /// The input joiners an upstream forker must feed. A real node
  /// contributes its own joiner; a bypass contributes its downstreams',
  /// recursively.
  fn input_joiners(&self) -> Vec<Joiner<T>>;
  /// Records one upstream connection for build-time validation.
  fn note_incoming(&self);
}

/// Implemented by the slot kinds that may appear on the receiving side
/// of a `send_to`: `Middle<T, _>` and `Final<T>`.
pub trait Inlet<T: Clone + Send + 'static> {
  /// The shared node behind the slot.
  ///
  /// # Panics
  ///
  /// Panics if no stage has been registered for the slot yet.
  fn inlet_node(&self) -> Arc<dyn InletNode<T>>;
}

/// Collects the downstream joiners in declaration order and lazily
/// starts every receiver that is not running yet.
fn resolve_and_start<T: Clone + Send + 'static>(outs: &[Arc<dyn InletNode<T>>]) -> Vec<Joiner<T>> {
  let mut joiners = Vec::with_capacity(outs.len());
  for out in outs {
    joiners.extend(out.input_joiners());
    if !out.is_started() {
      out.start();
    }
  }
  joiners
}

fn resolved_joiners<T: Clone + Send + 'static>(outs: &[Arc<dyn InletNode<T>>]) -> Vec<Joiner<T>> {
  outs.iter().flat_map(|out| out.input_joiners()).collect()
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// Typed slot holding a source node. Declared as a field of the user's
/// node map and filled by the builder.
pub struct Start<O: Clone + Send + 'static> {
  node: Option<Arc<StartNode<O>>>,
}

impl<O: Clone + Send + 'static> Default for Start<O> {
  fn default() -> Self {
    Self { node: None }
  }
}

impl<O: Clone + Send + 'static> Start<O> {
  /// Appends one downstream. Call once per target; fan-out follows the
  /// call order.
  pub fn send_to(&self, target: &impl Inlet<O>) {
    self.node().push_out(target.inlet_node());
  }

  fn node(&self) -> &Arc<StartNode<O>> {
    self.node.as_ref().unwrap_or_else(|| {
      panic!(
        "Start<{}> slot used before a stage was registered for it",
        type_name::<O>()
      )
    })
  }

  pub(crate) fn set(&mut self, node: Arc<StartNode<O>>) {
    self.node = Some(node);
  }
}

/// Typed slot holding a transform node, or a bypass.
pub struct Middle<I: Clone + Send + 'static, O: Clone + Send + 'static> {
  slot: Option<MiddleSlot<I, O>>,
}

pub(crate) enum MiddleSlot<I: Clone + Send + 'static, O: Clone + Send + 'static> {
  Transform(Arc<MiddleNode<I, O>>),
  Bypass(Arc<BypassNode<I, O>>),
}

impl<I: Clone + Send + 'static, O: Clone + Send + 'static> Clone for MiddleSlot<I, O> {
  fn clone(&self) -> Self {
    match self {
      Self::Transform(node) => Self::Transform(Arc::clone(node)),
      Self::Bypass(node) => Self::Bypass(Arc::clone(node)),
    }
  }
}

impl<I: Clone + Send + 'static, O: Clone + Send + 'static> Default for Middle<I, O> {
  fn default() -> Self {
    Self { slot: None }
  }
}

impl<I: Clone + Send + 'static, O: Clone + Send + 'static> Middle<I, O> {
  /// Appends one downstream. Call once per target; fan-out follows the
  /// call order.
  pub fn send_to(&self, target: &impl Inlet<O>) {
    match self.slot() {
      MiddleSlot::Transform(node) => node.push_out(target.inlet_node()),
      MiddleSlot::Bypass(node) => node.push_out(target.inlet_node()),
    }
  }

  fn slot(&self) -> &MiddleSlot<I, O> {
    self.slot.as_ref().unwrap_or_else(|| {
      panic!(
        "Middle<{}, {}> slot used before a stage was registered for it",
        type_name::<I>(),
        type_name::<O>()
      )
    })
  }

  pub(crate) fn set(&mut self, slot: MiddleSlot<I, O>) {
    self.slot = Some(slot);
  }
}

impl<I: Clone + Send + 'static, O: Clone + Send + 'static> Inlet<I> for Middle<I, O> {
  fn inlet_node(&self) -> Arc<dyn InletNode<I>> {
    match self.slot() {
      MiddleSlot::Transform(node) => Arc::clone(node) as Arc<dyn InletNode<I>>,
      MiddleSlot::Bypass(node) => Arc::clone(node) as Arc<dyn InletNode<I>>,
    }
  }
}

/// Typed slot holding a sink node.
pub struct Final<I: Clone + Send + 'static> {
  node: Option<Arc<FinalNode<I>>>,
}

impl<I: Clone + Send + 'static> Default for Final<I> {
  fn default() -> Self {
    Self { node: None }
  }
}

impl<I: Clone + Send + 'static> Final<I> {
  fn node(&self) -> &Arc<FinalNode<I>> {
    self.node.as_ref().unwrap_or_else(|| {
      panic!(
        "Final<{}> slot used before a stage was registered for it",
        type_name::<I>()
      )
    })
  }

  pub(crate) fn set(&mut self, node: Arc<FinalNode<I>>) {
    self.node = Some(node);
  }
}

impl<I: Clone + Send + 'static> Inlet<I> for Final<I> {
  fn inlet_node(&self) -> Arc<dyn InletNode<I>> {
    Arc::clone(self.node()) as Arc<dyn InletNode<I>>
  }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

pub(crate) struct StartNode<O: Clone + Send + 'static> {
  state: Mutex<StartState<O>>,
}

struct StartState<O: Clone + Send + 'static> {
  funs: Vec<BoxStartFn<O>>,
  outs: Vec<Arc<dyn InletNode<O>>>,
  started: bool,
}

impl<O: Clone + Send + 'static> StartNode<O> {
  pub(crate) fn new(funs: Vec<BoxStartFn<O>>) -> Self {
    Self {
      state: Mutex::new(StartState {
        funs,
        outs: Vec::new(),
        started: false,
      }),
    }
  }

  pub(crate) fn push_out(&self, target: Arc<dyn InletNode<O>>) {
    target.note_incoming();
    self.state.lock().unwrap().outs.push(target);
  }

  pub(crate) fn start(&self) {
    let (funs, outs) = {
      let mut state = self.state.lock().unwrap();
      if state.started {
        panic!("start node started twice");
      }
      state.started = true;
      (mem::take(&mut state.funs), state.outs.clone())
    };
    if outs.is_empty() {
      panic!("start node has no outputs");
    }
    trace!(producers = funs.len(), outputs = outs.len(), "starting source node");
    let forker = Forker::fork(resolve_and_start(&outs));
    // every producer acquires its sender before any of them runs, so an
    // early-finishing producer cannot close the downstream under the
    // others
    let senders: Vec<Sender<O>> = funs.iter().map(|_| forker.acquire_sender()).collect();
    for (fun, sender) in funs.into_iter().zip(senders) {
      tokio::spawn(async move {
        fun(sender).await;
      });
    }
  }

  pub(crate) fn check(&self, slot: &str) -> Vec<StructureProblem> {
    let outs = self.state.lock().unwrap().outs.clone();
    if resolved_joiners(&outs).is_empty() {
      return vec![StructureProblem::new(slot, StructureProblemKind::NoOutput)];
    }
    Vec::new()
  }
}

impl<O: Clone + Send + 'static> GraphStart for StartNode<O> {
  fn start(&self) {
    StartNode::start(self);
  }
}

pub(crate) struct MiddleNode<I: Clone + Send + 'static, O: Clone + Send + 'static> {
  joiner: Joiner<I>,
  state: Mutex<MiddleState<I, O>>,
}

struct MiddleState<I: Clone + Send + 'static, O: Clone + Send + 'static> {
  fun: Option<BoxMiddleFn<I, O>>,
  outs: Vec<Arc<dyn InletNode<O>>>,
  started: bool,
  incoming: usize,
}

impl<I: Clone + Send + 'static, O: Clone + Send + 'static> MiddleNode<I, O> {
  pub(crate) fn new(fun: BoxMiddleFn<I, O>, buffer_len: usize) -> Self {
    Self {
      joiner: Joiner::new(buffer_len),
      state: Mutex::new(MiddleState {
        fun: Some(fun),
        outs: Vec::new(),
        started: false,
        incoming: 0,
      }),
    }
  }

  pub(crate) fn push_out(&self, target: Arc<dyn InletNode<O>>) {
    target.note_incoming();
    self.state.lock().unwrap().outs.push(target);
  }

  pub(crate) fn check(&self, slot: &str) -> Vec<StructureProblem> {
    let (incoming, outs) = {
      let state = self.state.lock().unwrap();
      (state.incoming, state.outs.clone())
    };
    let mut problems = Vec::new();
    if incoming == 0 {
      problems.push(StructureProblem::new(slot, StructureProblemKind::NoInput));
    }
    if resolved_joiners(&outs).is_empty() {
      problems.push(StructureProblem::new(slot, StructureProblemKind::NoOutput));
    }
    problems
  }
}

impl<I: Clone + Send + 'static, O: Clone + Send + 'static> InletNode<I> for MiddleNode<I, O> {
  fn is_started(&self) -> bool {
    self.state.lock().unwrap().started
  }

  fn start(&self) {
    let (fun, outs) = {
      let mut state = self.state.lock().unwrap();
      if state.started {
        return;
      }
      state.started = true;
      let fun = state
        .fun
        .take()
        .expect("middle stage function taken before start");
      (fun, state.outs.clone())
    };
    if outs.is_empty() {
      panic!("middle node has no outputs");
    }
    trace!(outputs = outs.len(), "starting middle node");
    let forker = Forker::fork(resolve_and_start(&outs));
    let sender = forker.acquire_sender();
    let input = self.joiner.receiver();
    tokio::spawn(async move {
      fun(input, sender).await;
    });
  }

  fn input_joiners(&self) -> Vec<Joiner<I>> {
    vec![self.joiner.clone()]
  }

  fn note_incoming(&self) {
    self.state.lock().unwrap().incoming += 1;
  }
}

/// Construction-time placeholder. Owns no joiner, no forker and no
/// task; resolution walks through it to its downstreams, so the
/// upstream forker connects directly to the ultimate real nodes.
pub(crate) struct BypassNode<I: Clone + Send + 'static, O: Clone + Send + 'static> {
  // identity witness provided by `bypass::<T>()`, where I == O
  cast: fn(Joiner<O>) -> Joiner<I>,
  state: Mutex<BypassState<O>>,
}

struct BypassState<O: Clone + Send + 'static> {
  outs: Vec<Arc<dyn InletNode<O>>>,
  incoming: usize,
}

impl<I: Clone + Send + 'static, O: Clone + Send + 'static> BypassNode<I, O> {
  pub(crate) fn new(cast: fn(Joiner<O>) -> Joiner<I>) -> Self {
    Self {
      cast,
      state: Mutex::new(BypassState {
        outs: Vec::new(),
        incoming: 0,
      }),
    }
  }

  pub(crate) fn push_out(&self, target: Arc<dyn InletNode<O>>) {
    target.note_incoming();
    self.state.lock().unwrap().outs.push(target);
  }

  pub(crate) fn check(&self, slot: &str) -> Vec<StructureProblem> {
    let (incoming, outs) = {
      let state = self.state.lock().unwrap();
      (state.incoming, state.outs.clone())
    };
    let mut problems = Vec::new();
    if incoming == 0 {
      problems.push(StructureProblem::new(slot, StructureProblemKind::NoInput));
    }
    if outs.is_empty() {
      problems.push(StructureProblem::new(slot, StructureProblemKind::NoOutput));
    } else if resolved_joiners(&outs).is_empty() {
      problems.push(StructureProblem::new(
        slot,
        StructureProblemKind::BypassDeadEnd,
      ));
    }
    problems
  }
}

impl<I: Clone + Send + 'static, O: Clone + Send + 'static> InletNode<I> for BypassNode<I, O> {
  fn is_started(&self) -> bool {
    let outs = self.state.lock().unwrap().outs.clone();
    outs.iter().all(|out| out.is_started())
  }

  fn start(&self) {
    let outs = self.state.lock().unwrap().outs.clone();
    if outs.is_empty() {
      panic!("bypass node has no outputs");
    }
    for out in outs {
      if !out.is_started() {
        out.start();
      }
    }
  }

  fn input_joiners(&self) -> Vec<Joiner<I>> {
    let outs = self.state.lock().unwrap().outs.clone();
    resolved_joiners(&outs).into_iter().map(self.cast).collect()
  }

  fn note_incoming(&self) {
    self.state.lock().unwrap().incoming += 1;
  }
}

pub(crate) struct FinalNode<I: Clone + Send + 'static> {
  joiner: Joiner<I>,
  done: DoneSignal,
  state: Mutex<FinalState<I>>,
}

struct FinalState<I: Clone + Send + 'static> {
  fun: Option<BoxFinalFn<I>>,
  fire: Option<oneshot::Sender<()>>,
  started: bool,
  incoming: usize,
}

impl<I: Clone + Send + 'static> FinalNode<I> {
  pub(crate) fn new(fun: BoxFinalFn<I>, buffer_len: usize) -> Self {
    let (fire, fired) = oneshot::channel();
    Self {
      joiner: Joiner::new(buffer_len),
      done: DoneSignal::new(fired),
      state: Mutex::new(FinalState {
        fun: Some(fun),
        fire: Some(fire),
        started: false,
        incoming: 0,
      }),
    }
  }

  /// Personal completion signal, fired exactly once when the consumer
  /// function returns.
  pub(crate) fn done(&self) -> DoneSignal {
    self.done.clone()
  }

  pub(crate) fn check(&self, slot: &str) -> Vec<StructureProblem> {
    if self.state.lock().unwrap().incoming == 0 {
      return vec![StructureProblem::new(slot, StructureProblemKind::NoInput)];
    }
    Vec::new()
  }
}

impl<I: Clone + Send + 'static> InletNode<I> for FinalNode<I> {
  fn is_started(&self) -> bool {
    self.state.lock().unwrap().started
  }

  fn start(&self) {
    let (fun, fire) = {
      let mut state = self.state.lock().unwrap();
      if state.started {
        return;
      }
      state.started = true;
      let fun = state
        .fun
        .take()
        .expect("final stage function taken before start");
      let fire = state
        .fire
        .take()
        .expect("final done signal taken before start");
      (fun, fire)
    };
    trace!("starting final node");
    let input = self.joiner.receiver();
    tokio::spawn(async move {
      fun(input).await;
      let _ = fire.send(());
    });
  }

  fn input_joiners(&self) -> Vec<Joiner<I>> {
    vec![self.joiner.clone()]
  }

  fn note_incoming(&self) {
    self.state.lock().unwrap().incoming += 1;
  }
}
