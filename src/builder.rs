//! # Builder
//!
//! The builder collects stage declarations for the typed slots of a
//! user-supplied node map, then instantiates and wires the whole graph
//! in one [`Builder::build`] call:
//!
//! 1. Every declaration is applied in order. Provider thunks run here,
//!    not when they are added, so declaration order never matters to
//!    them; the first provider error aborts the build and is returned
//!    unchanged.
//! 2. The map's [`NodesMap::connect`] wires the slots with `send_to`.
//! 3. The wired graph is validated: middles and finals need at least
//!    one upstream, starts and middles need at least one downstream
//!    that resolves (through any bypasses) to a real node.
//!
//! `build` consumes the builder, so a builder cannot be reused after
//! it has produced a runner or an error.
//!
//! Slot accessors are plain functions from the map to one of its
//! fields, the same shape for every declaration:
//!
//! ```rust,ignore
//! builder.add_middle(|m: &mut MyMap| &mut m.doubler, |input, out| async move {
//!   while let Some(n) = input.recv().await {
//!     out.send(n * 2).await;
//!   }
//! });
//! ```

use crate::channel::{Receiver, Sender};
use crate::error::{BoxError, BuildError, StructureProblem, StructureProblems};
use crate::node::{BypassNode, Final, FinalNode, Middle, MiddleNode, MiddleSlot, Start, StartNode};
use crate::runner::{DoneSignal, GraphStart, Runner};
use crate::stage::{FinalStage, MiddleKind, MiddleStage, StartStage};
use std::any::type_name;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// A user-declared record of typed node slots plus the wiring between
/// them. `connect` is invoked once during [`Builder::build`], after
/// every slot has been filled.
pub trait NodesMap {
  fn connect(&mut self);
}

/// Collects node declarations for the slots of `M` and builds a
/// [`Runner`].
pub struct Builder<M: NodesMap + 'static> {
  map: M,
  default_buffer_len: usize,
  fills: Vec<Fill<M>>,
  declared: Declared,
}

#[derive(Default)]
struct Declared {
  starts: usize,
  middles: usize,
  finals: usize,
}

struct Registry {
  starts: Vec<Arc<dyn GraphStart>>,
  finals: Vec<DoneSignal>,
  checks: Vec<Box<dyn Fn() -> Vec<StructureProblem>>>,
}

type Fill<M> = Box<dyn FnOnce(&mut M, usize, &mut Registry) -> Result<(), BuildError>>;

impl<M: NodesMap + 'static> Builder<M> {
  pub fn new(map: M) -> Self {
    Self {
      map,
      default_buffer_len: 0,
      fills: Vec::new(),
      declared: Declared::default(),
    }
  }

  /// Sets the default capacity of every input channel created at build
  /// time. Zero, the default, makes channels rendezvous: a send
  /// completes only when the receiving stage takes the value.
  /// Individual stages may override this with `with_buffer_len`.
  pub fn with_channel_buffer_len(mut self, buffer_len: usize) -> Self {
    self.default_buffer_len = buffer_len;
    self
  }

  /// Declares a source from a single producer function. See
  /// [`add_start_stage`](Self::add_start_stage) for multi-producer
  /// nodes and placeholders.
  pub fn add_start<O, F, Fut>(&mut self, slot: fn(&mut M) -> &mut Start<O>, fun: F)
  where
    O: Clone + Send + 'static,
    F: FnOnce(Sender<O>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self.add_start_stage(slot, StartStage::new(fun));
  }

  /// Declares a source from an explicit stage value, e.g.
  /// [`StartStage::new(f).and(g)`](StartStage::and) or
  /// [`ignore_start()`](crate::ignore_start).
  pub fn add_start_stage<O>(&mut self, slot: fn(&mut M) -> &mut Start<O>, stage: StartStage<O>)
  where
    O: Clone + Send + 'static,
  {
    self.add_start_provider(slot, move || Ok(stage));
  }

  /// Declares a source through a provider thunk, evaluated at build
  /// time. A provider error aborts the build.
  pub fn add_start_provider<O, P>(&mut self, slot: fn(&mut M) -> &mut Start<O>, provider: P)
  where
    O: Clone + Send + 'static,
    P: FnOnce() -> Result<StartStage<O>, BoxError> + 'static,
  {
    let label = format!("start #{} ({})", self.declared.starts, type_name::<O>());
    self.declared.starts += 1;
    self.fills.push(Box::new(move |map, _buffer_len, registry| {
      let stage = provider().map_err(BuildError::Provider)?;
      let node = Arc::new(StartNode::new(stage.funs));
      registry.starts.push(node.clone());
      let checked = node.clone();
      registry.checks.push(Box::new(move || checked.check(&label)));
      slot(map).set(node);
      Ok(())
    }));
  }

  /// Declares a transform from a single function.
  pub fn add_middle<I, O, F, Fut>(&mut self, slot: fn(&mut M) -> &mut Middle<I, O>, fun: F)
  where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
    F: FnOnce(Receiver<I>, Sender<O>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self.add_middle_stage(slot, MiddleStage::new(fun));
  }

  /// Declares a transform from an explicit stage value, e.g.
  /// [`bypass()`](crate::bypass) or a stage carrying a buffer override.
  pub fn add_middle_stage<I, O>(
    &mut self,
    slot: fn(&mut M) -> &mut Middle<I, O>,
    stage: MiddleStage<I, O>,
  ) where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
  {
    self.add_middle_provider(slot, move || Ok(stage));
  }

  /// Declares a transform through a provider thunk, evaluated at build
  /// time. A provider error aborts the build.
  pub fn add_middle_provider<I, O, P>(&mut self, slot: fn(&mut M) -> &mut Middle<I, O>, provider: P)
  where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
    P: FnOnce() -> Result<MiddleStage<I, O>, BoxError> + 'static,
  {
    let label = format!(
      "middle #{} ({} -> {})",
      self.declared.middles,
      type_name::<I>(),
      type_name::<O>()
    );
    self.declared.middles += 1;
    self.fills.push(Box::new(move |map, buffer_len, registry| {
      let stage = provider().map_err(BuildError::Provider)?;
      let buffer_len = stage.buffer_len.unwrap_or(buffer_len);
      let middle_slot = match stage.kind {
        MiddleKind::Transform(fun) => {
          MiddleSlot::Transform(Arc::new(MiddleNode::new(fun, buffer_len)))
        }
        MiddleKind::Bypass(cast) => MiddleSlot::Bypass(Arc::new(BypassNode::new(cast))),
      };
      let checked = middle_slot.clone();
      registry.checks.push(Box::new(move || match &checked {
        MiddleSlot::Transform(node) => node.check(&label),
        MiddleSlot::Bypass(node) => node.check(&label),
      }));
      slot(map).set(middle_slot);
      Ok(())
    }));
  }

  /// Declares a sink from a single consumer function.
  pub fn add_final<I, F, Fut>(&mut self, slot: fn(&mut M) -> &mut Final<I>, fun: F)
  where
    I: Clone + Send + 'static,
    F: FnOnce(Receiver<I>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self.add_final_stage(slot, FinalStage::new(fun));
  }

  /// Declares a sink from an explicit stage value, e.g.
  /// [`ignore_final()`](crate::ignore_final).
  pub fn add_final_stage<I>(&mut self, slot: fn(&mut M) -> &mut Final<I>, stage: FinalStage<I>)
  where
    I: Clone + Send + 'static,
  {
    self.add_final_provider(slot, move || Ok(stage));
  }

  /// Declares a sink through a provider thunk, evaluated at build time.
  /// A provider error aborts the build.
  pub fn add_final_provider<I, P>(&mut self, slot: fn(&mut M) -> &mut Final<I>, provider: P)
  where
    I: Clone + Send + 'static,
    P: FnOnce() -> Result<FinalStage<I>, BoxError> + 'static,
  {
    let label = format!("final #{} ({})", self.declared.finals, type_name::<I>());
    self.declared.finals += 1;
    self.fills.push(Box::new(move |map, buffer_len, registry| {
      let stage = provider().map_err(BuildError::Provider)?;
      let buffer_len = stage.buffer_len.unwrap_or(buffer_len);
      let node = Arc::new(FinalNode::new(stage.fun, buffer_len));
      registry.finals.push(node.done());
      let checked = node.clone();
      registry.checks.push(Box::new(move || checked.check(&label)));
      slot(map).set(node);
      Ok(())
    }));
  }

  /// Instantiates every declared stage, wires the map and validates the
  /// result. No stage task is spawned before this returns `Ok`.
  pub fn build(self) -> Result<Runner, BuildError> {
    let Builder {
      mut map,
      default_buffer_len,
      fills,
      ..
    } = self;
    let mut registry = Registry {
      starts: Vec::new(),
      finals: Vec::new(),
      checks: Vec::new(),
    };
    for fill in fills {
      fill(&mut map, default_buffer_len, &mut registry)?;
    }
    map.connect();
    let problems: Vec<StructureProblem> = registry.checks.iter().flat_map(|check| check()).collect();
    if !problems.is_empty() {
      return Err(BuildError::Structure(StructureProblems(problems)));
    }
    debug!(
      starts = registry.starts.len(),
      finals = registry.finals.len(),
      "pipeline graph built"
    );
    Ok(Runner::new(registry.starts, registry.finals))
  }
}
