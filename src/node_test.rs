use crate::error::StructureProblemKind;
use crate::node::{BypassNode, FinalNode, InletNode, MiddleNode};
use crate::stage::{FinalStage, MiddleKind, MiddleStage};
use crate::Inlet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};

const TIMEOUT: Duration = Duration::from_secs(2);

fn collecting_final(into: Arc<Mutex<Vec<i32>>>) -> FinalNode<i32> {
  let stage = FinalStage::new(move |input| async move {
    while let Some(value) = input.recv().await {
      into.lock().await.push(value);
    }
  });
  FinalNode::new(stage.fun, 0)
}

fn doubling_middle() -> MiddleNode<i32, i32> {
  let stage = MiddleStage::new(|input, out| async move {
    while let Some(value) = input.recv().await {
      out.send(value * 2).await;
    }
  });
  match stage.kind {
    MiddleKind::Transform(fun) => MiddleNode::new(fun, 0),
    MiddleKind::Bypass(_) => unreachable!("a transform stage was declared"),
  }
}

fn bypass_node() -> BypassNode<i32, i32> {
  match crate::bypass::<i32>().kind {
    MiddleKind::Bypass(cast) => BypassNode::new(cast),
    MiddleKind::Transform(_) => unreachable!("bypass() builds a bypass stage"),
  }
}

#[tokio::test]
async fn middle_start_is_idempotent() {
  let collected = Arc::new(Mutex::new(Vec::new()));
  let sink = Arc::new(collecting_final(collected.clone()));
  let middle = doubling_middle();
  middle.push_out(sink.clone());

  assert!(!middle.is_started());
  middle.start();
  assert!(middle.is_started());
  // a second upstream resolving the same node must not respawn it
  middle.start();

  let producer = middle.input_joiners().remove(0).acquire_sender();
  tokio::spawn(async move {
    for value in [1, 2, 3] {
      producer.send(value).await;
    }
  });

  timeout(TIMEOUT, sink.done())
    .await
    .expect("sink never finished");
  assert_eq!(*collected.lock().await, vec![2, 4, 6]);
}

#[tokio::test]
async fn bypass_chains_resolve_to_the_real_joiner() {
  let collected = Arc::new(Mutex::new(Vec::new()));
  let sink = Arc::new(collecting_final(collected.clone()));
  let inner = Arc::new(bypass_node());
  let outer = Arc::new(bypass_node());
  inner.push_out(sink.clone());
  outer.push_out(inner.clone());

  // both hops collapse into the sink's own joiner
  let joiners = outer.input_joiners();
  assert_eq!(joiners.len(), 1);

  assert!(!outer.is_started());
  outer.start();
  assert!(outer.is_started());
  assert!(sink.is_started());

  let producer = joiners[0].acquire_sender();
  tokio::spawn(async move {
    producer.send(7).await;
  });
  timeout(TIMEOUT, sink.done())
    .await
    .expect("sink never finished");
  assert_eq!(*collected.lock().await, vec![7]);
}

#[test]
fn unwired_nodes_report_their_problems() {
  let middle = doubling_middle();
  let problems = middle.check("middle #0 (i32 -> i32)");
  let kinds: Vec<_> = problems.iter().map(|p| p.kind).collect();
  assert!(kinds.contains(&StructureProblemKind::NoInput));
  assert!(kinds.contains(&StructureProblemKind::NoOutput));
  assert!(problems.iter().all(|p| p.slot == "middle #0 (i32 -> i32)"));

  let sink = Arc::new(collecting_final(Arc::new(Mutex::new(Vec::new()))));
  middle.note_incoming();
  middle.push_out(sink);
  assert!(middle.check("middle #0 (i32 -> i32)").is_empty());
}

#[test]
fn a_dead_end_bypass_is_reported() {
  let lonely = bypass_node();
  lonely.note_incoming();
  let kinds: Vec<_> = lonely.check("middle #0").iter().map(|p| p.kind).collect();
  assert_eq!(kinds, vec![StructureProblemKind::NoOutput]);

  let chained = bypass_node();
  chained.note_incoming();
  chained.push_out(Arc::new(bypass_node()));
  let kinds: Vec<_> = chained.check("middle #1").iter().map(|p| p.kind).collect();
  assert_eq!(kinds, vec![StructureProblemKind::BypassDeadEnd]);
}

#[test]
#[should_panic(expected = "Middle<i32, i32> slot used before a stage was registered")]
fn wiring_an_empty_slot_panics() {
  let empty = crate::Middle::<i32, i32>::default();
  let _ = empty.inlet_node();
}
