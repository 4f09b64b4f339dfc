use pipeweave::{Builder, BuildError, Final, Middle, NodesMap, Start};
use pipeweave::StructureProblemKind;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

macro_rules! provider_error {
  ($name:ident) => {
    #[derive(Debug, PartialEq)]
    struct $name;

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", stringify!($name))
      }
    }

    impl std::error::Error for $name {}
  };
}

provider_error!(StartError);
provider_error!(MidError);
provider_error!(FinalError);

#[derive(Default)]
struct LinearGraph {
  source: Start<i32>,
  mid: Middle<i32, i32>,
  sink: Final<i32>,
}

impl NodesMap for LinearGraph {
  fn connect(&mut self) {
    self.source.send_to(&self.mid);
    self.mid.send_to(&self.sink);
  }
}

fn assert_provider_error<E: std::error::Error + 'static>(err: BuildError) {
  match err {
    BuildError::Provider(source) => {
      assert!(source.is::<E>(), "provider error lost its identity: {source}")
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[tokio::test]
async fn a_failing_start_provider_aborts_the_build() {
  let mut builder = Builder::new(LinearGraph::default());
  builder.add_start_provider(|m: &mut LinearGraph| &mut m.source, || Err(Box::new(StartError)));
  builder.add_middle(|m: &mut LinearGraph| &mut m.mid, |input, out| async move {
    while let Some(n) = input.recv().await {
      out.send(n).await;
    }
  });
  builder.add_final(|m: &mut LinearGraph| &mut m.sink, |input| async move {
    while input.recv().await.is_some() {}
  });

  assert_provider_error::<StartError>(builder.build().err().expect("build must fail"));
}

#[tokio::test]
async fn a_failing_middle_provider_aborts_the_build() {
  let mut builder = Builder::new(LinearGraph::default());
  builder.add_start(|m: &mut LinearGraph| &mut m.source, |out| async move {
    out.send(1).await;
  });
  builder.add_middle_provider(|m: &mut LinearGraph| &mut m.mid, || Err(Box::new(MidError)));
  builder.add_final(|m: &mut LinearGraph| &mut m.sink, |input| async move {
    while input.recv().await.is_some() {}
  });

  assert_provider_error::<MidError>(builder.build().err().expect("build must fail"));
}

#[tokio::test]
async fn a_failing_final_provider_aborts_the_build() {
  let mut builder = Builder::new(LinearGraph::default());
  builder.add_start(|m: &mut LinearGraph| &mut m.source, |out| async move {
    out.send(1).await;
  });
  builder.add_middle(|m: &mut LinearGraph| &mut m.mid, |input, out| async move {
    while let Some(n) = input.recv().await {
      out.send(n).await;
    }
  });
  builder.add_final_provider(|m: &mut LinearGraph| &mut m.sink, || Err(Box::new(FinalError)));

  assert_provider_error::<FinalError>(builder.build().err().expect("build must fail"));
}

#[tokio::test]
async fn providers_after_the_first_failure_are_not_evaluated() {
  let evaluated = Arc::new(AtomicBool::new(false));
  let mut builder = Builder::new(LinearGraph::default());
  builder.add_start(|m: &mut LinearGraph| &mut m.source, |out| async move {
    out.send(1).await;
  });
  builder.add_middle_provider(|m: &mut LinearGraph| &mut m.mid, || Err(Box::new(MidError)));
  let reached = evaluated.clone();
  builder.add_final_provider(|m: &mut LinearGraph| &mut m.sink, move || {
    reached.store(true, Ordering::SeqCst);
    Ok(pipeweave::ignore_final::<i32>())
  });

  assert_provider_error::<MidError>(builder.build().err().expect("build must fail"));
  assert!(!evaluated.load(Ordering::SeqCst));
}

#[derive(Default)]
struct DanglingGraph {
  source: Start<i32>,
  orphan: Middle<i32, i32>,
  sink: Final<i32>,
}

impl NodesMap for DanglingGraph {
  fn connect(&mut self) {
    // the orphan middle is declared but never wired
    self.source.send_to(&self.sink);
  }
}

#[tokio::test]
async fn an_unwired_middle_fails_the_build_naming_the_slot() {
  let mut builder = Builder::new(DanglingGraph::default());
  builder.add_start(|m: &mut DanglingGraph| &mut m.source, |out| async move {
    out.send(1).await;
  });
  builder.add_middle(|m: &mut DanglingGraph| &mut m.orphan, |input, out| async move {
    while let Some(n) = input.recv().await {
      out.send(n).await;
    }
  });
  builder.add_final(|m: &mut DanglingGraph| &mut m.sink, |input| async move {
    while input.recv().await.is_some() {}
  });

  let err = builder.build().err().expect("build must fail");
  let problems = match err {
    BuildError::Structure(problems) => problems.0,
    other => panic!("unexpected error: {other}"),
  };
  assert!(problems
    .iter()
    .any(|p| p.slot == "middle #0 (i32 -> i32)" && p.kind == StructureProblemKind::NoInput));
  assert!(problems
    .iter()
    .any(|p| p.slot == "middle #0 (i32 -> i32)" && p.kind == StructureProblemKind::NoOutput));
}

#[derive(Default)]
struct LonelyStart {
  source: Start<i32>,
}

impl NodesMap for LonelyStart {
  fn connect(&mut self) {}
}

#[tokio::test]
async fn a_start_without_outputs_fails_the_build() {
  let mut builder = Builder::new(LonelyStart::default());
  builder.add_start(|m: &mut LonelyStart| &mut m.source, |out| async move {
    out.send(1).await;
  });

  let err = builder.build().err().expect("build must fail");
  match err {
    BuildError::Structure(problems) => {
      assert_eq!(problems.0.len(), 1);
      assert_eq!(problems.0[0].slot, "start #0 (i32)");
      assert_eq!(problems.0[0].kind, StructureProblemKind::NoOutput);
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[derive(Default)]
struct SpareFinal {
  source: Start<i32>,
  sink: Final<i32>,
  spare: Final<i32>,
}

impl NodesMap for SpareFinal {
  fn connect(&mut self) {
    self.source.send_to(&self.sink);
  }
}

#[tokio::test]
async fn a_final_without_inputs_fails_the_build() {
  let mut builder = Builder::new(SpareFinal::default());
  builder.add_start(|m: &mut SpareFinal| &mut m.source, |out| async move {
    out.send(1).await;
  });
  builder.add_final(|m: &mut SpareFinal| &mut m.sink, |input| async move {
    while input.recv().await.is_some() {}
  });
  builder.add_final(|m: &mut SpareFinal| &mut m.spare, |input| async move {
    while input.recv().await.is_some() {}
  });

  let err = builder.build().err().expect("build must fail");
  match err {
    BuildError::Structure(problems) => {
      assert_eq!(problems.0.len(), 1);
      assert_eq!(problems.0[0].slot, "final #1 (i32)");
      assert_eq!(problems.0[0].kind, StructureProblemKind::NoInput);
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[tokio::test]
async fn structure_errors_render_with_every_slot() {
  let mut builder = Builder::new(DanglingGraph::default());
  builder.add_start(|m: &mut DanglingGraph| &mut m.source, |out| async move {
    out.send(1).await;
  });
  builder.add_middle(|m: &mut DanglingGraph| &mut m.orphan, |input, out| async move {
    while let Some(n) = input.recv().await {
      out.send(n).await;
    }
  });
  builder.add_final(|m: &mut DanglingGraph| &mut m.sink, |input| async move {
    while input.recv().await.is_some() {}
  });

  let rendered = builder.build().err().expect("build must fail").to_string();
  assert!(rendered.contains("invalid pipeline structure"));
  assert!(rendered.contains("middle #0 (i32 -> i32)"));
}
