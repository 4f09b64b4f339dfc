use std::fmt;
use thiserror::Error;

/// Boxed error returned by provider thunks. The original value is kept
/// intact inside [`BuildError::Provider`] so callers can match on it
/// with `downcast_ref`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error returned by [`Builder::build`](crate::Builder::build).
#[derive(Debug, Error)]
pub enum BuildError {
  /// A provider thunk failed. The build is aborted at the first failing
  /// provider and the original error value is carried unchanged.
  #[error("node provider failed: {0}")]
  Provider(#[source] BoxError),
  /// The declared graph cannot run: one or more slots are missing
  /// connections, or a bypass chain never reaches a real node.
  #[error("invalid pipeline structure: {0}")]
  Structure(StructureProblems),
}

/// The full list of structural problems found during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureProblems(pub Vec<StructureProblem>);

impl fmt::Display for StructureProblems {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, problem) in self.0.iter().enumerate() {
      if i > 0 {
        write!(f, "; ")?;
      }
      write!(f, "{problem}")?;
    }
    Ok(())
  }
}

/// One offending slot, identified by kind, declaration index and element
/// type names (e.g. `middle #1 (i32 -> alloc::string::String)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureProblem {
  pub slot: String,
  pub kind: StructureProblemKind,
}

impl StructureProblem {
  pub(crate) fn new(slot: &str, kind: StructureProblemKind) -> Self {
    Self {
      slot: slot.to_string(),
      kind,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureProblemKind {
  /// A middle or final slot that no upstream node sends to.
  NoInput,
  /// A start or middle slot whose output reaches no real node.
  NoOutput,
  /// A bypass whose downstream chain contains only other bypasses.
  BypassDeadEnd,
}

impl fmt::Display for StructureProblem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.kind {
      StructureProblemKind::NoInput => write!(f, "{} has no input connections", self.slot),
      StructureProblemKind::NoOutput => write!(f, "{} has no output connections", self.slot),
      StructureProblemKind::BypassDeadEnd => write!(f, "{} bypasses into no real node", self.slot),
    }
  }
}
