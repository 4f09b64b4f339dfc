//! Fan-in and fan-out connectors.
//!
//! A [`Joiner`] owns a node's input: any number of producers acquire
//! sender handles against it and their items are merged into a single
//! receive stream. A [`Forker`] owns a node's output: every produced
//! item is duplicated to each downstream joiner in declaration order.
//! Between them they implement close propagation, so a graph shuts
//! down on its own once every source function has returned.

pub mod forker;
pub mod joiner;

pub use forker::*;
pub use joiner::*;
