#![doc = include_str!("../README.md")]

#[cfg(test)]
mod node_test;

pub mod builder;
pub mod channel;
pub mod connect;
pub mod error;
pub mod node;
pub mod runner;
pub mod stage;

pub use builder::*;
pub use channel::*;
pub use connect::*;
pub use error::*;
pub use node::*;
pub use runner::*;
pub use stage::*;
