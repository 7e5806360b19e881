//! Temporal nearest-neighbour search used to build enhancement context.

pub mod temporal;
pub mod window;

pub use temporal::{TemporalDistance, TimeRange};
pub use window::{ContextCandidate, ContextWindowSearch};
