//! Trace-driven storage cache simulation.
//!
//! A trace declares a set of files and a sequence of byte-range accesses against them.
//! Files are split into fixed-size parts, the unit of cache admission and eviction, and
//! the sequence is replayed against any number of configured cache volumes, each with
//! its own capacity and eviction policy. Per-run hit/miss statistics are gated by
//! configurable warm-up and stop-early predicates.

pub mod access;
pub mod config;
pub mod error;
pub mod io;
pub mod policies;
pub mod reuse;
pub mod selection_tree;
pub mod simulator;
pub mod state;
pub mod stats;
pub mod units;

#[cfg(test)]
mod test;
