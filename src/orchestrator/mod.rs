//! Application-level orchestration utilities.
//!
//! This module owns the sweep lifecycle (template load, run, cancel) and
//! post-sweep processing such as aggregation, cleanup, and exports. CLI layers
//! call into this module to keep responsibilities separated.

mod controller;
mod post_process;

pub(crate) use controller::run_controller;
#[cfg(test)]
pub(crate) use controller::run_controller_until;
pub(crate) use post_process::{process_sweep_completion, ProcessedSweep};
