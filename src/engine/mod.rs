//! Execution engine.
//!
//! - [`core`]: [`AiCore`], the per-core state every operation runs against
//! - [`fault`]: faults recorded by the optional debug checks

pub mod core;
pub mod fault;

pub use self::core::{AiCore, CoreOptions};
pub use fault::Fault;
