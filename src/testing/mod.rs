//! Test harness for checking tile operations end to end.
//!
//! This module provides:
//! - Golden-output comparison with per-type tolerance
//! - TOML manifests describing single-operation cases
//! - Built-in scenarios run by the `tile-engine` binary
//!
//! # Usage
//!
//! ```bash
//! tile-engine manifest cases/tadd_partial.toml
//! ```

pub mod golden;
pub mod manifest;
pub mod scenarios;

pub use golden::{compare, compare_bits, compare_global, GoldenReport, Mismatch, Tolerance};
pub use manifest::{CaseManifest, CaseResult, ManifestError, ManifestRunner};
pub use scenarios::{run_all, ScenarioResult};
