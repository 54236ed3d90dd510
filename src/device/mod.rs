//! Device model: hardware generations and the memories they expose.
//!
//! This module provides:
//! - Per-generation configuration (tier sizes, vector width, capabilities)
//! - Hardware constants shared by every generation
//! - Global memory, shared by all cores and ranks
//! - On-chip tier memories with access accounting
//!
//! # Memory Overview
//!
//! ```text
//!              +-------------------------------+
//!              |        Global memory          |
//!              +-------------------------------+
//!                 | MTE2 (load)      ^ MTE3 (store)
//!                 v                  |
//!   +-------+  +-------+  +-------+  +-------+
//!   |  Mat  |->| Left  |  | Right |  |  Vec  |  <- vector unit (V)
//!   +-------+  +-------+  +-------+  +-------+
//!       |  MTE1    \         /
//!       +--------> cube (M) -> Acc
//! ```
//!
//! # Example
//!
//! ```
//! use tile_engine::device::{Arch, ArchConfig, GlobalMemory, Tier};
//!
//! let cfg = Arch::Kirin9030.config();
//! assert_eq!(cfg.tier_size(Tier::Vec), 128 * 1024);
//!
//! let mut gm = GlobalMemory::new();
//! gm.write_slice(0x1000, &[1.0f32, 2.0]);
//! assert_eq!(gm.read_slice::<f32>(0x1000, 2), vec![1.0, 2.0]);
//! ```

pub mod arch_config;
pub mod global_memory;
pub mod hw_spec;
pub mod tier_memory;

pub use arch_config::{Arch, ArchConfig};
pub use global_memory::{GlobalMemory, MemoryError, Traffic};
pub use tier_memory::{Tier, TierMemory};
