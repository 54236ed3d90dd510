//! Cross-pipe ordering.
//!
//! The core runs several independent pipelines. A value written by one
//! is not visible to another until the two synchronize, either through a
//! `set_flag`/`wait_flag` pair or by handing an [`Event`] from the
//! producing operation to the consuming one.
//!
//! - [`pipe`]: pipeline identities
//! - [`flags`]: flag table and per-pipe visibility clocks
//! - [`event`]: one-shot ordering tokens
//! - [`hazard`]: race detection used by debug checks
//! - [`signal`]: memory-based signals for cross-core coordination

pub mod event;
pub mod flags;
pub mod hazard;
pub mod pipe;
pub mod signal;

pub use event::{unwaited_events, Event};
pub use flags::{SyncError, SyncState, SyncStats};
pub use hazard::{HazardTracker, Race, RaceKind, Space};
pub use pipe::Pipe;
pub use signal::{NotifyOp, Signal, WaitCmp};
