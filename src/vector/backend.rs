//! Instruction backend capability interface.
//!
//! The dispatcher is the sole caller of a backend. A backend owns the
//! mask register and the tier storage the instructions operate on; each
//! hardware generation (or a recorder wrapping one) supplies one
//! implementation.

use std::sync::Arc;

use super::instr::VectorInstr;
use super::mask::VectorMask;
use crate::device::arch_config::ArchConfig;
use crate::device::tier_memory::TierMemory;

/// One-function-per-opcode-class vector instruction layer.
pub trait InstructionBackend {
    /// Parameters of the hardware generation.
    fn arch(&self) -> &Arc<dyn ArchConfig>;

    /// Mask register contents.
    fn mask(&self) -> VectorMask;

    /// Replace the mask register contents.
    fn set_mask(&mut self, mask: VectorMask);

    /// Execute one instruction under the current mask.
    fn issue(&mut self, instr: &VectorInstr);

    /// On-chip storage.
    fn tiers(&self) -> &TierMemory;

    /// Mutable on-chip storage (transfers and scalar accesses).
    fn tiers_mut(&mut self) -> &mut TierMemory;

    /// Instructions issued since construction.
    fn issued(&self) -> u64;
}
