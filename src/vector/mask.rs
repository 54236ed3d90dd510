//! Vector mask register model.
//!
//! The hardware mask is pipeline-wide state, not an instruction operand:
//! whatever mask is in force when an instruction issues decides which
//! lanes it touches. Two modes exist:
//!
//! - **Normal**: a per-lane bit set; each repeat processes the enabled
//!   lanes of one `REPEAT_BYTE`-wide row segment.
//! - **Count**: the instruction processes exactly `n` consecutive
//!   elements, computing its own repeat count.
//!
//! [`MaskScope`] owns the backend for the duration of one dispatch and
//! restores the full mask when dropped, so no early return or panic can
//! leak a partial mask into the next operation.

use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::device::hw_spec::MASK_LANES;

use super::backend::InstructionBackend;

const WORDS: usize = MASK_LANES / 64;

/// Mask register contents.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum VectorMask {
    /// Per-lane enable bits, lane `i` at bit `i % 64` of word `i / 64`.
    Norm([u64; WORDS]),
    /// Process exactly this many elements.
    Count(u32),
}

impl VectorMask {
    /// All lanes enabled in normal mode.
    pub const FULL: VectorMask = VectorMask::Norm([u64::MAX; WORDS]);

    /// Normal mode with the first `n` lanes enabled.
    pub fn lanes(n: usize) -> Self {
        let mut words = [0u64; WORDS];
        for (w, word) in words.iter_mut().enumerate() {
            let lo = w * 64;
            if n >= lo + 64 {
                *word = u64::MAX;
            } else if n > lo {
                *word = (1u64 << (n - lo)) - 1;
            }
        }
        VectorMask::Norm(words)
    }

    /// Counter mode over `n` elements.
    pub fn count(n: usize) -> Self {
        VectorMask::Count(n as u32)
    }

    /// True if every lane is enabled in normal mode.
    #[inline]
    pub fn is_full(&self) -> bool {
        *self == Self::FULL
    }

    /// Whether `lane` is enabled (normal mode; count mode reports all lanes).
    #[inline]
    pub fn lane_enabled(&self, lane: usize) -> bool {
        match self {
            VectorMask::Norm(words) => lane < MASK_LANES && (words[lane / 64] >> (lane % 64)) & 1 == 1,
            VectorMask::Count(_) => true,
        }
    }

    /// Number of lanes enabled among the first `epr`.
    pub fn active_lanes(&self, epr: usize) -> usize {
        match self {
            VectorMask::Norm(_) => (0..epr).filter(|&l| self.lane_enabled(l)).count(),
            VectorMask::Count(n) => (*n as usize).min(epr),
        }
    }

    /// Highest enabled lane plus one (normal mode).
    pub fn span(&self) -> usize {
        match self {
            VectorMask::Norm(_) => (0..MASK_LANES).rev().find(|&l| self.lane_enabled(l)).map_or(0, |l| l + 1),
            VectorMask::Count(n) => *n as usize,
        }
    }
}

impl Default for VectorMask {
    fn default() -> Self {
        Self::FULL
    }
}

impl fmt::Debug for VectorMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorMask::Norm(_) if self.is_full() => write!(f, "Norm(full)"),
            VectorMask::Norm(w) => write!(f, "Norm({:016x}_{:016x}_{:016x}_{:016x})", w[3], w[2], w[1], w[0]),
            VectorMask::Count(n) => write!(f, "Count({})", n),
        }
    }
}

/// Scoped ownership of the mask register.
///
/// Derefs to the backend. Dropping the scope restores [`VectorMask::FULL`].
pub struct MaskScope<'a, B: InstructionBackend + ?Sized> {
    backend: &'a mut B,
}

impl<'a, B: InstructionBackend + ?Sized> MaskScope<'a, B> {
    pub fn new(backend: &'a mut B) -> Self {
        Self { backend }
    }

    /// Set the mask if it differs from the one in force.
    pub fn set(&mut self, mask: VectorMask) {
        if self.backend.mask() != mask {
            self.backend.set_mask(mask);
        }
    }
}

impl<B: InstructionBackend + ?Sized> Deref for MaskScope<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backend
    }
}

impl<B: InstructionBackend + ?Sized> DerefMut for MaskScope<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.backend
    }
}

impl<B: InstructionBackend + ?Sized> Drop for MaskScope<'_, B> {
    fn drop(&mut self) {
        if !self.backend.mask().is_full() {
            self.backend.set_mask(VectorMask::FULL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lanes() {
        let m = VectorMask::lanes(70);
        assert!(m.lane_enabled(0));
        assert!(m.lane_enabled(69));
        assert!(!m.lane_enabled(70));
        assert_eq!(m.active_lanes(64), 64);
        assert_eq!(m.active_lanes(128), 70);
        assert_eq!(m.span(), 70);
        assert!(VectorMask::lanes(256).is_full());
        assert_eq!(VectorMask::lanes(0).active_lanes(256), 0);
    }

    #[test]
    fn test_count_mode() {
        let m = VectorMask::count(100);
        assert!(!m.is_full());
        assert_eq!(m.active_lanes(64), 64);
        assert_eq!(m.span(), 100);
    }

    #[test]
    fn test_default_is_full() {
        assert!(VectorMask::default().is_full());
        assert_eq!(format!("{:?}", VectorMask::FULL), "Norm(full)");
    }
}
