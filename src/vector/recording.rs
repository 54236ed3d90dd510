//! Recording backend for dispatch inspection.
//!
//! Wraps another backend, forwards every call, and keeps a log of each
//! issue together with the mask in force. Tests use the log to check
//! hardware legality of a dispatch plan after the fact.

use std::fmt;
use std::sync::Arc;

use super::backend::InstructionBackend;
use super::instr::VectorInstr;
use super::mask::VectorMask;
use crate::device::arch_config::ArchConfig;
use crate::device::tier_memory::TierMemory;

/// One recorded issuance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IssueRecord {
    pub instr: VectorInstr,
    pub mask: VectorMask,
}

/// Hardware-legality problems found in a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// Normal-mode issue with a zero repeat count.
    ZeroRepeat { index: usize },
    /// Partial mask enables lanes past the elements of one repeat.
    LaneBeyondRepeat { index: usize, span: usize, epr: usize },
    /// The mask was left partial after the last issue.
    MaskNotRestored,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::ZeroRepeat { index } => write!(f, "issue {} has repeat 0", index),
            Violation::LaneBeyondRepeat { index, span, epr } => {
                write!(f, "issue {} enables {} lanes, repeat holds {}", index, span, epr)
            }
            Violation::MaskNotRestored => write!(f, "mask left partial"),
        }
    }
}

/// Backend wrapper that logs every issue.
pub struct RecordingBackend<B: InstructionBackend> {
    inner: B,
    records: Vec<IssueRecord>,
    mask_writes: u64,
}

impl<B: InstructionBackend> RecordingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            records: Vec::new(),
            mask_writes: 0,
        }
    }

    /// Issues recorded so far.
    pub fn records(&self) -> &[IssueRecord] {
        &self.records
    }

    /// Number of mask register writes.
    pub fn mask_writes(&self) -> u64 {
        self.mask_writes
    }

    /// Forget recorded issues.
    pub fn clear(&mut self) {
        self.records.clear();
        self.mask_writes = 0;
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn into_inner(self) -> B {
        self.inner
    }

    /// Check every recorded issue and the final mask state.
    pub fn violations(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        for (index, rec) in self.records.iter().enumerate() {
            if let VectorMask::Norm(_) = rec.mask {
                if rec.instr.repeat() == 0 {
                    out.push(Violation::ZeroRepeat { index });
                }
                let epr = self.inner.arch().elements_per_repeat(rec.instr.lane_size());
                let span = rec.mask.span();
                if !rec.mask.is_full() && span > epr {
                    out.push(Violation::LaneBeyondRepeat { index, span, epr });
                }
            }
        }
        if !self.inner.mask().is_full() {
            out.push(Violation::MaskNotRestored);
        }
        out
    }
}

impl<B: InstructionBackend> InstructionBackend for RecordingBackend<B> {
    fn arch(&self) -> &Arc<dyn ArchConfig> {
        self.inner.arch()
    }

    fn mask(&self) -> VectorMask {
        self.inner.mask()
    }

    fn set_mask(&mut self, mask: VectorMask) {
        self.mask_writes += 1;
        self.inner.set_mask(mask);
    }

    fn issue(&mut self, instr: &VectorInstr) {
        self.records.push(IssueRecord {
            instr: *instr,
            mask: self.inner.mask(),
        });
        self.inner.issue(instr);
    }

    fn tiers(&self) -> &TierMemory {
        self.inner.tiers()
    }

    fn tiers_mut(&mut self) -> &mut TierMemory {
        self.inner.tiers_mut()
    }

    fn issued(&self) -> u64 {
        self.inner.issued()
    }
}
