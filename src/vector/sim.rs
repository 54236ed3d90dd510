//! Functional simulator backend.
//!
//! Executes [`VectorInstr`]s against a [`TierMemory`] one repeat at a
//! time: every enabled lane of a repeat is read before any of its results
//! are written, matching the hardware's register-staged datapath.

use std::sync::Arc;

use super::alu;
use super::backend::InstructionBackend;
use super::instr::{Operand, Rhs, VectorInstr};
use super::mask::VectorMask;
use crate::device::arch_config::ArchConfig;
use crate::device::tier_memory::TierMemory;
use crate::tile::dtype::ElementType;

/// Lanes of one repeat selected by the mask.
struct RepeatLanes {
    repeat: usize,
    lanes: Vec<usize>,
}

/// Functional model of one core's vector unit.
#[derive(Debug, Clone)]
pub struct SimBackend {
    arch: Arc<dyn ArchConfig>,
    tiers: TierMemory,
    mask: VectorMask,
    issued: u64,
}

impl SimBackend {
    /// Create a backend with zeroed tiers sized for `arch`.
    pub fn new(arch: Arc<dyn ArchConfig>) -> Self {
        Self {
            tiers: TierMemory::new(arch.clone()),
            arch,
            mask: VectorMask::FULL,
            issued: 0,
        }
    }

    /// Enabled lanes grouped per repeat.
    fn repeat_lanes(&self, epr: usize, repeat: u8) -> Vec<RepeatLanes> {
        match self.mask {
            VectorMask::Norm(_) => {
                let lanes: Vec<usize> = (0..epr).filter(|&i| self.mask.lane_enabled(i)).collect();
                if lanes.is_empty() {
                    return Vec::new();
                }
                (0..repeat as usize)
                    .map(|r| RepeatLanes {
                        repeat: r,
                        lanes: lanes.clone(),
                    })
                    .collect()
            }
            // Counter mode derives its own repeat count.
            VectorMask::Count(n) => {
                let n = n as usize;
                let repeats = n.div_ceil(epr);
                (0..repeats)
                    .map(|r| RepeatLanes {
                        repeat: r,
                        lanes: (0..epr.min(n - r * epr)).collect(),
                    })
                    .collect()
            }
        }
    }

    fn read(&mut self, op: &Operand, repeat: usize, lane: usize, dtype: ElementType) -> u64 {
        let addr = op.lane_addr(repeat, lane, dtype.size());
        self.tiers.read_elem(op.tier, addr, dtype)
    }

    fn write(&mut self, op: &Operand, repeat: usize, lane: usize, dtype: ElementType, bits: u64) {
        let addr = op.lane_addr(repeat, lane, dtype.size());
        self.tiers.write_elem(op.tier, addr, dtype, bits);
    }

    fn read_bit(&mut self, op: &Operand, repeat: usize, lane: usize) -> bool {
        let (addr, bit) = op.bit_addr(repeat, lane);
        let byte = self.tiers.read_elem(op.tier, addr, ElementType::U8);
        (byte >> bit) & 1 == 1
    }

    fn write_bit(&mut self, op: &Operand, repeat: usize, lane: usize, value: bool) {
        let (addr, bit) = op.bit_addr(repeat, lane);
        let byte = self.tiers.read_elem(op.tier, addr, ElementType::U8);
        let byte = if value { byte | (1 << bit) } else { byte & !(1 << bit) };
        self.tiers.write_elem(op.tier, addr, ElementType::U8, byte);
    }

    fn rhs(&mut self, rhs: &Rhs, repeat: usize, lane: usize, dtype: ElementType) -> u64 {
        match rhs {
            Rhs::Vector(op) => self.read(op, repeat, lane, dtype),
            Rhs::Scalar(s) => dtype.encode(*s),
        }
    }

    /// Evaluate `f` on every enabled lane, then write results to `dst`.
    fn map_lanes(
        &mut self,
        dtype: ElementType,
        dst: &Operand,
        repeat: u8,
        mut f: impl FnMut(&mut Self, usize, usize) -> u64,
    ) {
        let epr = self.arch.elements_per_repeat(dtype.size());
        for group in self.repeat_lanes(epr, repeat) {
            let results: Vec<u64> = group.lanes.iter().map(|&i| f(self, group.repeat, i)).collect();
            for (&i, bits) in group.lanes.iter().zip(results) {
                self.write(dst, group.repeat, i, dtype, bits);
            }
        }
    }
}

impl InstructionBackend for SimBackend {
    fn arch(&self) -> &Arc<dyn ArchConfig> {
        &self.arch
    }

    fn mask(&self) -> VectorMask {
        self.mask
    }

    fn set_mask(&mut self, mask: VectorMask) {
        self.mask = mask;
    }

    fn issue(&mut self, instr: &VectorInstr) {
        self.issued += 1;
        log::trace!("{} rpt={} mask={:?} {:?}", instr.mnemonic(), instr.repeat(), self.mask, instr);
        match *instr {
            VectorInstr::Binary {
                op,
                dtype,
                dst,
                src0,
                src1,
                repeat,
            } => self.map_lanes(dtype, &dst, repeat, |s, r, i| {
                let a = s.read(&src0, r, i, dtype);
                let b = s.read(&src1, r, i, dtype);
                alu::binary(op, dtype, a, b)
            }),
            VectorInstr::BinaryScalar {
                op,
                dtype,
                dst,
                src,
                scalar,
                repeat,
            } => self.map_lanes(dtype, &dst, repeat, |s, r, i| {
                let a = s.read(&src, r, i, dtype);
                alu::binary_scalar(op, dtype, a, scalar)
            }),
            VectorInstr::Unary {
                op,
                dtype,
                dst,
                src,
                repeat,
            } => self.map_lanes(dtype, &dst, repeat, |s, r, i| {
                let a = s.read(&src, r, i, dtype);
                alu::unary(op, dtype, a)
            }),
            VectorInstr::Duplicate {
                dtype,
                dst,
                scalar,
                repeat,
            } => {
                let bits = dtype.encode(scalar);
                self.map_lanes(dtype, &dst, repeat, |_, _, _| bits)
            }
            VectorInstr::Reduce {
                op,
                dtype,
                dst,
                src,
                repeat,
            } => {
                let size = dtype.size();
                let epr = self.arch.elements_per_repeat(size);
                let combine = op.combine();
                for group in self.repeat_lanes(epr, repeat) {
                    let mut acc: Option<u64> = None;
                    for &i in &group.lanes {
                        let v = self.read(&src, group.repeat, i, dtype);
                        acc = Some(match acc {
                            None => v,
                            Some(a) => alu::binary(combine, dtype, a, v),
                        });
                    }
                    if let Some(bits) = acc {
                        let addr = dst.addr + (group.repeat * dst.repeat_stride as usize * size) as u64;
                        self.tiers.write_elem(dst.tier, addr, dtype, bits);
                    }
                }
            }
            VectorInstr::Compare {
                mode,
                dtype,
                dst,
                src0,
                src1,
                repeat,
            } => {
                let epr = self.arch.elements_per_repeat(dtype.size());
                for group in self.repeat_lanes(epr, repeat) {
                    let bits: Vec<bool> = group
                        .lanes
                        .iter()
                        .map(|&i| {
                            let a = self.read(&src0, group.repeat, i, dtype);
                            let b = self.rhs(&src1, group.repeat, i, dtype);
                            alu::compare(mode, dtype, a, b)
                        })
                        .collect();
                    for (&i, bit) in group.lanes.iter().zip(bits) {
                        self.write_bit(&dst, group.repeat, i, bit);
                    }
                }
            }
            VectorInstr::Select {
                dtype,
                dst,
                mask,
                src0,
                src1,
                repeat,
            } => self.map_lanes(dtype, &dst, repeat, |s, r, i| {
                if s.read_bit(&mask, r, i) {
                    s.read(&src0, r, i, dtype)
                } else {
                    s.rhs(&src1, r, i, dtype)
                }
            }),
            VectorInstr::Convert {
                dst_type,
                src_type,
                round,
                dst,
                src,
                repeat,
            } => {
                let epr = self.arch.elements_per_repeat(instr.lane_size());
                for group in self.repeat_lanes(epr, repeat) {
                    let results: Vec<u64> = group
                        .lanes
                        .iter()
                        .map(|&i| {
                            let v = self.read(&src, group.repeat, i, src_type);
                            alu::convert(dst_type, src_type, round, v)
                        })
                        .collect();
                    for (&i, bits) in group.lanes.iter().zip(results) {
                        self.write(&dst, group.repeat, i, dst_type, bits);
                    }
                }
            }
        }
    }

    fn tiers(&self) -> &TierMemory {
        &self.tiers
    }

    fn tiers_mut(&mut self) -> &mut TierMemory {
        &mut self.tiers
    }

    fn issued(&self) -> u64 {
        self.issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::arch_config::Arch;
    use crate::device::tier_memory::Tier;
    use crate::tile::dtype::Scalar;
    use crate::vector::instr::{BinaryOp, CmpMode, ReduceOp};

    fn backend() -> SimBackend {
        SimBackend::new(Arch::A2A3.config())
    }

    fn fill_f32(b: &mut SimBackend, addr: u64, values: impl IntoIterator<Item = f32>) {
        for (i, v) in values.into_iter().enumerate() {
            b.tiers_mut()
                .write_elem(Tier::Vec, addr + 4 * i as u64, ElementType::F32, v.to_bits() as u64);
        }
    }

    fn read_f32(b: &mut SimBackend, addr: u64) -> f32 {
        f32::from_bits(b.tiers_mut().read_elem(Tier::Vec, addr, ElementType::F32) as u32)
    }

    #[test]
    fn test_binary_full_mask_two_repeats() {
        let mut b = backend();
        fill_f32(&mut b, 0, (0..128).map(|i| i as f32));
        fill_f32(&mut b, 0x1000, (0..128).map(|_| 1.0));
        b.issue(&VectorInstr::Binary {
            op: BinaryOp::Add,
            dtype: ElementType::F32,
            dst: Operand::new(Tier::Vec, 0x2000, 8),
            src0: Operand::new(Tier::Vec, 0, 8),
            src1: Operand::new(Tier::Vec, 0x1000, 8),
            repeat: 2,
        });
        assert_eq!(read_f32(&mut b, 0x2000), 1.0);
        assert_eq!(read_f32(&mut b, 0x2000 + 4 * 127), 128.0);
        assert_eq!(b.issued(), 1);
    }

    #[test]
    fn test_partial_mask_leaves_lanes_untouched() {
        let mut b = backend();
        fill_f32(&mut b, 0x100, (0..64).map(|_| -1.0));
        b.set_mask(VectorMask::lanes(3));
        b.issue(&VectorInstr::Duplicate {
            dtype: ElementType::F32,
            dst: Operand::new(Tier::Vec, 0x100, 8),
            scalar: Scalar::Float(7.0),
            repeat: 1,
        });
        assert_eq!(read_f32(&mut b, 0x100 + 8), 7.0);
        assert_eq!(read_f32(&mut b, 0x100 + 12), -1.0);
    }

    #[test]
    fn test_count_mode_ignores_repeat() {
        let mut b = backend();
        b.set_mask(VectorMask::count(70));
        b.issue(&VectorInstr::Duplicate {
            dtype: ElementType::F32,
            dst: Operand::new(Tier::Vec, 0, 8),
            scalar: Scalar::Float(2.0),
            repeat: 0,
        });
        assert_eq!(read_f32(&mut b, 4 * 69), 2.0);
        assert_eq!(read_f32(&mut b, 4 * 70), 0.0);
    }

    #[test]
    fn test_reduce_per_repeat() {
        let mut b = backend();
        fill_f32(&mut b, 0, (0..128).map(|i| if i < 64 { 1.0 } else { 2.0 }));
        b.issue(&VectorInstr::Reduce {
            op: ReduceOp::Sum,
            dtype: ElementType::F32,
            dst: Operand::new(Tier::Vec, 0x800, 1),
            src: Operand::new(Tier::Vec, 0, 8),
            repeat: 2,
        });
        assert_eq!(read_f32(&mut b, 0x800), 64.0);
        assert_eq!(read_f32(&mut b, 0x804), 128.0);
    }

    #[test]
    fn test_compare_then_select() {
        let mut b = backend();
        fill_f32(&mut b, 0, (0..64).map(|i| i as f32));
        fill_f32(&mut b, 0x400, (0..64).map(|_| 100.0));
        b.issue(&VectorInstr::Compare {
            mode: CmpMode::Lt,
            dtype: ElementType::F32,
            dst: Operand::new(Tier::Vec, 0x200, 1),
            src0: Operand::new(Tier::Vec, 0, 8),
            src1: Rhs::Scalar(Scalar::Float(10.0)),
            repeat: 1,
        });
        assert_eq!(b.tiers_mut().read_elem(Tier::Vec, 0x200, ElementType::U8), 0xff);
        assert_eq!(b.tiers_mut().read_elem(Tier::Vec, 0x201, ElementType::U8), 0x03);
        b.issue(&VectorInstr::Select {
            dtype: ElementType::F32,
            dst: Operand::new(Tier::Vec, 0x800, 8),
            mask: Operand::new(Tier::Vec, 0x200, 1),
            src0: Operand::new(Tier::Vec, 0, 8),
            src1: Rhs::Vector(Operand::new(Tier::Vec, 0x400, 8)),
            repeat: 1,
        });
        assert_eq!(read_f32(&mut b, 0x800 + 4 * 9), 9.0);
        assert_eq!(read_f32(&mut b, 0x800 + 4 * 10), 100.0);
    }

    #[test]
    fn test_in_place_broadcast_reads_before_writes() {
        let mut b = backend();
        fill_f32(&mut b, 0, (0..64).map(|i| i as f32 + 2.0));
        // dst[i] = src[i] * src[0]; src[0] is overwritten in the same repeat.
        b.issue(&VectorInstr::Binary {
            op: BinaryOp::Mul,
            dtype: ElementType::F32,
            dst: Operand::new(Tier::Vec, 0, 8),
            src0: Operand::new(Tier::Vec, 0, 8),
            src1: Operand::broadcast(Tier::Vec, 0, 0),
            repeat: 1,
        });
        assert_eq!(read_f32(&mut b, 0), 4.0);
        assert_eq!(read_f32(&mut b, 4 * 5), 14.0);
    }
}
