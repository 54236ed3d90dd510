//! Vector instruction forms accepted by an [`InstructionBackend`].
//!
//! Each variant corresponds to one hardware opcode class. Operands name a
//! tier, a byte address and strides in 32-byte blocks; the mask in force
//! at issue time selects lanes.
//!
//! # Lane addressing
//!
//! For repeat `r` and lane `i` of an operand with element size `s`:
//!
//! ```text
//! addr + r * repeat_stride * 32 + (i*s / 32) * block_stride * 32 + (i*s % 32)
//! ```
//!
//! A broadcast operand reads one element per repeat at
//! `addr + r * repeat_stride * 32`. Bitmask operands (compare results,
//! select masks) hold one bit per lane starting at
//! `addr + r * repeat_stride * 32`.
//!
//! [`InstructionBackend`]: super::backend::InstructionBackend

use crate::device::hw_spec::BLOCK_BYTE_SIZE;
use crate::device::tier_memory::Tier;
use crate::tile::dtype::{ElementType, Scalar};

/// One vector operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub tier: Tier,
    pub addr: u64,
    /// Distance between consecutive 32-byte blocks of one repeat.
    pub block_stride: u8,
    /// Distance between consecutive repeats.
    pub repeat_stride: u8,
    /// Read a single element per repeat for every lane.
    pub broadcast: bool,
}

impl Operand {
    /// Contiguous operand: unit block stride.
    pub fn new(tier: Tier, addr: u64, repeat_stride: u8) -> Self {
        Self {
            tier,
            addr,
            block_stride: 1,
            repeat_stride,
            broadcast: false,
        }
    }

    /// One element per repeat, replicated across lanes.
    pub fn broadcast(tier: Tier, addr: u64, repeat_stride: u8) -> Self {
        Self {
            broadcast: true,
            ..Self::new(tier, addr, repeat_stride)
        }
    }

    /// Byte address of lane `lane` in repeat `repeat` for `size`-byte elements.
    #[inline]
    pub fn lane_addr(&self, repeat: usize, lane: usize, size: usize) -> u64 {
        let rep = repeat as u64 * self.repeat_stride as u64 * BLOCK_BYTE_SIZE as u64;
        if self.broadcast {
            return self.addr + rep;
        }
        let byte = lane * size;
        let block = (byte / BLOCK_BYTE_SIZE) as u64 * self.block_stride as u64 * BLOCK_BYTE_SIZE as u64;
        self.addr + rep + block + (byte % BLOCK_BYTE_SIZE) as u64
    }

    /// Byte address and bit index of lane `lane` in a bitmask operand.
    #[inline]
    pub fn bit_addr(&self, repeat: usize, lane: usize) -> (u64, u32) {
        let rep = repeat as u64 * self.repeat_stride as u64 * BLOCK_BYTE_SIZE as u64;
        (self.addr + rep + (lane / 8) as u64, (lane % 8) as u32)
    }
}

/// Two-input elementwise operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
    And,
    Or,
    Xor,
    /// Truncated remainder.
    Rem,
    /// Truncated remainder through a float quotient; integers are
    /// narrowed to f16 (16-bit and smaller) or f32 on the way.
    Fmod,
    /// `x > 0 ? x : x * y`.
    Prelu,
}

/// One-input elementwise operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Copy,
    Abs,
    Neg,
    Exp,
    Ln,
    Sqrt,
    Rsqrt,
    Recip,
    Relu,
    Not,
}

/// Cross-lane reductions (one result per repeat).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
}

impl ReduceOp {
    /// The elementwise op that folds two partial results.
    pub fn combine(self) -> BinaryOp {
        match self {
            ReduceOp::Sum => BinaryOp::Add,
            ReduceOp::Max => BinaryOp::Max,
            ReduceOp::Min => BinaryOp::Min,
        }
    }
}

/// Comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpMode {
    Eq,
    Ne,
    Lt,
    Gt,
    Ge,
    Le,
}

/// Rounding for type conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RoundMode {
    /// Target default: round-to-nearest-even for floats, truncate for
    /// float-to-integer.
    #[default]
    None,
    /// Round to nearest, ties to even.
    Rint,
    /// Round to nearest, ties away from zero.
    Round,
    Floor,
    Ceil,
    Trunc,
    /// Round to odd (float narrowing only).
    Odd,
}

/// Second source of a compare or select: a vector or a scalar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rhs {
    Vector(Operand),
    Scalar(Scalar),
}

/// A vector instruction issuance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VectorInstr {
    /// `dst = src0 op src1`.
    Binary {
        op: BinaryOp,
        dtype: ElementType,
        dst: Operand,
        src0: Operand,
        src1: Operand,
        repeat: u8,
    },
    /// `dst = src op scalar`.
    BinaryScalar {
        op: BinaryOp,
        dtype: ElementType,
        dst: Operand,
        src: Operand,
        scalar: Scalar,
        repeat: u8,
    },
    /// `dst = op(src)`.
    Unary {
        op: UnaryOp,
        dtype: ElementType,
        dst: Operand,
        src: Operand,
        repeat: u8,
    },
    /// `dst = scalar` on every enabled lane.
    Duplicate {
        dtype: ElementType,
        dst: Operand,
        scalar: Scalar,
        repeat: u8,
    },
    /// Fold the enabled lanes of each repeat into one element written at
    /// `dst.addr + r * dst.repeat_stride * size` (stride in elements).
    Reduce {
        op: ReduceOp,
        dtype: ElementType,
        dst: Operand,
        src: Operand,
        repeat: u8,
    },
    /// Write one predicate bit per lane into a bitmask destination.
    Compare {
        mode: CmpMode,
        dtype: ElementType,
        dst: Operand,
        src0: Operand,
        src1: Rhs,
        repeat: u8,
    },
    /// `dst = bit ? src0 : src1` with `bit` read from a bitmask operand.
    Select {
        dtype: ElementType,
        dst: Operand,
        mask: Operand,
        src0: Operand,
        src1: Rhs,
        repeat: u8,
    },
    /// Elementwise type conversion; lanes per repeat follow the wider type.
    Convert {
        dst_type: ElementType,
        src_type: ElementType,
        round: RoundMode,
        dst: Operand,
        src: Operand,
        repeat: u8,
    },
}

impl VectorInstr {
    /// Repeat count carried by the issue.
    pub fn repeat(&self) -> u8 {
        match *self {
            VectorInstr::Binary { repeat, .. }
            | VectorInstr::BinaryScalar { repeat, .. }
            | VectorInstr::Unary { repeat, .. }
            | VectorInstr::Duplicate { repeat, .. }
            | VectorInstr::Reduce { repeat, .. }
            | VectorInstr::Compare { repeat, .. }
            | VectorInstr::Select { repeat, .. }
            | VectorInstr::Convert { repeat, .. } => repeat,
        }
    }

    /// Element size that fixes the lanes per repeat.
    pub fn lane_size(&self) -> usize {
        match *self {
            VectorInstr::Binary { dtype, .. }
            | VectorInstr::BinaryScalar { dtype, .. }
            | VectorInstr::Unary { dtype, .. }
            | VectorInstr::Duplicate { dtype, .. }
            | VectorInstr::Reduce { dtype, .. }
            | VectorInstr::Compare { dtype, .. }
            | VectorInstr::Select { dtype, .. } => dtype.size(),
            VectorInstr::Convert { dst_type, src_type, .. } => dst_type.size().max(src_type.size()),
        }
    }

    /// Short mnemonic for traces.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            VectorInstr::Binary { .. } => "vbin",
            VectorInstr::BinaryScalar { .. } => "vbins",
            VectorInstr::Unary { .. } => "vun",
            VectorInstr::Duplicate { .. } => "vdup",
            VectorInstr::Reduce { .. } => "vred",
            VectorInstr::Compare { .. } => "vcmp",
            VectorInstr::Select { .. } => "vsel",
            VectorInstr::Convert { .. } => "vconv",
        }
    }

    /// Every operand the instruction touches.
    pub fn operands(&self) -> smallvec::SmallVec<[Operand; 4]> {
        let mut ops = smallvec::SmallVec::new();
        match *self {
            VectorInstr::Binary { dst, src0, src1, .. } => ops.extend([dst, src0, src1]),
            VectorInstr::BinaryScalar { dst, src, .. }
            | VectorInstr::Unary { dst, src, .. }
            | VectorInstr::Reduce { dst, src, .. }
            | VectorInstr::Convert { dst, src, .. } => ops.extend([dst, src]),
            VectorInstr::Duplicate { dst, .. } => ops.push(dst),
            VectorInstr::Compare { dst, src0, src1, .. } => {
                ops.extend([dst, src0]);
                if let Rhs::Vector(v) = src1 {
                    ops.push(v);
                }
            }
            VectorInstr::Select { dst, mask, src0, src1, .. } => {
                ops.extend([dst, mask, src0]);
                if let Rhs::Vector(v) = src1 {
                    ops.push(v);
                }
            }
        }
        ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_addr_contiguous() {
        let op = Operand::new(Tier::Vec, 0x100, 8);
        assert_eq!(op.lane_addr(0, 0, 4), 0x100);
        assert_eq!(op.lane_addr(0, 9, 4), 0x100 + 36);
        assert_eq!(op.lane_addr(1, 0, 4), 0x200);
    }

    #[test]
    fn test_lane_addr_block_stride() {
        let op = Operand {
            block_stride: 2,
            ..Operand::new(Tier::Vec, 0, 16)
        };
        // Lane 8 of f32 is the first element of block 1, two blocks out.
        assert_eq!(op.lane_addr(0, 8, 4), 64);
        assert_eq!(op.lane_addr(0, 7, 4), 28);
    }

    #[test]
    fn test_broadcast_ignores_lane() {
        let op = Operand::broadcast(Tier::Vec, 0x40, 1);
        assert_eq!(op.lane_addr(0, 17, 2), 0x40);
        assert_eq!(op.lane_addr(3, 5, 2), 0x40 + 96);
    }

    #[test]
    fn test_bit_addr() {
        let op = Operand::new(Tier::Vec, 0x80, 2);
        assert_eq!(op.bit_addr(0, 13), (0x81, 5));
        assert_eq!(op.bit_addr(1, 0), (0xc0, 0));
    }

    #[test]
    fn test_convert_lane_size() {
        let instr = VectorInstr::Convert {
            dst_type: ElementType::F16,
            src_type: ElementType::F32,
            round: RoundMode::Rint,
            dst: Operand::new(Tier::Vec, 0, 4),
            src: Operand::new(Tier::Vec, 0x100, 8),
            repeat: 1,
        };
        assert_eq!(instr.lane_size(), 4);
        assert_eq!(instr.operands().len(), 2);
    }
}
