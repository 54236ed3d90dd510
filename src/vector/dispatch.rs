//! Vector instruction dispatcher.
//!
//! Lowers a logical operation over a `rows x cols` valid extent into
//! hardware-legal issues. One issue processes at most `epr` elements per
//! repeat (`epr = 256 / sizeof(T)`) and at most 255 repeats; operand row
//! strides must fit the 8-bit repeat-stride field.
//!
//! # Plan shapes
//!
//! ```text
//! Empty            rows == 0 || cols == 0                    no issues
//! Contiguous       valid region is one dense run             head (full mask, <=255 repeats)
//!                                                            + masked tail
//! ContiguousCount  dense run needing > 255 full repeats      one counter-mode issue
//! Small            cols <= epr                               repeat over rows, mask = cols
//! RowRepeat        cols > epr                                per column chunk, repeat over rows,
//!                                                            last chunk masked
//! PerRow           some row stride > 255 blocks              per row, per chunk
//! ```
//!
//! A plan is computed once from descriptors, then [`execute`] issues it
//! under a [`MaskScope`], so the full mask is restored however the
//! dispatch ends.

use super::backend::InstructionBackend;
use super::instr::{Operand, VectorInstr};
use super::mask::{MaskScope, VectorMask};
use crate::device::hw_spec::{BLOCK_BYTE_SIZE, REPEAT_MAX, REPEAT_STRIDE_MAX};
use crate::tile::descriptor::TileDesc;
use crate::tile::layout::Shape2;

/// Which lowering a plan uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    Empty,
    Small,
    Contiguous,
    ContiguousCount,
    RowRepeat,
    PerRow,
}

/// Region one issue covers, in the valid extent's `(row, col)` space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueShape {
    /// Repeat `r` processes row `row + r`, columns `col..col + width`.
    Rows {
        row: usize,
        col: usize,
        repeat: u8,
        width: usize,
    },
    /// Repeats advance `epr` elements along a contiguous run of `len`
    /// elements starting at `(row, col)`.
    Span {
        row: usize,
        col: usize,
        repeat: u8,
        len: usize,
    },
}

impl IssueShape {
    #[inline]
    pub fn row(&self) -> usize {
        match *self {
            IssueShape::Rows { row, .. } | IssueShape::Span { row, .. } => row,
        }
    }

    #[inline]
    pub fn col(&self) -> usize {
        match *self {
            IssueShape::Rows { col, .. } | IssueShape::Span { col, .. } => col,
        }
    }

    #[inline]
    pub fn repeat(&self) -> u8 {
        match *self {
            IssueShape::Rows { repeat, .. } | IssueShape::Span { repeat, .. } => repeat,
        }
    }
}

/// One planned issuance: its region and the mask to set first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Issue {
    pub shape: IssueShape,
    pub mask: VectorMask,
}

/// Ordered issues lowering one logical operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub kind: PlanKind,
    pub valid: Shape2,
    pub epr: usize,
    pub issues: Vec<Issue>,
}

fn width_mask(width: usize, epr: usize) -> VectorMask {
    if width >= epr {
        VectorMask::FULL
    } else {
        VectorMask::lanes(width)
    }
}

/// Plan a lowering.
///
/// `row_blocks` lists every operand's row stride in 32-byte blocks.
/// `dense` states that every operand's valid region is one contiguous run
/// with identical row stride (row-major, valid cols equal to capacity).
pub fn plan(valid: Shape2, epr: usize, row_blocks: &[usize], dense: bool) -> Plan {
    let mut issues = Vec::new();
    let kind = if valid.is_empty() {
        PlanKind::Empty
    } else if dense {
        plan_contiguous(valid, epr, &mut issues)
    } else if row_blocks.iter().any(|&b| b > REPEAT_STRIDE_MAX) {
        plan_per_row(valid, epr, &mut issues);
        PlanKind::PerRow
    } else {
        plan_row_repeat(valid, epr, &mut issues);
        if valid.cols <= epr {
            PlanKind::Small
        } else {
            PlanKind::RowRepeat
        }
    };
    log::debug!(
        "dispatch plan {:?} valid={} epr={} issues={}",
        kind,
        valid,
        epr,
        issues.len()
    );
    Plan {
        kind,
        valid,
        epr,
        issues,
    }
}

fn plan_contiguous(valid: Shape2, epr: usize, issues: &mut Vec<Issue>) -> PlanKind {
    let total = valid.numel();
    let full = total / epr;
    let tail = total % epr;
    if full > REPEAT_MAX {
        issues.push(Issue {
            shape: IssueShape::Span {
                row: 0,
                col: 0,
                repeat: 1,
                len: total,
            },
            mask: VectorMask::count(total),
        });
        return PlanKind::ContiguousCount;
    }
    if full > 0 {
        issues.push(Issue {
            shape: IssueShape::Span {
                row: 0,
                col: 0,
                repeat: full as u8,
                len: full * epr,
            },
            mask: VectorMask::FULL,
        });
    }
    if tail > 0 {
        let start = full * epr;
        issues.push(Issue {
            shape: IssueShape::Span {
                row: start / valid.cols,
                col: start % valid.cols,
                repeat: 1,
                len: tail,
            },
            mask: VectorMask::lanes(tail),
        });
    }
    PlanKind::Contiguous
}

fn plan_row_repeat(valid: Shape2, epr: usize, issues: &mut Vec<Issue>) {
    for col in (0..valid.cols).step_by(epr) {
        let width = epr.min(valid.cols - col);
        let mask = width_mask(width, epr);
        for row in (0..valid.rows).step_by(REPEAT_MAX) {
            let repeat = REPEAT_MAX.min(valid.rows - row) as u8;
            issues.push(Issue {
                shape: IssueShape::Rows {
                    row,
                    col,
                    repeat,
                    width,
                },
                mask,
            });
        }
    }
}

fn plan_per_row(valid: Shape2, epr: usize, issues: &mut Vec<Issue>) {
    for row in 0..valid.rows {
        for col in (0..valid.cols).step_by(epr) {
            let len = epr.min(valid.cols - col);
            issues.push(Issue {
                shape: IssueShape::Span {
                    row,
                    col,
                    repeat: 1,
                    len,
                },
                mask: width_mask(len, epr),
            });
        }
    }
}

/// Run a plan on `backend`, building each instruction with `build`.
///
/// The mask is set before each issue only when it changes and is
/// restored to full when this returns.
pub fn execute<B, F>(backend: &mut B, plan: &Plan, mut build: F)
where
    B: InstructionBackend + ?Sized,
    F: FnMut(&Issue) -> VectorInstr,
{
    let mut scope = MaskScope::new(backend);
    for issue in &plan.issues {
        scope.set(issue.mask);
        let instr = build(issue);
        scope.issue(&instr);
    }
}

// ============================================================================
// Operand builders
// ============================================================================

/// How an operand is walked relative to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Same `(row, col)` as the destination lane.
    Elementwise,
    /// Element `(row, 0)` broadcast across the row.
    RowScalar,
    /// Row 0 reused for every destination row.
    FirstRow,
}

/// Row stride of a row-major tile in 32-byte blocks.
#[inline]
pub fn row_blocks(desc: &TileDesc) -> usize {
    desc.row_bytes() / BLOCK_BYTE_SIZE
}

/// True when the `valid` region of every descriptor is one contiguous run
/// with the same row pitch, so the whole extent can be walked as a span.
pub fn all_dense(valid: Shape2, descs: &[&TileDesc]) -> bool {
    descs
        .iter()
        .all(|d| d.layout.is_row_major() && d.capacity.cols == valid.cols)
}

/// Operand for `desc` at `shape`.
pub fn operand(desc: &TileDesc, shape: &IssueShape, epr: usize, access: Access) -> Operand {
    let span_stride = (epr * desc.dtype.size() / BLOCK_BYTE_SIZE) as u8;
    let rb = row_blocks(desc) as u8;
    let (row, col) = (shape.row(), shape.col());
    match (access, shape) {
        (Access::Elementwise, IssueShape::Rows { .. }) => Operand::new(desc.tier, desc.elem_addr(row, col), rb),
        (Access::Elementwise, IssueShape::Span { .. }) => {
            Operand::new(desc.tier, desc.elem_addr(row, col), span_stride)
        }
        (Access::RowScalar, IssueShape::Rows { .. }) => Operand::broadcast(desc.tier, desc.elem_addr(row, 0), rb),
        (Access::RowScalar, IssueShape::Span { .. }) => Operand::broadcast(desc.tier, desc.elem_addr(row, 0), 0),
        (Access::FirstRow, IssueShape::Rows { .. }) => Operand::new(desc.tier, desc.elem_addr(0, col), 0),
        (Access::FirstRow, IssueShape::Span { .. }) => Operand::new(desc.tier, desc.elem_addr(0, col), span_stride),
    }
}

/// Bitmask operand over a `u8` tile holding one bit per element.
///
/// Only row-shaped and single-repeat span issues are expressible; callers
/// plan bitmask operations with `dense = false`.
pub fn bit_operand(mask: &TileDesc, shape: &IssueShape) -> Operand {
    let addr = mask.addr + (shape.row() * mask.row_bytes() + shape.col() / 8) as u64;
    Operand::new(mask.tier, addr, row_blocks(mask) as u8)
}
