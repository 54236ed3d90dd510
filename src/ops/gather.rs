//! Index- and pattern-driven gather and scatter.
//!
//! Tile gathers address the source as a flat run of elements from its
//! base, so an index names an element offset regardless of the source's
//! valid extent. Global gathers and scatters resolve out-of-range indices
//! according to an explicit policy; the tile forms, like the hardware, do
//! not, and only the debug checks notice.

use super::VecOperand;
use crate::engine::AiCore;
use crate::sync::event::Event;
use crate::sync::pipe::Pipe;
use crate::tile::descriptor::TileDesc;
use crate::tile::dtype::{Element, IndexElement};
use crate::tile::global::GlobalTensor;
use crate::vector::alu;
use crate::vector::backend::InstructionBackend;
use crate::vector::instr::BinaryOp;

/// Lane selection for [`AiCore::tgather_pattern`], read right to left:
/// `P0101` keeps lanes 0, 2, 4, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskPattern {
    P0101,
    P1010,
    P0001,
    P0010,
    P0100,
    P1000,
    P1111,
}

impl MaskPattern {
    /// Whether column `col` is selected.
    pub fn selects(self, col: usize) -> bool {
        match self {
            MaskPattern::P0101 => col % 2 == 0,
            MaskPattern::P1010 => col % 2 == 1,
            MaskPattern::P0001 => col % 4 == 0,
            MaskPattern::P0010 => col % 4 == 1,
            MaskPattern::P0100 => col % 4 == 2,
            MaskPattern::P1000 => col % 4 == 3,
            MaskPattern::P1111 => true,
        }
    }
}

/// Out-of-range policy for global gathers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatherOob {
    /// Use the index as given.
    #[default]
    Undefined,
    /// Clamp to the last element.
    Clamp,
    /// Index modulo the table size.
    Wrap,
    /// Produce zero.
    Zero,
}

/// Out-of-range policy for global scatters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScatterOob {
    /// Use the index as given.
    #[default]
    Undefined,
    /// Drop the element.
    Skip,
    /// Clamp to the last element.
    Clamp,
    /// Index modulo the table size.
    Wrap,
}

/// How a scattered element combines with the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScatterAtomic {
    #[default]
    None,
    Add,
    Max,
    Min,
}

impl ScatterAtomic {
    fn op(self) -> Option<BinaryOp> {
        match self {
            ScatterAtomic::None => None,
            ScatterAtomic::Add => Some(BinaryOp::Add),
            ScatterAtomic::Max => Some(BinaryOp::Max),
            ScatterAtomic::Min => Some(BinaryOp::Min),
        }
    }
}

/// Resolved gather index, `None` meaning "read zero".
fn resolve_gather(oob: GatherOob, index: u64, size: u64) -> Option<u64> {
    if index < size {
        return Some(index);
    }
    match oob {
        GatherOob::Undefined => Some(index),
        GatherOob::Clamp => size.checked_sub(1),
        GatherOob::Wrap => (size > 0).then(|| index % size),
        GatherOob::Zero => None,
    }
}

/// Resolved scatter index, `None` meaning "drop".
fn resolve_scatter(oob: ScatterOob, index: u64, size: u64) -> Option<u64> {
    if index < size {
        return Some(index);
    }
    match oob {
        ScatterOob::Undefined => Some(index),
        ScatterOob::Skip => None,
        ScatterOob::Clamp => size.checked_sub(1),
        ScatterOob::Wrap => (size > 0).then(|| index % size),
    }
}

/// Tile element `k` counted flat from the base.
fn flat_addr(d: &TileDesc, k: u64) -> u64 {
    d.addr + k * d.dtype.size() as u64
}

impl<B: InstructionBackend> AiCore<B> {
    fn load_index(&mut self, idx: &TileDesc, r: usize, c: usize) -> u64 {
        let bits = self.load_elem(idx, r, c);
        // Index tiles are i32 or u32; both read as unsigned offsets.
        bits & idx.dtype.bit_mask()
    }

    /// `dst[r][c] = src[idx[r][c]]`, `src` addressed flat from its base.
    pub fn tgather<T: Element, I: IndexElement>(
        &mut self,
        dst: &impl VecOperand<T>,
        src: &impl VecOperand<T>,
        idx: &impl VecOperand<I>,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let (d, s, x) = (dst.desc(), src.desc(), idx.desc());
        let tok = self.begin("tgather", Pipe::V, waits);
        self.read_tile(&tok, &x);
        self.read_tile(&tok, &TileDesc { valid: s.capacity, ..s });
        let limit = s.capacity.numel() as u64;
        for r in 0..d.valid.rows {
            for c in 0..d.valid.cols {
                let i = I::from_bits(self.load_index(&x, r, c)).as_index();
                self.check_index("tgather", i, limit);
                let bits = self.tiers_mut().read_elem(s.tier, flat_addr(&s, i), s.dtype);
                self.store_elem(&d, r, c, bits);
            }
        }
        self.write_tile(&tok, &d);
        self.finish(tok)
    }

    /// Keep the columns `pattern` selects from every valid row of `src`
    /// and pack them contiguously into `dst` from its first element.
    pub fn tgather_pattern<T: Element>(
        &mut self,
        dst: &impl VecOperand<T>,
        src: &impl VecOperand<T>,
        pattern: MaskPattern,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let (d, s) = (dst.desc(), src.desc());
        let tok = self.begin("tgather_pattern", Pipe::V, waits);
        self.read_tile(&tok, &s);
        let mut k = 0u64;
        for r in 0..s.valid.rows {
            for c in (0..s.valid.cols).filter(|&c| pattern.selects(c)) {
                let bits = self.load_elem(&s, r, c);
                self.tiers_mut().write_elem(d.tier, flat_addr(&d, k), d.dtype, bits);
                k += 1;
            }
        }
        log::debug!("tgather_pattern {:?}: {} elements packed", pattern, k);
        self.write_tile(&tok, &TileDesc { valid: d.capacity, ..d });
        self.finish(tok)
    }

    /// `dst[idx[r][c]] = src[r][c]`, `dst` addressed flat from its base.
    pub fn tscatter<T: Element, I: IndexElement>(
        &mut self,
        dst: &impl VecOperand<T>,
        src: &impl VecOperand<T>,
        idx: &impl VecOperand<I>,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let (d, s, x) = (dst.desc(), src.desc(), idx.desc());
        let tok = self.begin("tscatter", Pipe::V, waits);
        self.read_tile(&tok, &s);
        self.read_tile(&tok, &x);
        let limit = d.capacity.numel() as u64;
        for r in 0..s.valid.rows {
            for c in 0..s.valid.cols {
                let i = I::from_bits(self.load_index(&x, r, c)).as_index();
                self.check_index("tscatter", i, limit);
                let bits = self.load_elem(&s, r, c);
                self.tiers_mut().write_elem(d.tier, flat_addr(&d, i), d.dtype, bits);
            }
        }
        self.write_tile(&tok, &TileDesc { valid: d.capacity, ..d });
        self.finish(tok)
    }

    /// Element gather from global memory: `dst[r][c] = table[idx[r][c]]`
    /// with `table` addressed flat.
    pub fn mgather<T: Element, I: IndexElement>(
        &mut self,
        dst: &impl VecOperand<T>,
        table: &GlobalTensor<T>,
        idx: &impl VecOperand<I>,
        oob: GatherOob,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let (d, x) = (dst.desc(), idx.desc());
        let tok = self.begin("mgather", Pipe::Mte2, waits);
        self.read_tile(&tok, &x);
        let size = table.numel() as u64;
        let esize = T::DTYPE.size() as u64;
        self.read_global(&tok, table.addr(), (size * esize) as usize);
        for r in 0..d.valid.rows {
            for c in 0..d.valid.cols {
                let i = I::from_bits(self.load_index(&x, r, c)).as_index();
                if oob == GatherOob::Undefined {
                    self.check_index("mgather", i, size);
                }
                let bits = match resolve_gather(oob, i, size) {
                    Some(i) => self.gm().read_elem(table.addr() + i * esize, T::DTYPE),
                    None => 0,
                };
                self.store_elem(&d, r, c, bits);
            }
        }
        self.gm_mut().record_transfer_read(table.addr(), (size * esize) as usize);
        self.write_tile(&tok, &d);
        self.finish(tok)
    }

    /// Row gather from global memory: `dst[r][c] = table[idx[r][0]][c]`.
    pub fn mgather_rows<T: Element, I: IndexElement>(
        &mut self,
        dst: &impl VecOperand<T>,
        table: &GlobalTensor<T>,
        idx: &impl VecOperand<I>,
        oob: GatherOob,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let (d, x) = (dst.desc(), idx.desc());
        let tok = self.begin("mgather_rows", Pipe::Mte2, waits);
        self.read_tile(&tok, &x.window(0, 0, d.valid.rows, 1));
        let rows = table.rows() as u64;
        let cols = d.valid.cols.min(table.cols());
        self.read_global(&tok, table.addr(), table.numel() * T::DTYPE.size());
        for r in 0..d.valid.rows {
            let i = I::from_bits(self.load_index(&x, r, 0)).as_index();
            if oob == GatherOob::Undefined {
                self.check_index("mgather_rows", i, rows);
            }
            let row = resolve_gather(oob, i, rows);
            for c in 0..cols {
                let bits = match row {
                    Some(row) => self.gm().read_elem(table.elem_addr(row as usize, c), T::DTYPE),
                    None => 0,
                };
                self.store_elem(&d, r, c, bits);
            }
        }
        self.write_tile(&tok, &d.window(0, 0, d.valid.rows, cols));
        self.finish(tok)
    }

    /// Element scatter to global memory: `table[idx[r][c]] (op)= src[r][c]`.
    pub fn mscatter<T: Element, I: IndexElement>(
        &mut self,
        table: &GlobalTensor<T>,
        src: &impl VecOperand<T>,
        idx: &impl VecOperand<I>,
        oob: ScatterOob,
        atomic: ScatterAtomic,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let (s, x) = (src.desc(), idx.desc());
        let tok = self.begin("mscatter", Pipe::Mte3, waits);
        self.read_tile(&tok, &s);
        self.read_tile(&tok, &x);
        let size = table.numel() as u64;
        let esize = T::DTYPE.size() as u64;
        let mut dropped = 0usize;
        for r in 0..s.valid.rows {
            for c in 0..s.valid.cols {
                let i = I::from_bits(self.load_index(&x, r, c)).as_index();
                if oob == ScatterOob::Undefined {
                    self.check_index("mscatter", i, size);
                }
                let Some(i) = resolve_scatter(oob, i, size) else {
                    dropped += 1;
                    continue;
                };
                let addr = table.addr() + i * esize;
                let mut bits = self.load_elem(&s, r, c);
                if let Some(op) = atomic.op() {
                    bits = alu::binary(op, T::DTYPE, self.gm().read_elem(addr, T::DTYPE), bits);
                }
                self.gm_mut().write_elem(addr, T::DTYPE, bits);
            }
        }
        if dropped > 0 {
            log::debug!("mscatter: {} out-of-range elements skipped", dropped);
        }
        let span = (size * esize) as usize;
        self.gm_mut().record_transfer_write(table.addr(), span);
        self.write_global(&tok, table.addr(), span);
        self.finish(tok)
    }
}
