//! Transfers between global memory and tiles, and between tiles.
//!
//! Every transfer copies the overlap of the two valid extents,
//! `min(src, dst)` in each dimension, addressing each side through its own
//! layout. Rows move as one byte run only when both sides store a row
//! contiguously; any other combination, including every transfer touching
//! a boxed layout, copies element by element.

use super::VecOperand;
use crate::device::tier_memory::Tier;
use crate::engine::AiCore;
use crate::sync::event::Event;
use crate::sync::pipe::Pipe;
use crate::tile::descriptor::{TileDesc, TileView, Vector};
use crate::tile::dtype::Element;
use crate::tile::global::GlobalTensor;
use crate::tile::layout::{FlatLayout, Shape2};
use crate::vector::alu;
use crate::vector::backend::InstructionBackend;
use crate::vector::dispatch::Access;
use crate::vector::instr::{BinaryOp, UnaryOp};

/// How a store combines with the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AtomicMode {
    /// Overwrite.
    #[default]
    None,
    /// Add to the value already in global memory.
    Add,
}

/// Pipe that moves data from `src` to `dst` on chip.
fn move_pipe(src: Tier, dst: Tier) -> Pipe {
    match (src, dst) {
        (Tier::Acc, _) => Pipe::Fix,
        (Tier::Mat, Tier::Left | Tier::Right | Tier::Bias | Tier::Scaling) => Pipe::Mte1,
        _ => Pipe::V,
    }
}

/// Byte range of global memory covered by the first `extent` rows/cols.
fn global_span<T: Element>(g: &GlobalTensor<T>, extent: Shape2) -> (u64, usize) {
    if extent.is_empty() {
        return (g.addr(), 0);
    }
    let first = g.elem_addr(0, 0);
    let last = g.elem_addr(extent.rows - 1, extent.cols - 1) + T::DTYPE.size() as u64;
    (first, (last - first) as usize)
}

/// `rows x cols` region of `d` starting at `(row, col)`, for hazard tracking.
fn region(d: &TileDesc, row: usize, col: usize, rows: usize, cols: usize) -> TileDesc {
    if d.layout.is_flat() {
        d.window(row, col, rows, cols)
    } else {
        TileDesc {
            valid: Shape2::new(rows, cols),
            ..*d
        }
    }
}

impl<B: InstructionBackend> AiCore<B> {
    /// Write the pad value of `d` into every capacity cell outside `filled`.
    /// Returns whether anything was written.
    fn pad_outside(&mut self, d: &TileDesc, filled: Shape2) -> bool {
        let Some(bits) = d.dtype.pad_bits(d.pad) else {
            return false;
        };
        for r in 0..d.capacity.rows {
            for c in 0..d.capacity.cols {
                if r >= filled.rows || c >= filled.cols {
                    self.store_elem(d, r, c, bits);
                }
            }
        }
        true
    }

    /// Copy `extent` elements from `src` at `(r0, c0)` to `dst` at `(0, 0)`.
    fn copy_elems(&mut self, dst: &TileDesc, src: &TileDesc, r0: usize, c0: usize, extent: Shape2) {
        for r in 0..extent.rows {
            for c in 0..extent.cols {
                let bits = self.load_elem(src, r0 + r, c0 + c);
                self.store_elem(dst, r, c, bits);
            }
        }
    }

    /// Global tensor into a tile (MTE2).
    ///
    /// With a pad value set on the tile, every capacity cell outside the
    /// copied region is filled with it first.
    pub fn tload<V: TileView>(
        &mut self,
        dst: &V,
        src: &GlobalTensor<V::Elem>,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let d = dst.desc();
        let tok = self.begin("tload", Pipe::Mte2, waits);
        let extent = d.valid.min(Shape2::new(src.rows(), src.cols()));
        let (gaddr, glen) = global_span(src, extent);
        self.read_global(&tok, gaddr, glen);
        self.gm_mut().record_transfer_read(gaddr, glen);

        let padded = self.pad_outside(&d, extent);
        let size = d.dtype.size();
        if d.layout.is_row_major() && src.rows_contiguous() {
            log::debug!("tload: {} rows of {} bytes", extent.rows, extent.cols * size);
            let mut row = vec![0u8; extent.cols * size];
            for r in 0..extent.rows {
                self.gm().read_bytes(src.elem_addr(r, 0), &mut row);
                self.tiers_mut().write_bytes(d.tier, d.elem_addr(r, 0), &row);
            }
        } else {
            log::debug!("tload: {} elements one by one ({:?})", extent.numel(), d.layout);
            for r in 0..extent.rows {
                for c in 0..extent.cols {
                    let bits = self.gm().read_elem(src.elem_addr(r, c), d.dtype);
                    self.store_elem(&d, r, c, bits);
                }
            }
        }
        let written = if padded {
            TileDesc {
                valid: d.capacity,
                ..d
            }
        } else {
            region(&d, 0, 0, extent.rows, extent.cols)
        };
        self.write_tile(&tok, &written);
        self.finish(tok)
    }

    /// Tile into a global tensor: MTE3 for vector tiles, FIX for
    /// accumulators.
    pub fn tstore<V: TileView>(
        &mut self,
        dst: &GlobalTensor<V::Elem>,
        src: &V,
        atomic: AtomicMode,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let s = src.desc();
        let pipe = if s.tier == Tier::Acc { Pipe::Fix } else { Pipe::Mte3 };
        let tok = self.begin("tstore", pipe, waits);
        let extent = s.valid.min(Shape2::new(dst.rows(), dst.cols()));
        self.read_tile(&tok, &region(&s, 0, 0, extent.rows, extent.cols));
        let (gaddr, glen) = global_span(dst, extent);
        if atomic == AtomicMode::Add {
            self.read_global(&tok, gaddr, glen);
        }

        let size = s.dtype.size();
        if atomic == AtomicMode::None && s.layout.is_row_major() && dst.rows_contiguous() {
            log::debug!("tstore: {} rows of {} bytes", extent.rows, extent.cols * size);
            let mut row = vec![0u8; extent.cols * size];
            for r in 0..extent.rows {
                self.tiers_mut().read_bytes(s.tier, s.elem_addr(r, 0), &mut row);
                self.gm_mut().write_bytes(dst.elem_addr(r, 0), &row);
            }
        } else {
            log::debug!("tstore: {} elements one by one (atomic {:?})", extent.numel(), atomic);
            for r in 0..extent.rows {
                for c in 0..extent.cols {
                    let mut bits = self.load_elem(&s, r, c);
                    let addr = dst.elem_addr(r, c);
                    if atomic == AtomicMode::Add {
                        bits = alu::binary(BinaryOp::Add, s.dtype, self.gm().read_elem(addr, s.dtype), bits);
                    }
                    self.gm_mut().write_elem(addr, s.dtype, bits);
                }
            }
        }
        self.gm_mut().record_transfer_write(gaddr, glen);
        self.write_global(&tok, gaddr, glen);
        self.finish(tok)
    }

    /// Tile to tile. The pipe follows the tiers: FIX out of the
    /// accumulator, MTE1 from L1 into the matrix-unit buffers, the vector
    /// pipe otherwise.
    pub fn tmov<D, S>(&mut self, dst: &D, src: &S, waits: impl IntoIterator<Item = Event>) -> Event
    where
        D: TileView,
        S: TileView<Elem = D::Elem>,
    {
        let (d, s) = (dst.desc(), src.desc());
        self.vmove("tmov", d, s, 0, 0, waits)
    }

    /// Copy the window of `src` starting at `(row, col)` into `dst`.
    pub fn textract<D, S>(
        &mut self,
        dst: &D,
        src: &S,
        row: usize,
        col: usize,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event
    where
        D: TileView,
        S: TileView<Elem = D::Elem>,
    {
        let (d, s) = (dst.desc(), src.desc());
        self.vmove("textract", d, s, row, col, waits)
    }

    fn vmove(
        &mut self,
        name: &'static str,
        d: TileDesc,
        s: TileDesc,
        row: usize,
        col: usize,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let pipe = move_pipe(s.tier, d.tier);
        let tok = self.begin(name, pipe, waits);
        let extent = d.valid.min(Shape2::new(
            s.valid.rows.saturating_sub(row),
            s.valid.cols.saturating_sub(col),
        ));
        let from = region(&s, row, col, extent.rows, extent.cols);
        let to = region(&d, 0, 0, extent.rows, extent.cols);
        self.read_tile(&tok, &from);
        let vector_path = pipe == Pipe::V
            && d.tier == Tier::Vec
            && s.tier == Tier::Vec
            && d.layout.is_row_major()
            && s.layout.is_row_major();
        if vector_path {
            self.unary_kernel(name, UnaryOp::Copy, &to, &from, Access::Elementwise);
        } else {
            log::debug!("{}: {} elements one by one ({:?} -> {:?})", name, extent.numel(), s.layout, d.layout);
            self.copy_elems(&d, &s, row, col, extent);
        }
        self.write_tile(&tok, &to);
        self.finish(tok)
    }

    /// Copy the valid region of `src` into `dst` and fill the rest of
    /// `dst`'s capacity with its pad value.
    pub fn tfillpad<T: Element>(
        &mut self,
        dst: &impl VecOperand<T>,
        src: &impl VecOperand<T>,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let (d, s) = (dst.desc(), src.desc());
        let tok = self.begin("tfillpad", Pipe::V, waits);
        self.read_tile(&tok, &s);
        let Shape2 { rows, cols } = s.valid.min(d.capacity);
        if rows > 0 && cols > 0 {
            self.unary_kernel("tfillpad", UnaryOp::Copy, &d.window(0, 0, rows, cols), &s, Access::Elementwise);
        }
        if let Some(bits) = d.dtype.pad_bits(d.pad) {
            let pad = d.dtype.decode(bits);
            let cap = d.capacity;
            if cols < cap.cols && rows > 0 {
                self.fill_kernel("tfillpad", &d.window(0, cols, rows, cap.cols - cols), pad);
            }
            if rows < cap.rows {
                self.fill_kernel("tfillpad", &d.window(rows, 0, cap.rows - rows, cap.cols), pad);
            }
        }
        self.write_tile(&tok, &TileDesc { valid: d.capacity, ..d });
        self.finish(tok)
    }

    /// `dst[c][r] = src[r][c]` between flat vector tiles.
    pub fn ttrans<D, S>(&mut self, dst: &D, src: &S, waits: impl IntoIterator<Item = Event>) -> Event
    where
        D: TileView<Role = Vector>,
        S: TileView<Role = Vector, Elem = D::Elem>,
        D::Layout: FlatLayout,
        S::Layout: FlatLayout,
    {
        let (d, s) = (dst.desc(), src.desc());
        let tok = self.begin("ttrans", Pipe::V, waits);
        let rows = s.valid.rows.min(d.valid.cols);
        let cols = s.valid.cols.min(d.valid.rows);
        self.read_tile(&tok, &s.window(0, 0, rows, cols));
        for r in 0..rows {
            for c in 0..cols {
                let bits = self.load_elem(&s, r, c);
                self.store_elem(&d, c, r, bits);
            }
        }
        self.write_tile(&tok, &d.window(0, 0, cols, rows));
        self.finish(tok)
    }
}
