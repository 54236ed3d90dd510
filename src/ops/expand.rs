//! Broadcast expansion and partial-extent arithmetic.
//!
//! Row expansion reads one element per destination row (`src[r][0]`) as a
//! broadcast operand; column expansion reuses source row 0 for every
//! destination row. In both cases the source stays fixed while the
//! destination advances, so the source is never re-read per element.

use super::VecOperand;
use crate::engine::AiCore;
use crate::sync::event::Event;
use crate::sync::pipe::Pipe;
use crate::tile::descriptor::TileDesc;
use crate::tile::dtype::{Element, Scalar};
use crate::tile::layout::Shape2;
use crate::vector::backend::InstructionBackend;
use crate::vector::dispatch::Access;
use crate::vector::instr::{BinaryOp, UnaryOp};

/// The part of `d`'s valid extent inside rows `r0..r1`, columns `c0..c1`.
fn clipped(d: &TileDesc, r0: usize, c0: usize, r1: usize, c1: usize) -> Option<TileDesc> {
    let (r1, c1) = (r1.min(d.valid.rows), c1.min(d.valid.cols));
    (r0 < r1 && c0 < c1).then(|| d.window(r0, c0, r1 - r0, c1 - c0))
}

impl<B: InstructionBackend> AiCore<B> {
    fn vrowexpand_binary(
        &mut self,
        name: &'static str,
        op: BinaryOp,
        dst: TileDesc,
        a: TileDesc,
        b: TileDesc,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let tok = self.begin(name, Pipe::V, waits);
        self.read_tile(&tok, &a);
        self.read_tile(&tok, &b.window(0, 0, dst.valid.rows, 1));
        self.binary_kernel(name, op, &dst, (&a, Access::Elementwise), (&b, Access::RowScalar));
        self.write_tile(&tok, &dst);
        self.finish(tok)
    }

    /// Copy `src` into `dst`, or `a op b` over the overlap when both cover a
    /// cell; cells covered by neither become zero.
    fn vpart(
        &mut self,
        name: &'static str,
        op: BinaryOp,
        dst: TileDesc,
        a: TileDesc,
        b: TileDesc,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let tok = self.begin(name, Pipe::V, waits);
        self.read_tile(&tok, &a);
        self.read_tile(&tok, &b);
        let Shape2 { rows, cols } = dst.valid;
        let both = a.valid.min(b.valid);

        if let Some(o) = clipped(&dst, 0, 0, both.rows, both.cols) {
            let (sa, sb) = (a.window(0, 0, o.valid.rows, o.valid.cols), b.window(0, 0, o.valid.rows, o.valid.cols));
            self.binary_kernel(name, op, &o, (&sa, Access::Elementwise), (&sb, Access::Elementwise));
        }
        // Each source alone: the columns right of the overlap, then the rows
        // below it.
        for src in [a, b] {
            let Shape2 { rows: sr, cols: sc } = src.valid;
            let pieces = [(0, both.cols, sr, sc), (both.rows, 0, sr, both.cols.min(sc))];
            for (r0, c0, r1, c1) in pieces {
                if let Some(d) = clipped(&dst, r0, c0, r1, c1) {
                    let s = src.window(r0, c0, d.valid.rows, d.valid.cols);
                    self.unary_kernel(name, UnaryOp::Copy, &d, &s, Access::Elementwise);
                }
            }
        }
        // Uncovered cells, one band of rows at a time.
        let (short, tall) = if a.valid.rows <= b.valid.rows { (a.valid, b.valid) } else { (b.valid, a.valid) };
        let bands = [
            (0, short.rows, short.cols.max(tall.cols)),
            (short.rows, tall.rows, tall.cols),
            (tall.rows, rows, 0),
        ];
        for (r0, r1, covered) in bands {
            if let Some(d) = clipped(&dst, r0, covered, r1, cols) {
                self.fill_kernel(name, &d, Scalar::Int(0));
            }
        }
        self.write_tile(&tok, &dst);
        self.finish(tok)
    }
}

macro_rules! row_expand_ops {
    ($($(#[$doc:meta])* $name:ident => $op:ident;)*) => {
        impl<B: InstructionBackend> AiCore<B> {
            $(
                $(#[$doc])*
                pub fn $name<T: Element>(
                    &mut self,
                    dst: &impl VecOperand<T>,
                    a: &impl VecOperand<T>,
                    b: &impl VecOperand<T>,
                    waits: impl IntoIterator<Item = Event>,
                ) -> Event {
                    self.vrowexpand_binary(stringify!($name), BinaryOp::$op, dst.desc(), a.desc(), b.desc(), waits)
                }
            )*
        }
    };
}

row_expand_ops! {
    /// `dst[r][c] = a[r][c] + b[r][0]`.
    trowexpand_add => Add;
    /// `dst[r][c] = a[r][c] - b[r][0]`.
    trowexpand_sub => Sub;
    /// `dst[r][c] = a[r][c] * b[r][0]`.
    trowexpand_mul => Mul;
    /// `dst[r][c] = a[r][c] / b[r][0]`.
    trowexpand_div => Div;
    /// `dst[r][c] = max(a[r][c], b[r][0])`.
    trowexpand_max => Max;
    /// `dst[r][c] = min(a[r][c], b[r][0])`.
    trowexpand_min => Min;
}

macro_rules! part_ops {
    ($($(#[$doc:meta])* $name:ident => $op:ident;)*) => {
        impl<B: InstructionBackend> AiCore<B> {
            $(
                $(#[$doc])*
                pub fn $name<T: Element>(
                    &mut self,
                    dst: &impl VecOperand<T>,
                    a: &impl VecOperand<T>,
                    b: &impl VecOperand<T>,
                    waits: impl IntoIterator<Item = Event>,
                ) -> Event {
                    self.vpart(stringify!($name), BinaryOp::$op, dst.desc(), a.desc(), b.desc(), waits)
                }
            )*
        }
    };
}

part_ops! {
    /// Over `dst`'s valid extent: `a + b` where both sources are valid, the
    /// valid one where only one is, zero elsewhere.
    tpartadd => Add;
    /// As [`AiCore::tpartadd`] with `max`.
    tpartmax => Max;
    /// As [`AiCore::tpartadd`] with `min`.
    tpartmin => Min;
}

impl<B: InstructionBackend> AiCore<B> {
    /// `dst[r][c] = src[r][0]`.
    pub fn trowexpand<T: Element>(
        &mut self,
        dst: &impl VecOperand<T>,
        src: &impl VecOperand<T>,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let (d, s) = (dst.desc(), src.desc());
        let tok = self.begin("trowexpand", Pipe::V, waits);
        self.read_tile(&tok, &s.window(0, 0, d.valid.rows, 1));
        self.unary_kernel("trowexpand", UnaryOp::Copy, &d, &s, Access::RowScalar);
        self.write_tile(&tok, &d);
        self.finish(tok)
    }

    /// `dst[r][c] = src[0][c]`.
    pub fn tcolexpand<T: Element>(
        &mut self,
        dst: &impl VecOperand<T>,
        src: &impl VecOperand<T>,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let (d, s) = (dst.desc(), src.desc());
        let tok = self.begin("tcolexpand", Pipe::V, waits);
        self.read_tile(&tok, &s.window(0, 0, 1, d.valid.cols));
        self.unary_kernel("tcolexpand", UnaryOp::Copy, &d, &s, Access::FirstRow);
        self.write_tile(&tok, &d);
        self.finish(tok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::arch_config::Arch;
    use crate::engine::CoreOptions;
    use crate::testing::golden::{fill_capacity, fill_tile, read_capacity, read_tile};
    use crate::tile::descriptor::VecTile;

    fn core() -> AiCore {
        AiCore::with_options(Arch::A2A3, CoreOptions::checked())
    }

    #[test]
    fn test_row_and_col_expand() {
        let mut core = core();
        let col: VecTile<f32, 4, 8> = VecTile::with_valid(0x0, 4, 1).unwrap();
        let row: VecTile<f32, 1, 80> = VecTile::new(0x200).unwrap();
        let d: VecTile<f32, 4, 80> = VecTile::with_valid(0x400, 4, 70).unwrap();
        fill_tile(&mut core, &col, |r, _| r as f32 + 1.0);
        fill_tile(&mut core, &row, |_, c| c as f32);
        fill_capacity(&mut core, &d, -1.0f32);

        let ev = core.trowexpand(&d, &col, []);
        core.wait_event(ev);
        let out = read_capacity(&mut core, &d);
        assert_eq!(out[0], 1.0);
        assert_eq!(out[3 * 80 + 69], 4.0);
        assert_eq!(out[3 * 80 + 70], -1.0);

        let ev = core.tcolexpand(&d, &row, []);
        core.wait_event(ev);
        let out = read_tile(&mut core, &d);
        assert_eq!(out[2 * 70 + 65], 65.0);
        assert!(core.faults().is_empty());
    }

    #[test]
    fn test_row_expand_arithmetic() {
        let mut core = core();
        let a: VecTile<i32, 3, 16> = VecTile::new(0x0).unwrap();
        let b: VecTile<i32, 3, 8> = VecTile::with_valid(0x100, 3, 1).unwrap();
        let d: VecTile<i32, 3, 16> = VecTile::new(0x200).unwrap();
        fill_tile(&mut core, &a, |r, c| (r * 16 + c) as i32);
        fill_tile(&mut core, &b, |r, _| 10 * (r as i32 + 1));

        let ev = core.trowexpand_sub(&d, &a, &b, []);
        core.wait_event(ev);
        let out = read_tile(&mut core, &d);
        assert_eq!(out[0], -10);
        assert_eq!(out[2 * 16 + 15], 47 - 30);

        let ev = core.trowexpand_max(&d, &a, &b, []);
        core.wait_event(ev);
        let out = read_tile(&mut core, &d);
        assert_eq!(&out[..3], &[10, 10, 10]);
        assert_eq!(out[16 + 15], 31);
    }

    #[test]
    fn test_row_expand_mul_in_place() {
        let mut core = core();
        let t: VecTile<f32, 2, 64> = VecTile::new(0x0).unwrap();
        fill_tile(&mut core, &t, |r, c| (c + 2 + r) as f32);
        let ev = core.trowexpand_mul(&t, &t, &t, []);
        core.wait_event(ev);
        let out = read_tile(&mut core, &t);
        assert_eq!(out[0], 4.0);
        assert_eq!(out[5], 14.0);
        assert_eq!(out[64 + 1], 12.0);
    }

    #[test]
    fn test_partial_add_covers_every_case() {
        let mut core = core();
        let a: VecTile<i32, 8, 16> = VecTile::with_valid(0x0, 4, 10).unwrap();
        let b: VecTile<i32, 8, 16> = VecTile::with_valid(0x200, 6, 5).unwrap();
        let d: VecTile<i32, 8, 16> = VecTile::with_valid(0x400, 7, 12).unwrap();
        fill_tile(&mut core, &a, |_, _| 1);
        fill_tile(&mut core, &b, |_, _| 100);
        fill_capacity(&mut core, &d, -5);
        let ev = core.tpartadd(&d, &a, &b, []);
        core.wait_event(ev);
        let out = read_capacity(&mut core, &d);
        for r in 0..8 {
            for c in 0..16 {
                let (in_a, in_b) = (r < 4 && c < 10, r < 6 && c < 5);
                let want = if r >= 7 || c >= 12 {
                    -5
                } else {
                    match (in_a, in_b) {
                        (true, true) => 101,
                        (true, false) => 1,
                        (false, true) => 100,
                        (false, false) => 0,
                    }
                };
                assert_eq!(out[r * 16 + c], want, "({}, {})", r, c);
            }
        }
        assert!(core.faults().is_empty());
    }

    #[test]
    fn test_partial_max_min() {
        let mut core = core();
        let a: VecTile<f32, 2, 8> = VecTile::new(0x0).unwrap();
        let b: VecTile<f32, 2, 8> = VecTile::with_valid(0x40, 1, 8).unwrap();
        let d: VecTile<f32, 2, 8> = VecTile::new(0x80).unwrap();
        fill_tile(&mut core, &a, |_, c| c as f32);
        fill_tile(&mut core, &b, |_, _| 3.5);
        let ev = core.tpartmax(&d, &a, &b, []);
        core.wait_event(ev);
        let out = read_tile(&mut core, &d);
        assert_eq!(&out[..5], &[3.5, 3.5, 3.5, 3.5, 4.0]);
        assert_eq!(out[8 + 1], 1.0);
        let ev = core.tpartmin(&d, &a, &b, []);
        core.wait_event(ev);
        assert_eq!(read_tile(&mut core, &d)[7], 3.5);
    }
}
