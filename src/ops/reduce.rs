//! Row and column reductions.
//!
//! Row reductions fold each source row into column 0 of the destination.
//! Rows wider than one repeat are first folded chunk by chunk into a
//! caller-supplied scratch tile of at least `rows x epr`, then reduced
//! across lanes. Column reductions fold all source rows into row 0 of the
//! destination, either sequentially or as a pairwise tree through a
//! scratch tile of at least `ceil(rows / 2) x cols`.

use super::VecOperand;
use crate::device::hw_spec::REPEAT_STRIDE_MAX;
use crate::engine::AiCore;
use crate::sync::event::Event;
use crate::sync::pipe::Pipe;
use crate::tile::descriptor::TileDesc;
use crate::tile::dtype::Element;
use crate::tile::layout::Shape2;
use crate::vector::backend::InstructionBackend;
use crate::vector::dispatch::{operand, plan, row_blocks, Access};
use crate::vector::instr::{BinaryOp, Operand, ReduceOp, UnaryOp, VectorInstr};

impl<B: InstructionBackend> AiCore<B> {
    /// Fold each row of `src` (at most one repeat wide) into `dst[r][0]`.
    fn lane_reduce_kernel(&mut self, name: &str, op: ReduceOp, dst: &TileDesc, src: &TileDesc) {
        let (d, s) = (*dst, *src);
        let dtype = s.dtype;
        let epr = self.epr(dtype.size());
        // The destination advances one row per repeat, counted in elements.
        let dst_stride = d.row_stride();
        let mut blocks = vec![row_blocks(&s)];
        if dst_stride > REPEAT_STRIDE_MAX {
            blocks.push(dst_stride);
        }
        let p = plan(s.valid, epr, &blocks, false);
        self.run(name, &p, |issue| VectorInstr::Reduce {
            op,
            dtype,
            dst: Operand::new(d.tier, d.elem_addr(issue.shape.row(), 0), dst_stride.min(REPEAT_STRIDE_MAX) as u8),
            src: operand(&s, &issue.shape, epr, Access::Elementwise),
            repeat: issue.shape.repeat(),
        });
    }

    fn vrowreduce(
        &mut self,
        name: &'static str,
        op: ReduceOp,
        dst: TileDesc,
        src: TileDesc,
        tmp: TileDesc,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let tok = self.begin(name, Pipe::V, waits);
        self.read_tile(&tok, &src);
        let Shape2 { rows, cols } = src.valid;
        let epr = self.epr(src.dtype.size());
        if rows > 0 && cols > epr {
            self.check_scratch(name, Shape2::new(rows, epr), tmp.capacity);
            let acc = tmp.window(0, 0, rows, epr);
            self.unary_kernel(name, UnaryOp::Copy, &acc, &src.window(0, 0, rows, epr), Access::Elementwise);
            for col in (epr..cols).step_by(epr) {
                let width = epr.min(cols - col);
                let part = acc.window(0, 0, rows, width);
                self.binary_kernel(
                    name,
                    op.combine(),
                    &part,
                    (&part, Access::Elementwise),
                    (&src.window(0, col, rows, width), Access::Elementwise),
                );
            }
            self.write_tile(&tok, &acc);
            self.lane_reduce_kernel(name, op, &dst, &acc);
        } else if rows > 0 && cols > 0 {
            self.lane_reduce_kernel(name, op, &dst, &src);
        }
        self.write_tile(&tok, &dst.window(0, 0, rows, 1));
        self.finish(tok)
    }

    /// Fold rows `1..` of `src` into `dst` row 0 one row at a time.
    fn vcolreduce(
        &mut self,
        name: &'static str,
        op: BinaryOp,
        dst: TileDesc,
        src: TileDesc,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let tok = self.begin(name, Pipe::V, waits);
        self.read_tile(&tok, &src);
        let Shape2 { rows, cols } = src.valid;
        let out = dst.window(0, 0, 1, cols);
        if rows > 0 && cols > 0 {
            self.unary_kernel(name, UnaryOp::Copy, &out, &src.window(0, 0, 1, cols), Access::Elementwise);
            for r in 1..rows {
                self.binary_kernel(
                    name,
                    op,
                    &out,
                    (&out, Access::Elementwise),
                    (&src.window(r, 0, 1, cols), Access::Elementwise),
                );
            }
        }
        self.write_tile(&tok, &out);
        self.finish(tok)
    }
}

macro_rules! row_reductions {
    ($($(#[$doc:meta])* $name:ident => $op:ident;)*) => {
        impl<B: InstructionBackend> AiCore<B> {
            $(
                $(#[$doc])*
                pub fn $name<T: Element>(
                    &mut self,
                    dst: &impl VecOperand<T>,
                    src: &impl VecOperand<T>,
                    tmp: &impl VecOperand<T>,
                    waits: impl IntoIterator<Item = Event>,
                ) -> Event {
                    self.vrowreduce(stringify!($name), ReduceOp::$op, dst.desc(), src.desc(), tmp.desc(), waits)
                }
            )*
        }
    };
}

row_reductions! {
    /// `dst[r][0] = sum(src[r][..])`. `tmp` must hold `rows x epr`
    /// elements when a row is wider than one repeat.
    trowsum => Sum;
    /// `dst[r][0] = max(src[r][..])`.
    trowmax => Max;
    /// `dst[r][0] = min(src[r][..])`.
    trowmin => Min;
}

impl<B: InstructionBackend> AiCore<B> {
    /// `dst[0][c] = sum(src[..][c])`, accumulated row by row.
    pub fn tcolsum<T: Element>(
        &mut self,
        dst: &impl VecOperand<T>,
        src: &impl VecOperand<T>,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        self.vcolreduce("tcolsum", BinaryOp::Add, dst.desc(), src.desc(), waits)
    }

    /// `dst[0][c] = max(src[..][c])`.
    pub fn tcolmax<T: Element>(
        &mut self,
        dst: &impl VecOperand<T>,
        src: &impl VecOperand<T>,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        self.vcolreduce("tcolmax", BinaryOp::Max, dst.desc(), src.desc(), waits)
    }

    /// `dst[0][c] = min(src[..][c])`.
    pub fn tcolmin<T: Element>(
        &mut self,
        dst: &impl VecOperand<T>,
        src: &impl VecOperand<T>,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        self.vcolreduce("tcolmin", BinaryOp::Min, dst.desc(), src.desc(), waits)
    }

    /// `dst[0][c] = product(src[..][c])`. Integer products wrap.
    pub fn tcolprod<T: Element>(
        &mut self,
        dst: &impl VecOperand<T>,
        src: &impl VecOperand<T>,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        self.vcolreduce("tcolprod", BinaryOp::Mul, dst.desc(), src.desc(), waits)
    }

    /// Column sum as a pairwise tree: rows are added in pairs into `tmp`,
    /// then `tmp` is halved in place until one row remains.
    ///
    /// `tmp` must hold `ceil(rows / 2) x cols` elements.
    pub fn tcolsum_tree<T: Element>(
        &mut self,
        dst: &impl VecOperand<T>,
        src: &impl VecOperand<T>,
        tmp: &impl VecOperand<T>,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        const NAME: &str = "tcolsum_tree";
        let (dst, src, tmp) = (dst.desc(), src.desc(), tmp.desc());
        let tok = self.begin(NAME, Pipe::V, waits);
        self.read_tile(&tok, &src);
        let Shape2 { rows, cols } = src.valid;
        let out = dst.window(0, 0, 1, cols);
        if rows == 1 && cols > 0 {
            self.unary_kernel(NAME, UnaryOp::Copy, &out, &src.window(0, 0, 1, cols), Access::Elementwise);
        } else if rows > 1 && cols > 0 {
            let half = rows.div_ceil(2);
            self.check_scratch(NAME, Shape2::new(half, cols), tmp.capacity);
            let row = |t: &TileDesc, r: usize| t.window(r, 0, 1, cols);
            // First level reads the source.
            for i in 0..rows / 2 {
                self.binary_kernel(
                    NAME,
                    BinaryOp::Add,
                    &row(&tmp, i),
                    (&row(&src, 2 * i), Access::Elementwise),
                    (&row(&src, 2 * i + 1), Access::Elementwise),
                );
            }
            if rows % 2 == 1 {
                self.unary_kernel(NAME, UnaryOp::Copy, &row(&tmp, half - 1), &row(&src, rows - 1), Access::Elementwise);
            }
            // Later levels halve the scratch in place.
            let mut live = half;
            while live > 1 {
                for i in 0..live / 2 {
                    self.binary_kernel(
                        NAME,
                        BinaryOp::Add,
                        &row(&tmp, i),
                        (&row(&tmp, 2 * i), Access::Elementwise),
                        (&row(&tmp, 2 * i + 1), Access::Elementwise),
                    );
                }
                if live % 2 == 1 {
                    self.unary_kernel(NAME, UnaryOp::Copy, &row(&tmp, live / 2), &row(&tmp, live - 1), Access::Elementwise);
                }
                live = live.div_ceil(2);
            }
            self.write_tile(&tok, &tmp.window(0, 0, half, cols));
            self.unary_kernel(NAME, UnaryOp::Copy, &out, &row(&tmp, 0), Access::Elementwise);
        }
        self.write_tile(&tok, &out);
        self.finish(tok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::arch_config::Arch;
    use crate::engine::{CoreOptions, Fault};
    use crate::testing::golden::{fill_capacity, fill_tile, read_capacity, read_tile};
    use crate::tile::descriptor::VecTile;
    use crate::vector::mask::VectorMask;
    use crate::vector::recording::RecordingBackend;
    use crate::vector::sim::SimBackend;

    fn core() -> AiCore {
        AiCore::with_options(Arch::A2A3, CoreOptions::checked())
    }

    #[test]
    fn test_rowsum_narrow_rows() {
        let mut core = core();
        let src: VecTile<f32, 4, 16> = VecTile::with_valid(0x0, 3, 10).unwrap();
        let dst: VecTile<f32, 4, 8> = VecTile::with_valid(0x400, 3, 1).unwrap();
        let tmp: VecTile<f32, 4, 64> = VecTile::new(0x800).unwrap();
        fill_tile(&mut core, &src, |r, c| (r * 100 + c) as f32);
        let ev = core.trowsum(&dst, &src, &tmp, []);
        core.wait_event(ev);
        assert_eq!(read_tile(&mut core, &dst), vec![45.0, 1045.0, 2045.0]);
        assert!(core.faults().is_empty());
    }

    #[test]
    fn test_rowmax_wide_rows_use_scratch() {
        let mut core = core();
        let src: VecTile<f32, 2, 200> = VecTile::with_valid(0x0, 2, 150).unwrap();
        let dst: VecTile<f32, 2, 8> = VecTile::with_valid(0x1000, 2, 1).unwrap();
        let tmp: VecTile<f32, 2, 64> = VecTile::new(0x2000).unwrap();
        fill_capacity(&mut core, &src, 1e9f32);
        fill_tile(&mut core, &src, |r, c| if c == 130 + r { 500.0 } else { c as f32 });
        let ev = core.trowmax(&dst, &src, &tmp, []);
        core.wait_event(ev);
        assert_eq!(read_tile(&mut core, &dst), vec![500.0, 500.0]);

        let ev = core.trowmin(&dst, &src, &tmp, []);
        core.wait_event(ev);
        assert_eq!(read_tile(&mut core, &dst), vec![0.0, 0.0]);
        assert!(core.faults().is_empty());
    }

    #[test]
    fn test_rowsum_scratch_restores_mask() {
        let backend = RecordingBackend::new(SimBackend::new(Arch::A2A3.config()));
        let mut core = AiCore::with_backend(backend, CoreOptions::checked());
        let src: VecTile<f32, 2, 200> = VecTile::with_valid(0x0, 2, 150).unwrap();
        let dst: VecTile<f32, 2, 8> = VecTile::with_valid(0x1000, 2, 1).unwrap();
        let tmp: VecTile<f32, 2, 64> = VecTile::new(0x2000).unwrap();
        fill_tile(&mut core, &src, |_, c| c as f32);
        let ev = core.trowsum(&dst, &src, &tmp, []);
        core.wait_event(ev);
        assert_eq!(read_tile(&mut core, &dst), vec![11175.0, 11175.0]);

        let rec = core.backend();
        // Columns 128..150 fold into the scratch under a 22-lane mask.
        assert!(rec.records().iter().any(|r| r.mask == VectorMask::lanes(22)));
        assert!(rec.records().last().is_some_and(|r| r.mask.is_full()));
        assert!(rec.violations().is_empty(), "{:?}", rec.violations());
        assert!(rec.mask().is_full());
    }

    #[test]
    fn test_rowsum_integer_many_rows() {
        let mut core = core();
        let src: VecTile<i32, 300, 8> = VecTile::new(0x0).unwrap();
        let dst: VecTile<i32, 300, 8> = VecTile::with_valid(0x4000, 300, 1).unwrap();
        let tmp: VecTile<i32, 1, 8> = VecTile::new(0x8000).unwrap();
        fill_tile(&mut core, &src, |r, _| r as i32);
        let ev = core.trowsum(&dst, &src, &tmp, []);
        core.wait_event(ev);
        let out = read_tile(&mut core, &dst);
        assert!(out.iter().enumerate().all(|(r, &v)| v == 8 * r as i32));
    }

    #[test]
    fn test_small_scratch_reported() {
        let mut core = core();
        let src: VecTile<f32, 4, 128> = VecTile::new(0x0).unwrap();
        let dst: VecTile<f32, 4, 8> = VecTile::with_valid(0x1000, 4, 1).unwrap();
        let tmp: VecTile<f32, 2, 64> = VecTile::new(0x2000).unwrap();
        let ev = core.trowsum(&dst, &src, &tmp, []);
        core.wait_event(ev);
        assert!(matches!(
            core.faults(),
            [Fault::ScratchTooSmall { op: "trowsum", .. }, ..]
        ));
    }

    #[test]
    fn test_column_reductions() {
        let mut core = core();
        let src: VecTile<f32, 5, 72> = VecTile::with_valid(0x0, 5, 70).unwrap();
        let dst: VecTile<f32, 1, 72> = VecTile::with_valid(0x1000, 1, 70).unwrap();
        fill_tile(&mut core, &src, |r, c| (r * 2) as f32 + c as f32);
        let ev = core.tcolsum(&dst, &src, []);
        core.wait_event(ev);
        let out = read_tile(&mut core, &dst);
        assert_eq!(out[0], 20.0);
        assert_eq!(out[69], 20.0 + 5.0 * 69.0);

        let ev = core.tcolmax(&dst, &src, []);
        core.wait_event(ev);
        assert_eq!(read_tile(&mut core, &dst)[3], 11.0);
        let ev = core.tcolmin(&dst, &src, []);
        core.wait_event(ev);
        assert_eq!(read_tile(&mut core, &dst)[3], 3.0);
    }

    #[test]
    fn test_colprod() {
        let mut core = core();
        let src: VecTile<i16, 16, 16> = VecTile::with_valid(0x0, 8, 16).unwrap();
        let dst: VecTile<i16, 1, 16> = VecTile::new(0x200).unwrap();
        fill_capacity(&mut core, &src, 3i16);
        fill_tile(&mut core, &src, |r, c| if c == 0 { r as i16 + 1 } else { -1 });
        let ev = core.tcolprod(&dst, &src, []);
        core.wait_event(ev);
        let out = read_tile(&mut core, &dst);
        // 8! = 40320 wraps in i16; rows past the valid extent are ignored.
        assert_eq!(out[0], 40320u16 as i16);
        assert!(out[1..].iter().all(|&v| v == 1));

        let src: VecTile<f32, 64, 16> = VecTile::with_valid(0x400, 7, 16).unwrap();
        let dst: VecTile<f32, 1, 16> = VecTile::new(0x2000).unwrap();
        fill_tile(&mut core, &src, |r, c| if r == c % 7 { 0.5 } else { 2.0 });
        let ev = core.tcolprod(&dst, &src, []);
        core.wait_event(ev);
        assert!(read_tile(&mut core, &dst).iter().all(|&v| v == 32.0));
        assert!(core.faults().is_empty());
    }

    #[test]
    fn test_colsum_tree_matches_sequential() {
        for rows in [1usize, 2, 5, 8, 13] {
            let mut core = core();
            let src: VecTile<i32, 16, 40> = VecTile::with_valid(0x0, rows, 33).unwrap();
            let seq: VecTile<i32, 1, 40> = VecTile::with_valid(0x1000, 1, 33).unwrap();
            let tree: VecTile<i32, 1, 40> = VecTile::with_valid(0x1100, 1, 33).unwrap();
            let tmp: VecTile<i32, 8, 40> = VecTile::new(0x2000).unwrap();
            fill_tile(&mut core, &src, |r, c| (r * 7 + c) as i32);
            fill_capacity(&mut core, &tree, -1);
            let e1 = core.tcolsum(&seq, &src, []);
            let e2 = core.tcolsum_tree(&tree, &src, &tmp, [e1]);
            core.wait_event(e2);
            assert_eq!(read_tile(&mut core, &seq), read_tile(&mut core, &tree), "rows={}", rows);
            assert_eq!(read_capacity(&mut core, &tree)[33], -1);
            assert!(core.faults().is_empty(), "rows={}", rows);
        }
    }
}
