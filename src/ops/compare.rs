//! Predicate bitmasks and selection.
//!
//! A compare writes one bit per source element into a `u8` mask tile: bit
//! `c % 8` of byte `c / 8` in the mask row matching the source row. The
//! mask tile must therefore have at least `ceil(cols / 8)` columns.

use super::VecOperand;
use crate::engine::AiCore;
use crate::sync::event::Event;
use crate::sync::pipe::Pipe;
use crate::tile::descriptor::TileDesc;
use crate::tile::dtype::{Element, Scalar};
use crate::tile::layout::Shape2;
use crate::vector::backend::InstructionBackend;
use crate::vector::dispatch::{bit_operand, operand, plan, row_blocks, Access, IssueShape};
use crate::vector::instr::{CmpMode, Rhs, VectorInstr};

/// Second compare/select source.
#[derive(Debug, Clone, Copy)]
enum Second {
    Tile(TileDesc),
    Scalar(Scalar),
}

impl Second {
    fn rhs(&self, shape: &IssueShape, epr: usize) -> Rhs {
        match self {
            Second::Tile(d) => Rhs::Vector(operand(d, shape, epr, Access::Elementwise)),
            Second::Scalar(s) => Rhs::Scalar(*s),
        }
    }

    fn blocks(&self) -> usize {
        match self {
            Second::Tile(d) => row_blocks(d),
            Second::Scalar(_) => 0,
        }
    }
}

impl<B: InstructionBackend> AiCore<B> {
    fn check_mask_width(&mut self, op: &'static str, mask: &TileDesc, valid: Shape2) {
        let needed = Shape2::new(valid.rows, valid.cols.div_ceil(8));
        self.check_scratch(op, needed, mask.capacity);
    }

    fn vcompare(
        &mut self,
        name: &'static str,
        mode: CmpMode,
        dst: TileDesc,
        a: TileDesc,
        b: Second,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let tok = self.begin(name, Pipe::V, waits);
        self.read_tile(&tok, &a);
        if let Second::Tile(d) = &b {
            self.read_tile(&tok, d);
        }
        let valid = a.valid;
        self.check_mask_width(name, &dst, valid);
        let dtype = a.dtype;
        let epr = self.epr(dtype.size());
        let p = plan(valid, epr, &[row_blocks(&dst), row_blocks(&a), b.blocks()], false);
        self.run(name, &p, |issue| VectorInstr::Compare {
            mode,
            dtype,
            dst: bit_operand(&dst, &issue.shape),
            src0: operand(&a, &issue.shape, epr, Access::Elementwise),
            src1: b.rhs(&issue.shape, epr),
            repeat: issue.shape.repeat(),
        });
        let written = dst.window(0, 0, valid.rows, valid.cols.div_ceil(8));
        self.write_tile(&tok, &written);
        self.finish(tok)
    }

    fn vselect(
        &mut self,
        name: &'static str,
        dst: TileDesc,
        mask: TileDesc,
        a: TileDesc,
        b: Second,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let tok = self.begin(name, Pipe::V, waits);
        let valid = dst.valid;
        self.read_tile(&tok, &mask.window(0, 0, valid.rows, valid.cols.div_ceil(8)));
        self.read_tile(&tok, &a);
        if let Second::Tile(d) = &b {
            self.read_tile(&tok, d);
        }
        self.check_mask_width(name, &mask, valid);
        let dtype = dst.dtype;
        let epr = self.epr(dtype.size());
        let p = plan(
            valid,
            epr,
            &[row_blocks(&dst), row_blocks(&mask), row_blocks(&a), b.blocks()],
            false,
        );
        self.run(name, &p, |issue| VectorInstr::Select {
            dtype,
            dst: operand(&dst, &issue.shape, epr, Access::Elementwise),
            mask: bit_operand(&mask, &issue.shape),
            src0: operand(&a, &issue.shape, epr, Access::Elementwise),
            src1: b.rhs(&issue.shape, epr),
            repeat: issue.shape.repeat(),
        });
        self.write_tile(&tok, &dst);
        self.finish(tok)
    }

    /// `mask[r][c] = a[r][c] <mode> b[r][c]` over `a`'s valid extent.
    pub fn tcmp<T: Element>(
        &mut self,
        dst: &impl VecOperand<u8>,
        a: &impl VecOperand<T>,
        b: &impl VecOperand<T>,
        mode: CmpMode,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        self.vcompare("tcmp", mode, dst.desc(), a.desc(), Second::Tile(b.desc()), waits)
    }

    /// `mask[r][c] = a[r][c] <mode> scalar`.
    pub fn tcmps<T: Element>(
        &mut self,
        dst: &impl VecOperand<u8>,
        a: &impl VecOperand<T>,
        scalar: T,
        mode: CmpMode,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        self.vcompare("tcmps", mode, dst.desc(), a.desc(), Second::Scalar(scalar.to_scalar()), waits)
    }

    /// `dst = mask ? a : b` over `dst`'s valid extent.
    pub fn tsel<T: Element>(
        &mut self,
        dst: &impl VecOperand<T>,
        mask: &impl VecOperand<u8>,
        a: &impl VecOperand<T>,
        b: &impl VecOperand<T>,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        self.vselect("tsel", dst.desc(), mask.desc(), a.desc(), Second::Tile(b.desc()), waits)
    }

    /// `dst = mask ? a : scalar`.
    pub fn tsels<T: Element>(
        &mut self,
        dst: &impl VecOperand<T>,
        mask: &impl VecOperand<u8>,
        a: &impl VecOperand<T>,
        scalar: T,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        self.vselect("tsels", dst.desc(), mask.desc(), a.desc(), Second::Scalar(scalar.to_scalar()), waits)
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
    use crate::vector::recording::{IssueRecord, RecordingBackend};
    use crate::vector::sim::SimBackend;

    fn bit(bytes: &[u8], row_bytes: usize, r: usize, c: usize) -> bool {
        (bytes[r * row_bytes + c / 8] >> (c % 8)) & 1 == 1
    }

    #[test]
    fn test_compare_then_select_across_chunks() {
        let mut core = AiCore::with_options(Arch::A2A3, CoreOptions::checked());
        let a: VecTile<f32, 3, 96> = VecTile::with_valid(0x0, 3, 70).unwrap();
        let b: VecTile<f32, 3, 96> = VecTile::with_valid(0x800, 3, 70).unwrap();
        let m: VecTile<u8, 3, 32> = VecTile::new(0x1000).unwrap();
        let d: VecTile<f32, 3, 96> = VecTile::with_valid(0x1800, 3, 70).unwrap();
        fill_tile(&mut core, &a, |r, c| (c + r) as f32);
        fill_tile(&mut core, &b, |_, _| 40.0);
        fill_capacity(&mut core, &d, 0.0f32);

        let e1 = core.tcmps(&m, &a, 35.0, CmpMode::Ge, []);
        let bits = read_capacity(&mut core, &m);
        for r in 0..3 {
            for c in 0..70 {
                assert_eq!(bit(&bits, 32, r, c), c + r >= 35, "({}, {})", r, c);
            }
        }
        let e2 = core.tsel(&d, &m, &a, &b, [e1]);
        core.wait_event(e2);
        let out = read_tile(&mut core, &d);
        assert_eq!(out[0], 40.0);
        assert_eq!(out[35], 35.0);
        assert_eq!(out[70 + 69], 70.0);
        assert!(core.faults().is_empty());
    }

    #[test]
    fn test_compare_tiles_and_select_scalar() {
        let mut core = AiCore::new(Arch::A5);
        let a: VecTile<i16, 2, 16> = VecTile::new(0x0).unwrap();
        let b: VecTile<i16, 2, 16> = VecTile::new(0x40).unwrap();
        let m: VecTile<u8, 2, 32> = VecTile::new(0x80).unwrap();
        let d: VecTile<i16, 2, 16> = VecTile::new(0xc0).unwrap();
        fill_tile(&mut core, &a, |r, c| (c as i16) * if r == 0 { 1 } else { -1 });
        fill_tile(&mut core, &b, |_, _| 0);
        let e1 = core.tcmp(&m, &a, &b, CmpMode::Gt, []);
        let e2 = core.tsels(&d, &m, &a, -1, [e1]);
        core.wait_event(e2);
        let out = read_tile(&mut core, &d);
        assert_eq!(&out[..4], &[-1, 1, 2, 3]);
        assert!(out[16..].iter().all(|&v| v == -1));
    }

    #[test]
    fn test_compare_select_restore_mask() {
        let backend = RecordingBackend::new(SimBackend::new(Arch::A2A3.config()));
        let mut core = AiCore::with_backend(backend, CoreOptions::checked());
        let a: VecTile<f32, 3, 96> = VecTile::with_valid(0x0, 3, 70).unwrap();
        let b: VecTile<f32, 3, 96> = VecTile::with_valid(0x800, 3, 70).unwrap();
        let m: VecTile<u8, 3, 32> = VecTile::new(0x1000).unwrap();
        let d: VecTile<f32, 3, 96> = VecTile::with_valid(0x1800, 3, 70).unwrap();
        fill_tile(&mut core, &a, |_, c| c as f32);
        fill_tile(&mut core, &b, |_, c| (69 - c) as f32);

        let e1 = core.tcmp(&m, &a, &b, CmpMode::Lt, []);
        core.wait_event(e1);
        assert!(core.backend().mask().is_full());
        let compares = core.backend().records().len();

        let e2 = core.tsel(&d, &m, &a, &b, [e1]);
        core.wait_event(e2);
        let out = read_tile(&mut core, &d);
        let expected: Vec<f32> = (0..3 * 70).map(|i| (i % 70).min(69 - i % 70) as f32).collect();
        assert_eq!(out, expected);

        let rec = core.backend();
        let tails = |records: &[IssueRecord]| {
            records.iter().filter(|r| r.mask == VectorMask::lanes(6)).count()
        };
        assert_eq!(tails(&rec.records()[..compares]), 1);
        assert_eq!(tails(&rec.records()[compares..]), 1);
        assert!(rec.violations().is_empty(), "{:?}", rec.violations());
        assert!(rec.mask().is_full());
        assert!(core.faults().is_empty());
    }

    #[test]
    fn test_narrow_mask_reported() {
        let mut core = AiCore::with_options(Arch::A2A3, CoreOptions::checked());
        let a: VecTile<u8, 1, 64> = VecTile::new(0x0).unwrap();
        let m: VecTile<u8, 1, 32> = VecTile::new(0x100).unwrap();
        // 64 columns need 8 mask bytes; 32 is plenty, so no fault.
        let ev = core.tcmps(&m, &a, 0, CmpMode::Eq, []);
        core.wait_event(ev);
        assert!(core.faults().is_empty());
        let wide: VecTile<u8, 2, 512> = VecTile::new(0x200).unwrap();
        let ev = core.tcmps(&m, &wide, 0, CmpMode::Eq, []);
        core.wait_event(ev);
        assert!(matches!(core.faults(), [Fault::ScratchTooSmall { op: "tcmps", .. }]));
    }
}
