//! Element-wise arithmetic, fill, index ramp and type conversion.
//!
//! All of these run on the vector pipe and iterate the destination's valid
//! extent; sources are addressed at the same `(row, col)`.

use super::VecOperand;
use crate::engine::AiCore;
use crate::sync::event::Event;
use crate::sync::pipe::Pipe;
use crate::tile::descriptor::TileDesc;
use crate::tile::dtype::{Element, FloatElement, IntElement, Scalar};
use crate::vector::backend::InstructionBackend;
use crate::vector::dispatch::{all_dense, operand, plan, row_blocks, Access};
use crate::vector::instr::{BinaryOp, RoundMode, UnaryOp, VectorInstr};

// ============================================================================
// Kernels (no synchronization bracket)
// ============================================================================

impl<B: InstructionBackend> AiCore<B> {
    /// `dst = a op b` over `dst.valid`.
    pub(crate) fn binary_kernel(
        &mut self,
        name: &str,
        op: BinaryOp,
        dst: &TileDesc,
        a: (&TileDesc, Access),
        b: (&TileDesc, Access),
    ) {
        let (d, (sa, aa), (sb, ab)) = (*dst, (*a.0, a.1), (*b.0, b.1));
        let dtype = d.dtype;
        let epr = self.epr(dtype.size());
        let dense = aa == Access::Elementwise && ab == Access::Elementwise && all_dense(d.valid, &[&d, &sa, &sb]);
        let p = plan(d.valid, epr, &[row_blocks(&d), row_blocks(&sa), row_blocks(&sb)], dense);
        self.run(name, &p, |issue| VectorInstr::Binary {
            op,
            dtype,
            dst: operand(&d, &issue.shape, epr, Access::Elementwise),
            src0: operand(&sa, &issue.shape, epr, aa),
            src1: operand(&sb, &issue.shape, epr, ab),
            repeat: issue.shape.repeat(),
        });
    }

    /// `dst = src op scalar` over `dst.valid`.
    pub(crate) fn scalar_kernel(&mut self, name: &str, op: BinaryOp, dst: &TileDesc, src: &TileDesc, scalar: Scalar) {
        let (d, s) = (*dst, *src);
        let dtype = d.dtype;
        let epr = self.epr(dtype.size());
        let p = plan(d.valid, epr, &[row_blocks(&d), row_blocks(&s)], all_dense(d.valid, &[&d, &s]));
        self.run(name, &p, |issue| VectorInstr::BinaryScalar {
            op,
            dtype,
            dst: operand(&d, &issue.shape, epr, Access::Elementwise),
            src: operand(&s, &issue.shape, epr, Access::Elementwise),
            scalar,
            repeat: issue.shape.repeat(),
        });
    }

    /// `dst = op(src)` over `dst.valid`, reading `src` through `access`.
    pub(crate) fn unary_kernel(&mut self, name: &str, op: UnaryOp, dst: &TileDesc, src: &TileDesc, access: Access) {
        let (d, s) = (*dst, *src);
        let dtype = d.dtype;
        let epr = self.epr(dtype.size());
        let dense = access == Access::Elementwise && all_dense(d.valid, &[&d, &s]);
        let p = plan(d.valid, epr, &[row_blocks(&d), row_blocks(&s)], dense);
        self.run(name, &p, |issue| VectorInstr::Unary {
            op,
            dtype,
            dst: operand(&d, &issue.shape, epr, Access::Elementwise),
            src: operand(&s, &issue.shape, epr, access),
            repeat: issue.shape.repeat(),
        });
    }

    /// `dst = scalar` over `dst.valid`.
    pub(crate) fn fill_kernel(&mut self, name: &str, dst: &TileDesc, scalar: Scalar) {
        let d = *dst;
        let dtype = d.dtype;
        let epr = self.epr(dtype.size());
        let p = plan(d.valid, epr, &[row_blocks(&d)], all_dense(d.valid, &[&d]));
        self.run(name, &p, |issue| VectorInstr::Duplicate {
            dtype,
            dst: operand(&d, &issue.shape, epr, Access::Elementwise),
            scalar,
            repeat: issue.shape.repeat(),
        });
    }

    // ------------------------------------------------------------------
    // Bracketed runners shared by the generated wrappers
    // ------------------------------------------------------------------

    fn vbinary(
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
        self.binary_kernel(name, op, &dst, (&a, Access::Elementwise), (&b, Access::Elementwise));
        self.write_tile(&tok, &dst);
        self.finish(tok)
    }

    fn vscalar(
        &mut self,
        name: &'static str,
        op: BinaryOp,
        dst: TileDesc,
        src: TileDesc,
        scalar: Scalar,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let tok = self.begin(name, Pipe::V, waits);
        self.read_tile(&tok, &src);
        self.scalar_kernel(name, op, &dst, &src, scalar);
        self.write_tile(&tok, &dst);
        self.finish(tok)
    }

    fn vunary(
        &mut self,
        name: &'static str,
        op: UnaryOp,
        dst: TileDesc,
        src: TileDesc,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let tok = self.begin(name, Pipe::V, waits);
        self.read_tile(&tok, &src);
        self.unary_kernel(name, op, &dst, &src, Access::Elementwise);
        self.write_tile(&tok, &dst);
        self.finish(tok)
    }
}

// ============================================================================
// Public operations
// ============================================================================

macro_rules! binary_ops {
    ($($(#[$doc:meta])* $name:ident, $sname:ident => $op:ident: $bound:ident;)*) => {
        impl<B: InstructionBackend> AiCore<B> {
            $(
                $(#[$doc])*
                pub fn $name<T: $bound>(
                    &mut self,
                    dst: &impl VecOperand<T>,
                    a: &impl VecOperand<T>,
                    b: &impl VecOperand<T>,
                    waits: impl IntoIterator<Item = Event>,
                ) -> Event {
                    self.vbinary(stringify!($name), BinaryOp::$op, dst.desc(), a.desc(), b.desc(), waits)
                }

                #[doc = concat!("Scalar form of [`AiCore::", stringify!($name), "`].")]
                pub fn $sname<T: $bound>(
                    &mut self,
                    dst: &impl VecOperand<T>,
                    src: &impl VecOperand<T>,
                    scalar: T,
                    waits: impl IntoIterator<Item = Event>,
                ) -> Event {
                    self.vscalar(stringify!($sname), BinaryOp::$op, dst.desc(), src.desc(), scalar.to_scalar(), waits)
                }
            )*
        }
    };
}

binary_ops! {
    /// `dst = a + b`.
    tadd, tadds => Add: Element;
    /// `dst = a - b`.
    tsub, tsubs => Sub: Element;
    /// `dst = a * b`.
    tmul, tmuls => Mul: Element;
    /// `dst = a / b`. Integer division by zero yields zero.
    tdiv, tdivs => Div: Element;
    /// `dst = max(a, b)`.
    tmax, tmaxs => Max: Element;
    /// `dst = min(a, b)`.
    tmin, tmins => Min: Element;
    /// Bitwise `dst = a & b`.
    tand, tands => And: IntElement;
    /// Bitwise `dst = a | b`.
    tor, tors => Or: IntElement;
    /// Bitwise `dst = a ^ b`.
    txor, txors => Xor: IntElement;
    /// `dst = a % b` (truncated; `fmod` for floats).
    trem, trems => Rem: Element;
    /// `dst = a - trunc(a / b) * b` evaluated in floating point. Integer
    /// lanes go through f16 (up to 16 bits) or f32, so large integers
    /// lose precision the way the vector unit's conversion sequence does.
    tfmod, tfmods => Fmod: Element;
    /// `dst = a > 0 ? a : a * slope`, with a per-element slope tile or,
    /// in the scalar form (leaky ReLU), one slope for every element.
    tprelu, tlrelu => Prelu: FloatElement;
}

macro_rules! unary_ops {
    ($($(#[$doc:meta])* $name:ident => $op:ident: $bound:ident;)*) => {
        impl<B: InstructionBackend> AiCore<B> {
            $(
                $(#[$doc])*
                pub fn $name<T: $bound>(
                    &mut self,
                    dst: &impl VecOperand<T>,
                    src: &impl VecOperand<T>,
                    waits: impl IntoIterator<Item = Event>,
                ) -> Event {
                    self.vunary(stringify!($name), UnaryOp::$op, dst.desc(), src.desc(), waits)
                }
            )*
        }
    };
}

unary_ops! {
    /// Copy the valid extent.
    tcopy => Copy: Element;
    /// `|x|`.
    tabs => Abs: Element;
    /// `-x`.
    tneg => Neg: Element;
    /// `e^x`.
    texp => Exp: FloatElement;
    /// Natural logarithm.
    tlog => Ln: FloatElement;
    /// Square root.
    tsqrt => Sqrt: FloatElement;
    /// `1 / sqrt(x)`.
    trsqrt => Rsqrt: FloatElement;
    /// `1 / x`.
    trecip => Recip: FloatElement;
    /// `max(x, 0)`.
    trelu => Relu: Element;
    /// Bitwise complement.
    tnot => Not: IntElement;
}

impl<B: InstructionBackend> AiCore<B> {
    /// Fill the valid extent with `scalar`.
    pub fn texpands<T: Element>(
        &mut self,
        dst: &impl VecOperand<T>,
        scalar: T,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let d = dst.desc();
        let tok = self.begin("texpands", Pipe::V, waits);
        self.fill_kernel("texpands", &d, scalar.to_scalar());
        self.write_tile(&tok, &d);
        self.finish(tok)
    }

    /// Index ramp: `dst[r][c] = start + c`, or `start - c` when
    /// `descending`. Every valid row holds the same ramp; values wrap.
    pub fn tci<T: IntElement>(
        &mut self,
        dst: &impl VecOperand<T>,
        start: T,
        descending: bool,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let d = dst.desc();
        let tok = self.begin("tci", Pipe::V, waits);
        let base = start.to_scalar().as_i128();
        for c in 0..d.valid.cols {
            let step = c as i128;
            let value = if descending { base - step } else { base + step };
            let bits = d.dtype.encode(Scalar::Int(value));
            for r in 0..d.valid.rows {
                self.store_elem(&d, r, c, bits);
            }
        }
        self.write_tile(&tok, &d);
        self.finish(tok)
    }

    /// Triangular 0/1 pattern over the valid extent. With `upper`, cell
    /// `(r, c)` is 1 where `c - r >= diagonal`; otherwise where
    /// `c - r <= diagonal`. Every other valid cell is 0.
    pub fn ttri<T: Element>(
        &mut self,
        dst: &impl VecOperand<T>,
        upper: bool,
        diagonal: i64,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let d = dst.desc();
        let tok = self.begin("ttri", Pipe::V, waits);
        let (one, zero) = (d.dtype.encode(Scalar::Int(1)), d.dtype.encode(Scalar::Int(0)));
        for r in 0..d.valid.rows {
            for c in 0..d.valid.cols {
                let k = c as i64 - r as i64;
                let set = if upper { k >= diagonal } else { k <= diagonal };
                self.store_elem(&d, r, c, if set { one } else { zero });
            }
        }
        self.write_tile(&tok, &d);
        self.finish(tok)
    }

    /// Convert `src` into `dst`'s element type with `round`.
    ///
    /// Lanes per repeat follow the wider of the two types.
    pub fn tcvt<D: Element, S: Element>(
        &mut self,
        dst: &impl VecOperand<D>,
        src: &impl VecOperand<S>,
        round: RoundMode,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let (d, s) = (dst.desc(), src.desc());
        let tok = self.begin("tcvt", Pipe::V, waits);
        self.read_tile(&tok, &s);
        let epr = self.epr(D::DTYPE.size().max(S::DTYPE.size()));
        let p = plan(d.valid, epr, &[row_blocks(&d), row_blocks(&s)], all_dense(d.valid, &[&d, &s]));
        self.run("tcvt", &p, |issue| VectorInstr::Convert {
            dst_type: D::DTYPE,
            src_type: S::DTYPE,
            round,
            dst: operand(&d, &issue.shape, epr, Access::Elementwise),
            src: operand(&s, &issue.shape, epr, Access::Elementwise),
            repeat: issue.shape.repeat(),
        });
        self.write_tile(&tok, &d);
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
    use crate::vector::recording::RecordingBackend;
    use crate::vector::sim::SimBackend;
    use crate::vector::mask::VectorMask;

    fn core() -> AiCore {
        AiCore::with_options(Arch::A2A3, CoreOptions::checked())
    }

    #[test]
    fn test_tadd_64x64() {
        let mut core = core();
        let a: VecTile<f32, 64, 64> = VecTile::new(0x0).unwrap();
        let b: VecTile<f32, 64, 64> = VecTile::new(0x4000).unwrap();
        let d: VecTile<f32, 64, 64> = VecTile::new(0x8000).unwrap();
        fill_tile(&mut core, &a, |r, c| (r * 64 + c) as f32);
        fill_tile(&mut core, &b, |_, _| 1.0);
        let ev = core.tadd(&d, &a, &b, []);
        core.wait_event(ev);
        let out = read_tile(&mut core, &d);
        for (i, v) in out.iter().enumerate() {
            assert_eq!(*v, i as f32 + 1.0);
        }
        assert!(core.faults().is_empty());
    }

    #[test]
    fn test_chunking_matches_reference_and_respects_extent() {
        for cols in [1usize, 63, 64, 65, 127, 128, 129, 191, 192] {
            let mut core = core();
            let a: VecTile<f32, 5, 192> = VecTile::with_valid(0x0, 5, cols).unwrap();
            let b: VecTile<f32, 5, 192> = VecTile::with_valid(0x1000, 5, cols).unwrap();
            let d: VecTile<f32, 5, 192> = VecTile::with_valid(0x2000, 4, cols).unwrap();
            fill_tile(&mut core, &a, |r, c| (r * 1000 + c) as f32);
            fill_tile(&mut core, &b, |r, c| (c as f32) * 0.5 - r as f32);
            fill_capacity(&mut core, &d, -7.0f32);
            let ev = core.tmul(&d, &a, &b, []);
            core.wait_event(ev);
            let full = read_capacity(&mut core, &d);
            for r in 0..5 {
                for c in 0..192 {
                    let got = full[r * 192 + c];
                    if r < 4 && c < cols {
                        let want = (r * 1000 + c) as f32 * ((c as f32) * 0.5 - r as f32);
                        assert_eq!(got, want, "cols={} ({}, {})", cols, r, c);
                    } else {
                        assert_eq!(got, -7.0, "cols={} wrote outside ({}, {})", cols, r, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_scalar_and_unary() {
        let mut core = core();
        let s: VecTile<i32, 2, 16> = VecTile::new(0x0).unwrap();
        let d: VecTile<i32, 2, 16> = VecTile::new(0x100).unwrap();
        fill_tile(&mut core, &s, |r, c| c as i32 - 8 * r as i32);
        let e1 = core.tsubs(&d, &s, 3, []);
        let e2 = core.tabs(&d, &d, [e1]);
        let e3 = core.tands(&d, &d, 0x6, [e2]);
        core.wait_event(e3);
        let out = read_tile(&mut core, &d);
        assert_eq!(out[0], 3 & 0x6);
        assert_eq!(out[16], 11 & 0x6);
        assert!(core.faults().is_empty());
    }

    #[test]
    fn test_float_unary() {
        let mut core = core();
        let t: VecTile<f32, 1, 8> = VecTile::new(0x0).unwrap();
        fill_tile(&mut core, &t, |_, c| (c * c) as f32);
        let ev = core.tsqrt(&t, &t, []);
        core.wait_event(ev);
        assert_eq!(read_tile(&mut core, &t), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_texpands_partial_extent() {
        let mut core = core();
        let t: VecTile<half::f16, 4, 32> = VecTile::with_valid(0x0, 3, 5).unwrap();
        fill_capacity(&mut core, &t, half::f16::from_f32(9.0));
        let ev = core.texpands(&t, half::f16::from_f32(-1.5), []);
        core.wait_event(ev);
        let full = read_capacity(&mut core, &t);
        assert_eq!(full[4].to_f32(), -1.5);
        assert_eq!(full[5].to_f32(), 9.0);
        assert_eq!(full[2 * 32 + 4].to_f32(), -1.5);
        assert_eq!(full[3 * 32].to_f32(), 9.0);
    }

    #[test]
    fn test_tci_ramps() {
        let mut core = core();
        let up: VecTile<i32, 2, 8> = VecTile::with_valid(0x0, 2, 5).unwrap();
        let down: VecTile<i16, 1, 16> = VecTile::new(0x100).unwrap();
        let e1 = core.tci(&up, 10, false, []);
        let e2 = core.tci(&down, 3, true, []);
        core.wait_event(e1);
        core.wait_event(e2);
        assert_eq!(read_tile(&mut core, &up), vec![10, 11, 12, 13, 14, 10, 11, 12, 13, 14]);
        let d = read_tile(&mut core, &down);
        assert_eq!((d[0], d[3], d[15]), (3, 0, -12));
    }

    #[test]
    fn test_tcvt_f32_to_i32_and_f16() {
        let mut core = core();
        let s: VecTile<f32, 2, 64> = VecTile::with_valid(0x0, 2, 40).unwrap();
        let i: VecTile<i32, 2, 64> = VecTile::with_valid(0x1000, 2, 40).unwrap();
        let h: VecTile<half::f16, 2, 64> = VecTile::with_valid(0x2000, 2, 40).unwrap();
        fill_tile(&mut core, &s, |r, c| c as f32 + 0.5 - r as f32 * 100.0);
        let e1 = core.tcvt(&i, &s, RoundMode::Rint, []);
        let e2 = core.tcvt(&h, &s, RoundMode::None, []);
        core.wait_event(e1);
        core.wait_event(e2);
        let ints = read_tile(&mut core, &i);
        assert_eq!(ints[0], 0); // 0.5 -> 0 (ties to even)
        assert_eq!(ints[1], 2); // 1.5 -> 2
        assert_eq!(ints[40], -100); // -99.5 -> -100
        let halves = read_tile(&mut core, &h);
        assert_eq!(halves[3].to_f32(), 3.5);
    }

    #[test]
    fn test_mask_restored_after_partial_chunk() {
        let backend = RecordingBackend::new(SimBackend::new(Arch::A2A3.config()));
        let mut core = AiCore::with_backend(backend, CoreOptions::default());
        let a: VecTile<f32, 64, 128> = VecTile::with_valid(0x0, 63, 125).unwrap();
        let ev = core.tadds(&a, &a, 1.0, []);
        core.wait_event(ev);
        let rec = core.backend();
        assert_eq!(rec.records().len(), 2);
        assert_eq!(rec.records()[1].mask, VectorMask::lanes(61));
        assert!(rec.violations().is_empty());
        assert!(rec.mask().is_full());
    }

    #[test]
    fn test_txor() {
        let mut core = core();
        let a: VecTile<i16, 2, 16> = VecTile::new(0x0).unwrap();
        let b: VecTile<i16, 2, 16> = VecTile::new(0x40).unwrap();
        let d: VecTile<i16, 2, 16> = VecTile::with_valid(0x80, 2, 13).unwrap();
        fill_capacity(&mut core, &d, 99i16);
        fill_tile(&mut core, &a, |r, c| (r * 16 + c) as i16);
        fill_tile(&mut core, &b, |_, _| 0x0f0f);
        let e1 = core.txor(&d, &a, &b, []);
        core.wait_event(e1);
        let full = read_capacity(&mut core, &d);
        assert_eq!(full[0], 0x0f0f);
        assert_eq!(full[12], 12 ^ 0x0f0f);
        assert_eq!(full[13], 99);
        assert_eq!(full[16 + 1], 17 ^ 0x0f0f);

        let e2 = core.txors(&d, &a, -1, [e1]);
        core.wait_event(e2);
        assert_eq!(read_tile(&mut core, &d)[5], !5);
        assert!(core.faults().is_empty());
    }

    #[test]
    fn test_tfmods() {
        let mut core = core();
        let f: VecTile<f32, 2, 8> = VecTile::new(0x0).unwrap();
        fill_tile(&mut core, &f, |r, c| (c as f32 + 0.5) * if r == 0 { 1.0 } else { -1.0 });
        let ev = core.tfmods(&f, &f, 3.0, []);
        core.wait_event(ev);
        let out = read_tile(&mut core, &f);
        assert_eq!(&out[..8], &[0.5, 1.5, 2.5, 0.5, 1.5, 2.5, 0.5, 1.5]);
        assert_eq!(out[8 + 4], -1.5);

        let i: VecTile<i32, 1, 8> = VecTile::new(0x100).unwrap();
        fill_tile(&mut core, &i, |_, c| [7, -7, 16_777_217, 0, 2, 9, -9, 1][c]);
        let ev = core.tfmods(&i, &i, 3, []);
        core.wait_event(ev);
        assert_eq!(read_tile(&mut core, &i), vec![1, -1, 1, 0, 2, 0, 0, 1]);

        let j: VecTile<i32, 1, 8> = VecTile::new(0x200).unwrap();
        fill_tile(&mut core, &j, |_, c| 16_777_217 + c as i32);
        let ev = core.trems(&j, &j, 3, []);
        core.wait_event(ev);
        assert_eq!(read_tile(&mut core, &j)[0], 2);
    }

    #[test]
    fn test_prelu_and_lrelu() {
        let mut core = core();
        let x: VecTile<f32, 2, 8> = VecTile::new(0x0).unwrap();
        let slope: VecTile<f32, 2, 8> = VecTile::new(0x100).unwrap();
        let d: VecTile<f32, 2, 8> = VecTile::new(0x200).unwrap();
        fill_tile(&mut core, &x, |_, c| c as f32 - 4.0);
        fill_tile(&mut core, &slope, |r, _| if r == 0 { 0.5 } else { 0.25 });
        let ev = core.tprelu(&d, &x, &slope, []);
        core.wait_event(ev);
        let out = read_tile(&mut core, &d);
        assert_eq!(&out[..8], &[-2.0, -1.5, -1.0, -0.5, 0.0, 1.0, 2.0, 3.0]);
        assert_eq!(out[8], -1.0);

        let h: VecTile<half::f16, 1, 16> = VecTile::with_valid(0x300, 1, 4).unwrap();
        fill_tile(&mut core, &h, |_, c| half::f16::from_f32([-8.0, -0.5, 0.0, 6.0][c]));
        let ev = core.tlrelu(&h, &h, half::f16::from_f32(0.125), []);
        core.wait_event(ev);
        let out: Vec<f32> = read_tile(&mut core, &h).iter().map(|v| v.to_f32()).collect();
        assert_eq!(out, vec![-1.0, -0.0625, 0.0, 6.0]);
    }

    #[test]
    fn test_ttri_matches_triangles() {
        let mut core = core();
        let t: VecTile<f32, 128, 128> = VecTile::with_valid(0x0, 128, 111).unwrap();
        fill_capacity(&mut core, &t, 7.0f32);
        for (upper, diagonal) in [(false, -2), (false, 2), (true, -2), (true, 2), (true, 444), (false, -444)] {
            let ev = core.ttri(&t, upper, diagonal, []);
            core.wait_event(ev);
            let out = read_tile(&mut core, &t);
            for r in 0..128 {
                for c in 0..111 {
                    let k = c as i64 - r as i64;
                    let set = if upper { k >= diagonal } else { k <= diagonal };
                    assert_eq!(out[r * 111 + c], if set { 1.0 } else { 0.0 }, "({}, {})", r, c);
                }
            }
        }
        // Columns past the valid extent keep their old contents.
        assert_eq!(read_capacity(&mut core, &t)[111], 7.0);

        let i: VecTile<u16, 4, 16> = VecTile::new(0x10000).unwrap();
        let ev = core.ttri(&i, false, 0, []);
        core.wait_event(ev);
        let out = read_tile(&mut core, &i);
        assert_eq!(&out[16..20], &[1, 1, 0, 0]);
        assert!(core.faults().is_empty());
    }

    #[test]
    fn test_binary_with_mixed_operand_capacities() {
        // max over a 60x60 extent: dst 60x128, src0 64x64, src1 60x128.
        let mut core = core();
        let d: VecTile<f32, 60, 128> = VecTile::with_valid(0x0, 60, 60).unwrap();
        let a: VecTile<f32, 64, 64> = VecTile::with_valid(0x8000, 60, 60).unwrap();
        let b: VecTile<f32, 60, 128> = VecTile::with_valid(0xc000, 60, 60).unwrap();
        fill_capacity(&mut core, &d, f32::MAX);
        fill_tile(&mut core, &a, |r, c| (r * 60 + c) as f32);
        fill_tile(&mut core, &b, |r, c| (c * 60 + r) as f32);
        let ev = core.tmax(&d, &a, &b, []);
        core.wait_event(ev);
        let full = read_capacity(&mut core, &d);
        for r in 0..60 {
            for c in 0..128 {
                let expected = if c < 60 { (r * 60 + c).max(c * 60 + r) as f32 } else { f32::MAX };
                assert_eq!(full[r * 128 + c], expected, "({}, {})", r, c);
            }
        }

        // mul over 16x64: dst 16x64, both sources 16x128.
        let d: VecTile<half::f16, 16, 64> = VecTile::new(0x0).unwrap();
        let a: VecTile<half::f16, 16, 128> = VecTile::with_valid(0x8000, 16, 64).unwrap();
        let b: VecTile<half::f16, 16, 128> = VecTile::with_valid(0xc000, 16, 64).unwrap();
        fill_tile(&mut core, &a, |r, _| half::f16::from_f32(r as f32));
        fill_tile(&mut core, &b, |_, c| half::f16::from_f32(c as f32 * 0.5));
        let ev = core.tmul(&d, &a, &b, []);
        core.wait_event(ev);
        let out = read_tile(&mut core, &d);
        assert_eq!(out[3 * 64 + 10].to_f32(), 15.0);
        assert!(core.faults().is_empty());
    }

    fn recording_core() -> AiCore<RecordingBackend<SimBackend>> {
        AiCore::with_backend(RecordingBackend::new(SimBackend::new(Arch::A2A3.config())), CoreOptions::checked())
    }

    #[test]
    fn test_tcvt_restores_mask() {
        let mut core = recording_core();
        let s: VecTile<f32, 3, 96> = VecTile::with_valid(0x0, 3, 70).unwrap();
        let h: VecTile<half::f16, 3, 96> = VecTile::with_valid(0x1000, 3, 70).unwrap();
        fill_tile(&mut core, &s, |r, c| (r * 70 + c) as f32);
        let ev = core.tcvt(&h, &s, RoundMode::Rint, []);
        core.wait_event(ev);
        let out = read_tile(&mut core, &h);
        assert!(out.iter().enumerate().all(|(i, v)| v.to_f32() == i as f32));

        let rec = core.backend();
        let masks: Vec<VectorMask> = rec.records().iter().map(|r| r.mask).collect();
        assert_eq!(masks, vec![VectorMask::FULL, VectorMask::lanes(6)]);
        assert!(rec.violations().is_empty(), "{:?}", rec.violations());
        assert!(rec.mask().is_full());
    }

    #[test]
    fn test_count_mode_restores_mask() {
        // 256 full f32 repeats exceed the 255-repeat limit.
        let mut core = recording_core();
        let t: VecTile<f32, 256, 64> = VecTile::new(0x0).unwrap();
        fill_tile(&mut core, &t, |r, c| (r + c) as f32);
        let ev = core.tadds(&t, &t, 0.5, []);
        core.wait_event(ev);
        let out = read_tile(&mut core, &t);
        assert_eq!((out[0], out[64 * 255 + 63]), (0.5, 318.5));

        let rec = core.backend();
        assert_eq!(rec.records().len(), 1);
        assert_eq!(rec.records()[0].mask, VectorMask::count(256 * 64));
        assert!(rec.violations().is_empty(), "{:?}", rec.violations());
        assert!(rec.mask().is_full());
        assert!(core.faults().is_empty());
    }

    #[test]
    fn test_per_row_plan_restores_mask() {
        // A 2048-wide f32 row spans 256 blocks, past the 8-bit stride field.
        let mut core = recording_core();
        let t: VecTile<f32, 2, 2048> = VecTile::with_valid(0x0, 2, 100).unwrap();
        fill_capacity(&mut core, &t, 1.0f32);
        let ev = core.tmuls(&t, &t, 3.0, []);
        core.wait_event(ev);
        let full = read_capacity(&mut core, &t);
        assert!(full[..100].iter().all(|&v| v == 3.0));
        assert_eq!(full[100], 1.0);
        assert!(full[2048..2148].iter().all(|&v| v == 3.0));
        assert_eq!(full[2148], 1.0);

        let rec = core.backend();
        let masks: Vec<VectorMask> = rec.records().iter().map(|r| r.mask).collect();
        let tail = VectorMask::lanes(36);
        assert_eq!(masks, vec![VectorMask::FULL, tail, VectorMask::FULL, tail]);
        assert!(rec.violations().is_empty(), "{:?}", rec.violations());
        assert!(rec.mask().is_full());
        assert!(core.faults().is_empty());
    }

    #[test]
    fn test_race_without_event() {
        let mut core = core();
        let g = crate::tile::global::GlobalTensor::<f32>::dense_2d(0x10000, 8, 8);
        let t: VecTile<f32, 8, 8> = VecTile::new(0).unwrap();
        let load = core.tload(&t, &g, []);
        let add = core.tadd(&t, &t, &t, []);
        core.wait_event(load);
        core.wait_event(add);
        assert!(core.faults().iter().any(|f| matches!(f, Fault::Race(_))));
    }
}
