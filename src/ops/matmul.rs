//! Matrix multiply on the cube unit.
//!
//! `c = a x b` with `a` in the left-operand tier (`M x K`), `b` in the
//! right-operand tier (`K x N`) and `c` in the accumulator. Extents come
//! from the operands' valid shapes: `M` and `K` from `a`, `N` from `b`.
//! Products accumulate at full precision and round once into the
//! accumulator type.

use crate::engine::AiCore;
use crate::sync::event::Event;
use crate::sync::pipe::Pipe;
use crate::tile::descriptor::{Acc, Bias, Left, Right, TileDesc, TileView};
use crate::tile::dtype::{ElementType, MatmulInput, Scalar};
use crate::tile::layout::Shape2;
use crate::vector::alu;
use crate::vector::backend::InstructionBackend;

/// Starting value of each output element.
#[derive(Debug, Clone, Copy)]
enum Init {
    Zero,
    Accumulate,
    Bias(TileDesc),
}

impl<B: InstructionBackend> AiCore<B> {
    /// `c = a x b`.
    pub fn tmatmul<T, C, L, R>(&mut self, c: &C, a: &L, b: &R, waits: impl IntoIterator<Item = Event>) -> Event
    where
        T: MatmulInput,
        C: TileView<Role = Acc, Elem = T::Acc>,
        L: TileView<Role = Left, Elem = T>,
        R: TileView<Role = Right, Elem = T>,
    {
        self.matmul("tmatmul", &c.desc(), &a.desc(), &b.desc(), Init::Zero, waits)
    }

    /// `c += a x b`.
    pub fn tmatmul_acc<T, C, L, R>(&mut self, c: &C, a: &L, b: &R, waits: impl IntoIterator<Item = Event>) -> Event
    where
        T: MatmulInput,
        C: TileView<Role = Acc, Elem = T::Acc>,
        L: TileView<Role = Left, Elem = T>,
        R: TileView<Role = Right, Elem = T>,
    {
        self.matmul("tmatmul_acc", &c.desc(), &a.desc(), &b.desc(), Init::Accumulate, waits)
    }

    /// `c = a x b + bias`, with `bias[j]` added to every row of column `j`.
    pub fn tmatmul_bias<T, C, L, R, S>(
        &mut self,
        c: &C,
        a: &L,
        b: &R,
        bias: &S,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event
    where
        T: MatmulInput,
        C: TileView<Role = Acc, Elem = T::Acc>,
        L: TileView<Role = Left, Elem = T>,
        R: TileView<Role = Right, Elem = T>,
        S: TileView<Role = Bias, Elem = T::Acc>,
    {
        self.matmul("tmatmul_bias", &c.desc(), &a.desc(), &b.desc(), Init::Bias(bias.desc()), waits)
    }

    fn matmul(
        &mut self,
        name: &'static str,
        c: &TileDesc,
        a: &TileDesc,
        b: &TileDesc,
        init: Init,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let tok = self.begin(name, Pipe::M, waits);
        if a.dtype == ElementType::F32 && !self.arch().supports_f32_matmul() {
            log::warn!("{}: {} has no f32 matrix path", name, self.arch().name());
        }
        let (m, k, n) = (a.valid.rows, a.valid.cols, b.valid.cols);
        if b.valid.rows != k {
            log::warn!(
                "{}: left operand is {} but right operand is {}; using K = {}",
                name,
                a.valid,
                b.valid,
                k.min(b.valid.rows)
            );
        }
        let k = k.min(b.valid.rows);
        let (m, n) = (m.min(c.capacity.rows), n.min(c.capacity.cols));
        let out = TileDesc {
            valid: Shape2::new(m, n),
            ..*c
        };

        self.read_tile(&tok, a);
        self.read_tile(&tok, b);
        match init {
            Init::Zero => {}
            Init::Accumulate => self.read_tile(&tok, &out),
            Init::Bias(ref s) => self.read_tile(&tok, s),
        }

        let acc_float = c.dtype.is_float();
        for i in 0..m {
            for j in 0..n {
                let start = match init {
                    Init::Zero => 0,
                    Init::Accumulate => self.load_elem(c, i, j),
                    Init::Bias(ref s) => self.load_elem(s, 0, j),
                };
                let value = if acc_float {
                    let mut sum = alu::to_f64(c.dtype, start);
                    for p in 0..k {
                        let x = alu::to_f64(a.dtype, self.load_elem(a, i, p));
                        let y = alu::to_f64(b.dtype, self.load_elem(b, p, j));
                        sum += x * y;
                    }
                    Scalar::Float(sum)
                } else {
                    let mut sum = c.dtype.decode(start).as_i128();
                    for p in 0..k {
                        let x = a.dtype.decode(self.load_elem(a, i, p)).as_i128();
                        let y = b.dtype.decode(self.load_elem(b, p, j)).as_i128();
                        sum += x * y;
                    }
                    Scalar::Int(sum)
                };
                self.store_elem(c, i, j, c.dtype.encode(value));
            }
        }
        log::debug!("{}: {}x{}x{}", name, m, k, n);
        self.write_tile(&tok, &out);
        self.finish(tok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::arch_config::Arch;
    use crate::engine::CoreOptions;
    use crate::testing::golden::{compare, fill_tile, read_tile};
    use crate::tile::descriptor::{AccTile, BiasTile, LeftTile, RightTile};
    use half::f16;

    fn core() -> AiCore {
        AiCore::with_options(Arch::A2A3, CoreOptions::checked())
    }

    fn reference(m: usize, k: usize, n: usize, a: impl Fn(usize, usize) -> f32, b: impl Fn(usize, usize) -> f32) -> Vec<f32> {
        let mut out = Vec::with_capacity(m * n);
        for i in 0..m {
            for j in 0..n {
                out.push((0..k).map(|p| a(i, p) * b(p, j)).sum());
            }
        }
        out
    }

    #[test]
    fn test_f16_matmul_boxed_layouts() {
        let mut core = core();
        let a: LeftTile<f16, 32, 32> = LeftTile::with_valid(0x0, 20, 24).unwrap();
        let b: RightTile<f16, 32, 32> = RightTile::with_valid(0x0, 24, 18).unwrap();
        let c: AccTile<f32, 32, 32> = AccTile::with_valid(0x0, 20, 18).unwrap();
        let fa = |i: usize, p: usize| ((i + 2 * p) % 7) as f32 - 3.0;
        let fb = |p: usize, j: usize| ((3 * p + j) % 5) as f32 * 0.5;
        fill_tile(&mut core, &a, |i, p| f16::from_f32(fa(i, p)));
        fill_tile(&mut core, &b, |p, j| f16::from_f32(fb(p, j)));
        let ev = core.tmatmul(&c, &a, &b, []);
        core.wait_event(ev);
        let got = read_tile(&mut core, &c);
        let r = compare(&reference(20, 24, 18, fa, fb), &got);
        assert!(r.passed(), "{}", r);
        assert!(core.faults().is_empty());
    }

    #[test]
    fn test_accumulate_and_bias() {
        let mut core = core();
        let a: LeftTile<f16, 16, 16> = LeftTile::new(0x0).unwrap();
        let b: RightTile<f16, 16, 16> = RightTile::new(0x0).unwrap();
        let c: AccTile<f32, 16, 16> = AccTile::new(0x0).unwrap();
        let bias: BiasTile<f32, 16> = BiasTile::new(0x0).unwrap();
        fill_tile(&mut core, &a, |i, p| f16::from_f32(if i == p { 2.0 } else { 0.0 }));
        fill_tile(&mut core, &b, |p, j| f16::from_f32((p * 16 + j) as f32));
        fill_tile(&mut core, &bias, |_, j| j as f32 * 1000.0);

        let ev = core.tmatmul_bias(&c, &a, &b, &bias, []);
        let ev = core.tmatmul_acc(&c, &a, &b, [ev]);
        core.wait_event(ev);
        let got = read_tile(&mut core, &c);
        for i in 0..16 {
            for j in 0..16 {
                let expected = 4.0 * (i * 16 + j) as f32 + j as f32 * 1000.0;
                assert_eq!(got[i * 16 + j], expected, "({}, {})", i, j);
            }
        }
    }

    #[test]
    fn test_i8_matmul_into_i32() {
        let mut core = core();
        let a: LeftTile<i8, 16, 32> = LeftTile::new(0x0).unwrap();
        let b: RightTile<i8, 32, 16> = RightTile::new(0x0).unwrap();
        let c: AccTile<i32, 16, 16> = AccTile::new(0x0).unwrap();
        fill_tile(&mut core, &a, |_, _| -128);
        fill_tile(&mut core, &b, |_, _| 127);
        let ev = core.tmatmul(&c, &a, &b, []);
        core.wait_event(ev);
        assert!(read_tile(&mut core, &c).iter().all(|&v| v == -128 * 127 * 32));
    }
}
