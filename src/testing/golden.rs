//! Golden-output comparison.
//!
//! Helpers to seed and read back tiles directly through tier memory
//! (bypassing the pipes and the hazard tracker), and to compare results
//! against reference vectors with a per-type tolerance.

use std::fmt;

use crate::device::global_memory::GlobalMemory;
use crate::device::hw_spec::SORT_RECORD_BYTES;
use crate::engine::AiCore;
use crate::tile::descriptor::TileView;
use crate::tile::dtype::{Element, ElementType};
use crate::vector::alu;
use crate::vector::backend::InstructionBackend;

/// Mismatches kept in a report; the rest are only counted.
const MAX_REPORTED: usize = 16;

// ============================================================================
// Tile seeding and readback
// ============================================================================

/// Write `f(r, c)` into every valid element of `tile`.
pub fn fill_tile<B, V>(core: &mut AiCore<B>, tile: &V, f: impl Fn(usize, usize) -> V::Elem)
where
    B: InstructionBackend,
    V: TileView,
{
    let d = tile.desc();
    for r in 0..d.valid.rows {
        for c in 0..d.valid.cols {
            core.tiers_mut()
                .write_elem(d.tier, d.elem_addr(r, c), d.dtype, f(r, c).to_bits());
        }
    }
}

/// Write `value` into every element of the capacity, valid or not.
pub fn fill_capacity<B, V>(core: &mut AiCore<B>, tile: &V, value: V::Elem)
where
    B: InstructionBackend,
    V: TileView,
{
    let d = tile.desc();
    for r in 0..d.capacity.rows {
        for c in 0..d.capacity.cols {
            core.tiers_mut()
                .write_elem(d.tier, d.elem_addr(r, c), d.dtype, value.to_bits());
        }
    }
}

/// The valid extent, flattened row by row.
pub fn read_tile<B, V>(core: &mut AiCore<B>, tile: &V) -> Vec<V::Elem>
where
    B: InstructionBackend,
    V: TileView,
{
    let d = tile.desc();
    let mut out = Vec::with_capacity(d.valid.numel());
    for r in 0..d.valid.rows {
        for c in 0..d.valid.cols {
            let bits = core.tiers_mut().read_elem(d.tier, d.elem_addr(r, c), d.dtype);
            out.push(V::Elem::from_bits(bits));
        }
    }
    out
}

/// The whole capacity, indexed `r * capacity.cols + c` regardless of layout.
pub fn read_capacity<B, V>(core: &mut AiCore<B>, tile: &V) -> Vec<V::Elem>
where
    B: InstructionBackend,
    V: TileView,
{
    let d = tile.desc();
    let mut out = Vec::with_capacity(d.capacity.numel());
    for r in 0..d.capacity.rows {
        for c in 0..d.capacity.cols {
            let bits = core.tiers_mut().read_elem(d.tier, d.elem_addr(r, c), d.dtype);
            out.push(V::Elem::from_bits(bits));
        }
    }
    out
}

/// Decode the first `count` (value, index) sort records at `tile`'s base.
pub fn read_records<B, V>(core: &mut AiCore<B>, tile: &V, count: usize) -> Vec<(V::Elem, u32)>
where
    B: InstructionBackend,
    V: TileView,
{
    let d = tile.desc();
    (0..count)
        .map(|i| {
            let addr = d.addr + (i * SORT_RECORD_BYTES) as u64;
            let value = core.tiers_mut().read_elem(d.tier, addr, d.dtype);
            let index = core.tiers_mut().read_elem(d.tier, addr + 4, ElementType::U32);
            (V::Elem::from_bits(value), index as u32)
        })
        .collect()
}

/// Encode `records` as sort records from `tile`'s base.
pub fn write_records<B, V>(core: &mut AiCore<B>, tile: &V, records: &[(V::Elem, u32)])
where
    B: InstructionBackend,
    V: TileView,
{
    let d = tile.desc();
    for (i, (value, index)) in records.iter().enumerate() {
        let addr = d.addr + (i * SORT_RECORD_BYTES) as u64;
        core.tiers_mut().write_elem(d.tier, addr, ElementType::U32, 0);
        core.tiers_mut().write_elem(d.tier, addr, d.dtype, value.to_bits());
        core.tiers_mut()
            .write_elem(d.tier, addr + 4, ElementType::U32, *index as u64);
    }
}

// ============================================================================
// Comparison
// ============================================================================

/// Allowed difference between expected and actual values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub abs: f64,
    pub rel: f64,
}

impl Tolerance {
    /// Bit-exact comparison.
    pub const EXACT: Tolerance = Tolerance { abs: 0.0, rel: 0.0 };

    /// Default tolerance for values of `dtype`.
    pub fn for_dtype(dtype: ElementType) -> Self {
        match dtype {
            ElementType::F32 => Tolerance { abs: 1e-6, rel: 1e-5 },
            ElementType::F16 => Tolerance { abs: 1e-3, rel: 1e-3 },
            ElementType::BF16 => Tolerance { abs: 1e-2, rel: 1e-2 },
            _ => Self::EXACT,
        }
    }

    fn accepts(&self, expected: f64, actual: f64) -> bool {
        if expected.is_nan() || actual.is_nan() {
            return expected.is_nan() && actual.is_nan();
        }
        if expected == actual {
            return true;
        }
        let diff = (expected - actual).abs();
        diff <= self.abs || diff <= self.rel * expected.abs()
    }
}

/// One element that differs from the reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch {
    pub index: usize,
    pub expected: f64,
    pub actual: f64,
}

/// Result of comparing a buffer against its reference.
#[derive(Debug, Clone, PartialEq)]
pub struct GoldenReport {
    pub total: usize,
    pub mismatch_count: usize,
    /// The first mismatches, in index order.
    pub mismatches: Vec<Mismatch>,
}

impl GoldenReport {
    pub fn passed(&self) -> bool {
        self.mismatch_count == 0
    }

    pub fn first_mismatch(&self) -> Option<&Mismatch> {
        self.mismatches.first()
    }
}

impl fmt::Display for GoldenReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} correct", self.total - self.mismatch_count, self.total)?;
        if let Some(m) = self.first_mismatch() {
            write!(f, ", first mismatch at {}: expected {}, got {}", m.index, m.expected, m.actual)?;
        }
        Ok(())
    }
}

/// Compare raw element bits of `dtype` with `tol`.
///
/// Lengths that differ count every missing position as a mismatch.
pub fn compare_bits(dtype: ElementType, expected: &[u64], actual: &[u64], tol: Tolerance) -> GoldenReport {
    let total = expected.len().max(actual.len());
    let mut report = GoldenReport {
        total,
        mismatch_count: 0,
        mismatches: Vec::new(),
    };
    for index in 0..total {
        let e = expected.get(index).map(|&b| alu::to_f64(dtype, b));
        let a = actual.get(index).map(|&b| alu::to_f64(dtype, b));
        let ok = match (e, a) {
            (Some(e), Some(a)) if dtype.is_float() => tol.accepts(e, a),
            (Some(_), Some(_)) => expected[index] == actual[index],
            _ => false,
        };
        if !ok {
            report.mismatch_count += 1;
            if report.mismatches.len() < MAX_REPORTED {
                report.mismatches.push(Mismatch {
                    index,
                    expected: e.unwrap_or(f64::NAN),
                    actual: a.unwrap_or(f64::NAN),
                });
            }
        }
    }
    report
}

/// Compare typed values with the default tolerance of `T`.
pub fn compare<T: Element>(expected: &[T], actual: &[T]) -> GoldenReport {
    let e: Vec<u64> = expected.iter().map(|v| v.to_bits()).collect();
    let a: Vec<u64> = actual.iter().map(|v| v.to_bits()).collect();
    compare_bits(T::DTYPE, &e, &a, Tolerance::for_dtype(T::DTYPE))
}

/// Compare a tile's valid extent against `expected` (row by row).
pub fn compare_tile<B, V>(core: &mut AiCore<B>, tile: &V, expected: &[V::Elem]) -> GoldenReport
where
    B: InstructionBackend,
    V: TileView,
{
    let actual = read_tile(core, tile);
    compare(expected, &actual)
}

/// Compare `expected.len()` elements of global memory at `addr`.
pub fn compare_global<T: Element>(gm: &GlobalMemory, addr: u64, expected: &[T]) -> GoldenReport {
    let actual: Vec<u64> = (0..expected.len())
        .map(|i| gm.read_elem(addr + (i * T::DTYPE.size()) as u64, T::DTYPE))
        .collect();
    let e: Vec<u64> = expected.iter().map(|v| v.to_bits()).collect();
    compare_bits(T::DTYPE, &e, &actual, Tolerance::for_dtype(T::DTYPE))
}
