//! Built-in end-to-end scenarios.
//!
//! Each scenario stages inputs in global memory, runs a short op sequence
//! on a fresh core and checks the stored result against a host reference.

use std::fmt;

use crate::config::Config;
use crate::device::global_memory::{MemoryError, Traffic};
use crate::engine::{AiCore, CoreOptions, Fault};
use crate::ops::{AtomicMode, SortList};
use crate::tile::descriptor::{VecTile, VecTileCol};
use crate::tile::global::GlobalTensor;

use super::golden::{compare, compare_global, fill_capacity, read_capacity, read_records, write_records, GoldenReport};

const GM_A: u64 = 0x10_0000;
const GM_B: u64 = 0x20_0000;
const GM_OUT: u64 = 0x30_0000;

/// Value left in capacity outside the valid extent.
const SENTINEL: f32 = -7777.0;

/// Outcome of one scenario.
#[derive(Debug)]
pub struct ScenarioResult {
    pub name: &'static str,
    pub report: GoldenReport,
    pub faults: Vec<Fault>,
    /// Global memory traffic per registered region.
    pub traffic: Traffic,
}

impl ScenarioResult {
    pub fn passed(&self) -> bool {
        self.report.passed() && self.faults.is_empty()
    }
}

impl fmt::Display for ScenarioResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed() { "PASS" } else { "FAIL" };
        write!(f, "{:<12} {}  {}", self.name, status, self.report)?;
        if !self.faults.is_empty() {
            write!(f, ", {} fault(s)", self.faults.len())?;
        }
        Ok(())
    }
}

fn core_for(config: &Config) -> AiCore {
    AiCore::with_options(
        config.arch,
        CoreOptions {
            debug_checks: true,
            ..CoreOptions::from_config(config)
        },
    )
}

fn register(core: &mut AiCore, regions: &[(&str, u64, usize)]) -> Result<(), MemoryError> {
    for &(name, base, size) in regions {
        core.gm_mut().allocate_region(name, base, size)?;
    }
    Ok(())
}

/// Every built-in scenario, in order.
pub fn run_all(config: &Config) -> Vec<ScenarioResult> {
    vec![scenario_a(config), scenario_b(config), merge(config)]
}

/// 64x64 f32 add: `a[r][c] = r*64 + c`, `b = 1`.
pub fn scenario_a(config: &Config) -> ScenarioResult {
    const N: usize = 64;
    let mut core = core_for(config);
    let bytes = N * N * 4;
    if register(&mut core, &[("a", GM_A, bytes), ("b", GM_B, bytes), ("out", GM_OUT, bytes)]).is_err() {
        return setup_failed("scenario-a", N * N);
    }
    let a: Vec<f32> = (0..N * N).map(|i| i as f32).collect();
    core.gm_mut().write_slice(GM_A, &a);
    core.gm_mut().write_slice(GM_B, &vec![1.0f32; N * N]);

    let gm_a = GlobalTensor::<f32>::dense_2d(GM_A, N, N);
    let gm_b = GlobalTensor::<f32>::dense_2d(GM_B, N, N);
    let out = GlobalTensor::<f32>::dense_2d(GM_OUT, N, N);
    let bytes = VecTile::<f32, N, N>::BYTES as u64;
    let tiles = (
        VecTile::<f32, N, N>::new(0),
        VecTile::<f32, N, N>::new(bytes),
        VecTile::<f32, N, N>::new(2 * bytes),
    );
    let (Ok(ta), Ok(tb), Ok(dst)) = tiles else {
        return setup_failed("scenario-a", N * N);
    };

    let ev_a = core.tload(&ta, &gm_a, []);
    let ev_b = core.tload(&tb, &gm_b, []);
    let ev = core.tadd(&dst, &ta, &tb, [ev_a, ev_b]);
    let ev = core.tstore(&out, &dst, AtomicMode::None, [ev]);
    core.wait_event(ev);

    let expected: Vec<f32> = (0..N * N).map(|i| i as f32 + 1.0).collect();
    ScenarioResult {
        name: "scenario-a",
        report: compare_global(core.gm(), GM_OUT, &expected),
        faults: core.take_faults(),
        traffic: core.gm().traffic(),
    }
}

/// 63x125 valid extent inside 64x128 tiles, moved into a column-major tile.
///
/// The whole capacity of both result tiles is compared: inside the valid
/// extent against a full-size computation, outside it against the sentinel.
pub fn scenario_b(config: &Config) -> ScenarioResult {
    const ROWS: usize = 64;
    const COLS: usize = 128;
    const VR: usize = 63;
    const VC: usize = 125;
    let mut core = core_for(config);
    let bytes = ROWS * COLS * 4;
    if register(&mut core, &[("a", GM_A, bytes), ("b", GM_B, bytes)]).is_err() {
        return setup_failed("scenario-b", ROWS * COLS * 2);
    }
    let f = |r: usize, c: usize| (r * COLS + c) as f32 * 0.25 - 100.0;
    let g = |r: usize, c: usize| ((r + 3 * c) % 11) as f32;
    let a: Vec<f32> = (0..ROWS * COLS).map(|i| f(i / COLS, i % COLS)).collect();
    let b: Vec<f32> = (0..ROWS * COLS).map(|i| g(i / COLS, i % COLS)).collect();
    core.gm_mut().write_slice(GM_A, &a);
    core.gm_mut().write_slice(GM_B, &b);

    let gm_a = GlobalTensor::<f32>::strided_2d(GM_A, VR, VC, COLS);
    let gm_b = GlobalTensor::<f32>::strided_2d(GM_B, VR, VC, COLS);
    let bytes = VecTile::<f32, ROWS, COLS>::BYTES as u64;
    let tiles = (
        VecTile::<f32, ROWS, COLS>::with_valid(0, VR, VC),
        VecTile::<f32, ROWS, COLS>::with_valid(bytes, VR, VC),
        VecTile::<f32, ROWS, COLS>::with_valid(2 * bytes, VR, VC),
        VecTileCol::<f32, ROWS, COLS>::with_valid(3 * bytes, VR, VC),
    );
    let (Ok(ta), Ok(tb), Ok(dst), Ok(col)) = tiles else {
        return setup_failed("scenario-b", ROWS * COLS * 2);
    };
    fill_capacity(&mut core, &dst, SENTINEL);
    fill_capacity(&mut core, &col, SENTINEL);

    let ev_a = core.tload(&ta, &gm_a, []);
    let ev_b = core.tload(&tb, &gm_b, []);
    let ev = core.tadd(&dst, &ta, &tb, [ev_a, ev_b]);
    let ev = core.tmov(&col, &dst, [ev]);
    core.wait_event(ev);

    let expected_at = |r: usize, c: usize| {
        if r < VR && c < VC {
            f(r, c) + g(r, c)
        } else {
            SENTINEL
        }
    };
    let expected: Vec<f32> = (0..ROWS * COLS)
        .map(|i| expected_at(i / COLS, i % COLS))
        .collect();
    let mut actual = read_capacity(&mut core, &dst);
    actual.extend(read_capacity(&mut core, &col));
    let expected: Vec<f32> = expected.iter().chain(expected.iter()).copied().collect();
    ScenarioResult {
        name: "scenario-b",
        report: compare(&expected, &actual),
        faults: core.take_faults(),
        traffic: core.gm().traffic(),
    }
}

/// Merge sorted lists of 5 and 8 records into one list of 13.
pub fn merge(config: &Config) -> ScenarioResult {
    let mut core = core_for(config);
    let tiles = (
        VecTile::<f32, 1, 16>::new(0x0),
        VecTile::<f32, 1, 16>::new(0x100),
        VecTile::<f32, 1, 32>::new(0x200),
    );
    let (Ok(a), Ok(b), Ok(dst)) = tiles else {
        return setup_failed("merge", 13);
    };
    let left: Vec<(f32, u32)> = (0..5).map(|i| (10.0 - 2.0 * i as f32, i)).collect();
    let right: Vec<(f32, u32)> = (0..8).map(|i| (9.5 - 1.5 * i as f32, 100 + i)).collect();
    write_records(&mut core, &a, &left);
    write_records(&mut core, &b, &right);

    let (ev, counts) = core.tmrgsort(&dst, &[SortList::new(&a, 5), SortList::new(&b, 8)], false, []);
    core.wait_event(ev);

    let mut expected: Vec<(f32, u32)> = left.iter().chain(right.iter()).copied().collect();
    expected.sort_by(|x, y| y.0.total_cmp(&x.0));
    let got = read_records(&mut core, &dst, counts.total());

    let values = |v: &[(f32, u32)]| v.iter().map(|r| r.0).collect::<Vec<_>>();
    let mut report = compare(&values(&expected), &values(&got));
    let indices_match = expected.iter().map(|r| r.1).eq(got.iter().map(|r| r.1));
    if counts.consumed() != [5, 8] || !indices_match {
        log::warn!("merge: consumed {:?}, indices match: {}", counts.consumed(), indices_match);
        report.mismatch_count += 1;
    }
    ScenarioResult {
        name: "merge",
        report,
        faults: core.take_faults(),
        traffic: core.gm().traffic(),
    }
}

fn setup_failed(name: &'static str, total: usize) -> ScenarioResult {
    log::error!("{}: tile setup rejected", name);
    ScenarioResult {
        name,
        report: GoldenReport {
            total,
            mismatch_count: total,
            mismatches: Vec::new(),
        },
        faults: Vec::new(),
        traffic: Traffic::default(),
    }
}
