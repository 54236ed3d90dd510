//! Test cases described by TOML manifests.
//!
//! A manifest names one vector operation, the element type and valid
//! extent of its tiles, and a pattern for each input. The runner loads the
//! inputs from global memory into 64x128 tiles, runs the operation,
//! stores the result and compares it against a host-side reference (or an
//! explicit list of values).
//!
//! # Example Manifest
//!
//! ```toml
//! [test]
//! name = "tadd_partial"
//! description = "63x125 valid extent inside a 64x128 tile"
//!
//! [tile]
//! element_type = "f32"
//! rows = 63
//! cols = 125
//!
//! [op]
//! name = "add"
//!
//! [inputs.a]
//! type = "sequential"
//! start = 0
//! step = 1
//!
//! [inputs.b]
//! type = "constant"
//! value = 1
//!
//! [expected]
//! type = "reference"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use half::f16;
use serde::Deserialize;
use thiserror::Error;

use super::golden::{compare_bits, GoldenReport, Tolerance};
use crate::config::Config;
use crate::device::arch_config::Arch;
use crate::engine::{AiCore, CoreOptions, Fault};
use crate::ops::AtomicMode;
use crate::sync::event::Event;
use crate::tile::descriptor::VecTile;
use crate::tile::dtype::{Element, ElementType, Scalar};
use crate::tile::global::GlobalTensor;
use crate::vector::instr::{BinaryOp, ReduceOp, UnaryOp};

/// Capacity of every tile the runner allocates.
pub const CASE_ROWS: usize = 64;
pub const CASE_COLS: usize = 128;

const GM_A: u64 = 0x10_0000;
const GM_B: u64 = 0x20_0000;
const GM_OUT: u64 = 0x30_0000;

/// Failure to load or run a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unsupported element type '{0}' (expected f32, f16, i32 or i16)")]
    UnknownElementType(String),

    #[error("unknown operation '{0}'")]
    UnknownOp(String),

    #[error("unknown input pattern '{0}'")]
    UnknownPattern(String),

    #[error("valid extent {rows}x{cols} does not fit a 64x128 tile")]
    ShapeTooLarge { rows: usize, cols: usize },

    #[error("operation '{op}' needs input '{input}'")]
    MissingInput { op: String, input: &'static str },

    #[error("operation '{0}' needs a scalar")]
    MissingScalar(String),

    #[error("expected {expected} values, manifest lists {actual}")]
    ValueCount { expected: usize, actual: usize },
}

/// One manifest file.
#[derive(Debug, Clone, Deserialize)]
pub struct CaseManifest {
    pub test: CaseInfo,
    pub tile: TileDef,
    pub op: OpDef,
    #[serde(default)]
    pub inputs: HashMap<String, PatternDef>,
    #[serde(default)]
    pub expected: ExpectedDef,
    /// Overrides the runner's architecture.
    #[serde(default)]
    pub arch: Option<Arch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaseInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Element type and valid extent of the case's tiles.
#[derive(Debug, Clone, Deserialize)]
pub struct TileDef {
    pub element_type: String,
    pub rows: usize,
    pub cols: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpDef {
    pub name: String,
    #[serde(default)]
    pub scalar: Option<f64>,
}

/// Input generator, evaluated at the flat index `r * cols + c`.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternDef {
    #[serde(rename = "type")]
    pub pattern_type: String,
    #[serde(default)]
    pub start: f64,
    #[serde(default = "default_step")]
    pub step: f64,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub modulus: Option<u64>,
}

fn default_step() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpectedDef {
    #[serde(rename = "type", default = "default_expected")]
    pub expected_type: String,
    #[serde(default)]
    pub values: Option<Vec<f64>>,
    #[serde(default)]
    pub abs_tol: Option<f64>,
    #[serde(default)]
    pub rel_tol: Option<f64>,
}

fn default_expected() -> String {
    "reference".to_string()
}

impl Default for ExpectedDef {
    fn default() -> Self {
        Self {
            expected_type: default_expected(),
            values: None,
            abs_tol: None,
            rel_tol: None,
        }
    }
}

/// Operation a manifest can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseOp {
    Binary(BinaryOp),
    Scalar(BinaryOp),
    Unary(UnaryOp),
    RowReduce(ReduceOp),
    ColReduce(ReduceOp),
}

impl CaseOp {
    pub fn parse(name: &str) -> Option<Self> {
        let op = match name {
            "add" => CaseOp::Binary(BinaryOp::Add),
            "sub" => CaseOp::Binary(BinaryOp::Sub),
            "mul" => CaseOp::Binary(BinaryOp::Mul),
            "div" => CaseOp::Binary(BinaryOp::Div),
            "max" => CaseOp::Binary(BinaryOp::Max),
            "min" => CaseOp::Binary(BinaryOp::Min),
            "adds" => CaseOp::Scalar(BinaryOp::Add),
            "subs" => CaseOp::Scalar(BinaryOp::Sub),
            "muls" => CaseOp::Scalar(BinaryOp::Mul),
            "maxs" => CaseOp::Scalar(BinaryOp::Max),
            "mins" => CaseOp::Scalar(BinaryOp::Min),
            "copy" => CaseOp::Unary(UnaryOp::Copy),
            "abs" => CaseOp::Unary(UnaryOp::Abs),
            "neg" => CaseOp::Unary(UnaryOp::Neg),
            "relu" => CaseOp::Unary(UnaryOp::Relu),
            "rowsum" => CaseOp::RowReduce(ReduceOp::Sum),
            "rowmax" => CaseOp::RowReduce(ReduceOp::Max),
            "rowmin" => CaseOp::RowReduce(ReduceOp::Min),
            "colsum" => CaseOp::ColReduce(ReduceOp::Sum),
            "colmax" => CaseOp::ColReduce(ReduceOp::Max),
            "colmin" => CaseOp::ColReduce(ReduceOp::Min),
            _ => return None,
        };
        Some(op)
    }

    fn needs_b(self) -> bool {
        matches!(self, CaseOp::Binary(_))
    }

    /// Shape of the result for a `rows x cols` input.
    fn output(self, rows: usize, cols: usize) -> (usize, usize) {
        match self {
            CaseOp::RowReduce(_) => (rows, 1),
            CaseOp::ColReduce(_) => (1, cols),
            _ => (rows, cols),
        }
    }
}

impl PatternDef {
    fn value_at(&self, i: usize) -> Result<f64, ManifestError> {
        let i = i as f64;
        let v = match self.pattern_type.as_str() {
            "sequential" => self.start + i * self.step,
            "constant" => self.value,
            "zeros" => 0.0,
            "alternating" => {
                if i as u64 % 2 == 0 {
                    self.value
                } else {
                    -self.value
                }
            }
            "modular" => {
                let m = self.modulus.unwrap_or(1).max(1) as f64;
                self.start + (i * self.step).rem_euclid(m)
            }
            other => return Err(ManifestError::UnknownPattern(other.to_string())),
        };
        Ok(v)
    }
}

impl CaseManifest {
    /// Load a manifest from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(text)?)
    }

    pub fn op(&self) -> Result<CaseOp, ManifestError> {
        CaseOp::parse(&self.op.name).ok_or_else(|| ManifestError::UnknownOp(self.op.name.clone()))
    }

    /// Values of input `name` over the valid extent, or `None` if absent.
    pub fn generate_input(&self, name: &str) -> Result<Option<Vec<f64>>, ManifestError> {
        let Some(pattern) = self.inputs.get(name) else {
            return Ok(None);
        };
        (0..self.tile.rows * self.tile.cols)
            .map(|i| pattern.value_at(i))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

/// Outcome of one case.
#[derive(Debug)]
pub struct CaseResult {
    pub name: String,
    pub report: GoldenReport,
    pub faults: Vec<Fault>,
}

impl CaseResult {
    pub fn passed(&self) -> bool {
        self.report.passed() && self.faults.is_empty()
    }
}

/// Runs manifests on fresh cores built from a [`Config`].
pub struct ManifestRunner {
    config: Config,
}

impl ManifestRunner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Load and run one manifest file.
    pub fn run_file(&self, path: &Path) -> Result<CaseResult, ManifestError> {
        let manifest = CaseManifest::from_file(path)?;
        self.run(&manifest)
    }

    /// Run every `*.toml` file directly inside `dir`, in name order.
    pub fn run_dir(&self, dir: &Path) -> Result<Vec<(PathBuf, Result<CaseResult, ManifestError>)>, ManifestError> {
        let entries = fs::read_dir(dir).map_err(|source| ManifestError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();
        Ok(paths
            .into_iter()
            .map(|p| {
                let result = self.run_file(&p);
                (p, result)
            })
            .collect())
    }

    pub fn run(&self, manifest: &CaseManifest) -> Result<CaseResult, ManifestError> {
        let (rows, cols) = (manifest.tile.rows, manifest.tile.cols);
        if rows == 0 || cols == 0 || rows > CASE_ROWS || cols > CASE_COLS {
            return Err(ManifestError::ShapeTooLarge { rows, cols });
        }
        match manifest.tile.element_type.as_str() {
            "f32" => self.run_typed::<f32>(manifest),
            "f16" => self.run_typed::<f16>(manifest),
            "i32" => self.run_typed::<i32>(manifest),
            "i16" => self.run_typed::<i16>(manifest),
            other => Err(ManifestError::UnknownElementType(other.to_string())),
        }
    }

    fn run_typed<T: Element>(&self, manifest: &CaseManifest) -> Result<CaseResult, ManifestError> {
        let op = manifest.op()?;
        let (rows, cols) = (manifest.tile.rows, manifest.tile.cols);
        let dtype = T::DTYPE;
        let a = manifest.generate_input("a")?.ok_or_else(|| ManifestError::MissingInput {
            op: manifest.op.name.clone(),
            input: "a",
        })?;
        let b = match manifest.generate_input("b")? {
            Some(b) => b,
            None if op.needs_b() => {
                return Err(ManifestError::MissingInput {
                    op: manifest.op.name.clone(),
                    input: "b",
                })
            }
            None => vec![0.0; rows * cols],
        };
        let scalar = match (op, manifest.op.scalar) {
            (CaseOp::Scalar(_), None) => return Err(ManifestError::MissingScalar(manifest.op.name.clone())),
            (_, s) => s.unwrap_or(0.0),
        };

        let to_bits = |v: f64| {
            if dtype.is_float() {
                dtype.encode(Scalar::Float(v))
            } else {
                dtype.encode(Scalar::Int(v as i128))
            }
        };
        let a_bits: Vec<u64> = a.iter().map(|&v| to_bits(v)).collect();
        let b_bits: Vec<u64> = b.iter().map(|&v| to_bits(v)).collect();
        let scalar = T::from_bits(to_bits(scalar));

        let (out_rows, out_cols) = op.output(rows, cols);
        let expected = match manifest.expected.expected_type.as_str() {
            "values" => {
                let values = manifest.expected.values.clone().unwrap_or_default();
                if values.len() != out_rows * out_cols {
                    return Err(ManifestError::ValueCount {
                        expected: out_rows * out_cols,
                        actual: values.len(),
                    });
                }
                values.into_iter().map(to_bits).collect()
            }
            _ => reference(op, dtype, &a_bits, &b_bits, scalar.to_scalar(), rows, cols),
        };

        let arch = manifest.arch.unwrap_or(self.config.arch);
        let mut core = AiCore::with_options(
            arch,
            CoreOptions {
                debug_checks: true,
                ..CoreOptions::from_config(&self.config)
            },
        );
        log::info!("manifest case '{}' on {}: {:?}", manifest.test.name, arch, op);

        let actual = execute::<T>(&mut core, op, rows, cols, &a_bits, &b_bits, scalar);
        let default_tol = Tolerance::for_dtype(dtype);
        let tol = Tolerance {
            abs: manifest.expected.abs_tol.unwrap_or(default_tol.abs),
            rel: manifest.expected.rel_tol.unwrap_or(default_tol.rel),
        };
        Ok(CaseResult {
            name: manifest.test.name.clone(),
            report: compare_bits(dtype, &expected, &actual, tol),
            faults: core.take_faults(),
        })
    }
}

type CaseTile<T> = VecTile<T, CASE_ROWS, CASE_COLS>;

/// Run `op` on a fresh core and return the stored result bits.
fn execute<T: Element>(
    core: &mut AiCore,
    op: CaseOp,
    rows: usize,
    cols: usize,
    a: &[u64],
    b: &[u64],
    scalar: T,
) -> Vec<u64> {
    let bytes = CaseTile::<T>::BYTES as u64;
    // Tile capacities are fixed, so these only fail if the valid extent
    // was not checked against them.
    let tiles = (
        CaseTile::<T>::with_valid(0, rows, cols),
        CaseTile::<T>::with_valid(bytes, rows, cols),
        CaseTile::<T>::with_valid(2 * bytes, rows, cols),
        CaseTile::<T>::new(3 * bytes),
    );
    let (Ok(ta), Ok(tb), Ok(mut dst), Ok(tmp)) = tiles else {
        return Vec::new();
    };

    let gm_a = GlobalTensor::<T>::dense_2d(GM_A, rows, cols);
    let gm_b = GlobalTensor::<T>::dense_2d(GM_B, rows, cols);
    let values_a: Vec<T> = a.iter().map(|&v| T::from_bits(v)).collect();
    let values_b: Vec<T> = b.iter().map(|&v| T::from_bits(v)).collect();
    core.gm_mut().write_slice(GM_A, &values_a);
    core.gm_mut().write_slice(GM_B, &values_b);

    let ev_a = core.tload(&ta, &gm_a, []);
    let ev_b = core.tload(&tb, &gm_b, []);
    let waits: [Event; 2] = [ev_a, ev_b];

    let (out_rows, out_cols) = op.output(rows, cols);
    if dst.set_valid(out_rows, out_cols).is_err() {
        log::warn!("result extent {}x{} rejected", out_rows, out_cols);
    }
    let ev = match op {
        CaseOp::Binary(BinaryOp::Add) => core.tadd(&dst, &ta, &tb, waits),
        CaseOp::Binary(BinaryOp::Sub) => core.tsub(&dst, &ta, &tb, waits),
        CaseOp::Binary(BinaryOp::Mul) => core.tmul(&dst, &ta, &tb, waits),
        CaseOp::Binary(BinaryOp::Div) => core.tdiv(&dst, &ta, &tb, waits),
        CaseOp::Binary(BinaryOp::Max) => core.tmax(&dst, &ta, &tb, waits),
        CaseOp::Binary(_) => core.tmin(&dst, &ta, &tb, waits),
        CaseOp::Scalar(BinaryOp::Add) => core.tadds(&dst, &ta, scalar, waits),
        CaseOp::Scalar(BinaryOp::Sub) => core.tsubs(&dst, &ta, scalar, waits),
        CaseOp::Scalar(BinaryOp::Mul) => core.tmuls(&dst, &ta, scalar, waits),
        CaseOp::Scalar(BinaryOp::Max) => core.tmaxs(&dst, &ta, scalar, waits),
        CaseOp::Scalar(_) => core.tmins(&dst, &ta, scalar, waits),
        CaseOp::Unary(UnaryOp::Abs) => core.tabs(&dst, &ta, waits),
        CaseOp::Unary(UnaryOp::Neg) => core.tneg(&dst, &ta, waits),
        CaseOp::Unary(UnaryOp::Relu) => core.trelu(&dst, &ta, waits),
        CaseOp::Unary(_) => core.tcopy(&dst, &ta, waits),
        CaseOp::RowReduce(ReduceOp::Sum) => core.trowsum(&dst, &ta, &tmp, waits),
        CaseOp::RowReduce(ReduceOp::Max) => core.trowmax(&dst, &ta, &tmp, waits),
        CaseOp::RowReduce(ReduceOp::Min) => core.trowmin(&dst, &ta, &tmp, waits),
        CaseOp::ColReduce(ReduceOp::Sum) => core.tcolsum(&dst, &ta, waits),
        CaseOp::ColReduce(ReduceOp::Max) => core.tcolmax(&dst, &ta, waits),
        CaseOp::ColReduce(ReduceOp::Min) => core.tcolmin(&dst, &ta, waits),
    };

    let out = GlobalTensor::<T>::dense_2d(GM_OUT, out_rows, out_cols);
    let ev = core.tstore(&out, &dst, AtomicMode::None, [ev]);
    core.wait_event(ev);
    (0..out_rows * out_cols)
        .map(|i| core.gm().read_elem(GM_OUT + (i * T::DTYPE.size()) as u64, T::DTYPE))
        .collect()
}

/// Host-side reference over decoded values, rounded once into `dtype`.
fn reference(
    op: CaseOp,
    dtype: ElementType,
    a: &[u64],
    b: &[u64],
    scalar: Scalar,
    rows: usize,
    cols: usize,
) -> Vec<u64> {
    let float = dtype.is_float();
    let get = |v: &[u64], i: usize| dtype.decode(v[i]);
    let bin = |op: BinaryOp, x: Scalar, y: Scalar| -> Scalar {
        if float {
            let (x, y) = (x.as_f64(), y.as_f64());
            Scalar::Float(match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                BinaryOp::Div => x / y,
                BinaryOp::Max => x.max(y),
                _ => x.min(y),
            })
        } else {
            let (x, y) = (x.as_i128(), y.as_i128());
            Scalar::Int(match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                BinaryOp::Div if y == 0 => 0,
                BinaryOp::Div => x / y,
                BinaryOp::Max => x.max(y),
                _ => x.min(y),
            })
        }
    };
    let fold = |op: ReduceOp, values: &mut dyn Iterator<Item = Scalar>| -> Scalar {
        let combine = op.combine();
        let mut acc: Option<Scalar> = None;
        for v in values {
            acc = Some(match acc {
                None => v,
                Some(a) => bin(combine, a, v),
            });
        }
        acc.unwrap_or(Scalar::Int(0))
    };

    let results: Vec<Scalar> = match op {
        CaseOp::Binary(o) => (0..rows * cols).map(|i| bin(o, get(a, i), get(b, i))).collect(),
        CaseOp::Scalar(o) => (0..rows * cols).map(|i| bin(o, get(a, i), scalar)).collect(),
        CaseOp::Unary(o) => (0..rows * cols)
            .map(|i| {
                let x = get(a, i);
                match (o, x) {
                    (UnaryOp::Abs, Scalar::Float(f)) => Scalar::Float(f.abs()),
                    (UnaryOp::Abs, Scalar::Int(n)) => Scalar::Int(n.abs()),
                    (UnaryOp::Neg, Scalar::Float(f)) => Scalar::Float(-f),
                    (UnaryOp::Neg, Scalar::Int(n)) => Scalar::Int(-n),
                    (UnaryOp::Relu, Scalar::Float(f)) => Scalar::Float(f.max(0.0)),
                    (UnaryOp::Relu, Scalar::Int(n)) => Scalar::Int(n.max(0)),
                    _ => x,
                }
            })
            .collect(),
        CaseOp::RowReduce(o) => (0..rows)
            .map(|r| fold(o, &mut (0..cols).map(|c| get(a, r * cols + c))))
            .collect(),
        CaseOp::ColReduce(o) => (0..cols)
            .map(|c| fold(o, &mut (0..rows).map(|r| get(a, r * cols + c))))
            .collect(),
    };
    results.into_iter().map(|s| dtype.encode(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(op: &str, dtype: &str, rows: usize, cols: usize, extra: &str) -> CaseManifest {
        let text = format!(
            r#"
[test]
name = "{op}_{dtype}"

[tile]
element_type = "{dtype}"
rows = {rows}
cols = {cols}

[op]
name = "{op}"

[inputs.a]
type = "sequential"
start = -50
step = 1

[inputs.b]
type = "modular"
start = 1
step = 3
modulus = 7
{extra}
"#
        );
        CaseManifest::from_toml(&text).unwrap()
    }

    fn runner() -> ManifestRunner {
        ManifestRunner::new(Config::default())
    }

    #[test]
    fn test_parse_manifest() {
        let m = manifest("add", "f32", 4, 8, "");
        assert_eq!(m.test.name, "add_f32");
        assert_eq!(m.op().unwrap(), CaseOp::Binary(BinaryOp::Add));
        assert_eq!(m.expected.expected_type, "reference");
        let b = m.generate_input("b").unwrap().unwrap();
        assert_eq!(&b[..4], &[1.0, 4.0, 7.0, 3.0]);
        assert!(m.generate_input("c").unwrap().is_none());
    }

    #[test]
    fn test_binary_cases_pass() {
        for (op, dtype) in [("add", "f32"), ("mul", "i32"), ("max", "i16"), ("sub", "f16"), ("div", "i32")] {
            let result = runner().run(&manifest(op, dtype, 63, 125, "")).unwrap();
            assert!(result.passed(), "{} {}: {} {:?}", op, dtype, result.report, result.faults);
        }
    }

    #[test]
    fn test_unary_scalar_and_reductions_pass() {
        for op in ["abs", "neg", "relu", "copy", "rowsum", "rowmax", "colmin", "colsum"] {
            let result = runner().run(&manifest(op, "i32", 37, 100, "")).unwrap();
            assert!(result.passed(), "{}: {} {:?}", op, result.report, result.faults);
        }
        let mut m = manifest("muls", "f32", 16, 64, "");
        m.op.scalar = Some(0.5);
        assert!(runner().run(&m).unwrap().passed());
    }

    #[test]
    fn test_explicit_values() {
        let m = manifest(
            "rowsum",
            "i32",
            2,
            3,
            "[expected]\ntype = \"values\"\nvalues = [-147, -138]\n",
        );
        assert!(runner().run(&m).unwrap().passed());

        let wrong = manifest("rowsum", "i32", 2, 3, "[expected]\ntype = \"values\"\nvalues = [0, -138]\n");
        let result = runner().run(&wrong).unwrap();
        assert_eq!(result.report.mismatch_count, 1);
        assert_eq!(result.report.first_mismatch().map(|m| m.index), Some(0));
    }

    #[test]
    fn test_errors() {
        let r = runner();
        assert!(matches!(
            r.run(&manifest("add", "f32", 65, 8, "")),
            Err(ManifestError::ShapeTooLarge { rows: 65, .. })
        ));
        assert!(matches!(
            r.run(&manifest("add", "u64", 4, 8, "")),
            Err(ManifestError::UnknownElementType(_))
        ));
        assert!(matches!(r.run(&manifest("fma", "f32", 4, 8, "")), Err(ManifestError::UnknownOp(_))));
        assert!(matches!(r.run(&manifest("adds", "f32", 4, 8, "")), Err(ManifestError::MissingScalar(_))));
        assert!(matches!(
            CaseManifest::from_toml("[test]\nname = 1"),
            Err(ManifestError::Parse(_))
        ));
        assert!(matches!(
            r.run_file(Path::new("/nonexistent/case.toml")),
            Err(ManifestError::Io { .. })
        ));
    }

    #[test]
    fn test_arch_override() {
        let text = "arch = \"kirin9030\"\n[test]\nname = \"k\"\n[tile]\nelement_type = \"f32\"\nrows = 64\ncols = 128\n[op]\nname = \"relu\"\n[inputs.a]\ntype = \"alternating\"\nvalue = 2.5\n";
        let m = CaseManifest::from_toml(text).unwrap();
        assert_eq!(m.arch, Some(Arch::Kirin9030));
        let result = runner().run(&m).unwrap();
        assert!(result.passed(), "{}", result.report);
    }
}
