//! Per-lane arithmetic used by the functional simulator.
//!
//! Every function takes and returns raw element bits so the simulator can
//! stay type-erased. Integer results wrap to the element width; integer
//! division by zero yields zero and remainder by zero yields the dividend
//! (the hardware does not trap).

use half::{bf16, f16};

use super::instr::{BinaryOp, CmpMode, RoundMode, UnaryOp};
use crate::tile::dtype::{ElementType, Scalar};

/// Apply a two-input op.
pub fn binary(op: BinaryOp, dtype: ElementType, a: u64, b: u64) -> u64 {
    if matches!(op, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor) {
        let r = match op {
            BinaryOp::And => a & b,
            BinaryOp::Or => a | b,
            _ => a ^ b,
        };
        return r & dtype.bit_mask();
    }
    let result = match (dtype.decode(a), dtype.decode(b)) {
        (Scalar::Int(x), Scalar::Int(y)) if op == BinaryOp::Fmod => Scalar::Int(int_fmod(dtype, x, y)),
        (Scalar::Int(x), Scalar::Int(y)) => Scalar::Int(int_binary(op, x, y)),
        (x, y) => Scalar::Float(float_binary(op, x.as_f64(), y.as_f64())),
    };
    dtype.encode(result)
}

fn int_binary(op: BinaryOp, x: i128, y: i128) -> i128 {
    match op {
        BinaryOp::Add => x.wrapping_add(y),
        BinaryOp::Sub => x.wrapping_sub(y),
        BinaryOp::Mul => x.wrapping_mul(y),
        BinaryOp::Div => {
            if y == 0 {
                0
            } else {
                x.wrapping_div(y)
            }
        }
        BinaryOp::Rem | BinaryOp::Fmod => {
            if y == 0 {
                x
            } else {
                x.wrapping_rem(y)
            }
        }
        BinaryOp::Max => x.max(y),
        BinaryOp::Min => x.min(y),
        BinaryOp::And => x & y,
        BinaryOp::Or => x | y,
        BinaryOp::Xor => x ^ y,
        BinaryOp::Prelu => {
            if x > 0 {
                x
            } else {
                x.wrapping_mul(y)
            }
        }
    }
}

/// `x - trunc(x / y) * y` with every step rounded to the float type the
/// vector unit converts integers of `dtype` into.
fn int_fmod(dtype: ElementType, x: i128, y: i128) -> i128 {
    if y == 0 {
        return x;
    }
    let narrow = |v: f64| {
        if dtype.size() <= 2 {
            f16::from_f64(v).to_f64()
        } else {
            v as f32 as f64
        }
    };
    let (xf, yf) = (narrow(x as f64), narrow(y as f64));
    let q = narrow(xf / yf).trunc();
    let r = narrow(xf - narrow(q * yf));
    round_half_even(r) as i128
}

fn float_binary(op: BinaryOp, x: f64, y: f64) -> f64 {
    match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        BinaryOp::Rem | BinaryOp::Fmod => x % y,
        BinaryOp::Max => x.max(y),
        BinaryOp::Min => x.min(y),
        BinaryOp::Prelu => {
            if x > 0.0 {
                x
            } else {
                x * y
            }
        }
        // Bitwise ops are handled on raw bits before decoding.
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => f64::NAN,
    }
}

/// Apply a two-input op with a scalar second operand.
pub fn binary_scalar(op: BinaryOp, dtype: ElementType, a: u64, scalar: Scalar) -> u64 {
    binary(op, dtype, a, dtype.encode(scalar))
}

/// Apply a one-input op.
pub fn unary(op: UnaryOp, dtype: ElementType, a: u64) -> u64 {
    match op {
        UnaryOp::Copy => return a & dtype.bit_mask(),
        UnaryOp::Not => return !a & dtype.bit_mask(),
        _ => {}
    }
    let result = match dtype.decode(a) {
        Scalar::Int(x) => match op {
            UnaryOp::Abs => Scalar::Int(x.wrapping_abs()),
            UnaryOp::Neg => Scalar::Int(x.wrapping_neg()),
            UnaryOp::Relu => Scalar::Int(x.max(0)),
            _ => Scalar::Float(float_unary(op, x as f64)),
        },
        Scalar::Float(x) => Scalar::Float(float_unary(op, x)),
    };
    dtype.encode(result)
}

fn float_unary(op: UnaryOp, x: f64) -> f64 {
    match op {
        UnaryOp::Abs => x.abs(),
        UnaryOp::Neg => -x,
        UnaryOp::Exp => x.exp(),
        UnaryOp::Ln => x.ln(),
        UnaryOp::Sqrt => x.sqrt(),
        UnaryOp::Rsqrt => 1.0 / x.sqrt(),
        UnaryOp::Recip => 1.0 / x,
        UnaryOp::Relu => {
            if x > 0.0 {
                x
            } else {
                0.0
            }
        }
        UnaryOp::Copy | UnaryOp::Not => x,
    }
}

/// Evaluate a comparison predicate.
pub fn compare(mode: CmpMode, dtype: ElementType, a: u64, b: u64) -> bool {
    let (x, y) = (dtype.decode(a), dtype.decode(b));
    let ord = match (x, y) {
        (Scalar::Int(x), Scalar::Int(y)) => Some(x.cmp(&y)),
        (x, y) => x.as_f64().partial_cmp(&y.as_f64()),
    };
    use std::cmp::Ordering::*;
    match (mode, ord) {
        (CmpMode::Ne, None) => true,
        (_, None) => false,
        (CmpMode::Eq, Some(o)) => o == Equal,
        (CmpMode::Ne, Some(o)) => o != Equal,
        (CmpMode::Lt, Some(o)) => o == Less,
        (CmpMode::Gt, Some(o)) => o == Greater,
        (CmpMode::Ge, Some(o)) => o != Less,
        (CmpMode::Le, Some(o)) => o != Greater,
    }
}

/// Convert one element between types.
pub fn convert(dst: ElementType, src: ElementType, round: RoundMode, bits: u64) -> u64 {
    let value = src.decode(bits);
    if dst.is_float() {
        return convert_to_float(dst, value.as_f64(), round);
    }
    match value {
        Scalar::Int(i) => dst.encode(Scalar::Int(i)),
        Scalar::Float(f) => {
            let rounded = match round {
                RoundMode::Rint => round_half_even(f),
                RoundMode::Round => f.round(),
                RoundMode::Floor => f.floor(),
                RoundMode::Ceil => f.ceil(),
                RoundMode::None | RoundMode::Trunc | RoundMode::Odd => f.trunc(),
            };
            dst.encode(Scalar::Float(rounded))
        }
    }
}

/// Round to nearest integer, ties to even.
pub fn round_half_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        r
    }
}

fn convert_to_float(dst: ElementType, x: f64, round: RoundMode) -> u64 {
    let nearest = dst.encode(Scalar::Float(x));
    if !x.is_finite() {
        return nearest;
    }
    let back = dst.decode(nearest).as_f64();
    match round {
        RoundMode::None | RoundMode::Rint | RoundMode::Round => nearest,
        RoundMode::Floor if back > x => step(dst, nearest, back, Direction::Down),
        RoundMode::Ceil if back < x => step(dst, nearest, back, Direction::Up),
        RoundMode::Trunc if back.abs() > x.abs() => step(dst, nearest, back, Direction::TowardZero),
        RoundMode::Odd => {
            let toward_zero = if back.abs() > x.abs() {
                step(dst, nearest, back, Direction::TowardZero)
            } else {
                nearest
            };
            if dst.decode(toward_zero).as_f64() != x {
                toward_zero | 1
            } else {
                toward_zero
            }
        }
        _ => nearest,
    }
}

enum Direction {
    Up,
    Down,
    TowardZero,
}

/// Move one ulp from `bits` (whose value is `value`) in `dir`.
fn step(dtype: ElementType, bits: u64, value: f64, dir: Direction) -> u64 {
    let sign = match dtype {
        ElementType::F16 | ElementType::BF16 => 0x8000,
        _ => 0x8000_0000,
    };
    let magnitude = bits & !sign;
    let negative = bits & sign != 0;
    let grow = match dir {
        Direction::Up => negative && magnitude == 0 || !negative,
        Direction::Down => negative,
        Direction::TowardZero => false,
    };
    if grow {
        if magnitude == 0 && value == 0.0 && matches!(dir, Direction::Up) {
            return 1;
        }
        bits + 1
    } else if magnitude == 0 {
        // Stepping down from +0 lands on the smallest negative subnormal.
        sign | 1
    } else {
        bits - 1
    }
}

/// Decode helper for tests and golden comparison.
pub fn to_f64(dtype: ElementType, bits: u64) -> f64 {
    match dtype {
        ElementType::F16 => f16::from_bits(bits as u16).to_f64(),
        ElementType::BF16 => bf16::from_bits(bits as u16).to_f64(),
        _ => dtype.decode(bits).as_f64(),
    }
}
