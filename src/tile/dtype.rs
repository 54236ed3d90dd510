//! Element types stored in tiles and global tensors.
//!
//! [`ElementType`] is the runtime tag every byte-offset and repeat-count
//! computation is driven by. The [`Element`] trait ties a Rust scalar to
//! its tag so descriptors can be generic over the stored type, and the
//! capability traits ([`FloatElement`], [`IntElement`], ...) let each
//! operation state which element types it accepts as a compile-time bound.
//!
//! Arithmetic in the simulator goes through [`Scalar`]: integers widen to
//! `i128` (covers every signed and unsigned width) and floats to `f64`,
//! then results are narrowed back on encode.

use std::fmt;

use half::{bf16, f16};

/// Scalar element type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F16,
    BF16,
    F32,
}

impl ElementType {
    /// Size in bytes.
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            ElementType::I8 | ElementType::U8 => 1,
            ElementType::I16 | ElementType::U16 | ElementType::F16 | ElementType::BF16 => 2,
            ElementType::I32 | ElementType::U32 | ElementType::F32 => 4,
            ElementType::I64 | ElementType::U64 => 8,
        }
    }

    /// Width in bits.
    #[inline]
    pub const fn bits(self) -> u32 {
        (self.size() * 8) as u32
    }

    /// True for the floating-point types.
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, ElementType::F16 | ElementType::BF16 | ElementType::F32)
    }

    /// True for signed integers and floats.
    #[inline]
    pub const fn is_signed(self) -> bool {
        !matches!(
            self,
            ElementType::U8 | ElementType::U16 | ElementType::U32 | ElementType::U64
        )
    }

    /// Mask selecting the low `bits()` of a raw value.
    #[inline]
    pub const fn bit_mask(self) -> u64 {
        if self.size() == 8 {
            u64::MAX
        } else {
            (1u64 << self.bits()) - 1
        }
    }

    /// Interpret raw little-endian bits as a scalar.
    pub fn decode(self, bits: u64) -> Scalar {
        match self {
            ElementType::I8 => Scalar::Int(bits as u8 as i8 as i128),
            ElementType::U8 => Scalar::Int(bits as u8 as i128),
            ElementType::I16 => Scalar::Int(bits as u16 as i16 as i128),
            ElementType::U16 => Scalar::Int(bits as u16 as i128),
            ElementType::I32 => Scalar::Int(bits as u32 as i32 as i128),
            ElementType::U32 => Scalar::Int(bits as u32 as i128),
            ElementType::I64 => Scalar::Int(bits as i64 as i128),
            ElementType::U64 => Scalar::Int(bits as i128),
            ElementType::F16 => Scalar::Float(f16::from_bits(bits as u16).to_f64()),
            ElementType::BF16 => Scalar::Float(bf16::from_bits(bits as u16).to_f64()),
            ElementType::F32 => Scalar::Float(f32::from_bits(bits as u32) as f64),
        }
    }

    /// Encode a scalar into raw bits of this type.
    ///
    /// Integers wrap to the target width. Floats converted to integers
    /// truncate toward zero and saturate; NaN becomes zero.
    pub fn encode(self, value: Scalar) -> u64 {
        match self {
            ElementType::F16 => f16::from_f64(value.as_f64()).to_bits() as u64,
            ElementType::BF16 => bf16::from_f64(value.as_f64()).to_bits() as u64,
            ElementType::F32 => (value.as_f64() as f32).to_bits() as u64,
            _ => {
                let v = match value {
                    Scalar::Int(i) => i,
                    Scalar::Float(f) => self.saturate_float(f),
                };
                (v as u64) & self.bit_mask()
            }
        }
    }

    /// Smallest representable integer value (integers only).
    pub const fn int_min(self) -> i128 {
        match self {
            ElementType::I8 => i8::MIN as i128,
            ElementType::I16 => i16::MIN as i128,
            ElementType::I32 => i32::MIN as i128,
            ElementType::I64 => i64::MIN as i128,
            _ => 0,
        }
    }

    /// Largest representable integer value (integers only).
    pub const fn int_max(self) -> i128 {
        match self {
            ElementType::I8 => i8::MAX as i128,
            ElementType::U8 => u8::MAX as i128,
            ElementType::I16 => i16::MAX as i128,
            ElementType::U16 => u16::MAX as i128,
            ElementType::I32 => i32::MAX as i128,
            ElementType::U32 => u32::MAX as i128,
            ElementType::I64 => i64::MAX as i128,
            ElementType::U64 => u64::MAX as i128,
            _ => 0,
        }
    }

    fn saturate_float(self, f: f64) -> i128 {
        if f.is_nan() {
            return 0;
        }
        let t = f.trunc();
        if t <= self.int_min() as f64 {
            self.int_min()
        } else if t >= self.int_max() as f64 {
            self.int_max()
        } else {
            t as i128
        }
    }

    /// Raw bits used to fill padding for `pad`, or `None` for [`PadValue::Null`].
    pub fn pad_bits(self, pad: PadValue) -> Option<u64> {
        match pad {
            PadValue::Null => None,
            PadValue::Zero => Some(0),
            PadValue::Min => Some(match self {
                ElementType::F32 => 0xff80_0000,
                ElementType::F16 => 0xfc00,
                ElementType::BF16 => 0xff80,
                int => (int.int_min() as u64) & int.bit_mask(),
            }),
            PadValue::Max => Some(match self {
                ElementType::F32 => 0x7f80_0000,
                ElementType::F16 => 0x7c00,
                ElementType::BF16 => 0x7f80,
                int => (int.int_max() as u64) & int.bit_mask(),
            }),
        }
    }

    /// Raw bits of the lowest value of the type (negative infinity for floats).
    pub fn lowest_bits(self) -> u64 {
        self.pad_bits(PadValue::Min).unwrap_or(0)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElementType::I8 => "i8",
            ElementType::U8 => "u8",
            ElementType::I16 => "i16",
            ElementType::U16 => "u16",
            ElementType::I32 => "i32",
            ElementType::U32 => "u32",
            ElementType::I64 => "i64",
            ElementType::U64 => "u64",
            ElementType::F16 => "f16",
            ElementType::BF16 => "bf16",
            ElementType::F32 => "f32",
        };
        f.write_str(s)
    }
}

/// Value used to fill the part of a tile outside its valid extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PadValue {
    /// Leave padding untouched.
    #[default]
    Null,
    /// Fill with zero bits.
    Zero,
    /// Fill with the lowest value (negative infinity for floats).
    Min,
    /// Fill with the highest value (positive infinity for floats).
    Max,
}

/// Widened scalar used for simulated arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i128),
    Float(f64),
}

impl Scalar {
    /// Value as a float.
    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Int(i) => i as f64,
            Scalar::Float(f) => f,
        }
    }

    /// Value as an integer (floats truncate toward zero).
    #[inline]
    pub fn as_i128(self) -> i128 {
        match self {
            Scalar::Int(i) => i,
            Scalar::Float(f) => f as i128,
        }
    }
}

// ============================================================================
// Typed elements
// ============================================================================

/// A Rust scalar that can be stored in a tile.
pub trait Element: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Runtime tag.
    const DTYPE: ElementType;

    /// Raw bits, zero-extended.
    fn to_bits(self) -> u64;

    /// Build from raw bits (upper bits ignored).
    fn from_bits(bits: u64) -> Self;

    /// Widen for arithmetic.
    #[inline]
    fn to_scalar(self) -> Scalar {
        Self::DTYPE.decode(self.to_bits())
    }

    /// Narrow from arithmetic.
    #[inline]
    fn from_scalar(value: Scalar) -> Self {
        Self::from_bits(Self::DTYPE.encode(value))
    }
}

/// Floating-point elements (transcendental and sort operations).
pub trait FloatElement: Element {}

/// Integer elements (bitwise operations, index tiles).
pub trait IntElement: Element {}

/// Elements usable as gather/scatter offsets.
pub trait IndexElement: IntElement {
    /// Offset as an unsigned element count.
    fn as_index(self) -> u64;
}

/// Elements accepted by the sort and merge instructions.
pub trait SortElement: FloatElement {}

/// Matrix-unit input type and the accumulator type it produces.
pub trait MatmulInput: Element {
    type Acc: Element;
}

macro_rules! impl_int_element {
    ($($t:ty => $tag:ident, $u:ty);* $(;)?) => {
        $(
            impl Element for $t {
                const DTYPE: ElementType = ElementType::$tag;

                #[inline]
                fn to_bits(self) -> u64 {
                    self as $u as u64
                }

                #[inline]
                fn from_bits(bits: u64) -> Self {
                    bits as $u as $t
                }
            }

            impl IntElement for $t {}
        )*
    };
}

impl_int_element! {
    i8 => I8, u8;
    u8 => U8, u8;
    i16 => I16, u16;
    u16 => U16, u16;
    i32 => I32, u32;
    u32 => U32, u32;
    i64 => I64, u64;
    u64 => U64, u64;
}

impl IndexElement for i32 {
    #[inline]
    fn as_index(self) -> u64 {
        self as u32 as u64
    }
}

impl IndexElement for u32 {
    #[inline]
    fn as_index(self) -> u64 {
        self as u64
    }
}

impl Element for f32 {
    const DTYPE: ElementType = ElementType::F32;

    #[inline]
    fn to_bits(self) -> u64 {
        f32::to_bits(self) as u64
    }

    #[inline]
    fn from_bits(bits: u64) -> Self {
        f32::from_bits(bits as u32)
    }
}

impl Element for f16 {
    const DTYPE: ElementType = ElementType::F16;

    #[inline]
    fn to_bits(self) -> u64 {
        f16::to_bits(self) as u64
    }

    #[inline]
    fn from_bits(bits: u64) -> Self {
        f16::from_bits(bits as u16)
    }
}

impl Element for bf16 {
    const DTYPE: ElementType = ElementType::BF16;

    #[inline]
    fn to_bits(self) -> u64 {
        bf16::to_bits(self) as u64
    }

    #[inline]
    fn from_bits(bits: u64) -> Self {
        bf16::from_bits(bits as u16)
    }
}

impl FloatElement for f32 {}
impl FloatElement for f16 {}
impl FloatElement for bf16 {}

impl SortElement for f32 {}
impl SortElement for f16 {}

impl MatmulInput for f16 {
    type Acc = f32;
}

impl MatmulInput for bf16 {
    type Acc = f32;
}

impl MatmulInput for f32 {
    type Acc = f32;
}

impl MatmulInput for i8 {
    type Acc = i32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(ElementType::I8.size(), 1);
        assert_eq!(ElementType::BF16.size(), 2);
        assert_eq!(ElementType::F32.size(), 4);
        assert_eq!(ElementType::U64.size(), 8);
        assert_eq!(ElementType::U64.bit_mask(), u64::MAX);
        assert_eq!(ElementType::I16.bit_mask(), 0xffff);
    }

    #[test]
    fn test_decode_sign_extension() {
        assert_eq!(ElementType::I8.decode(0xff), Scalar::Int(-1));
        assert_eq!(ElementType::U8.decode(0xff), Scalar::Int(255));
        assert_eq!(ElementType::I32.decode(0x8000_0000), Scalar::Int(i32::MIN as i128));
    }

    #[test]
    fn test_encode_wraps_and_saturates() {
        assert_eq!(ElementType::U8.encode(Scalar::Int(256 + 3)), 3);
        assert_eq!(ElementType::I16.encode(Scalar::Int(-1)), 0xffff);
        assert_eq!(ElementType::I8.encode(Scalar::Float(1000.0)), 0x7f);
        assert_eq!(ElementType::I8.encode(Scalar::Float(-1000.0)), 0x80);
        assert_eq!(ElementType::I32.encode(Scalar::Float(f64::NAN)), 0);
        assert_eq!(ElementType::I32.encode(Scalar::Float(-2.7)), (-2i32) as u32 as u64);
    }

    #[test]
    fn test_pad_bits() {
        assert_eq!(ElementType::F32.pad_bits(PadValue::Min), Some(0xff80_0000));
        assert_eq!(ElementType::F16.pad_bits(PadValue::Max), Some(0x7c00));
        assert_eq!(ElementType::BF16.pad_bits(PadValue::Min), Some(0xff80));
        assert_eq!(ElementType::I16.pad_bits(PadValue::Min), Some(0x8000));
        assert_eq!(ElementType::U16.pad_bits(PadValue::Max), Some(0xffff));
        assert_eq!(ElementType::I32.pad_bits(PadValue::Null), None);
    }

    #[test]
    fn test_element_round_trip_bits() {
        assert_eq!(<f32 as Element>::from_bits(Element::to_bits(1.5f32)), 1.5);
        assert_eq!(<i8 as Element>::from_bits(Element::to_bits(-5i8)), -5);
        let h = f16::from_f32(0.25);
        assert_eq!(<f16 as Element>::from_scalar(h.to_scalar()), h);
        assert_eq!(i32::from_scalar(Scalar::Int(7)), 7);
    }
}
