//! Tile descriptors.
//!
//! A [`Tile`] is a non-owning, typed view over one on-chip tier. Its role
//! (which tier it lives in), element type, layout and capacity are all
//! type parameters, so the addressing arithmetic is constant-foldable and
//! an operation that only accepts, say, row-major vector tiles states that
//! as a trait bound. The valid extent and base address are ordinary fields
//! and may be rebound between uses.
//!
//! # Example
//!
//! ```
//! use tile_engine::tile::{VecTile, Shape2};
//!
//! let mut t: VecTile<f32, 64, 128> = VecTile::with_valid(0x0, 63, 125).unwrap();
//! assert_eq!(t.capacity(), Shape2::new(64, 128));
//! assert_eq!(t.offset(1, 2), 130);
//! t.set_valid(64, 128).unwrap();
//! ```
//!
//! Capacities a layout cannot address (for example a row-major `f32` tile
//! with 7 columns, 28 bytes per row) fail to compile as soon as a
//! constructor is instantiated.

use std::fmt;
use std::marker::PhantomData;

use thiserror::Error;

use super::dtype::{Element, ElementType, PadValue};
use super::layout::{self, ColMajor, LayoutFamily, NzC, RowMajor, Shape2, TileLayout, Zn, Zz};
use crate::device::arch_config::ArchConfig;
use crate::device::hw_spec::TILE_ALIGN_BYTES;
use crate::device::tier_memory::Tier;

/// Errors raised when binding a tile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    #[error("tile base 0x{addr:x} is not {align}-byte aligned")]
    Misaligned { addr: u64, align: usize },

    #[error("valid extent {valid} exceeds capacity {capacity}")]
    ValidExceedsCapacity { valid: Shape2, capacity: Shape2 },

    #[error("tile [0x{addr:x}, 0x{end:x}) does not fit in {tier} ({size} bytes)")]
    OutOfTier { tier: Tier, addr: u64, end: u64, size: usize },
}

// ============================================================================
// Roles
// ============================================================================

/// Memory-tier role of a tile, fixed at the type level.
pub trait TileRole: Copy + Default + fmt::Debug + Send + Sync + 'static {
    const TIER: Tier;
}

/// Roles whose tiles the vector unit may read and write.
pub trait VectorRole: TileRole {}

/// Roles that may feed the matrix unit's left/right ports.
pub trait MatrixOperandRole: TileRole {}

macro_rules! role_marker {
    ($($(#[$doc:meta])* $name:ident => $tier:ident;)*) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
            pub struct $name;

            impl TileRole for $name {
                const TIER: Tier = Tier::$tier;
            }
        )*
    };
}

role_marker! {
    /// Streaming-vector tile (unified buffer).
    Vector => Vec;
    /// Matrix staging tile (L1).
    Matrix => Mat;
    /// Matrix left operand (L0A).
    Left => Left;
    /// Matrix right operand (L0B).
    Right => Right;
    /// Matrix accumulator (L0C).
    Acc => Acc;
    /// Bias table entry.
    Bias => Bias;
    /// Scaling factors.
    Scaling => Scaling;
}

impl VectorRole for Vector {}
impl MatrixOperandRole for Left {}
impl MatrixOperandRole for Right {}

// ============================================================================
// Tile
// ============================================================================

/// Typed tile view.
///
/// `ROWS x COLS` is the static capacity. Addressing is defined only inside
/// the valid extent; operations never touch elements outside it.
pub struct Tile<R: TileRole, T: Element, L: TileLayout, const ROWS: usize, const COLS: usize> {
    addr: u64,
    valid: Shape2,
    pad: PadValue,
    _marker: PhantomData<(R, T, L)>,
}

/// Row-major vector tile.
pub type VecTile<T, const ROWS: usize, const COLS: usize> = Tile<Vector, T, RowMajor, ROWS, COLS>;

/// Column-major vector tile.
pub type VecTileCol<T, const ROWS: usize, const COLS: usize> = Tile<Vector, T, ColMajor, ROWS, COLS>;

/// Matrix staging tile with an explicit layout.
pub type MatTile<T, L, const ROWS: usize, const COLS: usize> = Tile<Matrix, T, L, ROWS, COLS>;

/// Left operand in its native Zz layout.
pub type LeftTile<T, const ROWS: usize, const COLS: usize> = Tile<Left, T, Zz, ROWS, COLS>;

/// Right operand in its native Zn layout.
pub type RightTile<T, const ROWS: usize, const COLS: usize> = Tile<Right, T, Zn, ROWS, COLS>;

/// Accumulator in its native 16x16 fractal layout.
pub type AccTile<T, const ROWS: usize, const COLS: usize> = Tile<Acc, T, NzC, ROWS, COLS>;

/// Bias row.
pub type BiasTile<T, const COLS: usize> = Tile<Bias, T, RowMajor, 1, COLS>;

/// Scaling-factor row.
pub type ScalingTile<T, const COLS: usize> = Tile<Scaling, T, RowMajor, 1, COLS>;

impl<R, T, L, const ROWS: usize, const COLS: usize> Tile<R, T, L, ROWS, COLS>
where
    R: TileRole,
    T: Element,
    L: TileLayout,
{
    /// Static capacity.
    pub const CAPACITY: Shape2 = Shape2::new(ROWS, COLS);

    /// Inner block of the layout for this element type.
    pub const INNER: Shape2 = L::FAMILY.inner_block(T::DTYPE.size());

    /// Capacity in bytes.
    pub const BYTES: usize = ROWS * COLS * T::DTYPE.size();

    const GEOMETRY: () = assert!(
        L::FAMILY.is_addressable(Shape2::new(ROWS, COLS), T::DTYPE.size())
            && ROWS > 0
            && COLS > 0,
        "tile capacity is not addressable under its layout"
    );

    /// Bind a tile at `addr` with the full capacity valid.
    pub fn new(addr: u64) -> Result<Self, TileError> {
        Self::with_valid(addr, ROWS, COLS)
    }

    /// Bind a tile at `addr` with a `rows x cols` valid extent.
    pub fn with_valid(addr: u64, rows: usize, cols: usize) -> Result<Self, TileError> {
        #[allow(clippy::let_unit_value)]
        let () = Self::GEOMETRY;
        check_aligned(addr)?;
        let valid = Shape2::new(rows, cols);
        check_valid(valid, Self::CAPACITY)?;
        Ok(Self {
            addr,
            valid,
            pad: PadValue::Null,
            _marker: PhantomData,
        })
    }

    /// Set the value loads use to fill outside the valid extent.
    pub fn with_pad(mut self, pad: PadValue) -> Self {
        self.pad = pad;
        self
    }

    /// Rebind the base address.
    pub fn assign(&mut self, addr: u64) -> Result<(), TileError> {
        check_aligned(addr)?;
        self.addr = addr;
        Ok(())
    }

    /// Rebind the valid extent.
    pub fn set_valid(&mut self, rows: usize, cols: usize) -> Result<(), TileError> {
        let valid = Shape2::new(rows, cols);
        check_valid(valid, Self::CAPACITY)?;
        self.valid = valid;
        Ok(())
    }

    /// Check that the whole capacity lies inside the tile's tier.
    pub fn check_fits(&self, arch: &dyn ArchConfig) -> Result<(), TileError> {
        let size = arch.tier_size(R::TIER);
        let end = self.addr + Self::BYTES as u64;
        if end > size as u64 {
            return Err(TileError::OutOfTier {
                tier: R::TIER,
                addr: self.addr,
                end,
                size,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn addr(&self) -> u64 {
        self.addr
    }

    #[inline]
    pub fn capacity(&self) -> Shape2 {
        Self::CAPACITY
    }

    #[inline]
    pub fn valid(&self) -> Shape2 {
        self.valid
    }

    #[inline]
    pub fn valid_rows(&self) -> usize {
        self.valid.rows
    }

    #[inline]
    pub fn valid_cols(&self) -> usize {
        self.valid.cols
    }

    #[inline]
    pub fn pad(&self) -> PadValue {
        self.pad
    }

    #[inline]
    pub fn tier(&self) -> Tier {
        R::TIER
    }

    #[inline]
    pub fn layout(&self) -> LayoutFamily {
        L::FAMILY
    }

    #[inline]
    pub fn dtype(&self) -> ElementType {
        T::DTYPE
    }

    /// Element offset of `(row, col)` from the base.
    #[inline]
    pub fn offset(&self, row: usize, col: usize) -> usize {
        layout::offset(L::FAMILY, Self::CAPACITY, Self::INNER, row, col)
    }

    /// Byte offset of `(row, col)` from the base.
    #[inline]
    pub fn byte_offset(&self, row: usize, col: usize) -> usize {
        self.offset(row, col) * T::DTYPE.size()
    }

    /// Byte address of `(row, col)` in the tier.
    #[inline]
    pub fn elem_addr(&self, row: usize, col: usize) -> u64 {
        self.addr + self.byte_offset(row, col) as u64
    }

    /// Element distance between rows for flat layouts.
    #[inline]
    pub fn row_stride(&self) -> Option<usize> {
        L::FAMILY.row_stride(Self::CAPACITY)
    }

    /// Element distance between columns for flat layouts.
    #[inline]
    pub fn col_stride(&self) -> Option<usize> {
        L::FAMILY.col_stride(Self::CAPACITY)
    }

    /// Runtime snapshot used by the dispatcher.
    pub fn desc(&self) -> TileDesc {
        TileDesc {
            tier: R::TIER,
            dtype: T::DTYPE,
            layout: L::FAMILY,
            capacity: Self::CAPACITY,
            inner: Self::INNER,
            valid: self.valid,
            addr: self.addr,
            pad: self.pad,
        }
    }
}

impl<R: TileRole, T: Element, L: TileLayout, const ROWS: usize, const COLS: usize> Clone
    for Tile<R, T, L, ROWS, COLS>
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<R: TileRole, T: Element, L: TileLayout, const ROWS: usize, const COLS: usize> Copy
    for Tile<R, T, L, ROWS, COLS>
{
}

impl<R: TileRole, T: Element, L: TileLayout, const ROWS: usize, const COLS: usize> fmt::Debug
    for Tile<R, T, L, ROWS, COLS>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("tier", &R::TIER)
            .field("dtype", &T::DTYPE)
            .field("layout", &L::FAMILY)
            .field("capacity", &Self::CAPACITY)
            .field("valid", &self.valid)
            .field("addr", &format_args!("0x{:x}", self.addr))
            .finish()
    }
}

/// Any tile, with its type parameters exposed as associated types so an
/// operation can accept tiles of differing capacity under one bound.
pub trait TileView {
    type Role: TileRole;
    type Elem: Element;
    type Layout: TileLayout;

    /// Runtime snapshot of the view.
    fn desc(&self) -> TileDesc;
}

impl<R, T, L, const ROWS: usize, const COLS: usize> TileView for Tile<R, T, L, ROWS, COLS>
where
    R: TileRole,
    T: Element,
    L: TileLayout,
{
    type Role = R;
    type Elem = T;
    type Layout = L;

    #[inline]
    fn desc(&self) -> TileDesc {
        Tile::desc(self)
    }
}

fn check_aligned(addr: u64) -> Result<(), TileError> {
    if addr % TILE_ALIGN_BYTES as u64 != 0 {
        return Err(TileError::Misaligned {
            addr,
            align: TILE_ALIGN_BYTES,
        });
    }
    Ok(())
}

fn check_valid(valid: Shape2, capacity: Shape2) -> Result<(), TileError> {
    if !valid.fits_in(&capacity) {
        return Err(TileError::ValidExceedsCapacity { valid, capacity });
    }
    Ok(())
}

// ============================================================================
// Runtime descriptor
// ============================================================================

/// Type-erased tile snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileDesc {
    pub tier: Tier,
    pub dtype: ElementType,
    pub layout: LayoutFamily,
    pub capacity: Shape2,
    pub inner: Shape2,
    pub valid: Shape2,
    pub addr: u64,
    pub pad: PadValue,
}

impl TileDesc {
    /// Element offset of `(row, col)`.
    #[inline]
    pub fn offset(&self, row: usize, col: usize) -> usize {
        layout::offset(self.layout, self.capacity, self.inner, row, col)
    }

    /// Byte address of `(row, col)`.
    #[inline]
    pub fn elem_addr(&self, row: usize, col: usize) -> u64 {
        self.addr + (self.offset(row, col) * self.dtype.size()) as u64
    }

    /// Row stride in elements (row-major tiles).
    #[inline]
    pub fn row_stride(&self) -> usize {
        self.layout.row_stride(self.capacity).unwrap_or(self.capacity.cols)
    }

    /// Row stride in bytes.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.row_stride() * self.dtype.size()
    }

    /// Capacity in bytes.
    #[inline]
    pub fn bytes(&self) -> usize {
        self.capacity.numel() * self.dtype.size()
    }

    /// Byte range `(start, len)` spanned by the valid extent.
    ///
    /// Flat layouts span from the first to the last valid element; boxed
    /// layouts conservatively cover the whole capacity.
    pub fn footprint(&self) -> (u64, usize) {
        if self.valid.is_empty() {
            return (self.addr, 0);
        }
        let size = self.dtype.size();
        let (rows, cols) = (self.valid.rows, self.valid.cols);
        let elems = match self.layout {
            l if l.is_row_major() => (rows - 1) * self.capacity.cols + cols,
            l if l.is_flat() => (cols - 1) * self.capacity.rows + rows,
            _ => return (self.addr, self.bytes()),
        };
        (self.addr, elems * size)
    }

    /// The `rows x cols` window of a flat tile starting at `(row, col)`.
    ///
    /// The window keeps the parent's capacity, so addressing inside it
    /// matches the parent shifted by `(row, col)`. Flat layouts only.
    pub fn window(&self, row: usize, col: usize, rows: usize, cols: usize) -> TileDesc {
        TileDesc {
            addr: self.elem_addr(row, col),
            valid: Shape2::new(rows, cols),
            ..*self
        }
    }

    /// True when the valid extent covers whole rows, so the valid region
    /// is one contiguous run of `rows * cols` elements.
    #[inline]
    pub fn is_dense(&self) -> bool {
        self.layout.is_row_major() && self.valid.cols == self.capacity.cols
    }
}
