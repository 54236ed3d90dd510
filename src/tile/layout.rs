//! Tile addressing model.
//!
//! Maps a logical `(row, col)` coordinate inside a tile to a linear
//! element offset from the tile base. Two layout families exist:
//!
//! - **Flat**: plain row-major or column-major storage.
//! - **Boxed**: the tile is cut into fixed `Ir x Ic` inner blocks that are
//!   each physically contiguous. The matrix unit consumes operands in this
//!   form.
//!
//! # Boxed Geometry
//!
//! ```text
//! Nz (blocks column-major, inner row-major), 4-byte elements:
//!   Ir = 16, Ic = 8
//!
//!        c: 0..8     8..16
//!   r 0..16  [blk 0]  [blk 2]
//!   r16..32  [blk 1]  [blk 3]
//!
//!   offset = (c/Ic)*Rows*Ic + (r/Ir)*Ir*Ic + (r%Ir)*Ic + c%Ic
//! ```
//!
//! The inner block is 32 bytes wide along its contiguous axis, except for
//! the accumulator fractal which is always 16x16.
//!
//! All functions here are pure; [`offset`] is only meaningful for
//! coordinates inside the capacity.

use std::fmt;

use crate::device::hw_spec::{FRACTAL_C_SIDE, FRACTAL_ROWS, TILE_ALIGN_BYTES};

/// Order in which blocks (or elements within a block) are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockOrder {
    RowMajor,
    ColMajor,
}

/// Layout family of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutFamily {
    /// Flat row-major: `offset = row * cols + col`.
    RowMajor,
    /// Flat column-major: `offset = col * rows + row`.
    ColMajor,
    /// Sub-fractal boxed layout.
    Boxed {
        /// Order of the inner blocks across the tile.
        blocks: BlockOrder,
        /// Order of elements inside one inner block.
        inner: BlockOrder,
        /// Use the fixed 16x16 accumulator fractal.
        fractal_c: bool,
    },
}

/// Rows and columns of a tile or an extent within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Shape2 {
    pub rows: usize,
    pub cols: usize,
}

impl Shape2 {
    #[inline]
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Number of elements.
    #[inline]
    pub const fn numel(&self) -> usize {
        self.rows * self.cols
    }

    /// True if either side is zero.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Elementwise minimum.
    #[inline]
    pub fn min(self, other: Shape2) -> Shape2 {
        Shape2::new(self.rows.min(other.rows), self.cols.min(other.cols))
    }

    /// True if this extent fits inside `other`.
    #[inline]
    pub fn fits_in(&self, other: &Shape2) -> bool {
        self.rows <= other.rows && self.cols <= other.cols
    }
}

impl fmt::Display for Shape2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

impl LayoutFamily {
    /// Nz: blocks column-major, inner row-major.
    pub const NZ: LayoutFamily = LayoutFamily::Boxed {
        blocks: BlockOrder::ColMajor,
        inner: BlockOrder::RowMajor,
        fractal_c: false,
    };

    /// Zn: blocks row-major, inner column-major.
    pub const ZN: LayoutFamily = LayoutFamily::Boxed {
        blocks: BlockOrder::RowMajor,
        inner: BlockOrder::ColMajor,
        fractal_c: false,
    };

    /// Zz: blocks row-major, inner row-major.
    pub const ZZ: LayoutFamily = LayoutFamily::Boxed {
        blocks: BlockOrder::RowMajor,
        inner: BlockOrder::RowMajor,
        fractal_c: false,
    };

    /// Accumulator Nz with 16x16 fractals.
    pub const NZ_C: LayoutFamily = LayoutFamily::Boxed {
        blocks: BlockOrder::ColMajor,
        inner: BlockOrder::RowMajor,
        fractal_c: true,
    };

    /// True for flat row- or column-major.
    #[inline]
    pub const fn is_flat(self) -> bool {
        matches!(self, LayoutFamily::RowMajor | LayoutFamily::ColMajor)
    }

    /// True for flat row-major.
    #[inline]
    pub const fn is_row_major(self) -> bool {
        matches!(self, LayoutFamily::RowMajor)
    }

    /// Inner block shape for elements of `elem_size` bytes.
    ///
    /// Flat layouts report a 1x1 block.
    pub const fn inner_block(self, elem_size: usize) -> Shape2 {
        match self {
            LayoutFamily::RowMajor | LayoutFamily::ColMajor => Shape2::new(1, 1),
            LayoutFamily::Boxed { fractal_c: true, .. } => {
                Shape2::new(FRACTAL_C_SIDE, FRACTAL_C_SIDE)
            }
            LayoutFamily::Boxed { inner: BlockOrder::RowMajor, .. } => {
                Shape2::new(FRACTAL_ROWS, TILE_ALIGN_BYTES / elem_size)
            }
            LayoutFamily::Boxed { inner: BlockOrder::ColMajor, .. } => {
                Shape2::new(TILE_ALIGN_BYTES / elem_size, FRACTAL_ROWS)
            }
        }
    }

    /// Whether `capacity` is addressable under this layout: the contiguous
    /// dimension of a flat tile spans whole 32-byte blocks, and a boxed tile is
    /// a whole number of inner blocks.
    pub const fn is_addressable(self, capacity: Shape2, elem_size: usize) -> bool {
        match self {
            LayoutFamily::RowMajor => (capacity.cols * elem_size) % TILE_ALIGN_BYTES == 0,
            LayoutFamily::ColMajor => (capacity.rows * elem_size) % TILE_ALIGN_BYTES == 0,
            LayoutFamily::Boxed { .. } => {
                let inner = self.inner_block(elem_size);
                capacity.rows % inner.rows == 0 && capacity.cols % inner.cols == 0
            }
        }
    }

    /// Element distance between consecutive rows (flat layouts).
    ///
    /// Boxed layouts have no single row stride and return `None`.
    pub const fn row_stride(self, capacity: Shape2) -> Option<usize> {
        match self {
            LayoutFamily::RowMajor => Some(capacity.cols),
            LayoutFamily::ColMajor => Some(1),
            LayoutFamily::Boxed { .. } => None,
        }
    }

    /// Element distance between consecutive columns (flat layouts).
    pub const fn col_stride(self, capacity: Shape2) -> Option<usize> {
        match self {
            LayoutFamily::RowMajor => Some(1),
            LayoutFamily::ColMajor => Some(capacity.rows),
            LayoutFamily::Boxed { .. } => None,
        }
    }
}

/// Linear element offset of `(row, col)`.
///
/// `inner` must be the block returned by [`LayoutFamily::inner_block`] for
/// boxed layouts; it is ignored for flat ones.
#[inline]
pub fn offset(layout: LayoutFamily, capacity: Shape2, inner: Shape2, row: usize, col: usize) -> usize {
    match layout {
        LayoutFamily::RowMajor => row * capacity.cols + col,
        LayoutFamily::ColMajor => col * capacity.rows + row,
        LayoutFamily::Boxed { blocks, inner: order, .. } => {
            let (ir, ic) = (inner.rows, inner.cols);
            let block_base = match blocks {
                BlockOrder::ColMajor => (col / ic) * capacity.rows * ic + (row / ir) * ir * ic,
                BlockOrder::RowMajor => (row / ir) * capacity.cols * ir + (col / ic) * ir * ic,
            };
            let within = match order {
                BlockOrder::RowMajor => (row % ir) * ic + col % ic,
                BlockOrder::ColMajor => (col % ic) * ir + row % ir,
            };
            block_base + within
        }
    }
}

// ============================================================================
// Type-level layout markers
// ============================================================================

/// Layout family fixed at the type level.
pub trait TileLayout: Copy + Default + fmt::Debug + Send + Sync + 'static {
    const FAMILY: LayoutFamily;
}

/// Marker for layouts the vector unit can stream (flat row-major).
pub trait VectorLayout: TileLayout {}

/// Flat layouts (row- or column-major).
pub trait FlatLayout: TileLayout {}

macro_rules! layout_marker {
    ($($(#[$doc:meta])* $name:ident => $family:expr;)*) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
            pub struct $name;

            impl TileLayout for $name {
                const FAMILY: LayoutFamily = $family;
            }
        )*
    };
}

layout_marker! {
    /// Flat row-major.
    RowMajor => LayoutFamily::RowMajor;
    /// Flat column-major.
    ColMajor => LayoutFamily::ColMajor;
    /// Boxed, blocks column-major, inner row-major.
    Nz => LayoutFamily::NZ;
    /// Boxed, blocks row-major, inner column-major.
    Zn => LayoutFamily::ZN;
    /// Boxed, blocks row-major, inner row-major.
    Zz => LayoutFamily::ZZ;
    /// Accumulator fractal layout (16x16 Nz).
    NzC => LayoutFamily::NZ_C;
}

impl VectorLayout for RowMajor {}
impl FlatLayout for RowMajor {}
impl FlatLayout for ColMajor {}
