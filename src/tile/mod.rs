//! Tile and global-tensor descriptors plus the addressing model.
//!
//! - [`dtype`]: element types and their capability traits
//! - [`layout`]: pure `(row, col) -> offset` functions and layout markers
//! - [`descriptor`]: typed tile views over on-chip tiers
//! - [`global`]: rank-5 strided views over global memory

pub mod descriptor;
pub mod dtype;
pub mod global;
pub mod layout;

pub use descriptor::{
    Acc, AccTile, Bias, BiasTile, Left, LeftTile, MatTile, Matrix, MatrixOperandRole, Right,
    RightTile, Scaling, ScalingTile, Tile, TileDesc, TileError, TileRole, TileView, VecTile, VecTileCol,
    Vector, VectorRole,
};
pub use dtype::{
    Element, ElementType, FloatElement, IndexElement, IntElement, MatmulInput, PadValue, Scalar,
    SortElement,
};
pub use global::{GlobalLayout, GlobalTensor};
pub use layout::{
    offset, BlockOrder, ColMajor, FlatLayout, LayoutFamily, Nz, NzC, RowMajor, Shape2, TileLayout,
    VectorLayout, Zn, Zz,
};
