//! Logical tile operations.
//!
//! Every operation is a method on [`AiCore`](crate::engine::AiCore). It takes
//! tile and tensor views, a list of [`Event`](crate::sync::Event)s to consume
//! before starting, and returns the event of its own completion:
//!
//! ```text
//! let ev = core.tadd(&dst, &a, &b, [load_a, load_b]);
//! core.tstore(&out, &dst, AtomicMode::None, [ev]);
//! ```
//!
//! Operand restrictions (tier role, layout, element type) are trait bounds,
//! so an unsupported combination does not compile.
//!
//! - [`elementwise`]: binary, scalar and unary arithmetic, fill, index ramp,
//!   conversion
//! - [`compare`]: predicate bitmasks and selection
//! - [`reduce`]: row and column reductions
//! - [`expand`]: row/column broadcast and partial-extent arithmetic
//! - [`transfer`]: load, store, move, extract, fill-pad, transpose
//! - [`gather`]: index- and pattern-driven gather/scatter
//! - [`sort`]: 32-wide block sort and k-way merge
//! - [`matmul`]: matrix multiply into the accumulator
//! - [`comm`]: remote copies, group collectives and signals

pub mod comm;
pub mod compare;
pub mod elementwise;
pub mod expand;
pub mod gather;
pub mod matmul;
pub mod reduce;
pub mod sort;
pub mod transfer;

pub use comm::ParallelGroup;
pub use gather::{GatherOob, MaskPattern, ScatterAtomic, ScatterOob};
pub use sort::{MergeCounts, SortList};
pub use transfer::AtomicMode;

use crate::tile::descriptor::{TileView, Vector};
use crate::tile::dtype::Element;
use crate::tile::layout::RowMajor;

/// A row-major vector tile holding `T`, of any capacity.
pub trait VecOperand<T: Element>: TileView<Role = Vector, Elem = T, Layout = RowMajor> {}

impl<T: Element, V> VecOperand<T> for V where V: TileView<Role = Vector, Elem = T, Layout = RowMajor> {}
