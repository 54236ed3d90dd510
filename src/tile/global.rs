//! Global tensor descriptors.
//!
//! A [`GlobalTensor`] is a rank-5 strided view over global memory. It is
//! only ever the counterparty of a transfer (load, store, gather, scatter)
//! and never an arithmetic operand.
//!
//! Shapes and strides are in elements, outermost dimension first. The
//! view is folded to a logical 2-D `(row, col)` space according to its
//! [`GlobalLayout`]:
//!
//! ```text
//! ND: row = (d0, d1, d2, d3) flattened   col = d4
//! DN: row = d3                           col = (d0, d1, d2, d4) flattened
//! NZ: row = (d2, d3)                     col = (d1, d4)        d0 = 0
//! ```

use std::fmt;
use std::marker::PhantomData;

use super::dtype::Element;
use crate::device::hw_spec::{C0_BYTES, FRACTAL_ROWS};

/// Physical arrangement of a global tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GlobalLayout {
    /// Row-major innermost pair.
    #[default]
    ND,
    /// Column-major innermost pair.
    DN,
    /// Pre-fractalized `[1, C1, R1, 16, C0]`.
    NZ,
}

/// Rank-5 strided view over global memory.
pub struct GlobalTensor<T: Element> {
    addr: u64,
    shape: [usize; 5],
    stride: [usize; 5],
    layout: GlobalLayout,
    _marker: PhantomData<T>,
}

impl<T: Element> GlobalTensor<T> {
    /// Create a tensor from explicit shape and stride.
    pub fn new(addr: u64, shape: [usize; 5], stride: [usize; 5], layout: GlobalLayout) -> Self {
        Self {
            addr,
            shape,
            stride,
            layout,
            _marker: PhantomData,
        }
    }

    /// Dense row-major (ND) tensor.
    pub fn dense(addr: u64, shape: [usize; 5]) -> Self {
        let mut stride = [1usize; 5];
        for i in (0..4).rev() {
            stride[i] = stride[i + 1] * shape[i + 1];
        }
        Self::new(addr, shape, stride, GlobalLayout::ND)
    }

    /// Dense `rows x cols` matrix.
    pub fn dense_2d(addr: u64, rows: usize, cols: usize) -> Self {
        Self::dense(addr, [1, 1, 1, rows, cols])
    }

    /// `rows x cols` window of a row-major matrix whose rows are `row_stride` apart.
    pub fn strided_2d(addr: u64, rows: usize, cols: usize, row_stride: usize) -> Self {
        let total = rows * row_stride;
        Self::new(
            addr,
            [1, 1, 1, rows, cols],
            [total, total, total, row_stride, 1],
            GlobalLayout::ND,
        )
    }

    /// Dense column-major `rows x cols` matrix.
    pub fn dn_2d(addr: u64, rows: usize, cols: usize) -> Self {
        let total = rows * cols;
        Self::new(
            addr,
            [1, 1, 1, rows, cols],
            [total, total, total, 1, rows],
            GlobalLayout::DN,
        )
    }

    /// Dense NZ-fractal `rows x cols` matrix (rows a multiple of 16, cols of C0).
    pub fn nz_2d(addr: u64, rows: usize, cols: usize) -> Self {
        let c0 = C0_BYTES / T::DTYPE.size();
        let shape = [1, cols / c0, rows / FRACTAL_ROWS, FRACTAL_ROWS, c0];
        let mut t = Self::dense(addr, shape);
        t.layout = GlobalLayout::NZ;
        t
    }

    /// Single-element tensor.
    pub fn scalar(addr: u64) -> Self {
        Self::dense(addr, [1; 5])
    }

    #[inline]
    pub fn addr(&self) -> u64 {
        self.addr
    }

    /// Rebind the base address.
    pub fn set_addr(&mut self, addr: u64) {
        self.addr = addr;
    }

    #[inline]
    pub fn shape(&self) -> [usize; 5] {
        self.shape
    }

    #[inline]
    pub fn stride(&self) -> [usize; 5] {
        self.stride
    }

    #[inline]
    pub fn layout(&self) -> GlobalLayout {
        self.layout
    }

    /// Total element count.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Logical row count.
    pub fn rows(&self) -> usize {
        let s = &self.shape;
        match self.layout {
            GlobalLayout::ND => s[0] * s[1] * s[2] * s[3],
            GlobalLayout::DN => s[3],
            GlobalLayout::NZ => s[2] * s[3],
        }
    }

    /// Logical column count.
    pub fn cols(&self) -> usize {
        let s = &self.shape;
        match self.layout {
            GlobalLayout::ND => s[4],
            GlobalLayout::DN => s[0] * s[1] * s[2] * s[4],
            GlobalLayout::NZ => s[1] * s[4],
        }
    }

    /// Element offset of the logical `(row, col)`.
    pub fn offset(&self, row: usize, col: usize) -> usize {
        let s = &self.shape;
        let idx: [usize; 5] = match self.layout {
            GlobalLayout::ND => {
                let (d3, rest) = (row % s[3], row / s[3]);
                let (d2, rest) = (rest % s[2], rest / s[2]);
                let (d1, d0) = (rest % s[1], rest / s[1]);
                [d0, d1, d2, d3, col]
            }
            GlobalLayout::DN => {
                let (d4, rest) = (col % s[4], col / s[4]);
                let (d2, rest) = (rest % s[2], rest / s[2]);
                let (d1, d0) = (rest % s[1], rest / s[1]);
                [d0, d1, d2, row, d4]
            }
            GlobalLayout::NZ => [0, col / s[4], row / s[3], row % s[3], col % s[4]],
        };
        idx.iter().zip(&self.stride).map(|(i, st)| i * st).sum()
    }

    /// Byte address of the logical `(row, col)`.
    #[inline]
    pub fn elem_addr(&self, row: usize, col: usize) -> u64 {
        self.addr + (self.offset(row, col) * T::DTYPE.size()) as u64
    }

    /// `rows x cols` sub-view starting at the logical `(row, col)`.
    ///
    /// Defined for 2-D ND and DN views whose rows are uniformly strided;
    /// NZ tensors have no flat window and yield `None`.
    pub fn window(&self, row: usize, col: usize, rows: usize, cols: usize) -> Option<Self> {
        if self.layout == GlobalLayout::NZ {
            return None;
        }
        let total = self.stride[0] * self.shape[0];
        Some(Self::new(
            self.elem_addr(row, col),
            [1, 1, 1, rows, cols],
            [total, total, total, self.stride[3], self.stride[4]],
            self.layout,
        ))
    }

    /// True when each logical row is a contiguous run of elements.
    pub fn rows_contiguous(&self) -> bool {
        self.layout == GlobalLayout::ND && self.stride[4] == 1
    }
}

impl<T: Element> Clone for GlobalTensor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Element> Copy for GlobalTensor<T> {}

impl<T: Element> fmt::Debug for GlobalTensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalTensor")
            .field("dtype", &T::DTYPE)
            .field("addr", &format_args!("0x{:x}", self.addr))
            .field("shape", &self.shape)
            .field("stride", &self.stride)
            .field("layout", &self.layout)
            .finish()
    }
}
