//! Vector/Matrix Core Hardware Constants
//!
//! Instruction-width, alignment and tier-size constants shared by every
//! supported accelerator generation. Per-generation values (tier sizes,
//! matmul input support) live in [`super::arch_config`].

// ============================================================================
// Vector Instruction Geometry
// ============================================================================

/// Bytes processed by one repeat of a vector instruction: 256.
/// One repeat covers eight 32-byte blocks.
pub const REPEAT_BYTE: usize = 256;

/// Bytes in one vector block: 32.
/// Block and repeat strides are encoded in units of this size.
pub const BLOCK_BYTE_SIZE: usize = 32;

/// Blocks per repeat: 256 / 32 = 8.
pub const BLOCKS_PER_REPEAT: usize = REPEAT_BYTE / BLOCK_BYTE_SIZE;

/// Maximum repeat count encodable in one issue: 255.
pub const REPEAT_MAX: usize = 255;

/// Maximum block or repeat stride encodable in one issue: 255 blocks.
pub const REPEAT_STRIDE_MAX: usize = 255;

/// Lanes in the vector mask register (covers one repeat of 8-bit elements).
pub const MASK_LANES: usize = REPEAT_BYTE;

// ============================================================================
// Tile Geometry
// ============================================================================

/// Byte alignment of the contiguous dimension of a flat tile: 32.
pub const TILE_ALIGN_BYTES: usize = 32;

/// Rows of a matrix-unit fractal: 16.
pub const FRACTAL_ROWS: usize = 16;

/// Byte width of one fractal column group (C0): 32.
pub const C0_BYTES: usize = 32;

/// Fixed side of the accumulator fractal (16x16 elements).
pub const FRACTAL_C_SIDE: usize = 16;

/// Bytes of a 16x16 accumulator fractal of 4-byte elements.
pub const FRACTAL_C_BYTES: usize = FRACTAL_C_SIDE * FRACTAL_C_SIDE * 4;

/// Bytes of a left/right operand fractal: 512.
pub const FRACTAL_AB_BYTES: usize = FRACTAL_ROWS * C0_BYTES;

// ============================================================================
// Sort / Merge
// ============================================================================

/// Elements sorted together by one sort instruction.
pub const SORT_BLOCK: usize = 32;

/// Bytes per (value, index) record written by sort and read by merge.
pub const SORT_RECORD_BYTES: usize = 8;

/// Maximum number of runs a single merge instruction consumes.
pub const MERGE_MAX_LISTS: usize = 4;

// ============================================================================
// Synchronization
// ============================================================================

/// Hardware event ids per (src, dst) pipe pair.
pub const EVENT_IDS: usize = 8;

/// Default retry budget for signal polling.
pub const SIGNAL_DEFAULT_RETRIES: u32 = 1 << 16;

/// Elements of type with `size` bytes per repeat.
#[inline]
pub const fn elements_per_repeat(size: usize) -> usize {
    REPEAT_BYTE / size
}

/// Elements of type with `size` bytes per 32-byte block.
#[inline]
pub const fn elements_per_block(size: usize) -> usize {
    BLOCK_BYTE_SIZE / size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_geometry() {
        assert_eq!(elements_per_repeat(4), 64);
        assert_eq!(elements_per_repeat(2), 128);
        assert_eq!(elements_per_repeat(1), 256);
        assert_eq!(elements_per_block(4), 8);
        assert_eq!(BLOCKS_PER_REPEAT, 8);
    }

    #[test]
    fn test_fractal_sizes() {
        assert_eq!(FRACTAL_AB_BYTES, 512);
        assert_eq!(FRACTAL_C_BYTES, 1024);
    }
}
