//! Architecture configuration trait and implementations.
//!
//! Every accelerator generation shares the same addressing and dispatch
//! contracts; what differs is the size of each on-chip tier and a few
//! capability bits. Code asks `arch.tier_size(Tier::Vec)` instead of
//! hardcoding a buffer size, so one dispatcher serves all generations.
//!
//! # Example
//!
//! ```ignore
//! use tile_engine::device::arch_config::{Arch, ArchConfig};
//! use tile_engine::device::Tier;
//!
//! let arch = Arch::A2A3.config();
//! assert_eq!(arch.tier_size(Tier::Vec), 192 * 1024);
//! assert_eq!(arch.elements_per_repeat(4), 64);
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::hw_spec;
use super::tier_memory::Tier;

/// Hardware generation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// Training/inference generation with 192 KiB unified buffer.
    #[default]
    A2A3,
    /// Next generation with 256 KiB unified buffer and f32 cube inputs.
    A5,
    /// Mobile generation with reduced tier sizes.
    Kirin9030,
}

impl Arch {
    /// Get the configuration object for this generation.
    pub fn config(self) -> Arc<dyn ArchConfig> {
        match self {
            Arch::A2A3 => Arc::new(A2A3Config),
            Arch::A5 => Arc::new(A5Config),
            Arch::Kirin9030 => Arc::new(Kirin9030Config),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Arch::A2A3 => "a2a3",
            Arch::A5 => "a5",
            Arch::Kirin9030 => "kirin9030",
        };
        f.write_str(s)
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a2a3" | "a2" | "a3" => Ok(Arch::A2A3),
            "a5" => Ok(Arch::A5),
            "kirin9030" => Ok(Arch::Kirin9030),
            other => Err(format!("unknown architecture '{}'", other)),
        }
    }
}

/// Architecture configuration trait for accelerator generations.
pub trait ArchConfig: Send + Sync + fmt::Debug {
    // ========================================================================
    // Identity
    // ========================================================================

    /// Generation selector this configuration describes.
    fn arch(&self) -> Arch;

    /// Get the architecture name for display.
    fn name(&self) -> &'static str;

    // ========================================================================
    // Memory Configuration
    // ========================================================================

    /// Capacity in bytes of an on-chip tier.
    fn tier_size(&self, tier: Tier) -> usize;

    // ========================================================================
    // Vector Unit
    // ========================================================================

    /// Bytes covered by one vector repeat.
    fn repeat_bytes(&self) -> usize {
        hw_spec::REPEAT_BYTE
    }

    /// Bytes in one stride block.
    fn block_bytes(&self) -> usize {
        hw_spec::BLOCK_BYTE_SIZE
    }

    /// Largest repeat count one issue may carry.
    fn max_repeat(&self) -> usize {
        hw_spec::REPEAT_MAX
    }

    /// Largest block or repeat stride one issue may carry.
    fn max_repeat_stride(&self) -> usize {
        hw_spec::REPEAT_STRIDE_MAX
    }

    /// Elements of a `size`-byte type per repeat.
    fn elements_per_repeat(&self, size: usize) -> usize {
        self.repeat_bytes() / size
    }

    /// Elements of a `size`-byte type per block.
    fn elements_per_block(&self, size: usize) -> usize {
        self.block_bytes() / size
    }

    // ========================================================================
    // Matrix Unit
    // ========================================================================

    /// Whether the matrix unit accepts f32 left/right operands.
    fn supports_f32_matmul(&self) -> bool;
}

// ============================================================================
// A2/A3 Configuration
// ============================================================================

/// A2/A3 generation configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct A2A3Config;

impl ArchConfig for A2A3Config {
    fn arch(&self) -> Arch {
        Arch::A2A3
    }

    fn name(&self) -> &'static str {
        "A2/A3"
    }

    fn tier_size(&self, tier: Tier) -> usize {
        match tier {
            Tier::Vec => 192 * 1024,
            Tier::Mat => 512 * 1024,
            Tier::Left | Tier::Right => 64 * 1024,
            Tier::Acc => 128 * 1024,
            Tier::Bias => 1024,
            Tier::Scaling => 2 * 1024,
        }
    }

    fn supports_f32_matmul(&self) -> bool {
        false
    }
}

// ============================================================================
// A5 Configuration
// ============================================================================

/// A5 generation configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct A5Config;

impl ArchConfig for A5Config {
    fn arch(&self) -> Arch {
        Arch::A5
    }

    fn name(&self) -> &'static str {
        "A5"
    }

    fn tier_size(&self, tier: Tier) -> usize {
        match tier {
            Tier::Vec => 256 * 1024,
            Tier::Mat => 512 * 1024,
            Tier::Left | Tier::Right => 64 * 1024,
            Tier::Acc => 256 * 1024,
            Tier::Bias => 4 * 1024,
            Tier::Scaling => 4 * 1024,
        }
    }

    fn supports_f32_matmul(&self) -> bool {
        true
    }
}

// ============================================================================
// Kirin 9030 Configuration
// ============================================================================

/// Kirin 9030 configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Kirin9030Config;

impl ArchConfig for Kirin9030Config {
    fn arch(&self) -> Arch {
        Arch::Kirin9030
    }

    fn name(&self) -> &'static str {
        "Kirin 9030"
    }

    fn tier_size(&self, tier: Tier) -> usize {
        match tier {
            Tier::Vec => 128 * 1024,
            Tier::Mat => 256 * 1024,
            Tier::Left | Tier::Right => 32 * 1024,
            Tier::Acc => 64 * 1024,
            Tier::Bias => 1024,
            Tier::Scaling => 1024,
        }
    }

    fn supports_f32_matmul(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a2a3_tiers() {
        let arch = Arch::A2A3.config();
        assert_eq!(arch.tier_size(Tier::Vec), 192 * 1024);
        assert_eq!(arch.tier_size(Tier::Acc), 128 * 1024);
        assert!(!arch.supports_f32_matmul());
    }

    #[test]
    fn test_shared_vector_geometry() {
        for arch in [Arch::A2A3, Arch::A5, Arch::Kirin9030] {
            let cfg = arch.config();
            assert_eq!(cfg.elements_per_repeat(2), 128);
            assert_eq!(cfg.elements_per_block(4), 8);
            assert_eq!(cfg.max_repeat(), 255);
            assert_eq!(cfg.arch(), arch);
        }
    }

    #[test]
    fn test_arch_parse_and_display() {
        assert_eq!("A5".parse::<Arch>(), Ok(Arch::A5));
        assert_eq!("kirin9030".parse::<Arch>(), Ok(Arch::Kirin9030));
        assert!("npu9".parse::<Arch>().is_err());
        assert_eq!(Arch::A2A3.to_string(), "a2a3");
    }
}
