//! On-chip memory tiers.
//!
//! Each tier is a flat, byte-addressed, little-endian space. Callers
//! partition a tier by binding tiles to explicit byte offsets; nothing
//! here allocates or tracks ownership.
//!
//! Accesses past the end of a tier follow the hardware's trap-free model:
//! reads yield zero bytes and writes are dropped. Each such access bumps
//! [`TierMemory::out_of_range`] so debug tooling can report it.
//!
//! ```text
//!   GM ──MTE2──▶ Vec ──V──▶ Vec ──MTE3──▶ GM
//!   GM ──MTE2──▶ Mat ──MTE1──▶ Left/Right ──M──▶ Acc ──FIX──▶ GM / Vec
//!                Mat ──MTE1──▶ Bias / Scaling
//! ```

use std::fmt;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use super::arch_config::ArchConfig;
use crate::tile::dtype::ElementType;

/// A physically distinct on-chip memory region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// Unified/vector buffer streamed by the vector unit.
    Vec,
    /// Matrix staging buffer (L1).
    Mat,
    /// Matrix left-operand buffer (L0A).
    Left,
    /// Matrix right-operand buffer (L0B).
    Right,
    /// Matrix accumulator buffer (L0C).
    Acc,
    /// Bias table.
    Bias,
    /// Scaling-factor (fixpipe) buffer.
    Scaling,
}

impl Tier {
    /// All tiers in index order.
    pub const ALL: [Tier; 7] = [
        Tier::Vec,
        Tier::Mat,
        Tier::Left,
        Tier::Right,
        Tier::Acc,
        Tier::Bias,
        Tier::Scaling,
    ];

    #[inline]
    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Vec => "UB",
            Tier::Mat => "L1",
            Tier::Left => "L0A",
            Tier::Right => "L0B",
            Tier::Acc => "L0C",
            Tier::Bias => "BT",
            Tier::Scaling => "FB",
        };
        f.write_str(s)
    }
}

/// Backing storage for every on-chip tier of one core.
#[derive(Debug, Clone)]
pub struct TierMemory {
    arch: Arc<dyn ArchConfig>,
    buffers: [Vec<u8>; 7],
    out_of_range: u64,
}

impl TierMemory {
    /// Allocate zeroed tiers sized for `arch`.
    pub fn new(arch: Arc<dyn ArchConfig>) -> Self {
        let buffers = Tier::ALL.map(|t| vec![0u8; arch.tier_size(t)]);
        Self {
            arch,
            buffers,
            out_of_range: 0,
        }
    }

    /// Architecture the tiers were sized for.
    pub fn arch(&self) -> &Arc<dyn ArchConfig> {
        &self.arch
    }

    /// Size in bytes of a tier.
    #[inline]
    pub fn size(&self, tier: Tier) -> usize {
        self.buffers[tier.index()].len()
    }

    /// Number of accesses that fell outside their tier.
    #[inline]
    pub fn out_of_range(&self) -> u64 {
        self.out_of_range
    }

    /// Check whether `[addr, addr + len)` lies inside `tier`.
    #[inline]
    pub fn contains(&self, tier: Tier, addr: u64, len: usize) -> bool {
        (addr as usize)
            .checked_add(len)
            .map_or(false, |end| end <= self.size(tier))
    }

    /// Copy bytes out of a tier. Out-of-range bytes read as zero.
    pub fn read_bytes(&mut self, tier: Tier, addr: u64, out: &mut [u8]) {
        if self.contains(tier, addr, out.len()) {
            let start = addr as usize;
            out.copy_from_slice(&self.buffers[tier.index()][start..start + out.len()]);
        } else {
            self.out_of_range += 1;
            log::trace!("{} read of {} bytes at 0x{:x} out of range", tier, out.len(), addr);
            let buf = &self.buffers[tier.index()];
            for (i, b) in out.iter_mut().enumerate() {
                *b = (addr as usize)
                    .checked_add(i)
                    .and_then(|a| buf.get(a))
                    .copied()
                    .unwrap_or(0);
            }
        }
    }

    /// Copy bytes into a tier. Out-of-range bytes are dropped.
    pub fn write_bytes(&mut self, tier: Tier, addr: u64, data: &[u8]) {
        if self.contains(tier, addr, data.len()) {
            let start = addr as usize;
            self.buffers[tier.index()][start..start + data.len()].copy_from_slice(data);
        } else {
            self.out_of_range += 1;
            log::trace!("{} write of {} bytes at 0x{:x} out of range", tier, data.len(), addr);
            let buf = &mut self.buffers[tier.index()];
            for (i, b) in data.iter().enumerate() {
                if let Some(slot) = (addr as usize).checked_add(i).and_then(|a| buf.get_mut(a)) {
                    *slot = *b;
                }
            }
        }
    }

    /// Read one element as raw zero-extended bits.
    pub fn read_elem(&mut self, tier: Tier, addr: u64, dtype: ElementType) -> u64 {
        let mut buf = [0u8; 8];
        let n = dtype.size();
        self.read_bytes(tier, addr, &mut buf[..n]);
        decode_le(&buf[..n])
    }

    /// Write one element from raw bits.
    pub fn write_elem(&mut self, tier: Tier, addr: u64, dtype: ElementType, bits: u64) {
        let mut buf = [0u8; 8];
        let n = dtype.size();
        encode_le(&mut buf[..n], bits);
        self.write_bytes(tier, addr, &buf[..n]);
    }

    /// Fill `len` bytes starting at `addr` with repeated element bits.
    pub fn fill_elems(&mut self, tier: Tier, addr: u64, count: usize, dtype: ElementType, bits: u64) {
        let size = dtype.size();
        for i in 0..count {
            self.write_elem(tier, addr + (i * size) as u64, dtype, bits);
        }
    }

    /// Borrow a tier's raw bytes (diagnostics and tests).
    pub fn raw(&self, tier: Tier) -> &[u8] {
        &self.buffers[tier.index()]
    }
}

/// Decode 1, 2, 4 or 8 little-endian bytes.
#[inline]
pub fn decode_le(bytes: &[u8]) -> u64 {
    match bytes.len() {
        1 => bytes[0] as u64,
        2 => LittleEndian::read_u16(bytes) as u64,
        4 => LittleEndian::read_u32(bytes) as u64,
        8 => LittleEndian::read_u64(bytes),
        n => LittleEndian::read_uint(bytes, n),
    }
}

/// Encode the low bytes of `bits` into `out` (1, 2, 4 or 8 bytes).
#[inline]
pub fn encode_le(out: &mut [u8], bits: u64) {
    match out.len() {
        1 => out[0] = bits as u8,
        2 => LittleEndian::write_u16(out, bits as u16),
        4 => LittleEndian::write_u32(out, bits as u32),
        8 => LittleEndian::write_u64(out, bits),
        n => LittleEndian::write_uint(out, bits, n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::arch_config::Arch;

    fn memory() -> TierMemory {
        TierMemory::new(Arch::A2A3.config())
    }

    #[test]
    fn test_tier_sizes() {
        let mem = memory();
        assert_eq!(mem.size(Tier::Vec), 192 * 1024);
        assert_eq!(mem.size(Tier::Bias), 1024);
    }

    #[test]
    fn test_elem_round_trip() {
        let mut mem = memory();
        mem.write_elem(Tier::Vec, 0x40, ElementType::F32, 1.5f32.to_bits() as u64);
        mem.write_elem(Tier::Vec, 0x44, ElementType::I16, 0xfffe);
        assert_eq!(mem.read_elem(Tier::Vec, 0x40, ElementType::F32), 1.5f32.to_bits() as u64);
        assert_eq!(mem.read_elem(Tier::Vec, 0x44, ElementType::I16), 0xfffe);
        assert_eq!(mem.raw(Tier::Vec)[0x44], 0xfe);
        assert_eq!(mem.out_of_range(), 0);
    }

    #[test]
    fn test_out_of_range_is_trap_free() {
        let mut mem = memory();
        let end = mem.size(Tier::Bias) as u64;
        mem.write_elem(Tier::Bias, end - 2, ElementType::F32, 0xdead_beef);
        // Only the two in-range bytes land.
        assert_eq!(mem.raw(Tier::Bias)[end as usize - 2], 0xef);
        assert_eq!(mem.raw(Tier::Bias)[end as usize - 1], 0xbe);
        assert_eq!(mem.read_elem(Tier::Bias, end - 2, ElementType::F32), 0xbeef);
        assert_eq!(mem.read_elem(Tier::Bias, end + 100, ElementType::U8), 0);
        assert_eq!(mem.out_of_range(), 3);
    }

    #[test]
    fn test_tiers_are_independent() {
        let mut mem = memory();
        mem.write_elem(Tier::Left, 0, ElementType::U32, 7);
        assert_eq!(mem.read_elem(Tier::Right, 0, ElementType::U32), 0);
        assert_eq!(mem.read_elem(Tier::Left, 0, ElementType::U32), 7);
    }
}
