//! Simulated off-chip global memory (GM).
//!
//! The host runtime owns allocation in real deployments; the engine only
//! needs raw base addresses. This module stands in for device DRAM so
//! transfers have something to read from and write to.
//!
//! # Usage
//!
//! ```
//! use tile_engine::device::GlobalMemory;
//!
//! let mut gm = GlobalMemory::new();
//! gm.allocate_region("src", 0x1000_0000, 4096).unwrap();
//! gm.write_slice(0x1000_0000, &[1.0f32, 2.0, 3.0]);
//! let back: Vec<f32> = gm.read_slice(0x1000_0000, 3);
//! assert_eq!(back, vec![1.0, 2.0, 3.0]);
//! assert_eq!(gm.traffic().region("src").map(|r| r.bytes_read), Some(12));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use super::tier_memory::{decode_le, encode_le};
use crate::tile::dtype::{Element, ElementType};

/// A named memory region for diagnostics.
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    /// Human-readable name (e.g., "src0", "dst")
    pub name: String,
    /// Base address
    pub base_address: u64,
    /// Size in bytes
    pub size: usize,
    /// Bytes written by the host
    pub bytes_written: usize,
    /// Bytes read by the host
    pub bytes_read: usize,
    /// Transfers (load/store/gather/scatter) that read this region
    pub transfer_reads: u64,
    /// Transfers that wrote this region
    pub transfer_writes: u64,
}

impl MemoryRegion {
    /// Region covering `[base_address, base_address + size)`.
    pub fn new(name: impl Into<String>, base_address: u64, size: usize) -> Self {
        Self {
            name: name.into(),
            base_address,
            size,
            bytes_written: 0,
            bytes_read: 0,
            transfer_reads: 0,
            transfer_writes: 0,
        }
    }

    /// Whether `addr` lies inside the region.
    #[inline]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base_address && addr < self.base_address + self.size as u64
    }

    /// Whether `[addr, addr + len)` intersects the region.
    #[inline]
    pub fn overlaps(&self, addr: u64, len: usize) -> bool {
        let end = addr.saturating_add(len as u64);
        let region_end = self.base_address.saturating_add(self.size as u64);
        addr < region_end && end > self.base_address
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<6} 0x{:08x}  loads {}  stores {}  host in {} B  host out {} B",
            self.name,
            self.base_address,
            self.transfer_reads,
            self.transfer_writes,
            self.bytes_written,
            self.bytes_read
        )
    }
}

/// Errors from global memory bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("region at 0x{new_base:016x} overlaps with '{existing_name}'")]
    RegionOverlap { new_base: u64, existing_name: String },
}

/// Sparse global memory.
///
/// Pages of 4 KiB are allocated on first write; untouched memory reads
/// as zero.
#[derive(Debug, Default)]
pub struct GlobalMemory {
    pages: BTreeMap<u64, Box<[u8; Self::PAGE_SIZE]>>,
    regions: Vec<MemoryRegion>,
    total_bytes_written: u64,
    total_bytes_read: u64,
}

impl GlobalMemory {
    /// Page size for sparse storage.
    pub const PAGE_SIZE: usize = 4096;

    const PAGE_MASK: u64 = !(Self::PAGE_SIZE as u64 - 1);

    /// Create an empty global memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named region. Pages are still allocated on demand.
    pub fn allocate_region(
        &mut self,
        name: impl Into<String>,
        base_address: u64,
        size: usize,
    ) -> Result<(), MemoryError> {
        let name = name.into();
        if let Some(existing) = self.regions.iter().find(|r| r.overlaps(base_address, size)) {
            return Err(MemoryError::RegionOverlap {
                new_base: base_address,
                existing_name: existing.name.clone(),
            });
        }
        log::debug!("GM region '{}' at 0x{:x} ({} bytes)", name, base_address, size);
        self.regions.push(MemoryRegion::new(name, base_address, size));
        Ok(())
    }

    fn page_mut(&mut self, addr: u64) -> &mut [u8; Self::PAGE_SIZE] {
        self.pages
            .entry(addr & Self::PAGE_MASK)
            .or_insert_with(|| Box::new([0u8; Self::PAGE_SIZE]))
    }

    fn page(&self, addr: u64) -> Option<&[u8; Self::PAGE_SIZE]> {
        self.pages.get(&(addr & Self::PAGE_MASK)).map(|b| b.as_ref())
    }

    /// Write a byte slice.
    pub fn write_bytes(&mut self, addr: u64, data: &[u8]) {
        let mut current = addr;
        let mut remaining = data;
        while !remaining.is_empty() {
            let offset = (current & !Self::PAGE_MASK) as usize;
            let n = remaining.len().min(Self::PAGE_SIZE - offset);
            self.page_mut(current)[offset..offset + n].copy_from_slice(&remaining[..n]);
            current += n as u64;
            remaining = &remaining[n..];
        }
        self.total_bytes_written += data.len() as u64;
    }

    /// Read bytes into a buffer.
    pub fn read_bytes(&self, addr: u64, buf: &mut [u8]) {
        let mut current = addr;
        let mut done = 0;
        while done < buf.len() {
            let offset = (current & !Self::PAGE_MASK) as usize;
            let n = (buf.len() - done).min(Self::PAGE_SIZE - offset);
            match self.page(current) {
                Some(page) => buf[done..done + n].copy_from_slice(&page[offset..offset + n]),
                None => buf[done..done + n].fill(0),
            }
            current += n as u64;
            done += n;
        }
    }

    /// Read one element as raw bits.
    pub fn read_elem(&self, addr: u64, dtype: ElementType) -> u64 {
        let mut buf = [0u8; 8];
        let n = dtype.size();
        self.read_bytes(addr, &mut buf[..n]);
        decode_le(&buf[..n])
    }

    /// Write one element from raw bits.
    pub fn write_elem(&mut self, addr: u64, dtype: ElementType, bits: u64) {
        let mut buf = [0u8; 8];
        let n = dtype.size();
        encode_le(&mut buf[..n], bits);
        self.write_bytes(addr, &buf[..n]);
    }

    /// Write typed elements contiguously (host-side staging).
    pub fn write_slice<T: Element>(&mut self, addr: u64, data: &[T]) {
        let size = T::DTYPE.size();
        let mut bytes = vec![0u8; data.len() * size];
        for (chunk, v) in bytes.chunks_exact_mut(size).zip(data) {
            encode_le(chunk, v.to_bits());
        }
        self.write_bytes(addr, &bytes);
        if let Some(region) = self.regions.iter_mut().find(|r| r.overlaps(addr, bytes.len())) {
            region.bytes_written += bytes.len();
        }
    }

    /// Read typed elements contiguously (host-side readback).
    pub fn read_slice<T: Element>(&mut self, addr: u64, count: usize) -> Vec<T> {
        let size = T::DTYPE.size();
        let mut bytes = vec![0u8; count * size];
        self.read_bytes(addr, &mut bytes);
        self.total_bytes_read += bytes.len() as u64;
        if let Some(region) = self.regions.iter_mut().find(|r| r.overlaps(addr, bytes.len())) {
            region.bytes_read += bytes.len();
        }
        bytes.chunks_exact(size).map(|c| T::from_bits(decode_le(c))).collect()
    }

    /// Record a transfer reading `[addr, addr + len)`.
    pub fn record_transfer_read(&mut self, addr: u64, len: usize) {
        if let Some(region) = self.regions.iter_mut().find(|r| r.overlaps(addr, len)) {
            region.transfer_reads += 1;
        }
    }

    /// Record a transfer writing `[addr, addr + len)`.
    pub fn record_transfer_write(&mut self, addr: u64, len: usize) {
        if let Some(region) = self.regions.iter_mut().find(|r| r.overlaps(addr, len)) {
            region.transfer_writes += 1;
        }
    }

    /// Snapshot of traffic counters for reporting.
    pub fn traffic(&self) -> Traffic {
        Traffic {
            pages: self.pages.len(),
            bytes_written: self.total_bytes_written,
            bytes_read: self.total_bytes_read,
            regions: self.regions.clone(),
        }
    }
}

/// Global memory traffic accumulated over a run.
#[derive(Debug, Clone, Default)]
pub struct Traffic {
    /// Materialized 4 KiB pages
    pub pages: usize,
    /// Bytes written through any path
    pub bytes_written: u64,
    /// Bytes read back by the host
    pub bytes_read: u64,
    pub regions: Vec<MemoryRegion>,
}

impl Traffic {
    pub fn region(&self, name: &str) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.name == name)
    }
}

impl fmt::Display for Traffic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} page(s), {} B written, {} B read back",
            self.pages, self.bytes_written, self.bytes_read
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_reads_zero() {
        let gm = GlobalMemory::new();
        assert_eq!(gm.read_elem(0xdead_0000, ElementType::U32), 0);
        assert_eq!(gm.traffic().pages, 0);
    }

    #[test]
    fn test_cross_page_write() {
        let mut gm = GlobalMemory::new();
        let data: Vec<u32> = (0..8).collect();
        gm.write_slice(GlobalMemory::PAGE_SIZE as u64 - 8, &data);
        assert_eq!(gm.traffic().pages, 2);
        let back: Vec<u32> = gm.read_slice(GlobalMemory::PAGE_SIZE as u64 - 8, 8);
        assert_eq!(back, data);
        let traffic = gm.traffic();
        assert_eq!((traffic.bytes_written, traffic.bytes_read), (32, 32));
    }

    #[test]
    fn test_region_overlap_rejected() {
        let mut gm = GlobalMemory::new();
        gm.allocate_region("a", 0x1000, 0x100).unwrap();
        let err = gm.allocate_region("b", 0x1080, 0x100).unwrap_err();
        assert!(matches!(err, MemoryError::RegionOverlap { ref existing_name, .. } if existing_name == "a"));
        assert!(gm.traffic().region("b").is_none());
    }

    #[test]
    fn test_region_stats() {
        let mut gm = GlobalMemory::new();
        gm.allocate_region("buf", 0x2000, 64).unwrap();
        gm.write_slice(0x2000, &[1i16, 2, 3, 4]);
        let _: Vec<i16> = gm.read_slice(0x2000, 2);
        gm.record_transfer_read(0x2000, 8);
        gm.record_transfer_write(0x3000, 8);
        let traffic = gm.traffic();
        let region = traffic.region("buf").unwrap();
        assert_eq!(region.bytes_written, 8);
        assert_eq!(region.bytes_read, 4);
        assert_eq!(region.transfer_reads, 1);
        assert_eq!(region.transfer_writes, 0);
        assert_eq!(
            region.to_string(),
            "buf    0x00002000  loads 1  stores 0  host in 8 B  host out 4 B"
        );
        assert_eq!(traffic.to_string(), "1 page(s), 8 B written, 4 B read back");
    }
}
