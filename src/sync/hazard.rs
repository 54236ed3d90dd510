//! Cross-pipe data race detection.
//!
//! Tracks which pipe last wrote each byte range and reports:
//! - **RAW** (read after write): a pipe reads a range another pipe wrote
//!   without having synchronized with that write
//! - **WAW** (write after write): a pipe overwrites such a range
//!
//! A range the accessor already sees through a newer write is not checked
//! against the older writes beneath it. Reads are not recorded, so
//! write-after-read is not detected.
//!
//! Only active when debug checks are enabled; release runs skip all
//! bookkeeping.

use std::fmt;

use smallvec::{smallvec, SmallVec};

use super::flags::SyncState;
use super::pipe::Pipe;
use crate::device::tier_memory::Tier;

/// Address space a range lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Space {
    Tier(Tier),
    Global,
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Space::Tier(t) => write!(f, "{}", t),
            Space::Global => write!(f, "GM"),
        }
    }
}

/// Type of race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceKind {
    /// Read after an unsynchronized write.
    Raw,
    /// Write after an unsynchronized write.
    Waw,
}

/// A detected race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Race {
    pub kind: RaceKind,
    pub space: Space,
    pub addr: u64,
    pub len: usize,
    /// Pipe that wrote the range.
    pub writer: Pipe,
    /// Pipe that accessed it without synchronizing.
    pub accessor: Pipe,
}

impl fmt::Display for Race {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} race on {} [0x{:x}, 0x{:x}): written by {}, accessed by {}",
            self.kind,
            self.space,
            self.addr,
            self.addr + self.len as u64,
            self.writer,
            self.accessor
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct WriteRecord {
    space: Space,
    start: u64,
    end: u64,
    pipe: Pipe,
    seq: u64,
}

/// `[s, e)` minus `[ws, we)`, as up to two non-empty pieces.
fn subtract((s, e): (u64, u64), (ws, we): (u64, u64)) -> impl Iterator<Item = (u64, u64)> {
    [(s, e.min(ws)), (s.max(we), e)].into_iter().filter(|&(a, b)| a < b)
}

/// Last-writer table over tier and global ranges.
#[derive(Debug, Clone, Default)]
pub struct HazardTracker {
    writes: Vec<WriteRecord>,
    raw_races: u64,
    waw_races: u64,
}

impl HazardTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(
        &self,
        sync: &SyncState,
        kind: RaceKind,
        pipe: Pipe,
        space: Space,
        addr: u64,
        len: usize,
    ) -> Option<Race> {
        // Parts of the range whose newest writer is not yet known to be visible.
        let mut open: SmallVec<[(u64, u64); 4]> = smallvec![(addr, addr + len as u64)];
        for w in self.writes.iter().rev() {
            if open.is_empty() {
                break;
            }
            if w.space != space {
                continue;
            }
            if sync.is_visible(pipe, w.pipe, w.seq) {
                open = open.into_iter().flat_map(|r| subtract(r, (w.start, w.end))).collect();
                continue;
            }
            let hit = open
                .iter()
                .map(|&(s, e)| (s.max(w.start), e.min(w.end)))
                .find(|&(s, e)| s < e);
            if let Some((s, e)) = hit {
                return Some(Race {
                    kind,
                    space,
                    addr: s,
                    len: (e - s) as usize,
                    writer: w.pipe,
                    accessor: pipe,
                });
            }
        }
        None
    }

    /// Check a read by `pipe` of `[addr, addr + len)`.
    pub fn check_read(&mut self, sync: &SyncState, pipe: Pipe, space: Space, addr: u64, len: usize) -> Option<Race> {
        let race = self.check(sync, RaceKind::Raw, pipe, space, addr, len);
        if race.is_some() {
            self.raw_races += 1;
        }
        race
    }

    /// Check a write by `pipe` of `[addr, addr + len)` and record it as
    /// operation `seq` of that pipe.
    pub fn write(
        &mut self,
        sync: &SyncState,
        pipe: Pipe,
        seq: u64,
        space: Space,
        addr: u64,
        len: usize,
    ) -> Option<Race> {
        let race = self.check(sync, RaceKind::Waw, pipe, space, addr, len);
        if race.is_some() {
            self.waw_races += 1;
        }
        let end = addr + len as u64;
        // A newer write hides every record it fully covers.
        self.writes
            .retain(|w| !(w.space == space && w.start >= addr && w.end <= end));
        self.writes.push(WriteRecord {
            space,
            start: addr,
            end,
            pipe,
            seq,
        });
        race
    }

    /// (RAW, WAW) races seen so far.
    pub fn counts(&self) -> (u64, u64) {
        (self.raw_races, self.waw_races)
    }

    /// Live write records.
    pub fn tracked(&self) -> usize {
        self.writes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UB: Space = Space::Tier(Tier::Vec);

    #[test]
    fn test_raw_without_sync() {
        let mut sync = SyncState::new();
        let mut h = HazardTracker::new();
        let seq = sync.advance(Pipe::Mte2);
        assert!(h.write(&sync, Pipe::Mte2, seq, UB, 0, 256).is_none());
        let race = h.check_read(&sync, Pipe::V, UB, 128, 256).unwrap();
        assert_eq!(race.kind, RaceKind::Raw);
        assert_eq!((race.addr, race.len), (128, 128));
        assert_eq!(race.writer, Pipe::Mte2);
    }

    #[test]
    fn test_synchronized_read_is_clean() {
        let mut sync = SyncState::new();
        let mut h = HazardTracker::new();
        let seq = sync.advance(Pipe::Mte2);
        h.write(&sync, Pipe::Mte2, seq, UB, 0, 256);
        sync.set_flag(Pipe::Mte2, Pipe::V, 0).unwrap();
        sync.wait_flag(Pipe::Mte2, Pipe::V, 0).unwrap();
        assert!(h.check_read(&sync, Pipe::V, UB, 0, 256).is_none());
        // Disjoint ranges and other spaces never race.
        assert!(h.check_read(&sync, Pipe::Mte3, UB, 256, 64).is_none());
        assert!(h.check_read(&sync, Pipe::Mte3, Space::Global, 0, 64).is_none());
    }

    #[test]
    fn test_waw_and_same_pipe() {
        let mut sync = SyncState::new();
        let mut h = HazardTracker::new();
        let a = sync.advance(Pipe::V);
        h.write(&sync, Pipe::V, a, UB, 0, 64);
        let b = sync.advance(Pipe::V);
        assert!(h.write(&sync, Pipe::V, b, UB, 0, 64).is_none());
        let c = sync.advance(Pipe::Mte2);
        let race = h.write(&sync, Pipe::Mte2, c, UB, 32, 64).unwrap();
        assert_eq!(race.kind, RaceKind::Waw);
        assert_eq!(h.counts(), (0, 1));
    }

    #[test]
    fn test_visible_partial_overwrite_hides_older_writer() {
        let mut sync = SyncState::new();
        let mut h = HazardTracker::new();
        let load = sync.advance(Pipe::Mte2);
        h.write(&sync, Pipe::Mte2, load, UB, 0, 256);
        let fill = sync.advance(Pipe::V);
        h.write(&sync, Pipe::V, fill, UB, 64, 64);
        assert_eq!(h.tracked(), 2);

        assert!(h.check_read(&sync, Pipe::V, UB, 64, 64).is_none());
        let race = h.check_read(&sync, Pipe::V, UB, 0, 256).unwrap();
        assert_eq!((race.addr, race.len), (0, 64));
        assert_eq!(race.writer, Pipe::Mte2);
        let race = h.check_read(&sync, Pipe::V, UB, 96, 64).unwrap();
        assert_eq!((race.addr, race.len), (128, 32));
    }

    #[test]
    fn test_subtract() {
        let pieces = |r, w| subtract(r, w).collect::<Vec<_>>();
        assert_eq!(pieces((0, 10), (3, 5)), vec![(0, 3), (5, 10)]);
        assert_eq!(pieces((0, 10), (0, 10)), vec![]);
        assert_eq!(pieces((0, 10), (10, 20)), vec![(0, 10)]);
        assert_eq!(pieces((5, 10), (0, 7)), vec![(7, 10)]);
    }

    #[test]
    fn test_covering_write_prunes_records() {
        let mut sync = SyncState::new();
        let mut h = HazardTracker::new();
        for i in 0..4 {
            let s = sync.advance(Pipe::V);
            h.write(&sync, Pipe::V, s, UB, i * 64, 64);
        }
        assert_eq!(h.tracked(), 4);
        let s = sync.advance(Pipe::V);
        h.write(&sync, Pipe::V, s, UB, 0, 256);
        assert_eq!(h.tracked(), 1);
    }
}
