//! Flag table and cross-pipe visibility tracking.
//!
//! Every concrete pipe advances a sequence number per operation it
//! executes. A consumer pipe may only rely on a producer's effects up to
//! the producer sequence it has synchronized with:
//!
//! ```text
//! visible[consumer][producer] = highest producer seq made visible
//! ```
//!
//! `set_flag(src, dst, id)` snapshots what `src` has done (and what it
//! has itself observed); `wait_flag(src, dst, id)` merges that snapshot
//! into `dst`. Within one pipe, program order already implies
//! visibility.

use thiserror::Error;

use super::pipe::{Pipe, PIPE_COUNT};
use crate::device::hw_spec::EVENT_IDS;

type Clock = [u64; PIPE_COUNT];

/// Synchronization failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("wait_flag({src}, {dst}, {id}) with no matching set_flag")]
    FlagNotSet { src: Pipe, dst: Pipe, id: u8 },

    #[error("event id {id} out of range (0..{max})")]
    InvalidEventId { id: u8, max: usize },

    #[error("{pipe} cannot be a flag endpoint")]
    InvalidPipe { pipe: Pipe },

    #[error("signal at 0x{addr:x} not satisfied after {retries} polls (last value {last})")]
    SignalTimeout { addr: u64, retries: u32, last: i32 },
}

/// Synchronization counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub flags_set: u64,
    pub flags_waited: u64,
    pub barriers: u64,
    pub events_waited: u64,
}

/// Per-core pipe clocks and pending flags.
#[derive(Debug, Clone)]
pub struct SyncState {
    seq: Clock,
    visible: [Clock; PIPE_COUNT],
    /// Pending snapshots, indexed `[src][dst][id]`.
    flags: Vec<Option<Clock>>,
    stats: SyncStats,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncState {
    pub fn new() -> Self {
        Self {
            seq: [0; PIPE_COUNT],
            visible: [[0; PIPE_COUNT]; PIPE_COUNT],
            flags: vec![None; PIPE_COUNT * PIPE_COUNT * EVENT_IDS],
            stats: SyncStats::default(),
        }
    }

    fn endpoint(pipe: Pipe) -> Result<usize, SyncError> {
        pipe.index().ok_or(SyncError::InvalidPipe { pipe })
    }

    fn slot(src: Pipe, dst: Pipe, id: u8) -> Result<usize, SyncError> {
        let (s, d) = (Self::endpoint(src)?, Self::endpoint(dst)?);
        if id as usize >= EVENT_IDS {
            return Err(SyncError::InvalidEventId { id, max: EVENT_IDS });
        }
        Ok((s * PIPE_COUNT + d) * EVENT_IDS + id as usize)
    }

    /// Start a new operation on `pipe`, returning its sequence number.
    pub fn advance(&mut self, pipe: Pipe) -> u64 {
        match pipe.index() {
            Some(i) => {
                self.seq[i] += 1;
                self.seq[i]
            }
            None => 0,
        }
    }

    /// Operations issued so far on `pipe`.
    pub fn seq(&self, pipe: Pipe) -> u64 {
        pipe.index().map_or(0, |i| self.seq[i])
    }

    /// Whether `consumer` may observe operation `seq` of `producer`.
    pub fn is_visible(&self, consumer: Pipe, producer: Pipe, seq: u64) -> bool {
        match (consumer.index(), producer.index()) {
            (Some(c), Some(p)) => c == p || self.visible[c][p] >= seq,
            _ => true,
        }
    }

    fn snapshot(&self, src: usize) -> Clock {
        let mut clock = self.visible[src];
        clock[src] = self.seq[src];
        clock
    }

    fn merge(&mut self, dst: usize, clock: &Clock) {
        for (v, c) in self.visible[dst].iter_mut().zip(clock) {
            *v = (*v).max(*c);
        }
    }

    /// Signal `dst` that everything `src` has issued so far is complete.
    pub fn set_flag(&mut self, src: Pipe, dst: Pipe, id: u8) -> Result<(), SyncError> {
        let slot = Self::slot(src, dst, id)?;
        let s = Self::endpoint(src)?;
        if self.flags[slot].is_some() {
            log::debug!("set_flag({}, {}, {}) overwrites a pending flag", src, dst, id);
        }
        self.flags[slot] = Some(self.snapshot(s));
        self.stats.flags_set += 1;
        Ok(())
    }

    /// Block `dst` until the matching flag from `src` is set, consuming it.
    pub fn wait_flag(&mut self, src: Pipe, dst: Pipe, id: u8) -> Result<(), SyncError> {
        let slot = Self::slot(src, dst, id)?;
        let d = Self::endpoint(dst)?;
        let clock = self.flags[slot].take().ok_or(SyncError::FlagNotSet { src, dst, id })?;
        self.merge(d, &clock);
        self.stats.flags_waited += 1;
        Ok(())
    }

    /// Arm flag `(producer, dst, id)` at a specific producer sequence.
    pub fn set_flag_at(&mut self, producer: Pipe, seq: u64, dst: Pipe, id: u8) -> Result<(), SyncError> {
        let slot = Self::slot(producer, dst, id)?;
        let p = Self::endpoint(producer)?;
        let mut clock = self.visible[p];
        clock[p] = seq;
        self.flags[slot] = Some(clock);
        self.stats.flags_set += 1;
        Ok(())
    }

    /// Make operation `seq` of `producer` visible to `consumer`.
    ///
    /// A consumer of [`Pipe::All`] publishes to every pipe.
    pub fn observe(&mut self, consumer: Pipe, producer: Pipe, seq: u64) {
        let Some(p) = producer.index() else {
            return;
        };
        let mut clock = self.visible[p];
        clock[p] = seq;
        match consumer.index() {
            Some(c) => self.merge(c, &clock),
            None => {
                for c in 0..PIPE_COUNT {
                    self.merge(c, &clock);
                }
            }
        }
        self.stats.events_waited += 1;
    }

    /// Order `pipe` behind its own prior operations; [`Pipe::All`]
    /// completes everything issued on every pipe.
    pub fn barrier(&mut self, pipe: Pipe) {
        self.stats.barriers += 1;
        if pipe == Pipe::All {
            let seq = self.seq;
            for c in 0..PIPE_COUNT {
                self.merge(c, &seq);
            }
        }
    }

    /// Flags set but not yet waited.
    pub fn pending_flags(&self) -> usize {
        self.flags.iter().filter(|f| f.is_some()).count()
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_makes_producer_visible() {
        let mut s = SyncState::new();
        let seq = s.advance(Pipe::Mte2);
        assert!(!s.is_visible(Pipe::V, Pipe::Mte2, seq));
        s.set_flag(Pipe::Mte2, Pipe::V, 0).unwrap();
        s.wait_flag(Pipe::Mte2, Pipe::V, 0).unwrap();
        assert!(s.is_visible(Pipe::V, Pipe::Mte2, seq));
        assert!(!s.is_visible(Pipe::Mte3, Pipe::Mte2, seq));
    }

    #[test]
    fn test_flag_snapshot_excludes_later_ops() {
        let mut s = SyncState::new();
        s.advance(Pipe::Mte2);
        s.set_flag(Pipe::Mte2, Pipe::V, 1).unwrap();
        let later = s.advance(Pipe::Mte2);
        s.wait_flag(Pipe::Mte2, Pipe::V, 1).unwrap();
        assert!(!s.is_visible(Pipe::V, Pipe::Mte2, later));
    }

    #[test]
    fn test_wait_without_set() {
        let mut s = SyncState::new();
        assert_eq!(
            s.wait_flag(Pipe::V, Pipe::Mte3, 2),
            Err(SyncError::FlagNotSet {
                src: Pipe::V,
                dst: Pipe::Mte3,
                id: 2
            })
        );
        s.set_flag(Pipe::V, Pipe::Mte3, 2).unwrap();
        s.wait_flag(Pipe::V, Pipe::Mte3, 2).unwrap();
        // Flags are one-shot.
        assert!(s.wait_flag(Pipe::V, Pipe::Mte3, 2).is_err());
    }

    #[test]
    fn test_invalid_endpoints() {
        let mut s = SyncState::new();
        assert!(matches!(
            s.set_flag(Pipe::All, Pipe::V, 0),
            Err(SyncError::InvalidPipe { .. })
        ));
        assert!(matches!(
            s.set_flag(Pipe::V, Pipe::Mte3, 8),
            Err(SyncError::InvalidEventId { id: 8, .. })
        ));
    }

    #[test]
    fn test_transitive_visibility() {
        let mut s = SyncState::new();
        let load = s.advance(Pipe::Mte2);
        s.set_flag(Pipe::Mte2, Pipe::V, 0).unwrap();
        s.wait_flag(Pipe::Mte2, Pipe::V, 0).unwrap();
        s.advance(Pipe::V);
        s.set_flag(Pipe::V, Pipe::Mte3, 0).unwrap();
        s.wait_flag(Pipe::V, Pipe::Mte3, 0).unwrap();
        assert!(s.is_visible(Pipe::Mte3, Pipe::Mte2, load));
    }

    #[test]
    fn test_barrier_all() {
        let mut s = SyncState::new();
        let a = s.advance(Pipe::Mte2);
        let b = s.advance(Pipe::V);
        s.barrier(Pipe::V);
        assert!(!s.is_visible(Pipe::Mte3, Pipe::V, b));
        s.barrier(Pipe::All);
        assert!(s.is_visible(Pipe::Mte3, Pipe::V, b));
        assert!(s.is_visible(Pipe::M, Pipe::Mte2, a));
        assert_eq!(s.stats().barriers, 2);
    }
}
