//! Producer-to-consumer ordering tokens.
//!
//! Every operation returns an [`Event`] naming the pipe that produced it
//! and its position in that pipe's order. The token is consumed by value,
//! either by the operation that reads the result (which binds the
//! consumer pipe at that point) or by an explicit wait. It cannot be
//! cloned, polled or combined.
//!
//! Dropping an event that was never consumed is a synchronization
//! omission; it is logged and counted.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::pipe::Pipe;

/// Events dropped without being consumed, process-wide.
static UNWAITED: AtomicU64 = AtomicU64::new(0);

/// Number of events dropped without being consumed in this process.
pub fn unwaited_events() -> u64 {
    UNWAITED.load(Ordering::Relaxed)
}

/// One-shot ordering token.
#[must_use = "pass the event to the consuming operation or wait on it"]
pub struct Event {
    producer: Pipe,
    seq: u64,
    armed: bool,
    sink: Option<Arc<AtomicU64>>,
}

impl Event {
    pub(crate) fn new(producer: Pipe, seq: u64, sink: Option<Arc<AtomicU64>>) -> Self {
        Self {
            producer,
            seq,
            armed: true,
            sink,
        }
    }

    /// Pipe whose operation this event follows.
    #[inline]
    pub fn producer(&self) -> Pipe {
        self.producer
    }

    /// Producer sequence number.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Consume the token, returning `(producer, seq)`.
    pub(crate) fn take(mut self) -> (Pipe, u64) {
        self.armed = false;
        (self.producer, self.seq)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event({}#{})", self.producer, self.seq)
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        if self.armed {
            UNWAITED.fetch_add(1, Ordering::Relaxed);
            if let Some(sink) = &self.sink {
                sink.fetch_add(1, Ordering::Relaxed);
            }
            log::warn!("{:?} dropped without being waited", self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_disarms() {
        let sink = Arc::new(AtomicU64::new(0));
        let ev = Event::new(Pipe::V, 3, Some(sink.clone()));
        assert_eq!(ev.take(), (Pipe::V, 3));
        assert_eq!(sink.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_drop_counts_unwaited() {
        let sink = Arc::new(AtomicU64::new(0));
        let before = unwaited_events();
        drop(Event::new(Pipe::Mte2, 1, Some(sink.clone())));
        assert_eq!(sink.load(Ordering::Relaxed), 1);
        assert!(unwaited_events() > before);
    }

    #[test]
    fn test_debug_format() {
        let ev = Event::new(Pipe::Mte3, 7, None);
        assert_eq!(format!("{:?}", ev), "Event(PIPE_MTE3#7)");
        let _ = ev.take();
    }
}
