//! Memory-based signals for cross-core coordination.
//!
//! A signal is a single `i32` in global memory. Producers update it with
//! [`notify`]; consumers [`test`] it against a condition or [`wait`]
//! with a bounded number of polls. This is best-effort coordination, not
//! cancellation: a timed-out wait leaves no state behind.

use super::flags::SyncError;
use crate::device::global_memory::GlobalMemory;
use crate::tile::dtype::ElementType;
use crate::tile::global::GlobalTensor;

/// Comparison applied by [`test`] and [`wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCmp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl WaitCmp {
    /// Whether `value` satisfies the condition against `expected`.
    pub fn holds(self, value: i32, expected: i32) -> bool {
        match self {
            WaitCmp::Eq => value == expected,
            WaitCmp::Ne => value != expected,
            WaitCmp::Gt => value > expected,
            WaitCmp::Ge => value >= expected,
            WaitCmp::Lt => value < expected,
            WaitCmp::Le => value <= expected,
        }
    }
}

/// Update applied by [`notify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOp {
    Set,
    AtomicAdd,
}

/// A signal word in global memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    addr: u64,
}

impl Signal {
    /// Signal at the first element of `tensor`.
    pub fn new(tensor: &GlobalTensor<i32>) -> Self {
        Self { addr: tensor.addr() }
    }

    #[inline]
    pub fn addr(&self) -> u64 {
        self.addr
    }
}

/// Current signal value.
pub fn load(gm: &GlobalMemory, sig: &Signal) -> i32 {
    gm.read_elem(sig.addr, ElementType::I32) as u32 as i32
}

/// Update a signal.
pub fn notify(gm: &mut GlobalMemory, sig: &Signal, op: NotifyOp, value: i32) {
    let next = match op {
        NotifyOp::Set => value,
        NotifyOp::AtomicAdd => load(gm, sig).wrapping_add(value),
    };
    gm.write_elem(sig.addr, ElementType::I32, next as u32 as u64);
}

/// Test a signal once.
pub fn test(gm: &GlobalMemory, sig: &Signal, cmp: WaitCmp, expected: i32) -> bool {
    cmp.holds(load(gm, sig), expected)
}

/// Poll until the condition holds, calling `progress` between polls.
///
/// Returns the number of polls taken, or [`SyncError::SignalTimeout`]
/// after `retries` unsuccessful polls.
pub fn wait(
    gm: &mut GlobalMemory,
    sig: &Signal,
    cmp: WaitCmp,
    expected: i32,
    retries: u32,
    mut progress: impl FnMut(&mut GlobalMemory),
) -> Result<u32, SyncError> {
    let mut last = load(gm, sig);
    for poll in 1..=retries.max(1) {
        if cmp.holds(last, expected) {
            return Ok(poll);
        }
        progress(gm);
        last = load(gm, sig);
    }
    if cmp.holds(last, expected) {
        return Ok(retries.max(1));
    }
    Err(SyncError::SignalTimeout {
        addr: sig.addr,
        retries,
        last,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal() -> (GlobalMemory, Signal) {
        let gm = GlobalMemory::new();
        let t = GlobalTensor::<i32>::scalar(0x100);
        (gm, Signal::new(&t))
    }

    #[test]
    fn test_notify_and_test() {
        let (mut gm, sig) = signal();
        notify(&mut gm, &sig, NotifyOp::Set, 5);
        notify(&mut gm, &sig, NotifyOp::AtomicAdd, -2);
        assert_eq!(load(&gm, &sig), 3);
        assert!(test(&gm, &sig, WaitCmp::Eq, 3));
        assert!(test(&gm, &sig, WaitCmp::Lt, 4));
        assert!(!test(&gm, &sig, WaitCmp::Gt, 3));
    }

    #[test]
    fn test_wait_observes_progress() {
        let (mut gm, sig) = signal();
        let polls = wait(&mut gm, &sig, WaitCmp::Ge, 3, 10, |gm| {
            notify(gm, &sig, NotifyOp::AtomicAdd, 1);
        })
        .unwrap();
        assert_eq!(polls, 4);
    }

    #[test]
    fn test_wait_times_out() {
        let (mut gm, sig) = signal();
        let err = wait(&mut gm, &sig, WaitCmp::Eq, 1, 5, |_| {}).unwrap_err();
        assert_eq!(
            err,
            SyncError::SignalTimeout {
                addr: 0x100,
                retries: 5,
                last: 0
            }
        );
    }
}
