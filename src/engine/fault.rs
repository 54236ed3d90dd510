//! Faults recorded by debug checks.
//!
//! Operations are trap-free: a fault never changes what an operation
//! computes. With debug checks enabled the core appends one [`Fault`] per
//! detected problem and logs it; with checks off nothing is tracked.

use thiserror::Error;

use crate::sync::hazard::Race;
use crate::tile::layout::Shape2;

/// A problem detected while executing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("{0}")]
    Race(Race),

    #[error("{op}: index {index} outside 0..{limit}")]
    IndexOutOfRange { op: &'static str, index: u64, limit: u64 },

    #[error("{op}: scratch tile {got} smaller than required {needed}")]
    ScratchTooSmall {
        op: &'static str,
        needed: Shape2,
        got: Shape2,
    },

    #[error("{op}: {accesses} access(es) beyond the end of a tier")]
    TierOverflow { op: &'static str, accesses: u64 },

    #[error("{count} event(s) dropped without being waited")]
    UnwaitedEvent { count: u64 },
}

impl Fault {
    /// Name of the operation that raised the fault, if any.
    pub fn op(&self) -> Option<&'static str> {
        match self {
            Fault::IndexOutOfRange { op, .. }
            | Fault::ScratchTooSmall { op, .. }
            | Fault::TierOverflow { op, .. } => Some(op),
            Fault::Race(_) | Fault::UnwaitedEvent { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::tier_memory::Tier;
    use crate::sync::hazard::{RaceKind, Space};
    use crate::sync::pipe::Pipe;

    #[test]
    fn test_fault_messages() {
        let f = Fault::ScratchTooSmall {
            op: "trowsum",
            needed: Shape2::new(4, 64),
            got: Shape2::new(4, 32),
        };
        assert_eq!(f.to_string(), "trowsum: scratch tile 4x32 smaller than required 4x64");
        assert_eq!(f.op(), Some("trowsum"));

        let race = Fault::Race(Race {
            kind: RaceKind::Raw,
            space: Space::Tier(Tier::Vec),
            addr: 0,
            len: 32,
            writer: Pipe::Mte2,
            accessor: Pipe::V,
        });
        assert!(race.to_string().starts_with("Raw race"));
        assert_eq!(race.op(), None);
    }
}
