//! Hardware pipeline identities.

use std::fmt;

/// An independent execution pipeline of the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pipe {
    /// Scalar unit.
    S,
    /// Vector unit.
    V,
    /// Matrix (cube) unit.
    M,
    /// L1 to L0A/L0B/bias transfers.
    Mte1,
    /// Global memory to on-chip transfers.
    Mte2,
    /// On-chip to global memory transfers.
    Mte3,
    /// Accumulator fixpipe (L0C out).
    Fix,
    /// Every pipe; only meaningful for barriers.
    All,
}

/// Number of concrete pipes (excluding [`Pipe::All`]).
pub const PIPE_COUNT: usize = 7;

impl Pipe {
    /// Concrete pipes in index order.
    pub const CONCRETE: [Pipe; PIPE_COUNT] = [
        Pipe::S,
        Pipe::V,
        Pipe::M,
        Pipe::Mte1,
        Pipe::Mte2,
        Pipe::Mte3,
        Pipe::Fix,
    ];

    /// Index into per-pipe tables, `None` for [`Pipe::All`].
    #[inline]
    pub fn index(self) -> Option<usize> {
        match self {
            Pipe::All => None,
            p => Some(p as usize),
        }
    }
}

impl fmt::Display for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Pipe::S => "PIPE_S",
            Pipe::V => "PIPE_V",
            Pipe::M => "PIPE_M",
            Pipe::Mte1 => "PIPE_MTE1",
            Pipe::Mte2 => "PIPE_MTE2",
            Pipe::Mte3 => "PIPE_MTE3",
            Pipe::Fix => "PIPE_FIX",
            Pipe::All => "PIPE_ALL",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_dense() {
        for (i, p) in Pipe::CONCRETE.iter().enumerate() {
            assert_eq!(p.index(), Some(i));
        }
        assert_eq!(Pipe::All.index(), None);
        assert_eq!(Pipe::Mte2.to_string(), "PIPE_MTE2");
    }
}
