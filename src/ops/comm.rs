//! Remote copies, group collectives and signals.
//!
//! Ranks share one global memory, so a remote buffer is simply a global
//! tensor at another address. Data never moves global to global directly:
//! every copy goes through a staging tile in chunks of the staging tile's
//! valid extent, one load and one store per chunk. Signals are `i32` words
//! updated and polled on the scalar pipe.

use super::transfer::AtomicMode;
use super::VecOperand;
use crate::device::global_memory::GlobalMemory;
use crate::engine::AiCore;
use crate::sync::event::Event;
use crate::sync::flags::SyncError;
use crate::sync::pipe::Pipe;
use crate::sync::signal::{self, NotifyOp, Signal, WaitCmp};
use crate::tile::dtype::Element;
use crate::tile::global::GlobalTensor;
use crate::tile::layout::Shape2;
use crate::vector::backend::InstructionBackend;
use crate::vector::dispatch::Access;
use crate::vector::instr::ReduceOp;

/// Same-shaped buffers, one per rank, and the rank of this core.
#[derive(Debug, Clone)]
pub struct ParallelGroup<T: Element> {
    members: Vec<GlobalTensor<T>>,
    rank: usize,
}

impl<T: Element> ParallelGroup<T> {
    pub fn new(members: Vec<GlobalTensor<T>>, rank: usize) -> Self {
        if let Some(first) = members.first() {
            let shape = (first.rows(), first.cols());
            if members.iter().any(|m| (m.rows(), m.cols()) != shape) {
                log::warn!("parallel group members differ in shape; collectives use each pair's overlap");
            }
        }
        if rank >= members.len() {
            log::warn!("rank {} outside a group of {}", rank, members.len());
        }
        Self { members, rank }
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn member(&self, rank: usize) -> Option<&GlobalTensor<T>> {
        self.members.get(rank)
    }

    /// This core's own buffer.
    pub fn local(&self) -> Option<&GlobalTensor<T>> {
        self.member(self.rank)
    }

    pub fn members(&self) -> &[GlobalTensor<T>] {
        &self.members
    }
}

/// Region of a tensor handled in one staging round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Chunk {
    row: usize,
    col: usize,
    rows: usize,
    cols: usize,
}

impl Chunk {
    fn of<T: Element>(&self, g: &GlobalTensor<T>) -> GlobalTensor<T> {
        g.window(self.row, self.col, self.rows, self.cols).unwrap_or(*g)
    }
}

/// Chunks of `extent` no larger than `step`; one chunk when the tensor
/// has no flat window.
fn chunks<T: Element>(g: &GlobalTensor<T>, extent: Shape2, step: Shape2) -> Vec<Chunk> {
    if step.is_empty() || extent.is_empty() {
        return Vec::new();
    }
    if g.window(0, 0, 1, 1).is_none() {
        if !extent.fits_in(&step) {
            log::warn!("{:?} tensor larger than its staging tile; copying the first {}", g.layout(), step);
        }
        return vec![Chunk {
            row: 0,
            col: 0,
            rows: extent.rows,
            cols: extent.cols,
        }];
    }
    let mut out = Vec::new();
    for row in (0..extent.rows).step_by(step.rows) {
        for col in (0..extent.cols).step_by(step.cols) {
            out.push(Chunk {
                row,
                col,
                rows: step.rows.min(extent.rows - row),
                cols: step.cols.min(extent.cols - col),
            });
        }
    }
    out
}

fn extent_of<T: Element>(g: &GlobalTensor<T>) -> Shape2 {
    Shape2::new(g.rows(), g.cols())
}

impl<B: InstructionBackend> AiCore<B> {
    /// Turn whatever is still pending into a single event.
    fn join(&mut self, name: &'static str, pipe: Pipe, mut pending: Vec<Event>) -> Event {
        if pending.len() == 1 {
            if let Some(ev) = pending.pop() {
                return ev;
            }
        }
        let tok = self.begin(name, pipe, pending);
        self.finish(tok)
    }

    /// Copy `src` into `dst` through `staging`, chunk by chunk.
    fn relay<T: Element>(
        &mut self,
        name: &'static str,
        dst: &GlobalTensor<T>,
        src: &GlobalTensor<T>,
        staging: &impl VecOperand<T>,
        atomic: AtomicMode,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let extent = extent_of(src).min(extent_of(dst));
        let step = staging.desc().valid;
        let mut pending: Vec<Event> = waits.into_iter().collect();
        let plan = chunks(src, extent, step);
        log::debug!("{}: {} in {} chunk(s) of {}", name, extent, plan.len(), step);
        for chunk in plan {
            let ev = self.tload(staging, &chunk.of(src), std::mem::take(&mut pending));
            pending.push(self.tstore(&chunk.of(dst), staging, atomic, [ev]));
        }
        self.join(name, Pipe::Mte3, pending)
    }

    /// Write local `src` into a remote `dst`, optionally adding to it.
    pub fn tput<T: Element>(
        &mut self,
        dst: &GlobalTensor<T>,
        src: &GlobalTensor<T>,
        staging: &impl VecOperand<T>,
        atomic: AtomicMode,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        self.relay("tput", dst, src, staging, atomic, waits)
    }

    /// Read a remote `src` into local `dst`.
    pub fn tget<T: Element>(
        &mut self,
        dst: &GlobalTensor<T>,
        src: &GlobalTensor<T>,
        staging: &impl VecOperand<T>,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        self.relay("tget", dst, src, staging, AtomicMode::None, waits)
    }

    /// Copy this rank's buffer to every other member of `group`.
    pub fn tbroadcast<T: Element>(
        &mut self,
        group: &ParallelGroup<T>,
        staging: &impl VecOperand<T>,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let mut pending: Vec<Event> = waits.into_iter().collect();
        let Some(root) = group.local().copied() else {
            return self.join("tbroadcast", Pipe::Mte3, pending);
        };
        for (rank, member) in group.members().iter().enumerate() {
            if rank != group.rank() {
                let ev = self.relay("tbroadcast", member, &root, staging, AtomicMode::None, std::mem::take(&mut pending));
                pending.push(ev);
            }
        }
        self.join("tbroadcast", Pipe::Mte3, pending)
    }

    /// Fold every member of `group` with `op` into `dst`.
    ///
    /// `acc` holds the running result and `tmp` each incoming chunk; both
    /// need the same valid extent.
    pub fn treduce<T: Element>(
        &mut self,
        group: &ParallelGroup<T>,
        dst: &GlobalTensor<T>,
        acc: &impl VecOperand<T>,
        tmp: &impl VecOperand<T>,
        op: ReduceOp,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let mut pending: Vec<Event> = waits.into_iter().collect();
        let Some(first) = group.members().first().copied() else {
            return self.join("treduce", Pipe::Mte3, pending);
        };
        let (a, t) = (acc.desc(), tmp.desc());
        self.check_scratch("treduce", a.valid, t.valid);
        let extent = group
            .members()
            .iter()
            .map(extent_of)
            .fold(extent_of(dst), |e, m| e.min(m));

        for chunk in chunks(&first, extent, a.valid) {
            let mut ev = self.tload(acc, &chunk.of(&first), std::mem::take(&mut pending));
            for member in &group.members()[1..] {
                // The load overwrites `tmp`, so it waits for the previous fold.
                let loaded = self.tload(tmp, &chunk.of(member), [ev]);
                let tok = self.begin("treduce", Pipe::V, [loaded]);
                let (wa, wt) = (a.window(0, 0, chunk.rows, chunk.cols), t.window(0, 0, chunk.rows, chunk.cols));
                self.read_tile(&tok, &wa);
                self.read_tile(&tok, &wt);
                self.binary_kernel("treduce", op.combine(), &wa, (&wa, Access::Elementwise), (&wt, Access::Elementwise));
                self.write_tile(&tok, &wa);
                ev = self.finish(tok);
            }
            pending.push(self.tstore(&chunk.of(dst), acc, AtomicMode::None, [ev]));
        }
        self.join("treduce", Pipe::Mte3, pending)
    }

    /// Update a signal word.
    pub fn tnotify(
        &mut self,
        sig: &Signal,
        op: NotifyOp,
        value: i32,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let tok = self.begin("tnotify", Pipe::S, waits);
        if op == NotifyOp::AtomicAdd {
            self.read_global(&tok, sig.addr(), 4);
        }
        signal::notify(self.gm_mut(), sig, op, value);
        self.write_global(&tok, sig.addr(), 4);
        self.finish(tok)
    }

    /// Test a signal once.
    pub fn ttest(
        &mut self,
        sig: &Signal,
        cmp: WaitCmp,
        expected: i32,
        waits: impl IntoIterator<Item = Event>,
    ) -> (Event, bool) {
        let tok = self.begin("ttest", Pipe::S, waits);
        self.read_global(&tok, sig.addr(), 4);
        let hit = signal::test(self.gm(), sig, cmp, expected);
        (self.finish(tok), hit)
    }

    /// Poll a signal until `cmp` holds, at most `signal_retries` times.
    ///
    /// `progress` runs between polls and stands in for the other agents
    /// that update the signal.
    pub fn twait(
        &mut self,
        sig: &Signal,
        cmp: WaitCmp,
        expected: i32,
        progress: impl FnMut(&mut GlobalMemory),
        waits: impl IntoIterator<Item = Event>,
    ) -> Result<Event, SyncError> {
        let tok = self.begin("twait", Pipe::S, waits);
        self.read_global(&tok, sig.addr(), 4);
        let retries = self.options().signal_retries;
        let polled = signal::wait(self.gm_mut(), sig, cmp, expected, retries, progress);
        let ev = self.finish(tok);
        match polled {
            Ok(polls) => {
                log::trace!("twait: satisfied after {} poll(s)", polls);
                Ok(ev)
            }
            Err(e) => {
                self.wait_event(ev);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::arch_config::Arch;
    use crate::engine::CoreOptions;
    use crate::testing::golden::compare_global;
    use crate::tile::descriptor::VecTile;

    fn core() -> AiCore {
        AiCore::with_options(Arch::A2A3, CoreOptions::checked())
    }

    #[test]
    fn test_chunk_plan_covers_extent() {
        let g = GlobalTensor::<f32>::dense_2d(0, 8, 40);
        let plan = chunks(&g, Shape2::new(8, 40), Shape2::new(4, 16));
        assert_eq!(plan.len(), 6);
        assert_eq!(plan[2], Chunk { row: 0, col: 32, rows: 4, cols: 8 });
        let covered: usize = plan.iter().map(|c| c.rows * c.cols).sum();
        assert_eq!(covered, 320);
        assert!(chunks(&g, Shape2::new(8, 40), Shape2::new(0, 16)).is_empty());
    }

    #[test]
    fn test_put_in_chunks() {
        let mut core = core();
        let src = GlobalTensor::<f32>::dense_2d(0x10000, 8, 40);
        let dst = GlobalTensor::<f32>::dense_2d(0x20000, 8, 40);
        let values: Vec<f32> = (0..320).map(|i| i as f32 * 0.25).collect();
        core.gm_mut().write_slice(0x10000, &values);
        let staging: VecTile<f32, 4, 16> = VecTile::new(0x0).unwrap();
        let ev = core.tput(&dst, &src, &staging, AtomicMode::None, []);
        core.wait_event(ev);
        assert!(compare_global(core.gm(), 0x20000, &values).passed());
        assert!(core.faults().is_empty());
    }

    #[test]
    fn test_put_atomic_add_and_get() {
        let mut core = core();
        let local = GlobalTensor::<i32>::dense_2d(0x10000, 2, 8);
        let remote = GlobalTensor::<i32>::dense_2d(0x20000, 2, 8);
        core.gm_mut().write_slice(0x10000, &[2i32; 16]);
        core.gm_mut().write_slice(0x20000, &[1i32; 16]);
        let staging: VecTile<i32, 2, 8> = VecTile::new(0x0).unwrap();
        let ev = core.tput(&remote, &local, &staging, AtomicMode::Add, []);
        let ev = core.tget(&local, &remote, &staging, [ev]);
        core.wait_event(ev);
        assert!(compare_global(core.gm(), 0x10000, &[3i32; 16]).passed());
    }

    #[test]
    fn test_broadcast_from_own_rank() {
        let mut core = core();
        let members: Vec<_> = (0..3)
            .map(|r| GlobalTensor::<u16>::dense_2d(0x10000 + r * 0x1000, 4, 16))
            .collect();
        let root: Vec<u16> = (0..64).collect();
        core.gm_mut().write_slice(0x11000, &root);
        let group = ParallelGroup::new(members, 1);
        let staging: VecTile<u16, 4, 16> = VecTile::new(0x0).unwrap();
        let ev = core.tbroadcast(&group, &staging, []);
        core.wait_event(ev);
        for r in 0..3u64 {
            assert!(compare_global(core.gm(), 0x10000 + r * 0x1000, &root).passed());
        }
    }

    #[test]
    fn test_reduce_sum_and_max() {
        let mut core = core();
        let members: Vec<_> = (0..3)
            .map(|r| GlobalTensor::<i32>::dense_2d(0x10000 + r * 0x1000, 3, 24))
            .collect();
        for r in 0..3 {
            let data: Vec<i32> = (0..72).map(|i| i * (r as i32 + 1) - 40).collect();
            core.gm_mut().write_slice(0x10000 + r as u64 * 0x1000, &data);
        }
        let group = ParallelGroup::new(members, 0);
        let out = GlobalTensor::<i32>::dense_2d(0x20000, 3, 24);
        let acc: VecTile<i32, 2, 16> = VecTile::new(0x0).unwrap();
        let tmp: VecTile<i32, 2, 16> = VecTile::new(0x100).unwrap();

        let ev = core.treduce(&group, &out, &acc, &tmp, ReduceOp::Sum, []);
        core.wait_event(ev);
        let sums: Vec<i32> = (0..72).map(|i| 6 * i - 120).collect();
        assert!(compare_global(core.gm(), 0x20000, &sums).passed());

        let ev = core.treduce(&group, &out, &acc, &tmp, ReduceOp::Max, []);
        core.wait_event(ev);
        let maxes: Vec<i32> = (0..72).map(|i| (i * 3 - 40).max(i - 40)).collect();
        assert!(compare_global(core.gm(), 0x20000, &maxes).passed());
        assert!(core.faults().is_empty());
    }

    #[test]
    fn test_signal_notify_test_wait() {
        let mut core = AiCore::with_options(
            Arch::A2A3,
            CoreOptions {
                signal_retries: 4,
                ..CoreOptions::checked()
            },
        );
        let sig = Signal::new(&GlobalTensor::<i32>::scalar(0x30000));
        let ev = core.tnotify(&sig, NotifyOp::Set, 1, []);
        let (ev, hit) = core.ttest(&sig, WaitCmp::Eq, 1, [ev]);
        assert!(hit);

        let ev = core
            .twait(&sig, WaitCmp::Ge, 3, |gm| signal::notify(gm, &sig, NotifyOp::AtomicAdd, 1), [ev])
            .unwrap();
        let err = core.twait(&sig, WaitCmp::Eq, 100, |_| {}, [ev]).unwrap_err();
        assert_eq!(
            err,
            SyncError::SignalTimeout {
                addr: 0x30000,
                retries: 4,
                last: 3
            }
        );
        assert!(core.faults().is_empty());
    }
}
