//! One simulated compute core.
//!
//! [`AiCore`] owns everything a kernel touches: the vector backend (and
//! through it the on-chip tiers), global memory and the pipe clocks. Every
//! logical operation is a method on it (see [`crate::ops`]) and follows
//! the same bracket:
//!
//! ```text
//! begin(name, pipe, waits)   consume input events, advance the pipe
//!   read_* / write_*         hazard bookkeeping (debug checks only)
//!   run(plan, build)         issue vector instructions under a mask scope
//! finish(token) -> Event     report tier overflows, hand back the event
//! ```
//!
//! # Usage
//!
//! ```
//! use tile_engine::device::Arch;
//! use tile_engine::engine::AiCore;
//! use tile_engine::tile::{GlobalTensor, VecTile};
//!
//! let mut core = AiCore::new(Arch::A2A3);
//! let g = GlobalTensor::<f32>::dense_2d(0x1000, 8, 8);
//! core.gm_mut().write_slice(0x1000, &[1.0f32; 64]);
//!
//! let t: VecTile<f32, 8, 8> = VecTile::new(0).unwrap();
//! let loaded = core.tload(&t, &g, []);
//! let doubled = core.tadd(&t, &t, &t, [loaded]);
//! core.wait_event(doubled);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::fault::Fault;
use crate::config::Config;
use crate::device::arch_config::{Arch, ArchConfig};
use crate::device::global_memory::GlobalMemory;
use crate::device::hw_spec::SIGNAL_DEFAULT_RETRIES;
use crate::device::tier_memory::TierMemory;
use crate::sync::event::Event;
use crate::sync::flags::{SyncError, SyncState};
use crate::sync::hazard::{HazardTracker, Space};
use crate::sync::pipe::Pipe;
use crate::tile::descriptor::TileDesc;
use crate::tile::layout::Shape2;
use crate::vector::backend::InstructionBackend;
use crate::vector::dispatch::{self, Issue, Plan};
use crate::vector::instr::VectorInstr;
use crate::vector::sim::SimBackend;

/// Per-core execution options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreOptions {
    /// Record faults (races, scratch size, indices, tier overflow).
    pub debug_checks: bool,
    /// Log every planned issue at debug level.
    pub trace_issues: bool,
    /// Poll budget for signal waits.
    pub signal_retries: u32,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            debug_checks: false,
            trace_issues: false,
            signal_retries: SIGNAL_DEFAULT_RETRIES,
        }
    }
}

impl CoreOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debug_checks: config.debug_checks,
            trace_issues: config.trace_issues,
            signal_retries: config.signal_retries,
        }
    }

    /// Defaults with debug checks on.
    pub fn checked() -> Self {
        Self {
            debug_checks: true,
            ..Self::default()
        }
    }
}

/// Bookkeeping that only exists while debug checks are on.
#[derive(Debug, Default)]
struct DebugChecks {
    hazards: HazardTracker,
    faults: Vec<Fault>,
    /// Events of this core dropped without being waited.
    unwaited: Arc<AtomicU64>,
    /// Portion of `unwaited` already turned into faults.
    reported: u64,
}

impl DebugChecks {
    fn push(&mut self, fault: Fault) {
        log::warn!("{}", fault);
        self.faults.push(fault);
    }

    fn poll_unwaited(&mut self) {
        let count = self.unwaited.load(Ordering::Relaxed);
        if count > self.reported {
            self.push(Fault::UnwaitedEvent {
                count: count - self.reported,
            });
            self.reported = count;
        }
    }
}

/// An operation in flight between [`AiCore::begin`] and [`AiCore::finish`].
#[derive(Debug)]
pub(crate) struct OpToken {
    pub(crate) name: &'static str,
    pub(crate) pipe: Pipe,
    pub(crate) seq: u64,
    oob_before: u64,
}

/// A simulated compute core.
pub struct AiCore<B: InstructionBackend = SimBackend> {
    backend: B,
    gm: GlobalMemory,
    sync: SyncState,
    options: CoreOptions,
    checks: Option<DebugChecks>,
}

impl AiCore<SimBackend> {
    /// Core for `arch` with default options.
    pub fn new(arch: Arch) -> Self {
        Self::with_options(arch, CoreOptions::default())
    }

    pub fn with_options(arch: Arch, options: CoreOptions) -> Self {
        Self::with_backend(SimBackend::new(arch.config()), options)
    }

    /// Core configured from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self::with_options(config.arch, CoreOptions::from_config(config))
    }
}

impl<B: InstructionBackend> AiCore<B> {
    /// Core driving an arbitrary instruction backend.
    pub fn with_backend(backend: B, options: CoreOptions) -> Self {
        log::debug!(
            "core on {} (debug_checks={}, trace_issues={})",
            backend.arch().name(),
            options.debug_checks,
            options.trace_issues
        );
        Self {
            backend,
            gm: GlobalMemory::new(),
            sync: SyncState::new(),
            options,
            checks: options.debug_checks.then(DebugChecks::default),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn arch(&self) -> &Arc<dyn ArchConfig> {
        self.backend.arch()
    }

    pub fn options(&self) -> &CoreOptions {
        &self.options
    }

    pub fn gm(&self) -> &GlobalMemory {
        &self.gm
    }

    pub fn gm_mut(&mut self) -> &mut GlobalMemory {
        &mut self.gm
    }

    pub fn tiers(&self) -> &TierMemory {
        self.backend.tiers()
    }

    pub fn tiers_mut(&mut self) -> &mut TierMemory {
        self.backend.tiers_mut()
    }

    pub fn sync(&self) -> &SyncState {
        &self.sync
    }

    // ------------------------------------------------------------------
    // Faults
    // ------------------------------------------------------------------

    /// Faults recorded so far. Empty when debug checks are off.
    pub fn faults(&mut self) -> &[Fault] {
        match self.checks.as_mut() {
            Some(checks) => {
                checks.poll_unwaited();
                &checks.faults
            }
            None => &[],
        }
    }

    /// Drain the fault log.
    pub fn take_faults(&mut self) -> Vec<Fault> {
        match self.checks.as_mut() {
            Some(checks) => {
                checks.poll_unwaited();
                std::mem::take(&mut checks.faults)
            }
            None => Vec::new(),
        }
    }

    pub(crate) fn report(&mut self, fault: Fault) {
        if let Some(checks) = self.checks.as_mut() {
            checks.push(fault);
        }
    }

    #[inline]
    pub(crate) fn checking(&self) -> bool {
        self.checks.is_some()
    }

    /// Report a scratch tile smaller than `needed`.
    pub(crate) fn check_scratch(&mut self, op: &'static str, needed: Shape2, got: Shape2) {
        if self.checking() && !needed.fits_in(&got) {
            self.report(Fault::ScratchTooSmall { op, needed, got });
        }
    }

    /// Report an index at or beyond `limit`. Returns whether it is in range.
    pub(crate) fn check_index(&mut self, op: &'static str, index: u64, limit: u64) -> bool {
        let ok = index < limit;
        if !ok && self.checking() {
            self.report(Fault::IndexOutOfRange { op, index, limit });
        }
        ok
    }

    // ------------------------------------------------------------------
    // Synchronization
    // ------------------------------------------------------------------

    /// `set_flag(src, dst, id)`: everything `src` has issued so far becomes
    /// visible to `dst` once it waits on the same flag.
    pub fn set_flag(&mut self, src: Pipe, dst: Pipe, id: u8) -> Result<(), SyncError> {
        self.sync.set_flag(src, dst, id)
    }

    /// `wait_flag(src, dst, id)`: stall `dst` until the flag is set.
    pub fn wait_flag(&mut self, src: Pipe, dst: Pipe, id: u8) -> Result<(), SyncError> {
        self.sync.wait_flag(src, dst, id)
    }

    /// Order `pipe` behind its own work; [`Pipe::All`] drains every pipe.
    pub fn pipe_barrier(&mut self, pipe: Pipe) {
        self.sync.barrier(pipe);
    }

    /// Block until the event's producer has completed, for every pipe.
    pub fn wait_event(&mut self, event: Event) {
        let (producer, seq) = event.take();
        self.sync.observe(Pipe::All, producer, seq);
    }

    /// Turn an event into a flag `dst` can wait on later.
    pub fn set_flag_on(&mut self, event: Event, dst: Pipe, id: u8) -> Result<(), SyncError> {
        let (producer, seq) = event.take();
        self.sync.set_flag_at(producer, seq, dst, id)
    }

    // ------------------------------------------------------------------
    // Operation bracket
    // ------------------------------------------------------------------

    /// Start operation `name` on `pipe` after consuming `waits`.
    pub(crate) fn begin(
        &mut self,
        name: &'static str,
        pipe: Pipe,
        waits: impl IntoIterator<Item = Event>,
    ) -> OpToken {
        for event in waits {
            let (producer, seq) = event.take();
            self.sync.observe(pipe, producer, seq);
        }
        let seq = self.sync.advance(pipe);
        OpToken {
            name,
            pipe,
            seq,
            oob_before: self.backend.tiers().out_of_range(),
        }
    }

    /// Complete an operation and return its event.
    pub(crate) fn finish(&mut self, tok: OpToken) -> Event {
        let oob = self.backend.tiers().out_of_range();
        if oob > tok.oob_before {
            self.report(Fault::TierOverflow {
                op: tok.name,
                accesses: oob - tok.oob_before,
            });
        }
        let sink = self.checks.as_ref().map(|c| c.unwaited.clone());
        Event::new(tok.pipe, tok.seq, sink)
    }

    fn track_read(&mut self, tok: &OpToken, space: Space, addr: u64, len: usize) {
        if len == 0 {
            return;
        }
        if let Some(checks) = self.checks.as_mut() {
            if let Some(race) = checks.hazards.check_read(&self.sync, tok.pipe, space, addr, len) {
                checks.push(Fault::Race(race));
            }
        }
    }

    fn track_write(&mut self, tok: &OpToken, space: Space, addr: u64, len: usize) {
        if len == 0 {
            return;
        }
        if let Some(checks) = self.checks.as_mut() {
            if let Some(race) = checks
                .hazards
                .write(&self.sync, tok.pipe, tok.seq, space, addr, len)
            {
                checks.push(Fault::Race(race));
            }
        }
    }

    pub(crate) fn read_tile(&mut self, tok: &OpToken, desc: &TileDesc) {
        let (addr, len) = desc.footprint();
        self.track_read(tok, Space::Tier(desc.tier), addr, len);
    }

    pub(crate) fn write_tile(&mut self, tok: &OpToken, desc: &TileDesc) {
        let (addr, len) = desc.footprint();
        self.track_write(tok, Space::Tier(desc.tier), addr, len);
    }

    pub(crate) fn read_global(&mut self, tok: &OpToken, addr: u64, len: usize) {
        self.track_read(tok, Space::Global, addr, len);
    }

    pub(crate) fn write_global(&mut self, tok: &OpToken, addr: u64, len: usize) {
        self.track_write(tok, Space::Global, addr, len);
    }

    // ------------------------------------------------------------------
    // Vector issue helpers
    // ------------------------------------------------------------------

    /// Elements per repeat for `size`-byte lanes.
    #[inline]
    pub(crate) fn epr(&self, size: usize) -> usize {
        self.backend.arch().elements_per_repeat(size)
    }

    /// Issue a plan, building one instruction per planned issue.
    pub(crate) fn run(&mut self, name: &str, plan: &Plan, build: impl FnMut(&Issue) -> VectorInstr) {
        if self.options.trace_issues {
            for issue in &plan.issues {
                log::debug!("{}: {:?} mask={:?}", name, issue.shape, issue.mask);
            }
        }
        dispatch::execute(&mut self.backend, plan, build);
    }

    /// Raw element `(row, col)` of a tile.
    #[inline]
    pub(crate) fn load_elem(&mut self, desc: &TileDesc, row: usize, col: usize) -> u64 {
        let addr = desc.elem_addr(row, col);
        self.backend.tiers_mut().read_elem(desc.tier, addr, desc.dtype)
    }

    /// Write raw element `(row, col)` of a tile.
    #[inline]
    pub(crate) fn store_elem(&mut self, desc: &TileDesc, row: usize, col: usize, bits: u64) {
        let addr = desc.elem_addr(row, col);
        self.backend.tiers_mut().write_elem(desc.tier, addr, desc.dtype, bits);
    }
}

impl<B: InstructionBackend> std::fmt::Debug for AiCore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiCore")
            .field("arch", &self.backend.arch().name())
            .field("issued", &self.backend.issued())
            .field("sync", &self.sync.stats())
            .field("options", &self.options)
            .finish()
    }
}
