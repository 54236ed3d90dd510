//! Block sort and k-way merge over (value, index) records.
//!
//! A record is 8 bytes: the value in the low 4 bytes (an f16 occupies the
//! first two, the next two are zero) and a `u32` index in the high 4. Record
//! lists are descending. Both instructions run on the vector pipe.

use std::cmp::Ordering;
use std::marker::PhantomData;

use super::VecOperand;
use crate::device::hw_spec::{MERGE_MAX_LISTS, SORT_BLOCK, SORT_RECORD_BYTES};
use crate::device::tier_memory::{Tier, TierMemory};
use crate::engine::AiCore;
use crate::sync::event::Event;
use crate::sync::pipe::Pipe;
use crate::tile::descriptor::TileDesc;
use crate::tile::dtype::{ElementType, SortElement};
use crate::tile::layout::Shape2;
use crate::vector::alu;
use crate::vector::backend::InstructionBackend;

/// Index stored in records that pad a partial block.
pub const PAD_INDEX: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct Record {
    bits: u64,
    value: f64,
    index: u32,
}

impl Record {
    fn load(tiers: &mut TierMemory, tier: Tier, addr: u64, dtype: ElementType) -> Self {
        let bits = tiers.read_elem(tier, addr, dtype);
        let index = tiers.read_elem(tier, addr + 4, ElementType::U32) as u32;
        Record {
            bits,
            value: alu::to_f64(dtype, bits),
            index,
        }
    }

    fn store(self, tiers: &mut TierMemory, tier: Tier, addr: u64, dtype: ElementType) {
        // Clears the f16 padding along with the value.
        tiers.write_elem(tier, addr, ElementType::U32, 0);
        tiers.write_elem(tier, addr, dtype, self.bits);
        tiers.write_elem(tier, addr + 4, ElementType::U32, self.index as u64);
    }
}

/// Total order on record values: NaN of either sign above `+inf`, all NaNs
/// equal, and `-0.0 == 0.0`.
fn value_order(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Larger value first, then lower block position.
fn descending(a: &(Record, usize), b: &(Record, usize)) -> Ordering {
    value_order(b.0.value, a.0.value).then(a.1.cmp(&b.1))
}

/// Bitonic sorting network over one full block.
fn bitonic_sort(block: &mut [(Record, usize); SORT_BLOCK]) {
    let n = SORT_BLOCK;
    let mut k = 2;
    while k <= n {
        let mut j = k / 2;
        while j > 0 {
            for i in 0..n {
                let l = i ^ j;
                if l > i {
                    let up = i & k == 0;
                    let out_of_order = descending(&block[i], &block[l]) == Ordering::Greater;
                    if out_of_order == up {
                        block.swap(i, l);
                    }
                }
            }
            j /= 2;
        }
        k *= 2;
    }
}

/// A run of descending records starting at a tile's base.
#[derive(Debug, Clone, Copy)]
pub struct SortList<T: SortElement> {
    desc: TileDesc,
    count: usize,
    _elem: PhantomData<T>,
}

impl<T: SortElement> SortList<T> {
    /// The first `count` records of `tile`.
    pub fn new(tile: &impl VecOperand<T>, count: usize) -> Self {
        Self {
            desc: tile.desc(),
            count,
            _elem: PhantomData,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn record_addr(&self, i: usize) -> u64 {
        self.desc.addr + (i * SORT_RECORD_BYTES) as u64
    }
}

/// Records consumed from each input list by a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeCounts {
    consumed: [usize; MERGE_MAX_LISTS],
    lists: usize,
}

impl MergeCounts {
    /// One entry per merged list.
    pub fn consumed(&self) -> &[usize] {
        &self.consumed[..self.lists]
    }

    /// Records written to the destination.
    pub fn total(&self) -> usize {
        self.consumed().iter().sum()
    }
}

/// Records that fit in a tile's capacity.
fn record_capacity(d: &TileDesc) -> usize {
    d.capacity.numel() * d.dtype.size() / SORT_RECORD_BYTES
}

impl<B: InstructionBackend> AiCore<B> {
    /// Sort each 32-element block of every valid row of `src` descending.
    ///
    /// Row `r` of `dst` receives the records of row `r` of `src`, block after
    /// block; `idx` supplies the index carried with each value. A partial last
    /// block is padded with negative infinity and [`PAD_INDEX`]. Equal values
    /// keep their column order.
    pub fn tsort32<T: SortElement>(
        &mut self,
        dst: &impl VecOperand<T>,
        src: &impl VecOperand<T>,
        idx: &impl VecOperand<u32>,
        waits: impl IntoIterator<Item = Event>,
    ) -> Event {
        let (d, s, x) = (dst.desc(), src.desc(), idx.desc());
        let dtype = s.dtype;
        let tok = self.begin("tsort32", Pipe::V, waits);
        self.read_tile(&tok, &s);
        self.read_tile(&tok, &x.window(0, 0, s.valid.rows, s.valid.cols));

        let blocks = s.valid.cols.div_ceil(SORT_BLOCK);
        let row_elems = blocks * SORT_BLOCK * SORT_RECORD_BYTES / dtype.size();
        self.check_scratch("tsort32", Shape2::new(s.valid.rows, row_elems), d.capacity);

        let pad = Record {
            bits: dtype.lowest_bits(),
            value: f64::NEG_INFINITY,
            index: PAD_INDEX,
        };
        for r in 0..s.valid.rows {
            let base = d.elem_addr(r, 0);
            for b in 0..blocks {
                let mut block = [(pad, 0usize); SORT_BLOCK];
                for (k, slot) in block.iter_mut().enumerate() {
                    let c = b * SORT_BLOCK + k;
                    slot.1 = k;
                    if c < s.valid.cols {
                        let bits = self.load_elem(&s, r, c);
                        let index = self.load_elem(&x, r, c) as u32;
                        slot.0 = Record {
                            bits,
                            value: alu::to_f64(dtype, bits),
                            index,
                        };
                    }
                }
                bitonic_sort(&mut block);
                for (k, (rec, _)) in block.iter().enumerate() {
                    let addr = base + ((b * SORT_BLOCK + k) * SORT_RECORD_BYTES) as u64;
                    rec.store(self.tiers_mut(), d.tier, addr, dtype);
                }
            }
        }
        let written = TileDesc {
            valid: Shape2::new(s.valid.rows, row_elems.min(d.capacity.cols)),
            ..d
        };
        self.write_tile(&tok, &written);
        self.finish(tok)
    }

    /// Merge descending record lists into `dst`.
    ///
    /// Takes the largest head each step, the earlier list winning ties. With
    /// `exhaust` set the merge stops as soon as any list runs out; otherwise
    /// it drains every list. Output stops early if `dst` is full. At most
    /// four lists are merged; extra lists are ignored.
    pub fn tmrgsort<T: SortElement>(
        &mut self,
        dst: &impl VecOperand<T>,
        lists: &[SortList<T>],
        exhaust: bool,
        waits: impl IntoIterator<Item = Event>,
    ) -> (Event, MergeCounts) {
        let tok = self.begin("tmrgsort", Pipe::V, waits);
        if lists.len() > MERGE_MAX_LISTS {
            log::warn!(
                "tmrgsort: {} lists given, merging the first {}",
                lists.len(),
                MERGE_MAX_LISTS
            );
        }
        let lists = &lists[..lists.len().min(MERGE_MAX_LISTS)];
        for list in lists {
            self.read_tile(&tok, &list.desc);
        }
        let counts = self.merge_kernel("tmrgsort", &dst.desc(), T::DTYPE, lists, exhaust);
        self.write_tile(&tok, &dst.desc());
        (self.finish(tok), counts)
    }

    /// Merge four consecutive sorted blocks of `block_len` records held in
    /// the first row of `src`.
    pub fn tmrgsort_blocks<T: SortElement>(
        &mut self,
        dst: &impl VecOperand<T>,
        src: &impl VecOperand<T>,
        block_len: usize,
        waits: impl IntoIterator<Item = Event>,
    ) -> (Event, MergeCounts) {
        let s = src.desc();
        let tok = self.begin("tmrgsort_blocks", Pipe::V, waits);
        self.read_tile(&tok, &s);
        let needed = MERGE_MAX_LISTS * block_len;
        if needed > record_capacity(&s) {
            let elems = needed * SORT_RECORD_BYTES / s.dtype.size();
            self.check_scratch("tmrgsort_blocks", Shape2::new(1, elems), s.capacity);
        }
        let lists: Vec<SortList<T>> = (0..MERGE_MAX_LISTS)
            .map(|b| SortList {
                desc: TileDesc {
                    addr: s.addr + (b * block_len * SORT_RECORD_BYTES) as u64,
                    ..s
                },
                count: block_len,
                _elem: PhantomData,
            })
            .collect();
        let counts = self.merge_kernel("tmrgsort_blocks", &dst.desc(), T::DTYPE, &lists, false);
        self.write_tile(&tok, &dst.desc());
        (self.finish(tok), counts)
    }

    fn merge_kernel<T: SortElement>(
        &mut self,
        name: &'static str,
        dst: &TileDesc,
        dtype: ElementType,
        lists: &[SortList<T>],
        exhaust: bool,
    ) -> MergeCounts {
        let mut counts = MergeCounts {
            lists: lists.len(),
            ..MergeCounts::default()
        };
        let room = record_capacity(dst);
        let wanted: usize = lists.iter().map(|l| l.count).sum();
        if wanted > room {
            let elems = wanted * SORT_RECORD_BYTES / dtype.size();
            self.check_scratch(name, Shape2::new(1, elems), dst.capacity);
        }

        let mut out = 0usize;
        while out < room {
            let live = (0..lists.len()).filter(|&i| counts.consumed[i] < lists[i].count);
            if exhaust && live.clone().count() < lists.len() {
                break;
            }
            let mut best: Option<(usize, Record)> = None;
            for i in live {
                let rec = Record::load(
                    self.tiers_mut(),
                    lists[i].desc.tier,
                    lists[i].record_addr(counts.consumed[i]),
                    dtype,
                );
                let better = match &best {
                    None => true,
                    Some((_, b)) => value_order(rec.value, b.value) == Ordering::Greater,
                };
                if better {
                    best = Some((i, rec));
                }
            }
            let Some((i, rec)) = best else { break };
            rec.store(self.tiers_mut(), dst.tier, dst.addr + (out * SORT_RECORD_BYTES) as u64, dtype);
            counts.consumed[i] += 1;
            out += 1;
        }
        log::debug!("{}: merged {} records, consumed {:?}", name, out, counts.consumed());
        counts
    }
}
