//! Sample storage: a ring of `B` blocks, each holding `S` sequences of `C` channels with
//! `R` results per channel.
//!
//! The sequencer interrupt fills blocks and the control loop drains them. The producer only
//! calls `free_index`, `set_free_is_full` and `reclaim_oldest`. The consumer only calls
//! `full_index` and `set_full_is_free`, handing back the index it read:
//!
//! ```ignore
//! while let Some(index) = task.full_index() {
//!     let current = task.block(index).get(0, 0, 0);
//!     if task.set_full_is_free(index) {
//!         // `current` is good
//!     }
//! }
//! ```
//!
//! A release returns false when the producer reclaimed the block during the read. That block
//! is already counted in `dropped()` and its contents may be torn.

use core::cell::Cell;
use core::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use critical_section::Mutex;

/// Value of every sample read through an out-of-range block view.
pub const ILLEGAL_SAMPLE: i32 = -1;

/// The ring interface the sequencer fills. Object safe, so a sequencer can bind any
/// `AdcTask` shape.
pub trait SampleBuffer: Sync {
    fn sequences_number(&self) -> usize;

    fn channels_number(&self) -> usize;

    fn results_number(&self) -> usize;

    /// Channel codes, in conversion order.
    fn channels(&self) -> &[u8];

    /// Block the producer writes next, or `None` if every block is full.
    fn free_index(&self) -> Option<usize>;

    /// Oldest full block, or `None` if the ring is empty. Consumer side only: this starts
    /// the read that `set_full_is_free` finishes.
    fn full_index(&self) -> Option<usize>;

    /// Publishes the free block as full. Producer side only.
    fn set_free_is_full(&self);

    /// Returns block `index`, read since the last `full_index`, to the producer. Consumer
    /// side only. Returns false, leaving the ring alone, if `index` isn't the oldest full
    /// block or the producer reclaimed it in the meantime.
    fn set_full_is_free(&self, index: usize) -> bool;

    /// Drops the oldest full block when the ring is full, so the producer can overwrite
    /// it. Returns whether a block was given up. Producer side only.
    fn reclaim_oldest(&self) -> bool;

    /// Stores sample `index` of `sequence` in `block`. Samples are channel-major:
    /// `index = channel * results_number() + result`, and hold the right-justified 12-bit
    /// conversion code. Out-of-range positions are ignored.
    fn store(&self, block: usize, sequence: usize, index: usize, value: i32);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Ring {
    free: usize,
    full: usize,
    filled: bool,
    // Set when the producer moves `full`, cleared when the consumer starts a read.
    reclaimed: bool,
}

impl Ring {
    fn is_empty(&self) -> bool {
        !self.filled && self.free == self.full
    }
}

fn next(index: usize, blocks: usize) -> usize {
    if index + 1 == blocks {
        0
    } else {
        index + 1
    }
}

pub struct AdcTask<const B: usize, const S: usize, const C: usize, const R: usize> {
    channels: [u8; C],
    samples: [[[[AtomicI32; R]; C]; S]; B],
    ring: Mutex<Cell<Ring>>,
    dropped: AtomicU32,
}

impl<const B: usize, const S: usize, const C: usize, const R: usize> AdcTask<B, S, C, R> {
    /// An empty ring sampling `channels`. Every sample starts at 0.
    pub const fn new(channels: [u8; C]) -> Self {
        Self {
            channels,
            samples: [const { [const { [const { [const { AtomicI32::new(0) }; R] }; C] }; S] }; B],
            ring: Mutex::new(Cell::new(Ring {
                free: 0,
                full: 0,
                filled: false,
                reclaimed: false,
            })),
            dropped: AtomicU32::new(0),
        }
    }

    pub const fn blocks_number(&self) -> usize {
        B
    }

    /// Read access to block `index`. An index past the ring gives a view that reads
    /// `ILLEGAL_SAMPLE` everywhere.
    pub fn block(&self, index: usize) -> BlockView<'_, S, C, R> {
        BlockView {
            samples: self.samples.get(index),
        }
    }

    /// Blocks given up to overruns, under either overflow policy.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn count_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn with_ring<T>(&self, f: impl FnOnce(&mut Ring) -> T) -> T {
        critical_section::with(|cs| {
            let cell = self.ring.borrow(cs);
            let mut ring = cell.get();
            let out = f(&mut ring);
            cell.set(ring);
            out
        })
    }
}

impl<const B: usize, const S: usize, const C: usize, const R: usize> SampleBuffer
    for AdcTask<B, S, C, R>
{
    fn sequences_number(&self) -> usize {
        S
    }

    fn channels_number(&self) -> usize {
        C
    }

    fn results_number(&self) -> usize {
        R
    }

    fn channels(&self) -> &[u8] {
        &self.channels
    }

    fn free_index(&self) -> Option<usize> {
        self.with_ring(|ring| (!ring.filled).then_some(ring.free))
    }

    fn full_index(&self) -> Option<usize> {
        self.with_ring(|ring| {
            ring.reclaimed = false;
            (!ring.is_empty()).then_some(ring.full)
        })
    }

    fn set_free_is_full(&self) {
        self.with_ring(|ring| {
            if ring.filled {
                return;
            }
            ring.free = next(ring.free, B);
            ring.filled = ring.free == ring.full;
        })
    }

    fn set_full_is_free(&self, index: usize) -> bool {
        self.with_ring(|ring| {
            if ring.reclaimed {
                ring.reclaimed = false;
                return false;
            }
            if ring.is_empty() || ring.full != index {
                return false;
            }
            ring.full = next(ring.full, B);
            ring.filled = false;
            true
        })
    }

    fn reclaim_oldest(&self) -> bool {
        let reclaimed = self.with_ring(|ring| {
            if !ring.filled {
                return false;
            }
            ring.full = next(ring.full, B);
            ring.filled = false;
            ring.reclaimed = true;
            true
        });
        if reclaimed {
            self.count_drop();
        }
        reclaimed
    }

    fn store(&self, block: usize, sequence: usize, index: usize, value: i32) {
        if R == 0 {
            return;
        }
        let sample = self
            .samples
            .get(block)
            .and_then(|b| b.get(sequence))
            .and_then(|s| s.get(index / R))
            .and_then(|c| c.get(index % R));
        if let Some(sample) = sample {
            sample.store(value, Ordering::Relaxed);
        }
    }
}

/// Read-only view of one block.
#[derive(Clone, Copy)]
pub struct BlockView<'t, const S: usize, const C: usize, const R: usize> {
    samples: Option<&'t [[[AtomicI32; R]; C]; S]>,
}

impl<const S: usize, const C: usize, const R: usize> BlockView<'_, S, C, R> {
    /// Whether the view maps a real block.
    pub fn is_legal(&self) -> bool {
        self.samples.is_some()
    }

    /// Result `result` of `channel` in `sequence`, or `ILLEGAL_SAMPLE` if any index is out
    /// of range.
    pub fn get(&self, sequence: usize, channel: usize, result: usize) -> i32 {
        self.samples
            .and_then(|b| b.get(sequence))
            .and_then(|s| s.get(channel))
            .and_then(|c| c.get(result))
            .map_or(ILLEGAL_SAMPLE, |v| v.load(Ordering::Relaxed))
    }

    /// Copies the block out.
    pub fn to_array(&self) -> [[[i32; R]; C]; S] {
        let mut out = [[[ILLEGAL_SAMPLE; R]; C]; S];
        for (s, seq) in out.iter_mut().enumerate() {
            for (c, ch) in seq.iter_mut().enumerate() {
                for (r, v) in ch.iter_mut().enumerate() {
                    *v = self.get(s, c, r);
                }
            }
        }
        out
    }
}
