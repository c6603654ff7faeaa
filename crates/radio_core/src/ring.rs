//! Lock-free single-producer/single-consumer ring buffer for interleaved
//! f32 blocks, with an explicit overflow policy.
//!
//! `rtrb` gives us a fast SPSC queue but its `Producer` has no way to force
//! the `Consumer`'s read cursor forward, which `DropOldest` needs on
//! overflow. This is a small hand-rolled atomic-index ring instead, in the
//! spirit of the indexed ring buffers a spectrum analyzer keeps for
//! incoming samples.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What the producer does when the ring is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushPolicy {
    /// Overwrite the oldest unread block, advancing the read cursor.
    DropOldest,
    /// Spin-wait (with a ceiling) for room, then give up.
    BlockBounded(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Ok,
    /// Room was made by discarding the oldest block.
    OverwroteOldest,
    /// `BlockBounded` policy timed out without finding room.
    WouldBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopOutcome {
    Ok,
    Empty,
}

struct Inner {
    slots: Vec<parking_lot::Mutex<Vec<f32>>>,
    capacity: usize,
    block_len: usize,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
    len: AtomicUsize,
    underruns: AtomicU64,
    overruns: AtomicU64,
}

/// Producer half of a [`FrameRing`]. Not `Sync`; intended for one thread.
pub struct FrameProducer {
    inner: Arc<Inner>,
    policy: PushPolicy,
}

/// Consumer half of a [`FrameRing`]. Not `Sync`; intended for one thread.
pub struct FrameConsumer {
    inner: Arc<Inner>,
}

/// Creates a bounded ring of `capacity` blocks, each `block_len` samples.
pub fn frame_ring(capacity: usize, block_len: usize, policy: PushPolicy) -> (FrameProducer, FrameConsumer) {
    assert!(capacity > 0, "ring capacity must be nonzero");
    let slots = (0..capacity)
        .map(|_| parking_lot::Mutex::new(vec![0.0f32; block_len]))
        .collect();
    let inner = Arc::new(Inner {
        slots,
        capacity,
        block_len,
        write_pos: AtomicUsize::new(0),
        read_pos: AtomicUsize::new(0),
        len: AtomicUsize::new(0),
        underruns: AtomicU64::new(0),
        overruns: AtomicU64::new(0),
    });
    (
        FrameProducer {
            inner: inner.clone(),
            policy,
        },
        FrameConsumer { inner },
    )
}

impl FrameProducer {
    /// Pushes one block. `block` must be exactly `block_len` samples.
    pub fn push(&self, block: &[f32]) -> PushOutcome {
        debug_assert_eq!(block.len(), self.inner.block_len);
        let len = self.inner.len.load(Ordering::Acquire);
        if len == self.inner.capacity {
            match self.policy {
                PushPolicy::DropOldest => {
                    self.inner.read_pos.fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| {
                        Some((p + 1) % self.inner.capacity)
                    }).ok();
                    self.inner.len.fetch_sub(1, Ordering::AcqRel);
                    self.inner.overruns.fetch_add(1, Ordering::Relaxed);
                    self.write_block(block);
                    PushOutcome::OverwroteOldest
                }
                PushPolicy::BlockBounded(timeout) => {
                    let deadline = Instant::now() + timeout;
                    loop {
                        if self.inner.len.load(Ordering::Acquire) < self.inner.capacity {
                            self.write_block(block);
                            return PushOutcome::Ok;
                        }
                        if Instant::now() >= deadline {
                            return PushOutcome::WouldBlock;
                        }
                        std::thread::yield_now();
                    }
                }
            }
        } else {
            self.write_block(block);
            PushOutcome::Ok
        }
    }

    fn write_block(&self, block: &[f32]) {
        let pos = self.inner.write_pos.load(Ordering::Acquire);
        {
            let mut slot = self.inner.slots[pos].lock();
            slot.copy_from_slice(block);
        }
        let next = (pos + 1) % self.inner.capacity;
        self.inner.write_pos.store(next, Ordering::Release);
        self.inner.len.fetch_add(1, Ordering::AcqRel);
    }

    pub fn overrun_count(&self) -> u64 {
        self.inner.overruns.load(Ordering::Relaxed)
    }

    pub fn block_len(&self) -> usize {
        self.inner.block_len
    }
}

impl FrameConsumer {
    /// Pops one block into `out`, which must be exactly `block_len` samples.
    /// On underrun, `out` is left unchanged by the caller's contract: fill
    /// it with silence before calling, or check the outcome.
    pub fn pop(&self, out: &mut [f32]) -> PopOutcome {
        debug_assert_eq!(out.len(), self.inner.block_len);
        let len = self.inner.len.load(Ordering::Acquire);
        if len == 0 {
            self.inner.underruns.fetch_add(1, Ordering::Relaxed);
            return PopOutcome::Empty;
        }
        let pos = self.inner.read_pos.load(Ordering::Acquire);
        {
            let slot = self.inner.slots[pos].lock();
            out.copy_from_slice(&slot);
        }
        let next = (pos + 1) % self.inner.capacity;
        self.inner.read_pos.store(next, Ordering::Release);
        self.inner.len.fetch_sub(1, Ordering::AcqRel);
        PopOutcome::Ok
    }

    pub fn underrun_count(&self) -> u64 {
        self.inner.underruns.load(Ordering::Relaxed)
    }

    pub fn available_blocks(&self) -> usize {
        self.inner.len.load(Ordering::Acquire)
    }

    pub fn block_len(&self) -> usize {
        self.inner.block_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_roundtrips() {
        let (p, c) = frame_ring(4, 2, PushPolicy::DropOldest);
        p.push(&[1.0, 2.0]);
        let mut out = [0.0; 2];
        assert_eq!(c.pop(&mut out), PopOutcome::Ok);
        assert_eq!(out, [1.0, 2.0]);
    }

    #[test]
    fn empty_ring_reports_underrun() {
        let (_p, c) = frame_ring(4, 2, PushPolicy::DropOldest);
        let mut out = [9.0; 2];
        assert_eq!(c.pop(&mut out), PopOutcome::Empty);
        assert_eq!(c.underrun_count(), 1);
    }

    #[test]
    fn drop_oldest_overwrites_and_advances_read_cursor() {
        let (p, c) = frame_ring(2, 1, PushPolicy::DropOldest);
        p.push(&[1.0]);
        p.push(&[2.0]);
        assert_eq!(p.push(&[3.0]), PushOutcome::OverwroteOldest);
        let mut out = [0.0; 1];
        assert_eq!(c.pop(&mut out), PopOutcome::Ok);
        assert_eq!(out, [2.0]);
        assert_eq!(c.pop(&mut out), PopOutcome::Ok);
        assert_eq!(out, [3.0]);
        assert_eq!(c.pop(&mut out), PopOutcome::Empty);
    }

    #[test]
    fn block_bounded_times_out_when_full() {
        let (p, _c) = frame_ring(1, 1, PushPolicy::BlockBounded(Duration::from_millis(5)));
        assert_eq!(p.push(&[1.0]), PushOutcome::Ok);
        assert_eq!(p.push(&[2.0]), PushOutcome::WouldBlock);
    }
}
