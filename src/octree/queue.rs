//! Bounded lock-free task ring
//!
//! Multi-producer multi-consumer ring buffer holding pending expansion
//! tasks. Capacity is fixed at construction; `bounded_push` hands the
//! task back instead of blocking when the ring is full, and the caller
//! keeps it on a thread-local stack. Each slot carries a sequence tag
//! (Vyukov's scheme) so a lapped compare-and-swap can never mistake a
//! recycled slot for a fresh one.
//!
//! Author: Moroya Sakamoto

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Slot<T> {
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Bounded MPMC ring of tasks
pub struct TaskRing<T> {
    buffer: Box<[Slot<T>]>,
    mask: usize,
    enqueue_pos: AtomicUsize,
    dequeue_pos: AtomicUsize,
}

unsafe impl<T: Send> Sync for TaskRing<T> {}
unsafe impl<T: Send> Send for TaskRing<T> {}

impl<T> TaskRing<T> {
    /// Create a ring with at least `capacity` slots (rounded up to a
    /// power of two, minimum 2).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        let buffer: Box<[Slot<T>]> = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();
        TaskRing {
            buffer,
            mask: capacity - 1,
            enqueue_pos: AtomicUsize::new(0),
            dequeue_pos: AtomicUsize::new(0),
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Try to push; returns the value back when the ring is full.
    pub fn bounded_push(&self, value: T) -> Result<(), T> {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let seq = slot.sequence.load(Ordering::Acquire);
            // seq == pos: slot free for this lap
            // seq < pos + 1: a full lap behind — ring is full
            // seq > pos: another producer claimed it — reload and retry
            if seq == pos {
                match self.enqueue_pos.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        unsafe { (*slot.value.get()).write(value) };
                        slot.sequence.store(pos + 1, Ordering::Release);
                        return Ok(());
                    }
                    Err(actual) => pos = actual,
                }
            } else if seq < pos + 1 {
                return Err(value);
            } else {
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// Try to pop; `None` when the ring is empty.
    pub fn pop(&self) -> Option<T> {
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let seq = slot.sequence.load(Ordering::Acquire);
            // seq == pos + 1: slot holds a value from this lap
            // seq < pos + 1: empty
            if seq == pos + 1 {
                match self.dequeue_pos.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.sequence
                            .store(pos + self.mask + 1, Ordering::Release);
                        return Some(value);
                    }
                    Err(actual) => pos = actual,
                }
            } else if seq < pos + 1 {
                return None;
            } else {
                pos = self.dequeue_pos.load(Ordering::Relaxed);
            }
        }
    }
}

impl<T> Drop for TaskRing<T> {
    fn drop(&mut self) {
        // Drain any tasks still in flight so their contents drop
        while self.pop().is_some() {}
    }
}
