// netwatch-pipeline: Lock-free SPSC ring buffer
// Power-of-two capacity, atomic indices, one producer and one consumer

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Ring counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    pub enqueued: u64,
    pub dequeued: u64,
    pub overflowed: u64,
    pub peak_depth: u64,
}

/// Lock-free single-producer single-consumer ring buffer
///
/// Capacity is rounded up to the next power of two so the index masks
/// stay branchless. Indices are monotonic u64 counters: the buffer is
/// full when `head - tail == capacity`, which lets every slot be used.
/// Only two threads ever touch the indices (one per end), so a single
/// Acquire/Release pair per operation is sufficient ordering.
#[derive(Debug)]
pub struct SpscRing<T> {
    /// Producer write position
    head: AtomicU64,
    /// Consumer read position
    tail: AtomicU64,
    mask: u64,
    capacity: u64,
    slots: Vec<UnsafeCell<Option<T>>>,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    overflowed: AtomicU64,
    peak_depth: AtomicU64,
}

// Slots are only touched by the owning end; transferring T between the
// producer and consumer threads requires T: Send.
unsafe impl<T: Send> Sync for SpscRing<T> {}
unsafe impl<T: Send> Send for SpscRing<T> {}

impl<T> SpscRing<T> {
    /// Create a ring with at least `capacity` usable slots
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two() as u64;
        let mut slots = Vec::with_capacity(capacity as usize);
        slots.resize_with(capacity as usize, || UnsafeCell::new(None));

        Self {
            head: AtomicU64::new(0),
            tail: AtomicU64::new(0),
            mask: capacity - 1,
            capacity,
            slots,
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            overflowed: AtomicU64::new(0),
            peak_depth: AtomicU64::new(0),
        }
    }

    /// Enqueue an item (producer side only)
    ///
    /// Returns the item back on overflow so the caller can release it.
    pub fn push(&self, item: T) -> Result<(), T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        if head.wrapping_sub(tail) == self.capacity {
            self.overflowed.fetch_add(1, Ordering::Relaxed);
            return Err(item);
        }

        let slot = (head & self.mask) as usize;
        unsafe {
            *self.slots[slot].get() = Some(item);
        }

        // Publish the slot to the consumer
        self.head.store(head.wrapping_add(1), Ordering::Release);

        self.enqueued.fetch_add(1, Ordering::Relaxed);
        let depth = head.wrapping_sub(tail) + 1;
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);

        Ok(())
    }

    /// Dequeue an item (consumer side only)
    pub fn pop(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        let slot = (tail & self.mask) as usize;
        let item = unsafe { (*self.slots[slot].get()).take() };

        // Release the slot back to the producer
        self.tail.store(tail.wrapping_add(1), Ordering::Release);

        self.dequeued.fetch_add(1, Ordering::Relaxed);
        item
    }

    /// Current depth (approximate between concurrent operations)
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() as u64 == self.capacity
    }

    /// Usable capacity (power of two)
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Counter snapshot
    pub fn stats(&self) -> RingStats {
        RingStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            overflowed: self.overflowed.load(Ordering::Relaxed),
            peak_depth: self.peak_depth.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_capacity_rounds_up_to_power_of_two() {
        let ring = SpscRing::<u32>::new(5);
        assert_eq!(ring.capacity(), 8);

        let ring = SpscRing::<u32>::new(8);
        assert_eq!(ring.capacity(), 8);

        let ring = SpscRing::<u32>::new(0);
        assert_eq!(ring.capacity(), 1);
    }

    #[test]
    fn test_push_pop_fifo() {
        let ring = SpscRing::new(4);

        for i in 0..4 {
            assert!(ring.push(i).is_ok());
        }
        for i in 0..4 {
            assert_eq!(ring.pop(), Some(i));
        }
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn test_full_capacity_usable() {
        // All 4 slots hold items, unlike a cap-1 design
        let ring = SpscRing::new(4);
        for i in 0..4 {
            assert!(ring.push(i).is_ok());
        }
        assert!(ring.is_full());

        let rejected = ring.push(99);
        assert_eq!(rejected, Err(99));
        assert_eq!(ring.stats().overflowed, 1);
    }

    #[test]
    fn test_wrap_around() {
        let ring = SpscRing::new(4);

        for round in 0..10u64 {
            for i in 0..4 {
                assert!(ring.push(round * 10 + i).is_ok());
            }
            for i in 0..4 {
                assert_eq!(ring.pop(), Some(round * 10 + i));
            }
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn test_counters() {
        let ring = SpscRing::new(2);
        ring.push(1u32).unwrap();
        ring.push(2u32).unwrap();
        assert!(ring.push(3u32).is_err());
        ring.pop();

        let stats = ring.stats();
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.dequeued, 1);
        assert_eq!(stats.overflowed, 1);
        assert_eq!(stats.peak_depth, 2);
    }

    #[test]
    fn test_drop_releases_outstanding_items() {
        let marker = Arc::new(());
        {
            let ring = SpscRing::new(4);
            ring.push(Arc::clone(&marker)).unwrap();
            ring.push(Arc::clone(&marker)).unwrap();
        }
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_spsc_fifo_across_threads() {
        const N: u64 = 100_000;
        let ring = Arc::new(SpscRing::new(1024));

        let producer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                let mut i = 0;
                while i < N {
                    if ring.push(i).is_ok() {
                        i += 1;
                    } else {
                        std::hint::spin_loop();
                    }
                }
            })
        };

        let consumer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                let mut expected = 0;
                while expected < N {
                    if let Some(v) = ring.pop() {
                        assert_eq!(v, expected);
                        expected += 1;
                    } else {
                        std::hint::spin_loop();
                    }
                }
            })
        };

        producer.join().unwrap();
        consumer.join().unwrap();

        let stats = ring.stats();
        assert_eq!(stats.enqueued, N);
        assert_eq!(stats.dequeued, N);
    }
}
