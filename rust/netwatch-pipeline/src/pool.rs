// netwatch-pipeline: Event object pool
// Recycles event allocations; exhaustion promotes to the heap, never fails

use netwatch_event::Event;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Pool counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: u64,
    pub in_use: u64,
    pub peak_use: u64,
    pub alloc_count: u64,
    pub free_count: u64,
    /// Allocations served from the free list
    pub hit: u64,
    /// Allocations that fell back to the heap
    pub miss: u64,
}

struct PoolInner {
    /// LIFO free list keeps recently-used slots hot in cache
    free: Mutex<Vec<Box<Event>>>,
    capacity: usize,
    in_use: AtomicU64,
    peak_use: AtomicU64,
    alloc_count: AtomicU64,
    free_count: AtomicU64,
    hit: AtomicU64,
    miss: AtomicU64,
}

/// Fixed-capacity pool of recyclable event slots
///
/// `acquire` draws a reset slot from the free list, or allocates a fresh
/// heap event when the pool is drained. Heap-fallback events are dropped
/// on release instead of growing the pool, so the free list never holds
/// more than `capacity` slots.
#[derive(Clone)]
pub struct EventPool {
    inner: Arc<PoolInner>,
}

impl EventPool {
    /// Pre-allocate `capacity` event slots
    pub fn new(capacity: usize) -> Self {
        let mut free = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            free.push(Box::new(Event::default()));
        }

        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(free),
                capacity,
                in_use: AtomicU64::new(0),
                peak_use: AtomicU64::new(0),
                alloc_count: AtomicU64::new(0),
                free_count: AtomicU64::new(0),
                hit: AtomicU64::new(0),
                miss: AtomicU64::new(0),
            }),
        }
    }

    /// Draw a reset event slot; falls back to the heap when drained
    pub fn acquire(&self) -> PooledEvent {
        self.inner.alloc_count.fetch_add(1, Ordering::Relaxed);

        let (event, from_pool) = match self.inner.free.lock().pop() {
            Some(slot) => (slot, true),
            None => (Box::new(Event::default()), false),
        };

        if from_pool {
            self.inner.hit.fetch_add(1, Ordering::Relaxed);
            let in_use = self.inner.in_use.fetch_add(1, Ordering::Relaxed) + 1;
            self.inner.peak_use.fetch_max(in_use, Ordering::Relaxed);
        } else {
            self.inner.miss.fetch_add(1, Ordering::Relaxed);
        }

        PooledEvent {
            event: Some(event),
            from_pool,
            pool: Arc::clone(&self.inner),
        }
    }

    /// Counter snapshot
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.inner.capacity as u64,
            in_use: self.inner.in_use.load(Ordering::Relaxed),
            peak_use: self.inner.peak_use.load(Ordering::Relaxed),
            alloc_count: self.inner.alloc_count.load(Ordering::Relaxed),
            free_count: self.inner.free_count.load(Ordering::Relaxed),
            hit: self.inner.hit.load(Ordering::Relaxed),
            miss: self.inner.miss.load(Ordering::Relaxed),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

/// Exclusively-owned event drawn from a pool
///
/// Dropping the handle returns pool-origin slots to the free list (after
/// resetting them) and frees heap-fallback allocations outright.
pub struct PooledEvent {
    event: Option<Box<Event>>,
    from_pool: bool,
    pool: Arc<PoolInner>,
}

impl PooledEvent {
    /// True when this slot came from the pre-allocated set
    pub fn is_pooled(&self) -> bool {
        self.from_pool
    }
}

impl Deref for PooledEvent {
    type Target = Event;

    fn deref(&self) -> &Event {
        // Always Some until drop
        self.event.as_ref().unwrap()
    }
}

impl DerefMut for PooledEvent {
    fn deref_mut(&mut self) -> &mut Event {
        self.event.as_mut().unwrap()
    }
}

impl Drop for PooledEvent {
    fn drop(&mut self) {
        let Some(mut event) = self.event.take() else {
            return;
        };
        self.pool.free_count.fetch_add(1, Ordering::Relaxed);

        if self.from_pool {
            self.pool.in_use.fetch_sub(1, Ordering::Relaxed);
            event.reset();
            let mut free = self.pool.free.lock();
            if free.len() < self.pool.capacity {
                free.push(event);
            }
        }
        // Heap-fallback events drop here
    }
}

impl std::fmt::Debug for PooledEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledEvent")
            .field("from_pool", &self.from_pool)
            .field("event", &self.event)
            .finish()
    }
}
