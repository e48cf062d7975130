// netwatch-rules: Concurrency gate
// Counting gate bounding in-flight actions across an engine

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

struct GateState {
    available: usize,
}

struct GateInner {
    state: Mutex<GateState>,
    cv: Condvar,
    capacity: usize,
}

/// Bounded concurrency gate
///
/// `acquire` blocks until a slot frees up; the returned guard releases
/// its slot on drop, including when the holder panics.
#[derive(Clone)]
pub struct ConcurrencyGate {
    inner: Arc<GateInner>,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(GateInner {
                state: Mutex::new(GateState {
                    available: capacity,
                }),
                cv: Condvar::new(),
                capacity,
            }),
        }
    }

    /// Block until a slot is available and take it
    pub fn acquire(&self) -> GateGuard {
        let mut state = self.inner.state.lock();
        while state.available == 0 {
            self.inner.cv.wait(&mut state);
        }
        state.available -= 1;
        GateGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Take a slot only if one is free
    pub fn try_acquire(&self) -> Option<GateGuard> {
        let mut state = self.inner.state.lock();
        if state.available == 0 {
            return None;
        }
        state.available -= 1;
        Some(GateGuard {
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn available(&self) -> usize {
        self.inner.state.lock().available
    }
}

/// Slot held while an action runs
pub struct GateGuard {
    inner: Arc<GateInner>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.available += 1;
        drop(state);
        self.inner.cv.notify_one();
    }
}
