// netwatch-pipeline: Priority worker pool
// Fixed threads, three FIFO levels, graceful or immediate shutdown

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error};

/// Job priority levels, popped highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low = 0,
    Normal = 1,
    High = 2,
}

/// Shutdown behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Drain every queued job before exiting
    Graceful,
    /// Drop queued jobs and exit as soon as running jobs finish
    Immediate,
}

/// Worker counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub pending: u64,
    pub active: u64,
    pub executed: u64,
    pub rejected: u64,
    pub dropped: u64,
    pub panicked: u64,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueueState {
    /// Index 0 = Low, 1 = Normal, 2 = High
    queues: [VecDeque<Job>; 3],
    pending: usize,
    active: usize,
    shutdown: Option<ShutdownMode>,
}

impl QueueState {
    fn pop_highest(&mut self) -> Option<Job> {
        for level in (0..3).rev() {
            if let Some(job) = self.queues[level].pop_front() {
                self.pending -= 1;
                return Some(job);
            }
        }
        None
    }

    fn drop_all(&mut self) -> usize {
        let mut dropped = 0;
        for queue in &mut self.queues {
            dropped += queue.len();
            queue.clear();
        }
        self.pending = 0;
        dropped
    }
}

struct Shared {
    state: Mutex<QueueState>,
    /// Signalled when work arrives or shutdown is requested
    work_cv: Condvar,
    /// Signalled when pending and active both reach zero
    idle_cv: Condvar,
    max_pending: usize,
    executed: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
    panicked: AtomicU64,
}

/// Fixed-size thread pool with priority-ordered queues
///
/// `submit` never blocks: a full queue rejects the job and the caller
/// decides what to do with the work. Panicking jobs are contained so a
/// single bad handler cannot take a worker down.
pub struct WorkerPool {
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers (0 selects the CPU count) with a bounded
    /// total queue length; spawn failure at startup is fatal and
    /// surfaced to the caller
    pub fn new(size: usize, max_pending: usize) -> crate::error::PipelineResult<Self> {
        let size = if size == 0 { num_cpus::get() } else { size };

        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
                pending: 0,
                active: 0,
                shutdown: None,
            }),
            work_cv: Condvar::new(),
            idle_cv: Condvar::new(),
            max_pending,
            executed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        let mut threads = Vec::with_capacity(size);
        for id in 0..size {
            let shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("netwatch-worker-{}", id))
                .spawn(move || worker_loop(shared))
                .map_err(|e| crate::error::PipelineError::Spawn(e.to_string()))?;
            threads.push(handle);
        }

        debug!(workers = size, max_pending, "worker pool started");

        Ok(Self {
            shared,
            threads: Mutex::new(threads),
            size,
        })
    }

    /// Queue a job at the given priority; `false` when saturated or
    /// shutting down
    pub fn submit<F>(&self, job: F, priority: Priority) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.shutdown.is_some() || state.pending >= self.shared.max_pending {
            drop(state);
            self.shared.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        state.queues[priority as usize].push_back(Box::new(job));
        state.pending += 1;
        drop(state);

        self.shared.work_cv.notify_one();
        true
    }

    /// Block until no job is queued or running
    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock();
        while state.pending > 0 || state.active > 0 {
            self.shared.idle_cv.wait(&mut state);
        }
    }

    /// Stop the pool, draining or dropping per `mode`, and join workers
    pub fn shutdown(&self, mode: ShutdownMode) {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown.is_none() {
                state.shutdown = Some(mode);
                if mode == ShutdownMode::Immediate {
                    let dropped = state.drop_all();
                    self.shared.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
                }
            }
        }
        self.shared.work_cv.notify_all();
        self.shared.idle_cv.notify_all();

        let mut threads = self.threads.lock();
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Counter snapshot
    pub fn stats(&self) -> WorkerStats {
        let state = self.shared.state.lock();
        WorkerStats {
            pending: state.pending as u64,
            active: state.active as u64,
            executed: self.shared.executed.load(Ordering::Relaxed),
            rejected: self.shared.rejected.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            panicked: self.shared.panicked.load(Ordering::Relaxed),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown(ShutdownMode::Graceful);
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if let Some(job) = state.pop_highest() {
                    state.active += 1;
                    break job;
                }
                match state.shutdown {
                    // Graceful exits once the queues are dry; Immediate
                    // queues were already cleared
                    Some(_) => return,
                    None => shared.work_cv.wait(&mut state),
                }
            }
        };

        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            shared.panicked.fetch_add(1, Ordering::Relaxed);
            error!("worker job panicked; worker continues");
        }
        shared.executed.fetch_add(1, Ordering::Relaxed);

        let mut state = shared.state.lock();
        state.active -= 1;
        if state.pending == 0 && state.active == 0 {
            shared.idle_cv.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_jobs_execute() {
        let pool = WorkerPool::new(2, 64).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            assert!(pool.submit(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                Priority::Normal
            ));
        }

        pool.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(pool.stats().executed, 10);
    }

    #[test]
    fn test_priority_ordering() {
        // Single worker so the queue order is observable
        let pool = WorkerPool::new(1, 64).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        // Park the worker so everything else queues behind it
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        {
            let gate = Arc::clone(&gate);
            pool.submit(
                move || {
                    let (lock, cv) = &*gate;
                    let mut open = lock.lock();
                    while !*open {
                        cv.wait(&mut open);
                    }
                },
                Priority::Normal,
            );
        }

        for (prio, tag) in [
            (Priority::Low, "low"),
            (Priority::Normal, "normal"),
            (Priority::High, "high"),
        ] {
            let order = Arc::clone(&order);
            pool.submit(
                move || {
                    order.lock().push(tag);
                },
                prio,
            );
        }

        {
            let (lock, cv) = &*gate;
            *lock.lock() = true;
            cv.notify_all();
        }

        pool.wait_idle();
        assert_eq!(*order.lock(), vec!["high", "normal", "low"]);
    }

    #[test]
    fn test_bounded_queue_rejects() {
        let pool = WorkerPool::new(1, 2).unwrap();

        // Hold the worker
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        {
            let gate = Arc::clone(&gate);
            pool.submit(
                move || {
                    let (lock, cv) = &*gate;
                    let mut open = lock.lock();
                    while !*open {
                        cv.wait(&mut open);
                    }
                },
                Priority::Normal,
            );
        }
        // Give the worker a moment to take the gate job off the queue
        std::thread::sleep(Duration::from_millis(20));

        assert!(pool.submit(|| {}, Priority::Normal));
        assert!(pool.submit(|| {}, Priority::Normal));
        assert!(!pool.submit(|| {}, Priority::Normal));
        assert_eq!(pool.stats().rejected, 1);

        let (lock, cv) = &*gate;
        *lock.lock() = true;
        cv.notify_all();
        pool.wait_idle();
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1, 16).unwrap();
        pool.submit(|| panic!("boom"), Priority::Normal);

        let counter = Arc::new(AtomicUsize::new(0));
        {
            let counter = Arc::clone(&counter);
            pool.submit(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                Priority::Normal,
            );
        }

        pool.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().panicked, 1);
    }

    #[test]
    fn test_graceful_shutdown_drains() {
        let pool = WorkerPool::new(2, 64).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            pool.submit(
                move || {
                    std::thread::sleep(Duration::from_millis(1));
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                Priority::Normal,
            );
        }

        pool.shutdown(ShutdownMode::Graceful);
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_immediate_shutdown_drops_queued() {
        let pool = WorkerPool::new(1, 64).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        // Slow job keeps the rest queued
        pool.submit(|| std::thread::sleep(Duration::from_millis(50)), Priority::Normal);
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.submit(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                Priority::Normal,
            );
        }

        pool.shutdown(ShutdownMode::Immediate);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(pool.stats().dropped, 10);
    }

    #[test]
    fn test_submit_after_shutdown_rejected() {
        let pool = WorkerPool::new(1, 16).unwrap();
        pool.shutdown(ShutdownMode::Graceful);
        assert!(!pool.submit(|| {}, Priority::High));
    }
}
