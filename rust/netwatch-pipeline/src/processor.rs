// netwatch-pipeline: Event processor
// Owns pool, ring, limiters and workers; fans events out to handlers

use crate::error::{PipelineError, PipelineResult};
use crate::pool::{EventPool, PooledEvent, PoolStats};
use crate::rate_limit::{RateLimiterMap, RateLimiterMapStats, TokenBucket};
use crate::ring::{RingStats, SpscRing};
use crate::worker::{Priority, ShutdownMode, WorkerPool, WorkerStats};
use netwatch_event::Event;
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Registered handler identifier
pub type HandlerId = u64;

/// Event handler callback
///
/// Handlers run on worker threads and may be invoked concurrently on
/// distinct events; a single event is seen by exactly one worker. A
/// handler must copy anything it keeps past the call.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Token-bucket parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSpec {
    /// Tokens per second
    pub rate: f64,
    pub burst: f64,
}

/// Processor construction parameters
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Ring capacity, rounded up to a power of two
    pub ring_capacity: usize,
    /// Worker thread count; 0 selects the CPU count
    pub workers: usize,
    /// Worker queue bound
    pub max_pending: usize,
    /// Event pool size; 0 disables pooling (every event heap-allocated)
    pub pool_capacity: usize,
    /// Global submission limiter
    pub global_rate: Option<RateSpec>,
    /// Default per-event-type limiter
    pub per_type_rate: Option<RateSpec>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 4096,
            workers: 0,
            max_pending: 8192,
            pool_capacity: 1024,
            global_rate: None,
            per_type_rate: None,
        }
    }
}

/// Processor counter snapshot
#[derive(Debug, Clone, Default)]
pub struct ProcessorStats {
    pub submitted: u64,
    pub processed: u64,
    pub dropped_full: u64,
    pub dropped_rate: u64,
    pub handler_panics: u64,
    pub ring: RingStats,
    pub pool: PoolStats,
    pub workers: WorkerStats,
    pub per_type: RateLimiterMapStats,
}

struct HandlerEntry {
    id: HandlerId,
    handler: Handler,
}

/// Event processor
///
/// `submit` is non-blocking and best-effort: it either copies the event
/// into the pipeline or refuses it (rate limit / full ring), surfacing
/// back-pressure only through the return value and counters. Workers
/// drain the ring through a consumer lock so the ring keeps its single-
/// consumer contract.
pub struct EventProcessor {
    ring: SpscRing<PooledEvent>,
    pool: EventPool,
    workers: WorkerPool,
    global_limiter: Option<TokenBucket>,
    type_limiters: Option<RateLimiterMap>,
    handlers: RwLock<Vec<HandlerEntry>>,
    /// Serializes the consumer side of the ring across workers
    consumer_lock: Mutex<()>,
    next_handler_id: AtomicU64,
    next_sequence: AtomicU64,
    shutting_down: AtomicBool,
    submitted: AtomicU64,
    processed: AtomicU64,
    dropped_full: AtomicU64,
    dropped_rate: AtomicU64,
    handler_panics: AtomicU64,
}

impl EventProcessor {
    /// Build a processor; fails fast on nonsensical configuration
    pub fn new(config: ProcessorConfig) -> PipelineResult<Arc<Self>> {
        if config.ring_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "ring_capacity must be non-zero".to_string(),
            ));
        }
        if config.max_pending == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_pending must be non-zero".to_string(),
            ));
        }

        let processor = Arc::new(Self {
            ring: SpscRing::new(config.ring_capacity),
            pool: EventPool::new(config.pool_capacity),
            workers: WorkerPool::new(config.workers, config.max_pending)?,
            global_limiter: config
                .global_rate
                .map(|spec| TokenBucket::new(spec.rate, spec.burst)),
            type_limiters: config
                .per_type_rate
                .map(|spec| RateLimiterMap::new(spec.rate, spec.burst)),
            handlers: RwLock::new(Vec::new()),
            consumer_lock: Mutex::new(()),
            next_handler_id: AtomicU64::new(1),
            next_sequence: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            dropped_full: AtomicU64::new(0),
            dropped_rate: AtomicU64::new(0),
            handler_panics: AtomicU64::new(0),
        });

        debug!(
            ring = processor.ring.capacity(),
            workers = processor.workers.size(),
            pool = processor.pool.capacity(),
            "event processor created"
        );

        Ok(processor)
    }

    /// Register a handler; handlers run in registration order
    pub fn register_handler(&self, handler: Handler) -> HandlerId {
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.write().push(HandlerEntry { id, handler });
        id
    }

    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|entry| entry.id != id);
        handlers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Submit one event; `true` when it entered the pipeline
    ///
    /// Producer side of the SPSC ring: per the source contract, at most
    /// one thread submits at a time.
    pub fn submit(self: &Arc<Self>, event: &Event) -> bool {
        self.try_submit(event).is_ok()
    }

    /// Submit with the refusal reason surfaced
    pub fn try_submit(self: &Arc<Self>, event: &Event) -> PipelineResult<()> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(PipelineError::ShuttingDown);
        }

        if let Some(limiter) = &self.global_limiter {
            if !limiter.allow(1.0) {
                self.dropped_rate.fetch_add(1, Ordering::Relaxed);
                return Err(PipelineError::RateLimited("global"));
            }
        }
        if let Some(map) = &self.type_limiters {
            if !map.allow(event.event_type.code(), 1.0) {
                self.dropped_rate.fetch_add(1, Ordering::Relaxed);
                return Err(PipelineError::RateLimited("event-type"));
            }
        }

        // Copy into an owned slot; the caller keeps its borrow
        let mut slot = self.pool.acquire();
        slot.clone_from(event);
        slot.sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        if slot.timestamp == 0 {
            slot.timestamp = netwatch_event::epoch_ns();
        }

        if self.ring.push(slot).is_err() {
            // The rejected slot drops here and returns to the pool
            self.dropped_full.fetch_add(1, Ordering::Relaxed);
            return Err(PipelineError::QueueFull);
        }
        self.submitted.fetch_add(1, Ordering::Relaxed);

        // The event is committed to the ring at this point; a saturated
        // worker queue only defers it until wait()/shutdown() drains
        let this = Arc::clone(self);
        if !self.workers.submit(move || this.dispatch_one(), Priority::Normal) {
            trace!("worker queue saturated; event deferred to drain");
        }

        Ok(())
    }

    /// Dequeue one event and run every handler against it
    fn dispatch_one(&self) {
        let event = {
            let _consumer = self.consumer_lock.lock();
            self.ring.pop()
        };
        let Some(event) = event else {
            return;
        };

        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .iter()
            .map(|entry| Arc::clone(&entry.handler))
            .collect();

        for handler in handlers {
            let result = catch_unwind(AssertUnwindSafe(|| handler(&event)));
            if result.is_err() {
                self.handler_panics.fetch_add(1, Ordering::Relaxed);
                error!(sequence = event.sequence, "handler panicked; event dispatch continues");
            }
        }

        self.processed.fetch_add(1, Ordering::Relaxed);
        // Dropping the slot returns it to the pool
    }

    /// Block until the ring and worker queues are drained
    pub fn wait(&self) {
        while !self.ring.is_empty() {
            self.dispatch_one();
        }
        self.workers.wait_idle();
        // Workers may have raced new pops in; settle the remainder
        while !self.ring.is_empty() {
            self.dispatch_one();
        }
    }

    /// Stop the processor
    ///
    /// `wait = true` refuses new submissions, drains everything queued,
    /// then joins workers. `wait = false` discards queued events (their
    /// payloads are freed) and joins immediately.
    pub fn shutdown(&self, wait: bool) {
        self.shutting_down.store(true, Ordering::Release);

        if wait {
            self.wait();
            self.workers.shutdown(ShutdownMode::Graceful);
        } else {
            self.workers.shutdown(ShutdownMode::Immediate);
            let _consumer = self.consumer_lock.lock();
            while let Some(event) = self.ring.pop() {
                drop(event);
            }
        }
        debug!("event processor stopped");
    }

    /// Counter snapshot
    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
            dropped_rate: self.dropped_rate.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            ring: self.ring.stats(),
            pool: self.pool.stats(),
            workers: self.workers.stats(),
            per_type: self
                .type_limiters
                .as_ref()
                .map(|map| map.stats())
                .unwrap_or_default(),
        }
    }
}
