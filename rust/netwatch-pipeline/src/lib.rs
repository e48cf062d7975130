// netwatch-pipeline: Event pipeline core
// Implements: pool → ring → rate limit → priority workers → dispatch

pub mod error;
pub mod pool;
pub mod processor;
pub mod rate_limit;
pub mod ring;
pub mod worker;

pub use error::{PipelineError, PipelineResult};
pub use pool::{EventPool, PooledEvent, PoolStats};
pub use processor::{
    EventProcessor, Handler, HandlerId, ProcessorConfig, ProcessorStats, RateSpec,
};
pub use rate_limit::{RateLimiterMap, RateLimiterMapStats, TokenBucket};
pub use ring::{RingStats, SpscRing};
pub use worker::{Priority, ShutdownMode, WorkerPool, WorkerStats};
