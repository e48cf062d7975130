// netwatch: Tracing subscriber setup

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber
///
/// Filter comes from `NETWATCH_LOG` (falling back to `RUST_LOG`, then
/// `info`). Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = std::env::var("NETWATCH_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    let _ = fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
