/// Configuration for the wireflow runtime
///
/// Holds the timing knobs the engines share: persistence debounce window,
/// actor state polling interval, and the wait-for-state bound.

use std::time::Duration;

/// Runtime tuning parameters
///
/// All values have sensible defaults and can be overridden via environment
/// variables for container deployment. Tests shrink them to keep suites fast.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Coalescing window for actor snapshot writes (default: 300 ms)
    pub persist_debounce: Duration,
    /// Polling interval used by `wait_for_state` (default: 500 ms)
    pub wait_poll: Duration,
    /// Upper bound on any single `wait_for_state` call (default: 30 s)
    pub wait_timeout: Duration,
}

impl Default for RuntimeConfig {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            persist_debounce: Duration::from_millis(env_ms("WIREFLOW_PERSIST_DEBOUNCE_MS", 300)),
            wait_poll: Duration::from_millis(env_ms("WIREFLOW_WAIT_POLL_MS", 500)),
            wait_timeout: Duration::from_millis(env_ms("WIREFLOW_WAIT_TIMEOUT_MS", 30_000)),
        }
    }
}

fn env_ms(var: &str, default: u64) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
