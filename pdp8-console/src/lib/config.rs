use std::path::PathBuf;
use std::time::Duration;

// Defaults.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

// Cycle budget limits for `/trace`.
pub const DEFAULT_CYCLES: u32 = 1024;
pub const MAX_CYCLES: u32 = 100_000;

/// Everything the console needs to know before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    pub server_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub run_cycles: u32,
    pub auto_run: bool,
    pub initial_image: Option<PathBuf>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            server_url: DEFAULT_SERVER_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            run_cycles: DEFAULT_CYCLES,
            auto_run: true,
            initial_image: None,
        }
    }
}

/// Turn a requested cycle count into the one actually sent. Missing, zero and
/// negative requests fall back to the default; large ones are clamped.
pub fn effective_cycles(requested: Option<i64>) -> u32 {
    match requested {
        Some(n) if n >= 1 => n.min(i64::from(MAX_CYCLES)) as u32,
        _ => DEFAULT_CYCLES,
    }
}

/// Parse operator-entered text as a cycle budget. Anything that isn't an
/// integer counts as unspecified.
pub fn parse_cycle_budget(text: &str) -> u32 {
    effective_cycles(text.trim().parse::<i64>().ok())
}
