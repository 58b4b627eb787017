//! Loop configuration, threaded explicitly through the agent.

use std::time::Duration;

/// Pause after every command so the UI can finish transitioning.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);
/// How long to wait for a page after a command before giving up.
pub const DETECT_TIMEOUT: Duration = Duration::from_secs(3);
/// How often to poll the detector while waiting.
pub const DETECT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Echo the full prompt before each model query.
    pub verbose: bool,
    /// Ask the operator to confirm or override each command.
    pub interactive: bool,
    pub settle_delay: Duration,
    pub detect_timeout: Duration,
    pub detect_poll_interval: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            interactive: true,
            settle_delay: SETTLE_DELAY,
            detect_timeout: DETECT_TIMEOUT,
            detect_poll_interval: DETECT_POLL_INTERVAL,
        }
    }
}
