//! Engine configuration
//!
//! The durations and trigger criteria the source design leaves open are
//! exposed here as tunables rather than baked-in constants: idle expiry,
//! sweep cadence, ticketing retry policy, and the phrases that count as an
//! explicit end-user escalation request.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the conversation engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sessions with no activity for this long are closed by the sweep
    pub idle_timeout: Duration,
    /// How often the idle sweep runs
    pub sweep_interval: Duration,
    /// Bound on each session's pending command queue (FIFO backpressure)
    pub session_queue_depth: usize,
    /// Inbound text containing one of these phrases is treated as an
    /// explicit escalation request
    pub escalation_phrases: Vec<String>,
    /// Sent to the end user when they are queued for a human agent
    pub waiting_notice: String,
    /// Retry policy toward the ticketing gateway
    pub ticketing: TicketingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            idle_timeout: Duration::from_secs(900),
            sweep_interval: Duration::from_secs(60),
            session_queue_depth: 64,
            escalation_phrases: vec![
                "talk to a human".to_string(),
                "speak to an agent".to_string(),
                "escalate".to_string(),
            ],
            waiting_notice: "You're in the queue. A human agent will be with you shortly."
                .to_string(),
            ticketing: TicketingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Set the idle timeout
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the ticketing retry policy
    pub fn with_ticketing(mut self, ticketing: TicketingConfig) -> Self {
        self.ticketing = ticketing;
        self
    }
}

/// Retry policy for ticketing gateway calls. Backoff is exponential from
/// `initial_backoff`, capped at `max_backoff`, with a small jitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketingConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for TicketingConfig {
    fn default() -> Self {
        TicketingConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}
