//! Agent configuration.

use std::sync::Arc;
use std::time::Duration;

use callwire_core::DomainSeparators;

use crate::poll::{FixedDelay, PollPolicy};

/// Configuration for an [`Agent`](crate::Agent).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Validity window added to "now" for every request's `ingress_expiry`.
    pub ingress_expiry: Duration,
    /// Separators used when signing requests and delegations.
    pub separators: DomainSeparators,
    /// Polling behaviour for updates.
    pub poll: PollConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ingress_expiry: Duration::from_secs(300),
            separators: DomainSeparators::default(),
            poll: PollConfig::default(),
        }
    }
}

/// How long and how often to poll for a request's status.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Wall-clock ceiling from the start of polling.
    pub timeout: Duration,
    /// Delay between read_state attempts.
    pub policy: Arc<dyn PollPolicy>,
}

impl PollConfig {
    pub fn new(timeout: Duration, policy: impl PollPolicy + 'static) -> Self {
        Self {
            timeout,
            policy: Arc::new(policy),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), FixedDelay::default())
    }
}
