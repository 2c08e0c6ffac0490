//! Client connection configuration: endpoint discovery, region preferences,
//! and retry tuning knobs.

use std::time::Duration;

/// Retry tuning for throttled requests.
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Maximum extra attempts after a throttled response (default: 9, so 10
    /// total attempts). Zero disables throttle retry entirely.
    pub max_retry_attempts_on_throttled_requests: u32,
    /// Cap on the cumulative wait spent between throttled attempts
    /// (default: 30 seconds).
    pub max_retry_wait_time: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retry_attempts_on_throttled_requests: 9,
            max_retry_wait_time: Duration::from_secs(30),
        }
    }
}

/// Connection policy governing endpoint selection and retry behavior.
#[derive(Debug, Clone)]
pub struct ConnectionPolicy {
    /// When true, the endpoint manager discovers regional endpoints from
    /// account metadata. When false, every operation uses the default
    /// endpoint and no preference logic applies.
    pub enable_endpoint_discovery: bool,
    /// Region names in caller priority order, consulted when picking the
    /// read endpoint.
    pub preferred_locations: Vec<String>,
    /// Throttle retry tuning.
    pub retry_options: RetryOptions,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            enable_endpoint_discovery: true,
            preferred_locations: Vec::new(),
            retry_options: RetryOptions::default(),
        }
    }
}
