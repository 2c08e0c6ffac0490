//! Per-error-class retry policies.
//!
//! Three recoverable classes, each with its own budget and recovery strategy:
//! throttling backs off by the server hint, region-forbidden writes force a
//! topology refresh before retrying, and unavailable session reads redirect
//! to the write region instead of waiting. Everything else propagates on
//! first occurrence.

use std::time::Duration;

use tracing::info;

use crate::config::RetryOptions;
use crate::endpoint::GlobalEndpointManager;
use crate::error::DbError;
use crate::request::DocumentRequest;

/// Wait applied when a throttled response carries no retry-after hint.
const DEFAULT_THROTTLE_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Cap on region-forbidden write retries within one logical operation.
pub const MAX_ENDPOINT_DISCOVERY_RETRIES: u32 = 120;

/// Fixed wait between region-forbidden retries.
const ENDPOINT_DISCOVERY_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Retries within one logical operation for an unavailable session read.
const MAX_SESSION_READ_RETRIES: u32 = 1;

/// Bounded, server-hinted backoff for throttled requests.
///
/// Only consulted for [`DbError::Throttled`]. Tracks its attempt count and
/// cumulative wait across one logical operation.
#[derive(Debug)]
pub struct ThrottleRetryPolicy {
    max_attempts: u32,
    max_wait: Duration,
    attempts: u32,
    cumulative_wait: Duration,
}

impl ThrottleRetryPolicy {
    /// Creates a policy with explicit limits.
    pub fn new(max_attempts: u32, max_wait: Duration) -> Self {
        Self {
            max_attempts,
            max_wait,
            attempts: 0,
            cumulative_wait: Duration::ZERO,
        }
    }

    /// Creates a policy from the client retry options.
    pub fn from_options(options: &RetryOptions) -> Self {
        Self::new(
            options.max_retry_attempts_on_throttled_requests,
            options.max_retry_wait_time,
        )
    }

    /// Decides whether to retry a throttled request, returning the wait to
    /// apply first. `None` means the error should surface to the caller.
    pub fn should_retry(&mut self, error: &DbError) -> Option<Duration> {
        let DbError::Throttled { retry_after_ms } = error else {
            return None;
        };
        if self.attempts >= self.max_attempts {
            return None;
        }

        // The server always hints a retry delay; fall back to a fixed wait
        // if it did not.
        let wait = if *retry_after_ms == 0 {
            DEFAULT_THROTTLE_RETRY_AFTER
        } else {
            Duration::from_millis(*retry_after_ms)
        };

        self.cumulative_wait += wait;
        if self.cumulative_wait >= self.max_wait {
            return None;
        }

        self.attempts += 1;
        info!(wait_ms = wait.as_millis() as u64, attempt = self.attempts, "throttled; retrying after wait");
        Some(wait)
    }
}

/// Forced-refresh retry for writes rejected by a non-write region.
///
/// Only consulted for forbidden errors carrying the write-forbidden
/// sub-status. The stale topology that caused the rejection is only fixable
/// by refreshing, so each retry is preceded by exactly one refresh call.
#[derive(Debug)]
pub struct EndpointDiscoveryRetryPolicy {
    discovery_enabled: bool,
    attempts: u32,
}

impl EndpointDiscoveryRetryPolicy {
    /// Creates a policy; retries are disabled when endpoint discovery is off.
    pub fn new(discovery_enabled: bool) -> Self {
        Self {
            discovery_enabled,
            attempts: 0,
        }
    }

    /// Decides whether to retry a region-forbidden write, forcing a topology
    /// refresh first. Returns the wait to apply, or `None` to surface.
    pub async fn should_retry(
        &mut self,
        error: &DbError,
        endpoint_manager: &GlobalEndpointManager,
    ) -> Option<Duration> {
        if !error.is_write_forbidden() {
            return None;
        }
        if !self.discovery_enabled {
            return None;
        }
        if self.attempts >= MAX_ENDPOINT_DISCOVERY_RETRIES {
            return None;
        }

        info!(attempt = self.attempts + 1, "write region changed; refreshing region topology and retrying");
        endpoint_manager.refresh().await;
        self.attempts += 1;
        Some(ENDPOINT_DISCOVERY_RETRY_INTERVAL)
    }
}

/// Redirect retry for session reads that outran replication.
///
/// Only consulted for not-found errors carrying the session-not-available
/// sub-status. Recovery re-targets the write region immediately instead of
/// backing off, bounded to a single retry.
#[derive(Debug, Default)]
pub struct SessionReadRetryPolicy {
    attempts: u32,
}

impl SessionReadRetryPolicy {
    /// Creates a fresh policy for one logical operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides whether to retry an unavailable session read by overriding
    /// the request endpoint to the write region. Returns true when the
    /// request was redirected and should be re-sent without delay.
    pub async fn should_retry(
        &mut self,
        error: &DbError,
        request: &mut DocumentRequest,
        endpoint_manager: &GlobalEndpointManager,
    ) -> bool {
        if !error.is_session_not_available() {
            return false;
        }
        if self.attempts >= MAX_SESSION_READ_RETRIES {
            return false;
        }
        if request.operation.is_write() || request.endpoint_override.is_some() {
            return false;
        }

        let read_endpoint = endpoint_manager.read_endpoint().await;
        let write_endpoint = endpoint_manager.write_endpoint().await;
        if read_endpoint.eq_ignore_ascii_case(&write_endpoint) {
            return false;
        }

        info!("session token not available in read region; retrying against write region");
        request.endpoint_override = Some(write_endpoint);
        self.attempts += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionPolicy;
    use crate::endpoint::{
        AccountMetadataSource, DatabaseAccount, DatabaseAccountLocation,
    };
    use crate::error::{SUB_STATUS_READ_SESSION_NOT_AVAILABLE, SUB_STATUS_WRITE_FORBIDDEN};
    use crate::types::{OperationType, ResourceType};
    use async_trait::async_trait;
    use std::sync::Arc;

    fn throttled(retry_after_ms: u64) -> DbError {
        DbError::Throttled { retry_after_ms }
    }

    fn write_forbidden() -> DbError {
        DbError::Forbidden {
            sub_status: Some(SUB_STATUS_WRITE_FORBIDDEN),
            reason: "write region changed".to_string(),
        }
    }

    fn session_not_available() -> DbError {
        DbError::NotFound {
            sub_status: Some(SUB_STATUS_READ_SESSION_NOT_AVAILABLE),
        }
    }

    struct SplitRegionSource;

    #[async_trait]
    impl AccountMetadataSource for SplitRegionSource {
        async fn database_account(&self, _endpoint: &str) -> Option<DatabaseAccount> {
            Some(DatabaseAccount {
                writable_locations: vec![DatabaseAccountLocation {
                    name: "West US".to_string(),
                    endpoint: "https://w.example.com/".to_string(),
                }],
                readable_locations: vec![DatabaseAccountLocation {
                    name: "East US".to_string(),
                    endpoint: "https://r.example.com/".to_string(),
                }],
            })
        }
    }

    fn split_region_manager() -> GlobalEndpointManager {
        let policy = ConnectionPolicy {
            preferred_locations: vec!["East US".to_string()],
            ..Default::default()
        };
        GlobalEndpointManager::new(Arc::new(SplitRegionSource), "https://acct.example.com/", &policy)
    }

    #[test]
    fn test_throttle_uses_server_hint() {
        let mut policy = ThrottleRetryPolicy::new(9, Duration::from_secs(30));
        let wait = policy.should_retry(&throttled(100)).unwrap();
        assert_eq!(wait, Duration::from_millis(100));
    }

    #[test]
    fn test_throttle_missing_hint_uses_default() {
        let mut policy = ThrottleRetryPolicy::new(9, Duration::from_secs(30));
        let wait = policy.should_retry(&throttled(0)).unwrap();
        assert_eq!(wait, DEFAULT_THROTTLE_RETRY_AFTER);
    }

    #[test]
    fn test_throttle_attempt_budget() {
        let mut policy = ThrottleRetryPolicy::new(3, Duration::from_secs(30));
        for _ in 0..3 {
            assert!(policy.should_retry(&throttled(10)).is_some());
        }
        assert!(policy.should_retry(&throttled(10)).is_none());
    }

    #[test]
    fn test_throttle_zero_attempts_disables_retry() {
        let mut policy = ThrottleRetryPolicy::new(0, Duration::from_secs(30));
        assert!(policy.should_retry(&throttled(10)).is_none());
    }

    #[test]
    fn test_throttle_cumulative_wait_cap() {
        let mut policy = ThrottleRetryPolicy::new(100, Duration::from_millis(250));
        assert!(policy.should_retry(&throttled(100)).is_some());
        assert!(policy.should_retry(&throttled(100)).is_some());
        // Third wait would push the cumulative total to 300ms >= 250ms.
        assert!(policy.should_retry(&throttled(100)).is_none());
    }

    #[test]
    fn test_throttle_ignores_other_errors() {
        let mut policy = ThrottleRetryPolicy::new(9, Duration::from_secs(30));
        assert!(policy.should_retry(&write_forbidden()).is_none());
    }

    #[tokio::test]
    async fn test_discovery_retry_refreshes_before_each_attempt() {
        let manager = split_region_manager();
        manager.write_endpoint().await;
        let initial_refreshes = manager.refresh_count();

        let mut policy = EndpointDiscoveryRetryPolicy::new(true);
        for attempt in 1..=5u64 {
            let wait = policy.should_retry(&write_forbidden(), &manager).await;
            assert_eq!(wait, Some(Duration::from_secs(1)));
            assert_eq!(manager.refresh_count(), initial_refreshes + attempt);
        }
    }

    #[tokio::test]
    async fn test_discovery_retry_budget() {
        let manager = split_region_manager();
        let mut policy = EndpointDiscoveryRetryPolicy::new(true);
        for _ in 0..MAX_ENDPOINT_DISCOVERY_RETRIES {
            assert!(policy.should_retry(&write_forbidden(), &manager).await.is_some());
        }
        assert!(policy.should_retry(&write_forbidden(), &manager).await.is_none());
    }

    #[tokio::test]
    async fn test_discovery_retry_disabled_without_discovery() {
        let manager = split_region_manager();
        let mut policy = EndpointDiscoveryRetryPolicy::new(false);
        assert!(policy.should_retry(&write_forbidden(), &manager).await.is_none());
    }

    #[tokio::test]
    async fn test_discovery_retry_ignores_generic_forbidden() {
        let manager = split_region_manager();
        let mut policy = EndpointDiscoveryRetryPolicy::new(true);
        let generic = DbError::Forbidden {
            sub_status: None,
            reason: "auth".to_string(),
        };
        assert!(policy.should_retry(&generic, &manager).await.is_none());
    }

    #[tokio::test]
    async fn test_session_read_redirects_to_write_region() {
        let manager = split_region_manager();
        let mut policy = SessionReadRetryPolicy::new();
        let mut request = DocumentRequest::new(OperationType::Read, ResourceType::Document);

        assert!(
            policy
                .should_retry(&session_not_available(), &mut request, &manager)
                .await
        );
        assert_eq!(
            request.endpoint_override.as_deref(),
            Some("https://w.example.com/")
        );
    }

    #[tokio::test]
    async fn test_session_read_single_retry() {
        let manager = split_region_manager();
        let mut policy = SessionReadRetryPolicy::new();
        let mut request = DocumentRequest::new(OperationType::Read, ResourceType::Document);

        assert!(
            policy
                .should_retry(&session_not_available(), &mut request, &manager)
                .await
        );
        // The override installed by the first retry also blocks a second one.
        assert!(
            !policy
                .should_retry(&session_not_available(), &mut request, &manager)
                .await
        );
    }

    #[tokio::test]
    async fn test_session_read_skips_writes() {
        let manager = split_region_manager();
        let mut policy = SessionReadRetryPolicy::new();
        let mut request = DocumentRequest::new(OperationType::Create, ResourceType::Document);

        assert!(
            !policy
                .should_retry(&session_not_available(), &mut request, &manager)
                .await
        );
    }

    #[tokio::test]
    async fn test_session_read_requires_distinct_regions() {
        // Single-region account: read endpoint equals write endpoint, so a
        // redirect cannot help.
        let manager = GlobalEndpointManager::new(
            Arc::new(SplitRegionSource),
            "https://acct.example.com/",
            &ConnectionPolicy::default(),
        );
        let mut policy = SessionReadRetryPolicy::new();
        let mut request = DocumentRequest::new(OperationType::Read, ResourceType::Document);

        assert!(
            !policy
                .should_retry(&session_not_available(), &mut request, &manager)
                .await
        );
    }
}
