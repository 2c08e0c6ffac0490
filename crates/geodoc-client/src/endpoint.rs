//! Endpoint management for geo-replicated database accounts.
//!
//! When endpoint discovery is enabled, the [`GlobalEndpointManager`] picks the
//! write and read endpoints from account topology retrieved from the service,
//! honoring the caller's preferred-region order. When discovery is disabled,
//! every operation uses the default endpoint supplied at construction.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::ConnectionPolicy;
use crate::types::OperationType;

/// One geographic replica of the account: a (region name, endpoint URI) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseAccountLocation {
    /// Region name, e.g. "East US".
    pub name: String,
    /// Endpoint URI serving this region.
    pub endpoint: String,
}

/// Account topology returned by a metadata fetch.
#[derive(Debug, Clone, Default)]
pub struct DatabaseAccount {
    /// Regions accepting writes.
    pub writable_locations: Vec<DatabaseAccountLocation>,
    /// Regions serving reads.
    pub readable_locations: Vec<DatabaseAccountLocation>,
}

/// Transport collaborator fetching account topology from an endpoint.
#[async_trait]
pub trait AccountMetadataSource: Send + Sync {
    /// Fetches the account topology from the given endpoint. Returns `None`
    /// when the endpoint is unreachable; availability failures never error.
    async fn database_account(&self, endpoint: &str) -> Option<DatabaseAccount>;
}

struct EndpointState {
    writable_locations: BTreeMap<String, String>,
    readable_locations: BTreeMap<String, String>,
    current_write: String,
    current_read: String,
}

/// Resolves the endpoint to target for each operation, refreshing its view of
/// region topology on demand.
///
/// Shared across all concurrent operations of one client. A refresh already
/// in progress makes concurrent `refresh()` calls no-ops; readers proceed
/// with the previous endpoints until the refresh lands. Initialization
/// happens lazily on first access, and concurrent first callers block until
/// it completes.
pub struct GlobalEndpointManager {
    source: Arc<dyn AccountMetadataSource>,
    default_endpoint: String,
    preferred_locations: Vec<String>,
    discovery_enabled: bool,
    state: RwLock<EndpointState>,
    init: tokio::sync::Mutex<bool>,
    refreshing: AtomicBool,
    refresh_count: AtomicU64,
}

impl GlobalEndpointManager {
    /// Creates a manager for the given default endpoint and connection policy.
    pub fn new(
        source: Arc<dyn AccountMetadataSource>,
        default_endpoint: &str,
        policy: &ConnectionPolicy,
    ) -> Self {
        Self {
            source,
            default_endpoint: default_endpoint.to_string(),
            preferred_locations: policy.preferred_locations.clone(),
            discovery_enabled: policy.enable_endpoint_discovery,
            state: RwLock::new(EndpointState {
                writable_locations: BTreeMap::new(),
                readable_locations: BTreeMap::new(),
                current_write: default_endpoint.to_string(),
                current_read: default_endpoint.to_string(),
            }),
            init: tokio::sync::Mutex::new(false),
            refreshing: AtomicBool::new(false),
            refresh_count: AtomicU64::new(0),
        }
    }

    /// Returns the endpoint currently targeted for writes.
    pub async fn write_endpoint(&self) -> String {
        self.ensure_initialized().await;
        self.state.read().unwrap().current_write.clone()
    }

    /// Returns the endpoint currently targeted for reads.
    pub async fn read_endpoint(&self) -> String {
        self.ensure_initialized().await;
        self.state.read().unwrap().current_read.clone()
    }

    /// Resolves the endpoint for an operation: write operations target the
    /// write endpoint, everything else the read endpoint.
    pub async fn resolve_endpoint(&self, operation: OperationType) -> String {
        if operation.is_write() {
            self.write_endpoint().await
        } else {
            self.read_endpoint().await
        }
    }

    /// The default endpoint supplied at construction.
    pub fn default_endpoint(&self) -> &str {
        &self.default_endpoint
    }

    /// Whether endpoint discovery is enabled.
    pub fn discovery_enabled(&self) -> bool {
        self.discovery_enabled
    }

    /// Number of topology refreshes performed so far.
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::SeqCst)
    }

    /// Re-fetches account topology and recomputes the current endpoints.
    ///
    /// Reentrancy-guarded: if a refresh is already underway, this call
    /// returns immediately and readers keep the previous endpoints.
    pub async fn refresh(&self) {
        if self.refreshing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.refresh_internal().await;
        self.refreshing.store(false, Ordering::SeqCst);
    }

    async fn ensure_initialized(&self) {
        let mut initialized = self.init.lock().await;
        if !*initialized {
            self.refresh_internal().await;
            *initialized = true;
        }
    }

    async fn refresh_internal(&self) {
        self.refresh_count.fetch_add(1, Ordering::SeqCst);

        let mut writable = BTreeMap::new();
        let mut readable = BTreeMap::new();
        if self.discovery_enabled {
            if let Some(account) = self.account_from_any_endpoint().await {
                for location in account.writable_locations {
                    if !location.name.is_empty() && !location.endpoint.is_empty() {
                        writable.insert(location.name, location.endpoint);
                    }
                }
                for location in account.readable_locations {
                    if !location.name.is_empty() && !location.endpoint.is_empty() {
                        readable.insert(location.name, location.endpoint);
                    }
                }
            }
        }

        self.update_cache(writable, readable);
    }

    /// Fetches the account topology from the default endpoint, falling back
    /// to each preferred region's derived endpoint until one answers.
    async fn account_from_any_endpoint(&self) -> Option<DatabaseAccount> {
        if let Some(account) = self.source.database_account(&self.default_endpoint).await {
            return Some(account);
        }

        // The global endpoint was not reachable; try the regional endpoints
        // derived from the preferred list.
        for region in &self.preferred_locations {
            if let Some(regional) = self.regional_endpoint(region) {
                if let Some(account) = self.source.database_account(&regional).await {
                    return Some(account);
                }
            }
        }

        warn!(endpoint = %self.default_endpoint, "failed to retrieve account topology from any endpoint");
        None
    }

    fn update_cache(&self, writable: BTreeMap<String, String>, readable: BTreeMap<String, String>) {
        let mut state = self.state.write().unwrap();

        // With discovery disabled the caller-supplied endpoint always wins.
        if !self.discovery_enabled {
            state.current_write = self.default_endpoint.clone();
            state.current_read = self.default_endpoint.clone();
            state.writable_locations = writable;
            state.readable_locations = readable;
            return;
        }

        // The write endpoint is the lexicographically-first writable region,
        // which makes the pick deterministic when several regions accept
        // writes. Falls back to the default endpoint when none exist.
        let current_write = writable
            .values()
            .next()
            .cloned()
            .unwrap_or_else(|| self.default_endpoint.clone());

        let current_read = if readable.is_empty() || self.preferred_locations.is_empty() {
            // No readable region, or no preference: read where we write.
            current_write.clone()
        } else {
            self.preferred_locations
                .iter()
                .filter(|region| !region.is_empty())
                .find_map(|region| {
                    readable
                        .get(region.as_str())
                        .or_else(|| writable.get(region.as_str()))
                        .cloned()
                })
                .unwrap_or_else(|| current_write.clone())
        };

        debug!(write = %current_write, read = %current_read, "endpoint cache updated");
        state.writable_locations = writable;
        state.readable_locations = readable;
        state.current_write = current_write;
        state.current_read = current_read;
    }

    /// Derives a region's endpoint from the default endpoint by appending
    /// `-<region-without-spaces>` to the account segment of the host.
    fn regional_endpoint(&self, region: &str) -> Option<String> {
        if region.is_empty() {
            return None;
        }
        let url = &self.default_endpoint;
        let scheme_end = url.find("://")? + 3;
        let host_end = url[scheme_end..]
            .find(['/', ':'])
            .map(|i| scheme_end + i)
            .unwrap_or(url.len());
        let host = &url[scheme_end..host_end];
        let account = host.split('.').next().unwrap_or(host);
        if account.is_empty() {
            return None;
        }
        let regional = format!("{}-{}", account, region.replace(' ', ""));
        Some(format!(
            "{}{}{}",
            &url[..scheme_end],
            regional,
            &url[scheme_end + account.len()..]
        ))
    }
}
