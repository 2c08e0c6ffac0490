//! Session token container implementing client-driven session consistency.
//!
//! Remembers the most advanced session token observed per collection scope
//! and attaches it to subsequent requests so the server can guarantee
//! read-your-own-writes. Shared across every in-flight request of a client;
//! resolve/capture/clear are atomic per-scope read-modify-write operations.

use std::collections::BTreeMap;

use dashmap::DashMap;
use tracing::debug;

use crate::request::{DocumentRequest, DocumentResponse};
use crate::types::{ConsistencyLevel, OperationType, ResourceType};

/// Maps collection resource id to the highest observed LSN per partition key
/// range. Entries live for the process lifetime; scopes for deleted
/// collections are removed by [`SessionContainer::clear_token`].
pub struct SessionContainer {
    default_consistency: ConsistencyLevel,
    tokens: DashMap<String, BTreeMap<String, u64>>,
}

impl SessionContainer {
    /// Creates an empty container with the client's default consistency.
    pub fn new(default_consistency: ConsistencyLevel) -> Self {
        Self {
            default_consistency,
            tokens: DashMap::new(),
        }
    }

    /// Attaches the stored session token for the request's scope, if one
    /// should be attached.
    ///
    /// An explicit caller-supplied token is left untouched. Nothing is
    /// attached unless the effective consistency level is Session and the
    /// request's owning collection is known.
    pub fn resolve_token(&self, request: &mut DocumentRequest) {
        if request.session_token.is_some() {
            return;
        }
        let effective = request.consistency.unwrap_or(self.default_consistency);
        if effective != ConsistencyLevel::Session {
            return;
        }
        let Some(resource_id) = &request.resource_id else {
            return;
        };
        if let Some(ranges) = self.tokens.get(resource_id) {
            let combined = Self::combine(&ranges);
            if !combined.is_empty() {
                request.session_token = Some(combined);
            }
        }
    }

    /// Merges the session token from a response into the request's scope,
    /// keeping the higher progress marker per partition key range.
    pub fn capture_token(&self, request: &DocumentRequest, response: &DocumentResponse) {
        let Some(token) = response.session_token() else {
            return;
        };
        let Some(resource_id) = &request.resource_id else {
            return;
        };

        let mut ranges = self.tokens.entry(resource_id.clone()).or_default();
        for part in token.split(',') {
            let Some((range, lsn)) = Self::parse_part(part) else {
                continue;
            };
            let slot = ranges.entry(range.to_string()).or_insert(0);
            if lsn > *slot {
                *slot = lsn;
            }
        }
    }

    /// Removes the stored scope after a collection delete; the partition
    /// space it addressed no longer exists.
    pub fn clear_token(&self, request: &DocumentRequest) {
        if request.operation != OperationType::Delete
            || request.resource_type != ResourceType::Collection
        {
            return;
        }
        if let Some(resource_id) = &request.resource_id {
            if self.tokens.remove(resource_id).is_some() {
                debug!(resource_id = %resource_id, "cleared session scope");
            }
        }
    }

    /// Returns the combined token currently stored for a scope, if any.
    pub fn token_for(&self, resource_id: &str) -> Option<String> {
        self.tokens
            .get(resource_id)
            .map(|ranges| Self::combine(&ranges))
            .filter(|s| !s.is_empty())
    }

    fn combine(ranges: &BTreeMap<String, u64>) -> String {
        ranges
            .iter()
            .map(|(range, lsn)| format!("{}:{}", range, lsn))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn parse_part(part: &str) -> Option<(&str, u64)> {
        let (range, lsn) = part.split_once(':')?;
        let lsn = lsn.parse::<u64>().ok()?;
        Some((range, lsn))
    }
}
