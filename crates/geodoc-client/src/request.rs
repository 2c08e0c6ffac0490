//! Logical request and response shapes passed between the executor, the
//! quorum reader, and the transport collaborator.
//!
//! No on-wire format is defined here; these are the decision layer's view of
//! a request in flight and the headers it consumes from responses.

use std::collections::HashMap;

use bytes::Bytes;
use uuid::Uuid;

use crate::types::{ConsistencyLevel, OperationType, ResourceType};

/// Response header carrying the session token for the owning partition scope.
pub const HEADER_SESSION_TOKEN: &str = "x-geodoc-session-token";
/// Response header carrying the retry-after hint (milliseconds) on throttled
/// responses.
pub const HEADER_RETRY_AFTER_MS: &str = "x-geodoc-retry-after-ms";
/// Request header carrying the client-generated activity id for correlation.
pub const HEADER_ACTIVITY_ID: &str = "x-geodoc-activity-id";

/// A logical operation to be executed against the service.
#[derive(Debug, Clone)]
pub struct DocumentRequest {
    /// The kind of operation.
    pub operation: OperationType,
    /// The kind of resource targeted.
    pub resource_type: ResourceType,
    /// Resource id of the owning collection (session-token scope), if known.
    pub resource_id: Option<String>,
    /// Partition key range targeted, if resolved.
    pub partition_key_range_id: Option<String>,
    /// Explicit session token supplied by the caller; when set, the session
    /// container leaves it untouched.
    pub session_token: Option<String>,
    /// Per-request consistency override; falls back to the client default.
    pub consistency: Option<ConsistencyLevel>,
    /// Endpoint override installed by the session-read retry policy; when
    /// set, endpoint resolution is bypassed.
    pub endpoint_override: Option<String>,
    /// Client-generated id attached to every attempt for log correlation.
    pub activity_id: Uuid,
}

impl DocumentRequest {
    /// Creates a new request with a fresh activity id.
    pub fn new(operation: OperationType, resource_type: ResourceType) -> Self {
        Self {
            operation,
            resource_type,
            resource_id: None,
            partition_key_range_id: None,
            session_token: None,
            consistency: None,
            endpoint_override: None,
            activity_id: Uuid::new_v4(),
        }
    }

    /// Sets the owning collection resource id.
    pub fn with_resource_id(mut self, resource_id: &str) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    /// Sets the targeted partition key range.
    pub fn with_partition_key_range(mut self, range_id: &str) -> Self {
        self.partition_key_range_id = Some(range_id.to_string());
        self
    }

    /// Sets a per-request consistency override.
    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = Some(consistency);
        self
    }

    /// Sets an explicit session token, bypassing the session container.
    pub fn with_session_token(mut self, token: &str) -> Self {
        self.session_token = Some(token.to_string());
        self
    }

    /// Derives the barrier probe for this request: a head-style request with
    /// the same addressing identity and no payload, used to poll replicas for
    /// LSN convergence without re-reading content.
    pub fn barrier_probe(&self) -> DocumentRequest {
        DocumentRequest {
            operation: OperationType::Head,
            resource_type: self.resource_type,
            resource_id: self.resource_id.clone(),
            partition_key_range_id: self.partition_key_range_id.clone(),
            session_token: None,
            consistency: self.consistency,
            endpoint_override: self.endpoint_override.clone(),
            activity_id: self.activity_id,
        }
    }
}

/// A response to a logical operation, as seen by the decision layer.
#[derive(Debug, Clone, Default)]
pub struct DocumentResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Response headers consumed by the core (session token, retry hints).
    pub headers: HashMap<String, String>,
    /// Opaque payload; the core never inspects it.
    pub body: Bytes,
}

impl DocumentResponse {
    /// Returns the session token header, if present and non-empty.
    pub fn session_token(&self) -> Option<&str> {
        self.headers
            .get(HEADER_SESSION_TOKEN)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }
}
