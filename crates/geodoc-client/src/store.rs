//! The replica read seam: the quorum reader drives consistency decisions
//! through the [`StoreReader`] trait and never performs network fan-out
//! itself.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

use crate::error::{DbError, Result};
use crate::request::DocumentRequest;
use crate::types::Lsn;

/// A raw response from one replica.
#[derive(Debug, Clone, Default)]
pub struct StoreResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Opaque payload.
    pub body: Bytes,
}

/// Outcome of reading one replica, including the consistency metadata the
/// quorum reader needs to compare replica freshness.
#[derive(Debug, Clone)]
pub struct StoreReadResult {
    /// The replica's response, when one was received.
    pub response: Option<StoreResponse>,
    /// The per-replica error, when the read failed.
    pub error: Option<DbError>,
    /// The replica's log sequence number, when reported.
    pub lsn: Option<Lsn>,
    /// The highest LSN acknowledged by a write quorum, when reported.
    pub quorum_acked_lsn: Option<Lsn>,
    /// The replica-set size reported by the replica, when present.
    pub replica_set_size: Option<u32>,
    /// The partition key range this result belongs to, when reported.
    pub partition_key_range_id: Option<String>,
    /// Request charge accumulated for this replica read.
    pub request_charge: f64,
    /// True when the result carries a usable response; false means `error`
    /// describes why the replica could not be read.
    pub is_valid: bool,
}

impl StoreReadResult {
    /// Builds a valid result from a response and its consistency metadata.
    pub fn valid(response: StoreResponse, lsn: Lsn) -> Self {
        Self {
            response: Some(response),
            error: None,
            lsn: Some(lsn),
            quorum_acked_lsn: None,
            replica_set_size: None,
            partition_key_range_id: None,
            request_charge: 0.0,
            is_valid: true,
        }
    }

    /// Builds an invalid result from a per-replica error.
    pub fn invalid(error: DbError) -> Self {
        Self {
            response: None,
            error: Some(error),
            lsn: None,
            quorum_acked_lsn: None,
            replica_set_size: None,
            partition_key_range_id: None,
            request_charge: 0.0,
            is_valid: false,
        }
    }

    /// Sets the quorum-acked LSN.
    pub fn with_quorum_acked_lsn(mut self, lsn: Lsn) -> Self {
        self.quorum_acked_lsn = Some(lsn);
        self
    }

    /// Sets the replica-set size.
    pub fn with_replica_set_size(mut self, size: u32) -> Self {
        self.replica_set_size = Some(size);
        self
    }

    /// True when the per-replica error is Gone-class.
    pub fn is_gone(&self) -> bool {
        matches!(self.error, Some(DbError::Gone { .. }))
    }

    /// True when the per-replica error is a not-found.
    pub fn is_not_found(&self) -> bool {
        matches!(self.error, Some(DbError::NotFound { .. }))
    }

    /// Consumes the result, yielding the response or the per-replica error.
    pub fn into_response(self) -> Result<StoreResponse> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.response.ok_or_else(|| DbError::Gone {
            reason: "replica result carried no response".to_string(),
        })
    }
}

/// Transport collaborator performing the actual replica reads.
///
/// Implementations own address resolution, connection pooling, and the
/// network fan-out. The quorum reader treats them as black boxes: a probe's
/// results are only handed back once every fanned-out replica has responded
/// or definitively failed.
#[async_trait]
pub trait StoreReader: Send + Sync {
    /// Reads directly from the primary replica. `force_address_refresh`
    /// bypasses cached replica addresses.
    async fn read_primary(
        &self,
        request: &DocumentRequest,
        force_address_refresh: bool,
    ) -> Result<StoreReadResult>;

    /// Fans out to replicas (secondaries only unless `include_primary`) and
    /// returns one result per replica that answered. The transport stops
    /// fanning out once `required_replica_count` responses are collected but
    /// never returns before each issued read has completed or failed.
    async fn read_multiple_replicas(
        &self,
        request: &DocumentRequest,
        include_primary: bool,
        required_replica_count: usize,
    ) -> Result<Vec<StoreReadResult>>;
}
