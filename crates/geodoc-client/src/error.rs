//! Error taxonomy for the client driver.
//!
//! Every failure surfaced by the core carries HTTP-style status semantics plus
//! an optional sub-status, so the retry layer can pattern-match on error kind
//! without inspecting message strings.

use thiserror::Error;

/// Sub-status distinguishing a write rejected because the targeted region is
/// not the current write region from other forbidden cases.
pub const SUB_STATUS_WRITE_FORBIDDEN: u32 = 3;

/// Sub-status distinguishing "session token not yet visible at the targeted
/// replica" from a plain not-found.
pub const SUB_STATUS_READ_SESSION_NOT_AVAILABLE: u32 = 1002;

/// Errors produced by the driver core and its transport collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DbError {
    /// A consistent read could not be established (quorum/barrier budget
    /// exhausted, or structurally invalid replica metadata). HTTP 410 class.
    #[error("gone: {reason}")]
    Gone {
        /// Why the read could not be completed.
        reason: String,
    },

    /// The request was rate limited. HTTP 429 class.
    #[error("request throttled, retry after {retry_after_ms}ms")]
    Throttled {
        /// Server-provided retry hint in milliseconds (0 when absent).
        retry_after_ms: u64,
    },

    /// The request was rejected. HTTP 403 class; sub-status 3 marks a write
    /// sent to a non-write region.
    #[error("forbidden (sub-status {sub_status:?}): {reason}")]
    Forbidden {
        /// Optional sub-status refining the rejection.
        sub_status: Option<u32>,
        /// Why the request was rejected.
        reason: String,
    },

    /// The resource was not found. HTTP 404 class; sub-status 1002 marks a
    /// session read not yet serviceable at the targeted replica.
    #[error("not found (sub-status {sub_status:?})")]
    NotFound {
        /// Optional sub-status refining the miss.
        sub_status: Option<u32>,
    },

    /// The request was malformed. HTTP 400 class; never retried.
    #[error("bad request: {reason}")]
    BadRequest {
        /// What was wrong with the request.
        reason: String,
    },

    /// A transport-level failure reported by a collaborator.
    #[error("transport failure: {reason}")]
    Transport {
        /// Description from the transport layer.
        reason: String,
    },

    /// An unexpected internal condition. HTTP 500 class.
    #[error("internal error: {reason}")]
    Internal {
        /// Description of the condition.
        reason: String,
    },
}

impl DbError {
    /// Returns the HTTP-style status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            DbError::Gone { .. } => 410,
            DbError::Throttled { .. } => 429,
            DbError::Forbidden { .. } => 403,
            DbError::NotFound { .. } => 404,
            DbError::BadRequest { .. } => 400,
            DbError::Transport { .. } => 503,
            DbError::Internal { .. } => 500,
        }
    }

    /// Returns the sub-status code, if this error carries one.
    pub fn sub_status(&self) -> Option<u32> {
        match self {
            DbError::Forbidden { sub_status, .. } => *sub_status,
            DbError::NotFound { sub_status } => *sub_status,
            _ => None,
        }
    }

    /// True if this is a write rejected by a non-write region.
    pub fn is_write_forbidden(&self) -> bool {
        matches!(
            self,
            DbError::Forbidden {
                sub_status: Some(SUB_STATUS_WRITE_FORBIDDEN),
                ..
            }
        )
    }

    /// True if this is a session read that outran replication at the
    /// targeted replica.
    pub fn is_session_not_available(&self) -> bool {
        matches!(
            self,
            DbError::NotFound {
                sub_status: Some(SUB_STATUS_READ_SESSION_NOT_AVAILABLE),
            }
        )
    }
}

/// Convenience alias used throughout the driver.
pub type Result<T> = std::result::Result<T, DbError>;
