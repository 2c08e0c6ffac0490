//! Core value types: LSNs, consistency levels, operation and resource kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Log sequence number: a monotonically increasing per-partition progress marker
/// used to compare replica freshness.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Lsn(u64);

impl Lsn {
    /// A zero LSN.
    pub const ZERO: Lsn = Lsn(0);

    /// Creates a new Lsn from a raw u64 value.
    pub fn new(lsn: u64) -> Self {
        Lsn(lsn)
    }

    /// Returns the raw u64 value of this LSN.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Consistency level requested for read operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    /// Quorum-confirmed reads via the strong read protocol.
    Strong,
    /// Quorum reads with bounded replication lag; no primary barrier.
    BoundedStaleness,
    /// Read-your-own-writes via session tokens.
    Session,
    /// No ordering guarantee beyond eventual convergence.
    Eventual,
}

/// The kind of logical operation being issued against the service.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    /// Create a resource.
    Create,
    /// Read a single resource.
    Read,
    /// Replace an existing resource.
    Replace,
    /// Upsert a resource.
    Upsert,
    /// Delete a resource.
    Delete,
    /// Execute a query.
    Query,
    /// Read the list of resources in a feed.
    ReadFeed,
    /// Lightweight head probe used for barrier requests.
    Head,
}

impl OperationType {
    /// Returns true if this operation mutates server state and must be
    /// routed to the current write endpoint.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            OperationType::Create
                | OperationType::Replace
                | OperationType::Upsert
                | OperationType::Delete
        )
    }
}

/// The kind of resource an operation targets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceType {
    /// The database account itself (topology metadata).
    DatabaseAccount,
    /// A database.
    Database,
    /// A document collection (the session-token scope owner).
    Collection,
    /// A document.
    Document,
}
