#![warn(missing_docs)]

//! GeoDoc client driver: quorum-based read consistency, multi-region endpoint
//! failover, session-token propagation, and throttling-aware retry.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod quorum;
pub mod request;
pub mod retry;
pub mod session;
pub mod store;
pub mod types;
