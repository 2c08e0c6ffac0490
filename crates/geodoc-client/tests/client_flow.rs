//! End-to-end flows through the executor, endpoint manager, session
//! container, and quorum reader working together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use geodoc_client::config::ConnectionPolicy;
use geodoc_client::endpoint::{
    AccountMetadataSource, DatabaseAccount, DatabaseAccountLocation, GlobalEndpointManager,
};
use geodoc_client::error::{DbError, Result, SUB_STATUS_WRITE_FORBIDDEN};
use geodoc_client::executor::RequestExecutor;
use geodoc_client::quorum::QuorumReader;
use geodoc_client::request::{DocumentRequest, DocumentResponse, HEADER_SESSION_TOKEN};
use geodoc_client::session::SessionContainer;
use geodoc_client::store::{StoreReadResult, StoreReader, StoreResponse};
use geodoc_client::types::{ConsistencyLevel, Lsn, OperationType, ResourceType};

fn location(name: &str, endpoint: &str) -> DatabaseAccountLocation {
    DatabaseAccountLocation {
        name: name.to_string(),
        endpoint: endpoint.to_string(),
    }
}

/// Metadata source whose write region moves after a regional failover.
struct FailoverSource {
    fetches: AtomicU32,
}

#[async_trait]
impl AccountMetadataSource for FailoverSource {
    async fn database_account(&self, _endpoint: &str) -> Option<DatabaseAccount> {
        let fetch = self.fetches.fetch_add(1, Ordering::SeqCst);
        let write_region = if fetch == 0 {
            location("Region A", "https://a.example.com/")
        } else {
            location("Region B", "https://b.example.com/")
        };
        Some(DatabaseAccount {
            writable_locations: vec![write_region],
            readable_locations: vec![],
        })
    }
}

#[tokio::test(start_paused = true)]
async fn region_failover_write_recovers_after_refresh() {
    let manager = Arc::new(GlobalEndpointManager::new(
        Arc::new(FailoverSource {
            fetches: AtomicU32::new(0),
        }),
        "https://acct.example.com/",
        &ConnectionPolicy::default(),
    ));
    let session = Arc::new(SessionContainer::new(ConsistencyLevel::Session));
    let executor = RequestExecutor::new(
        Arc::clone(&manager),
        session,
        ConnectionPolicy::default(),
    );

    // Region A no longer accepts writes; Region B does. The first attempt is
    // rejected, the retry layer refreshes topology, and the second attempt
    // lands on the new write region.
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_clone = Arc::clone(&attempts);
    let mut request = DocumentRequest::new(OperationType::Create, ResourceType::Document);
    let response = executor
        .execute(&mut request, move |_request, endpoint| {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                if endpoint == "https://b.example.com/" {
                    Ok(DocumentResponse {
                        status: 201,
                        ..Default::default()
                    })
                } else {
                    Err(DbError::Forbidden {
                        sub_status: Some(SUB_STATUS_WRITE_FORBIDDEN),
                        reason: "write region changed".to_string(),
                    })
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(manager.write_endpoint().await, "https://b.example.com/");
}

/// Metadata source serving a static single-region topology.
struct StaticSource;

#[async_trait]
impl AccountMetadataSource for StaticSource {
    async fn database_account(&self, _endpoint: &str) -> Option<DatabaseAccount> {
        Some(DatabaseAccount {
            writable_locations: vec![location("Region A", "https://a.example.com/")],
            readable_locations: vec![location("Region A", "https://a.example.com/")],
        })
    }
}

#[tokio::test(start_paused = true)]
async fn write_then_session_read_round_trip() {
    let manager = Arc::new(GlobalEndpointManager::new(
        Arc::new(StaticSource),
        "https://acct.example.com/",
        &ConnectionPolicy::default(),
    ));
    let session = Arc::new(SessionContainer::new(ConsistencyLevel::Session));
    let executor = RequestExecutor::new(
        Arc::clone(&manager),
        Arc::clone(&session),
        ConnectionPolicy::default(),
    );

    // A write is throttled once, then succeeds and returns a session token.
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_clone = Arc::clone(&attempts);
    let mut write = DocumentRequest::new(OperationType::Create, ResourceType::Document)
        .with_resource_id("coll1");
    executor
        .execute(&mut write, move |_request, _endpoint| {
            let attempts = Arc::clone(&attempts_clone);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(DbError::Throttled { retry_after_ms: 50 });
                }
                let mut headers = HashMap::new();
                headers.insert(HEADER_SESSION_TOKEN.to_string(), "0:7".to_string());
                Ok(DocumentResponse {
                    status: 201,
                    headers,
                    ..Default::default()
                })
            }
        })
        .await
        .unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    // The follow-up read carries the captured token.
    let observed_token = Arc::new(Mutex::new(None::<String>));
    let observed_clone = Arc::clone(&observed_token);
    let mut read = DocumentRequest::new(OperationType::Read, ResourceType::Document)
        .with_resource_id("coll1");
    executor
        .execute(&mut read, move |request, _endpoint| {
            let observed = Arc::clone(&observed_clone);
            async move {
                *observed.lock().unwrap() = request.session_token.clone();
                Ok(DocumentResponse::default())
            }
        })
        .await
        .unwrap();
    assert_eq!(observed_token.lock().unwrap().as_deref(), Some("0:7"));

    // Deleting the collection clears the scope for subsequent requests.
    let mut delete = DocumentRequest::new(OperationType::Delete, ResourceType::Collection)
        .with_resource_id("coll1");
    executor
        .execute(&mut delete, |_request, _endpoint| async move {
            Ok(DocumentResponse::default())
        })
        .await
        .unwrap();
    assert!(session.token_for("coll1").is_none());
}

/// Store whose replicas lag one barrier poll behind the freshest LSN.
struct LaggingStore {
    fanouts: AtomicU32,
}

#[async_trait]
impl StoreReader for LaggingStore {
    async fn read_primary(
        &self,
        _request: &DocumentRequest,
        _force_address_refresh: bool,
    ) -> Result<StoreReadResult> {
        Err(DbError::Gone {
            reason: "primary unavailable".to_string(),
        })
    }

    async fn read_multiple_replicas(
        &self,
        _request: &DocumentRequest,
        _include_primary: bool,
        _required_replica_count: usize,
    ) -> Result<Vec<StoreReadResult>> {
        let fanout = self.fanouts.fetch_add(1, Ordering::SeqCst);
        let fresh = StoreReadResult::valid(
            StoreResponse {
                status: 200,
                ..Default::default()
            },
            Lsn::new(10),
        );
        let stale = StoreReadResult::valid(StoreResponse::default(), Lsn::new(9));
        if fanout == 0 {
            // Initial probe: replicas disagree.
            Ok(vec![fresh, stale.clone(), stale])
        } else {
            // Barrier polls: everyone has caught up.
            Ok(vec![fresh.clone(), fresh.clone(), fresh])
        }
    }
}

#[tokio::test(start_paused = true)]
async fn strong_read_converges_via_barrier() {
    let store = Arc::new(LaggingStore {
        fanouts: AtomicU32::new(0),
    });
    let reader = QuorumReader::new(Arc::clone(&store) as _);

    let request = DocumentRequest::new(OperationType::Read, ResourceType::Document)
        .with_resource_id("coll1");
    let response = reader.read_strong(&request, 2).await.unwrap();

    assert_eq!(response.status, 200);
    // One data probe plus one converging barrier poll.
    assert_eq!(store.fanouts.load(Ordering::SeqCst), 2);
}
