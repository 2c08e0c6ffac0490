//! Request orchestration: endpoint resolution, session token attach/capture,
//! and the per-operation retry loop.
//!
//! Every logical operation runs through [`RequestExecutor::execute`], which
//! classifies failures by status/sub-status and delegates to the matching
//! retry policy. Retryable classes are handled here until their budget runs
//! out; everything else propagates on first occurrence.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::config::ConnectionPolicy;
use crate::endpoint::GlobalEndpointManager;
use crate::error::{DbError, Result};
use crate::request::{DocumentRequest, DocumentResponse};
use crate::retry::{EndpointDiscoveryRetryPolicy, SessionReadRetryPolicy, ThrottleRetryPolicy};
use crate::session::SessionContainer;

/// Wraps every operation in the retry loop, consulting the endpoint manager
/// for endpoint selection and the session container for token handling.
pub struct RequestExecutor {
    endpoint_manager: Arc<GlobalEndpointManager>,
    session: Arc<SessionContainer>,
    policy: ConnectionPolicy,
}

impl RequestExecutor {
    /// Creates an executor sharing the given endpoint manager and session
    /// container across operations.
    pub fn new(
        endpoint_manager: Arc<GlobalEndpointManager>,
        session: Arc<SessionContainer>,
        policy: ConnectionPolicy,
    ) -> Self {
        Self {
            endpoint_manager,
            session,
            policy,
        }
    }

    /// Executes one logical operation through the caller-supplied transport
    /// closure, retrying per error class.
    ///
    /// Per attempt: resolve the target endpoint (honoring a session-read
    /// redirect override), attach the session token, send, and on success
    /// capture the returned token (clearing the scope after a collection
    /// delete). Fresh retry budgets are created per call.
    pub async fn execute<F, Fut>(
        &self,
        request: &mut DocumentRequest,
        send: F,
    ) -> Result<DocumentResponse>
    where
        F: Fn(DocumentRequest, String) -> Fut,
        Fut: Future<Output = Result<DocumentResponse>>,
    {
        let mut throttle = ThrottleRetryPolicy::from_options(&self.policy.retry_options);
        let mut discovery =
            EndpointDiscoveryRetryPolicy::new(self.endpoint_manager.discovery_enabled());
        let mut session_read = SessionReadRetryPolicy::new();

        loop {
            let endpoint = match &request.endpoint_override {
                Some(endpoint) => endpoint.clone(),
                None => self.endpoint_manager.resolve_endpoint(request.operation).await,
            };
            self.session.resolve_token(request);

            debug!(
                activity_id = %request.activity_id,
                operation = ?request.operation,
                %endpoint,
                "dispatching request"
            );

            match send(request.clone(), endpoint).await {
                Ok(response) => {
                    self.session.capture_token(request, &response);
                    self.session.clear_token(request);
                    return Ok(response);
                }
                Err(error) => {
                    let wait = match &error {
                        DbError::Throttled { .. } => throttle.should_retry(&error),
                        DbError::Forbidden { .. } if error.is_write_forbidden() => {
                            discovery.should_retry(&error, &self.endpoint_manager).await
                        }
                        DbError::NotFound { .. } if error.is_session_not_available() => {
                            // Redirected session reads are re-sent immediately.
                            if session_read
                                .should_retry(&error, request, &self.endpoint_manager)
                                .await
                            {
                                continue;
                            }
                            None
                        }
                        _ => None,
                    };

                    match wait {
                        Some(wait) => tokio::time::sleep(wait).await,
                        None => return Err(error),
                    }
                }
            }
        }
    }
}
