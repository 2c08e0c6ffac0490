//! Quorum read protocol for strong and bounded-staleness consistency.
//!
//! A read is returned only once the required number of replicas is confirmed
//! to hold data at the same or higher LSN. Replica disagreement is resolved
//! by barrier probes polling for LSN convergence; persistent disagreement
//! falls back to a direct primary read, and every unrecoverable outcome
//! surfaces as a Gone-class error.
//!
//! Strong read state machine:
//! `Start -> SecondaryQuorumRead -> {Result, PrimaryReadBarrier,
//! PerformPrimaryRead} -> SecondaryQuorumRead (retry) -> Result`.
//! Bounded staleness differs in one step only: it never issues the
//! primary-including barrier on `QuorumSelected`, because async replication
//! makes primary staleness information unreliable at that level.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{DbError, Result};
use crate::request::DocumentRequest;
use crate::store::{StoreReadResult, StoreReader, StoreResponse};
use crate::types::Lsn;

/// Barrier poll attempts per convergence wait.
pub const MAX_READ_BARRIER_RETRIES: u32 = 6;
/// Retry iterations of the secondary quorum step per logical read.
pub const MAX_READ_QUORUM_RETRIES: u32 = 6;
/// Delay between consecutive barrier polls.
pub const BARRIER_POLL_DELAY: Duration = Duration::from_millis(10);

/// Outcome of one quorum probe.
#[derive(Debug)]
enum ReadQuorumOutcome {
    /// Enough replicas agree at the maximum LSN; the result is final.
    QuorumMet { lsn: Lsn, result: StoreReadResult },
    /// Replicas disagree but a tentative maximum was identified.
    QuorumSelected { lsn: Lsn, result: StoreReadResult },
    /// Too few replicas responded to form any quorum.
    QuorumNotSelected,
}

/// Outcome of a direct primary read.
#[derive(Debug)]
enum ReadPrimaryOutcome {
    /// The primary alone can prove quorum; its response is final.
    Response(StoreReadResult),
    /// The primary's replica set is larger than the read quorum, so a
    /// primary-only read cannot prove quorum; retry on secondaries.
    RetryOnSecondary,
}

/// Tentative quorum-selected state carried between retry iterations, so a
/// retried read can wait on the already-selected LSN instead of re-probing.
type SelectedQuorum = Option<(Lsn, StoreReadResult)>;

/// Implements the strong and bounded-staleness read protocols on top of a
/// [`StoreReader`].
pub struct QuorumReader {
    store: Arc<dyn StoreReader>,
}

impl QuorumReader {
    /// Creates a reader backed by the given store.
    pub fn new(store: Arc<dyn StoreReader>) -> Self {
        Self { store }
    }

    /// Performs a strong-consistency read requiring `read_quorum` replicas
    /// to agree before returning.
    pub async fn read_strong(
        &self,
        request: &DocumentRequest,
        read_quorum: usize,
    ) -> Result<StoreResponse> {
        self.read_with_quorum(request, read_quorum, true).await
    }

    /// Performs a bounded-staleness read requiring `read_quorum` replicas to
    /// agree before returning.
    pub async fn read_bounded_staleness(
        &self,
        request: &DocumentRequest,
        read_quorum: usize,
    ) -> Result<StoreResponse> {
        self.read_with_quorum(request, read_quorum, false).await
    }

    async fn read_with_quorum(
        &self,
        request: &DocumentRequest,
        read_quorum: usize,
        barrier_on_primary: bool,
    ) -> Result<StoreResponse> {
        if read_quorum == 0 {
            return Err(DbError::BadRequest {
                reason: "read quorum must be at least 1".to_string(),
            });
        }

        let mut selected: SelectedQuorum = None;
        let mut has_read_primary = false;
        let mut retries_left = MAX_READ_QUORUM_RETRIES;

        loop {
            let mut retry_on_secondary = false;

            match self.read_quorum(request, read_quorum, selected.take()).await? {
                ReadQuorumOutcome::QuorumMet { lsn, result } => {
                    debug!(%lsn, read_quorum, "read quorum met");
                    return result.into_response();
                }
                ReadQuorumOutcome::QuorumSelected { lsn, result } => {
                    if barrier_on_primary {
                        // Strong reads wait on a barrier that includes the
                        // primary before giving up on the selected LSN.
                        let barrier = request.barrier_probe();
                        if self.wait_for_barrier(&barrier, true, read_quorum, lsn).await? {
                            return result.into_response();
                        }
                        info!(
                            %lsn, read_quorum,
                            "could not converge on selected lsn after primary read barrier"
                        );
                    } else {
                        warn!(
                            %lsn, read_quorum,
                            "could not converge on selected lsn; no primary barrier for bounded staleness"
                        );
                    }
                    selected = Some((lsn, result));
                    retry_on_secondary = true;
                }
                ReadQuorumOutcome::QuorumNotSelected => {
                    if has_read_primary {
                        warn!("primary read already attempted; quorum could not be selected on secondaries");
                        return Err(DbError::Gone {
                            reason: "primary read already attempted; quorum could not be selected after retrying on secondaries".to_string(),
                        });
                    }

                    info!(read_quorum, "quorum could not be selected; reading primary");
                    match self.read_primary(request, read_quorum).await? {
                        ReadPrimaryOutcome::Response(result) => {
                            debug!("primary read succeeded");
                            return result.into_response();
                        }
                        ReadPrimaryOutcome::RetryOnSecondary => {
                            info!("primary read could not prove quorum; retrying on secondaries");
                            retry_on_secondary = true;
                            has_read_primary = true;
                        }
                    }
                }
            }

            retries_left -= 1;
            if retries_left == 0 || !retry_on_secondary {
                break;
            }
        }

        warn!(read_quorum, "read quorum retries exhausted");
        Err(DbError::Gone {
            reason: format!(
                "could not complete read quorum with read quorum value of {} within {} retries",
                read_quorum, MAX_READ_QUORUM_RETRIES
            ),
        })
    }

    /// Probes secondary replicas for quorum agreement. A previously selected
    /// LSN/response pair skips the fan-out and goes straight to the barrier
    /// wait for that LSN.
    async fn read_quorum(
        &self,
        request: &DocumentRequest,
        read_quorum: usize,
        selected: SelectedQuorum,
    ) -> Result<ReadQuorumOutcome> {
        let (max_lsn, highest) = match selected {
            None => {
                let responses = self
                    .store
                    .read_multiple_replicas(request, false, read_quorum)
                    .await?;
                if responses.len() < read_quorum {
                    return Ok(ReadQuorumOutcome::QuorumNotSelected);
                }

                let (max_lsn, agreeing, highest) = max_lsn_agreement(responses);
                if agreeing >= read_quorum {
                    match highest {
                        Some(result) => {
                            return Ok(ReadQuorumOutcome::QuorumMet {
                                lsn: max_lsn,
                                result,
                            })
                        }
                        None => return Ok(ReadQuorumOutcome::QuorumNotSelected),
                    }
                }
                (max_lsn, highest)
            }
            Some((lsn, result)) => {
                info!(%lsn, "waiting for replicas to catch up to previously selected lsn");
                (lsn, Some(result))
            }
        };

        let Some(highest) = highest else {
            return Ok(ReadQuorumOutcome::QuorumNotSelected);
        };

        // Replicas disagree: poll with barrier probes to see whether they
        // converge on the maximum LSN without re-reading content.
        let barrier = request.barrier_probe();
        if self.wait_for_barrier(&barrier, false, read_quorum, max_lsn).await? {
            return Ok(ReadQuorumOutcome::QuorumMet {
                lsn: max_lsn,
                result: highest,
            });
        }

        warn!(%max_lsn, "quorum selected without convergence");
        Ok(ReadQuorumOutcome::QuorumSelected {
            lsn: max_lsn,
            result: highest,
        })
    }

    /// Forces a direct primary read and validates its consistency metadata.
    async fn read_primary(
        &self,
        request: &DocumentRequest,
        read_quorum: usize,
    ) -> Result<ReadPrimaryOutcome> {
        let result = self.store.read_primary(request, true).await?;
        if !result.is_valid {
            return Err(result.error.unwrap_or(DbError::Gone {
                reason: "primary read returned an invalid result".to_string(),
            }));
        }

        let (Some(replica_set_size), Some(_lsn), Some(_quorum_acked)) =
            (result.replica_set_size, result.lsn, result.quorum_acked_lsn)
        else {
            warn!(
                replica_set_size = ?result.replica_set_size,
                lsn = ?result.lsn,
                quorum_acked_lsn = ?result.quorum_acked_lsn,
                "primary response missing consistency metadata"
            );
            return Err(DbError::Gone {
                reason: "invalid consistency metadata in primary read response".to_string(),
            });
        };

        if replica_set_size == 0 {
            return Err(DbError::Gone {
                reason: "primary reported an empty replica set".to_string(),
            });
        }

        if replica_set_size as usize > read_quorum {
            // The primary alone cannot prove quorum when more replicas exist
            // than the quorum requires; wait for the secondaries instead.
            return Ok(ReadPrimaryOutcome::RetryOnSecondary);
        }

        Ok(ReadPrimaryOutcome::Response(result))
    }

    /// Polls replicas with barrier probes until `read_quorum` of them report
    /// an LSN at or above `barrier_lsn`, or the poll budget runs out.
    async fn wait_for_barrier(
        &self,
        barrier_request: &DocumentRequest,
        allow_primary: bool,
        read_quorum: usize,
        barrier_lsn: Lsn,
    ) -> Result<bool> {
        for attempt in 0..MAX_READ_BARRIER_RETRIES {
            let responses = self
                .store
                .read_multiple_replicas(barrier_request, allow_primary, read_quorum)
                .await?;
            let caught_up = responses
                .iter()
                .filter(|result| result.lsn.unwrap_or(Lsn::ZERO) >= barrier_lsn)
                .count();

            if caught_up >= read_quorum {
                debug!(%barrier_lsn, caught_up, "barrier request converged");
                return Ok(true);
            }

            warn!(
                %barrier_lsn,
                caught_up,
                read_quorum,
                allow_primary,
                remaining = MAX_READ_BARRIER_RETRIES - attempt - 1,
                "barrier request did not converge"
            );

            if attempt + 1 < MAX_READ_BARRIER_RETRIES {
                tokio::time::sleep(BARRIER_POLL_DELAY).await;
            }
        }

        Ok(false)
    }
}

/// Scans replica results for the maximum LSN and how many replicas report
/// exactly that maximum. A strictly higher LSN replaces the running maximum
/// and resets the count to 1 regardless of arrival order; ties at a lower
/// LSN are discarded.
fn max_lsn_agreement(
    results: Vec<StoreReadResult>,
) -> (Lsn, usize, Option<StoreReadResult>) {
    let mut max_lsn = Lsn::ZERO;
    let mut agreeing = 0usize;
    let mut highest: Option<StoreReadResult> = None;

    for result in results {
        let lsn = result.lsn.unwrap_or(Lsn::ZERO);
        if lsn == max_lsn {
            agreeing += 1;
            if highest.is_none() {
                highest = Some(result);
            }
        } else if lsn > max_lsn {
            agreeing = 1;
            max_lsn = lsn;
            highest = Some(result);
        }
    }

    (max_lsn, agreeing, highest)
}
