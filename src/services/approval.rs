//! Pending request queue and approve/reject decisions.
//!
//! The console never moves a request between states itself. A decision marks
//! the row in flight, waits for the ledger, and the queue is re-read
//! afterwards; whatever the ledger returns is what gets shown.

use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::models::{page::backend_index, LifecycleRequest, Page};
use crate::services::gateway::{GatewayClient, GatewayError};

#[derive(thiserror::Error, Debug)]
pub enum ApprovalError {
    #[error("Request {0} is already being processed")]
    InFlight(i64),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ApprovalError {
    pub fn user_message(&self) -> String {
        match self {
            ApprovalError::Gateway(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

/// Per-row decision state as seen by this console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowMarker {
    Idle,
    InFlight,
    /// The ledger accepted a decision; the row leaves the queue on the next load
    Settled,
}

impl RowMarker {
    pub fn accepts_decision(&self) -> bool {
        !matches!(self, RowMarker::InFlight)
    }
}

/// Markers for rows that are not idle, keyed by request id
#[derive(Debug, Default)]
pub struct RowMarkers {
    rows: DashMap<i64, RowMarker>,
}

impl RowMarkers {
    pub fn get(&self, request_id: i64) -> RowMarker {
        self.rows
            .get(&request_id)
            .map(|m| *m)
            .unwrap_or(RowMarker::Idle)
    }

    /// Moves the row to `InFlight`. Fails when it already is.
    ///
    /// The row returns to idle when the guard drops unless it was settled,
    /// so an abandoned decision never leaves the row locked.
    fn begin(&self, request_id: i64) -> Result<InFlightGuard<'_>, ApprovalError> {
        let mut entry = self.rows.entry(request_id).or_insert(RowMarker::Idle);
        if *entry == RowMarker::InFlight {
            return Err(ApprovalError::InFlight(request_id));
        }
        *entry = RowMarker::InFlight;
        Ok(InFlightGuard {
            markers: self,
            request_id,
            settled: false,
        })
    }

    fn settle(&self, request_id: i64) {
        self.rows.insert(request_id, RowMarker::Settled);
    }

    fn release(&self, request_id: i64) {
        self.rows.remove(&request_id);
    }

    /// Forgets settled rows the ledger no longer lists as pending
    fn prune_settled(&self, still_pending: &HashSet<i64>) {
        self.rows
            .retain(|id, marker| *marker != RowMarker::Settled || still_pending.contains(id));
    }

    pub fn in_flight(&self) -> usize {
        self.rows
            .iter()
            .filter(|m| *m.value() == RowMarker::InFlight)
            .count()
    }
}

/// Holds a row in `InFlight` for the length of one decision
#[must_use]
struct InFlightGuard<'a> {
    markers: &'a RowMarkers,
    request_id: i64,
    settled: bool,
}

impl InFlightGuard<'_> {
    fn settle(mut self) {
        self.markers.settle(self.request_id);
        self.settled = true;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.markers.release(self.request_id);
        }
    }
}

/// Bumped after every accepted decision so aggregate counters know to refetch
#[derive(Debug)]
pub struct RefreshSignal {
    epoch: watch::Sender<u64>,
}

impl Default for RefreshSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshSignal {
    pub fn new() -> Self {
        let (epoch, _) = watch::channel(0);
        Self { epoch }
    }

    pub fn notify(&self) {
        self.epoch.send_modify(|epoch| *epoch += 1);
    }

    pub fn current(&self) -> u64 {
        *self.epoch.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.epoch.subscribe()
    }
}

#[derive(Debug, Clone)]
pub struct QueueRow {
    pub request: LifecycleRequest,
    pub marker: RowMarker,
}

#[derive(Debug, Clone)]
pub struct PendingQueue {
    pub rows: Vec<QueueRow>,
    /// Size of the whole backend collection, all statuses
    pub total_elements: u64,
}

/// Keeps only the `PENDING` requests of a page
pub fn pending_only(page: Page<LifecycleRequest>) -> Vec<LifecycleRequest> {
    page.content.into_iter().filter(|r| r.is_pending()).collect()
}

#[derive(Debug, Default)]
pub struct ApprovalConsole {
    markers: RowMarkers,
    refresh: RefreshSignal,
}

impl ApprovalConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn markers(&self) -> &RowMarkers {
        &self.markers
    }

    pub fn refresh_signal(&self) -> &RefreshSignal {
        &self.refresh
    }

    #[tracing::instrument(skip(self, gateway))]
    pub async fn load_pending(
        &self,
        gateway: &GatewayClient,
        page: u64,
        size: u64,
    ) -> Result<PendingQueue, GatewayError> {
        let page = gateway.list_requests(backend_index(page), size).await?;
        let total_elements = page.total_elements;
        let pending = pending_only(page);

        let pending_ids: HashSet<i64> = pending.iter().map(|r| r.request_id).collect();
        self.markers.prune_settled(&pending_ids);

        let rows = pending
            .into_iter()
            .map(|request| QueueRow {
                marker: self.markers.get(request.request_id),
                request,
            })
            .collect();

        Ok(PendingQueue {
            rows,
            total_elements,
        })
    }

    /// Sends an approve/reject decision. On success the row is settled and
    /// counters are told to refetch; on failure the row is idle again.
    #[tracing::instrument(skip(self, gateway))]
    pub async fn decide(
        &self,
        gateway: &GatewayClient,
        request_id: i64,
        approve: bool,
    ) -> Result<LifecycleRequest, ApprovalError> {
        let guard = self.markers.begin(request_id)?;

        match gateway.process_request(request_id, approve).await {
            Ok(request) => {
                guard.settle();
                self.refresh.notify();

                tracing::info!(
                    request_id,
                    approve,
                    status = request.status_code.code(),
                    "Decision recorded"
                );

                Ok(request)
            }
            Err(err) => {
                drop(guard);

                tracing::warn!(request_id, approve, error = %err, "Decision failed");

                Err(err.into())
            }
        }
    }
}
