use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex};

use crate::models::CardStatus;
use crate::services::gateway::{GatewayClient, GatewayError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardStats {
    pub total_cards: u64,
    pub active_cards: u64,
    pub inactive_cards: u64,
    pub pending_approvals: u64,
}

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    epoch: u64,
    fetched_at: Instant,
    stats: DashboardStats,
}

/// Aggregate counts for the dashboard.
///
/// A snapshot is reused until the approval console bumps the refresh epoch or
/// the snapshot is older than `ttl`.
#[derive(Debug)]
pub struct DashboardCounters {
    epoch: watch::Receiver<u64>,
    ttl: Duration,
    stats_window: u64,
    pending_window: u64,
    cached: Mutex<Option<Snapshot>>,
}

impl DashboardCounters {
    pub fn new(
        epoch: watch::Receiver<u64>,
        ttl: Duration,
        stats_window: u64,
        pending_window: u64,
    ) -> Self {
        Self {
            epoch,
            ttl,
            stats_window,
            pending_window,
            cached: Mutex::new(None),
        }
    }

    /// Cached counts, refetched when stale. Only an expired session is an
    /// error; any other failed source counts as zero.
    pub async fn stats(&self, gateway: &GatewayClient) -> Result<DashboardStats, GatewayError> {
        let epoch = *self.epoch.borrow();
        let mut cached = self.cached.lock().await;

        if let Some(snapshot) = cached.as_ref() {
            if snapshot.epoch == epoch && snapshot.fetched_at.elapsed() < self.ttl {
                return Ok(snapshot.stats);
            }
        }

        let stats = self.fetch(gateway).await?;
        *cached = Some(Snapshot {
            epoch,
            fetched_at: Instant::now(),
            stats,
        });

        Ok(stats)
    }

    async fn fetch(&self, gateway: &GatewayClient) -> Result<DashboardStats, GatewayError> {
        let (cards, requests) = tokio::join!(
            gateway.list_cards(0, self.stats_window),
            gateway.list_requests(0, self.pending_window),
        );

        let mut stats = DashboardStats::default();

        match cards {
            Ok(page) => {
                stats.total_cards = page.total_elements;
                stats.active_cards = count_status(&page.content, CardStatus::Active);
                stats.inactive_cards = count_status(&page.content, CardStatus::Inactive);
            }
            Err(err @ (GatewayError::Unauthorized | GatewayError::Cancelled)) => return Err(err),
            Err(err) => tracing::warn!(error = %err, "Card stats unavailable"),
        }

        match requests {
            Ok(page) => {
                stats.pending_approvals =
                    page.content.iter().filter(|r| r.is_pending()).count() as u64;
            }
            Err(err @ (GatewayError::Unauthorized | GatewayError::Cancelled)) => return Err(err),
            Err(err) => tracing::warn!(error = %err, "Pending count unavailable"),
        }

        tracing::debug!(?stats, "Dashboard counters refreshed");

        Ok(stats)
    }
}

fn count_status(cards: &[crate::models::Card], status: CardStatus) -> u64 {
    cards.iter().filter(|c| c.status_code == status).count() as u64
}
