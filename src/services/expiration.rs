use crate::clock::Clock;
use crate::config::GiftRoomConfig;
use crate::error::AppResult;
use crate::services::audit::AuditTrailService;
use crate::store::GiftRoomStore;
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info};

/// Background task that persists expiry for rooms past their deadline.
///
/// A room is finalised once it has been expired for longer than the claim
/// grace window: its remaining holds become `expired` and stop counting
/// towards `joined_count`. Reads derive expiry lazily before that happens.
pub struct ExpirationSweeper {
    store: Arc<dyn GiftRoomStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditTrailService>,
    sweep_interval: Duration,
    grace: ChronoDuration,
    batch_size: i64,
}

impl ExpirationSweeper {
    pub fn new(
        store: Arc<dyn GiftRoomStore>,
        clock: Arc<dyn Clock>,
        audit: Arc<AuditTrailService>,
        config: &GiftRoomConfig,
    ) -> Self {
        Self {
            store,
            clock,
            audit,
            sweep_interval: config.sweep_interval(),
            grace: config.claim_grace(),
            batch_size: config.sweep_batch_size.max(1),
        }
    }

    /// Start the sweeper background task
    pub async fn start(self) {
        let mut interval = time::interval(self.sweep_interval);
        info!("Expiration sweeper started, will sweep every {:?}", self.sweep_interval);

        loop {
            interval.tick().await;

            if let Err(e) = self.sweep_once().await {
                error!("Error sweeping expired gift rooms: {}", e);
            }
        }
    }

    /// Finalise every room due at this instant, batch by batch. Returns how many were expired.
    pub async fn sweep_once(&self) -> AppResult<usize> {
        let now = self.clock.now();
        let cutoff = now - self.grace;
        let mut total = 0;

        loop {
            let expired = self
                .store
                .expire_due_rooms(cutoff, now, self.batch_size)
                .await?;
            let count = expired.len();
            total += count;

            if count > 0 {
                let released: i32 = expired.iter().map(|r| r.released_reservations).sum();
                info!("Expired {} gift rooms, released {} held reservations", count, released);
                self.audit.log_rooms_expired(&expired, now).await;
            }

            if (count as i64) < self.batch_size {
                break;
            }
        }

        Ok(total)
    }
}
