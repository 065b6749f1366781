use crate::clock::Clock;
use crate::config::GiftRoomConfig;
use crate::error::{AppError, AppResult};
use crate::models::{GiftRoom, RoomStatus};
use crate::services::audit::AuditTrailService;
use crate::services::retry::RetryPolicy;
use crate::store::{GiftRoomStore, RefundOutcome, RefundRequest};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Refund eligibility as of now
#[derive(Debug, Clone, Serialize)]
pub struct RefundPreview {
    pub eligible: bool,
    /// Stable error code explaining why not, when not eligible
    pub reason: Option<String>,
    pub status: RoomStatus,
    pub unclaimed_count: i32,
    pub refund_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundResult {
    pub refund_amount: Decimal,
    pub unclaimed_count: i32,
    pub room: GiftRoom,
}

/// Service returning unclaimed escrow to room creators
pub struct RefundService {
    store: Arc<dyn GiftRoomStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditTrailService>,
    retry: RetryPolicy,
}

impl RefundService {
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
            retry: RetryPolicy::from_config(config),
        }
    }

    async fn owned_room(&self, room_id: Uuid, creator_id: Uuid) -> AppResult<GiftRoom> {
        let room = self
            .store
            .find_room(room_id)
            .await?
            .ok_or(AppError::RoomNotFound)?;
        if room.creator_id != creator_id {
            return Err(AppError::Unauthorized(
                "Only the room creator can request a refund".to_string(),
            ));
        }
        Ok(room)
    }

    pub async fn preview(&self, room_id: Uuid, creator_id: Uuid) -> AppResult<RefundPreview> {
        let room = self.owned_room(room_id, creator_id).await?;
        let now = self.clock.now();

        let (eligible, reason, refund_amount) = match room.check_refundable(now) {
            Ok(amount) => (true, None, amount),
            Err(e) => (false, Some(e.code().to_string()), Decimal::ZERO),
        };

        Ok(RefundPreview {
            eligible,
            reason,
            status: room.effective_status(now),
            unclaimed_count: room.unclaimed_count(),
            refund_amount,
        })
    }

    /// Credit the creator with the unclaimed escrow of an expired room, once
    pub async fn refund(&self, room_id: Uuid, creator_id: Uuid) -> AppResult<RefundResult> {
        let request = RefundRequest {
            room_id,
            creator_id,
            now: self.clock.now(),
        };

        let outcome: RefundOutcome = self
            .retry
            .run("refund_room", || self.store.refund_room(request.clone()))
            .await?;

        info!(
            "Refunded {} to creator {} for room {} ({} unclaimed, {} holds released)",
            outcome.refund_amount,
            creator_id,
            room_id,
            outcome.unclaimed_count,
            outcome.released_reservations
        );
        self.audit.log_room_refunded(&outcome).await;

        Ok(RefundResult {
            refund_amount: outcome.refund_amount,
            unclaimed_count: outcome.unclaimed_count,
            room: outcome.room,
        })
    }
}
