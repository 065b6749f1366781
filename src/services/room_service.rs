use crate::clock::Clock;
use crate::config::GiftRoomConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    CreatorInfo, GiftClaim, GiftRoom, HolderRef, NewGiftRoom, Reservation, RoomStatus, RoomType,
};
use crate::services::audit::AuditTrailService;
use crate::services::device_identity::hash_fingerprint;
use crate::services::retry::RetryPolicy;
use crate::store::GiftRoomStore;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const LISTING_LIMIT: i64 = 100;

/// Parameters of a room creation request
#[derive(Debug, Clone)]
pub struct CreateRoomInput {
    pub room_type: String,
    pub capacity: i32,
    pub amount: Decimal,
    pub message: Option<String>,
    pub expiration_hours: Option<i64>,
}

/// A room together with values derived at read time
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    #[serde(flatten)]
    pub room: GiftRoom,
    pub effective_status: RoomStatus,
    pub spots_remaining: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomDetails {
    pub room: GiftRoom,
    pub creator: CreatorInfo,
    pub status: RoomStatus,
    pub spots_remaining: i32,
    /// The caller's own reservation, if the account or device already holds one
    pub reservation: Option<Reservation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GiftHistory {
    /// Gifts the caller received
    pub claims: Vec<GiftClaim>,
    /// Rooms the caller opened that reached a terminal state
    pub rooms: Vec<RoomSummary>,
}

/// Service for opening and reading gift rooms
pub struct RoomService {
    store: Arc<dyn GiftRoomStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditTrailService>,
    config: GiftRoomConfig,
    retry: RetryPolicy,
}

impl RoomService {
    pub fn new(
        store: Arc<dyn GiftRoomStore>,
        clock: Arc<dyn Clock>,
        audit: Arc<AuditTrailService>,
        config: GiftRoomConfig,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            store,
            clock,
            audit,
            config,
            retry,
        }
    }

    fn summarize(&self, room: GiftRoom) -> RoomSummary {
        let now = self.clock.now();
        RoomSummary {
            effective_status: room.effective_status(now),
            spots_remaining: room.spots_remaining(),
            room,
        }
    }

    /// Open a room and escrow `capacity × amount` from the creator
    pub async fn create_room(&self, creator_id: Uuid, input: CreateRoomInput) -> AppResult<GiftRoom> {
        let room_type = RoomType::from_str(&input.room_type).map_err(AppError::Validation)?;
        let new_room = NewGiftRoom {
            creator_id,
            room_type,
            capacity: input.capacity,
            amount_per_gift: input.amount,
            message: input.message,
            expiration_hours: input
                .expiration_hours
                .unwrap_or(self.config.default_expiration_hours),
        };
        new_room.validate(self.config.min_amount_per_gift)?;
        let escrow = new_room.escrow_total()?;

        info!(
            "Creating {} gift room: creator={}, capacity={}, amount={}",
            room_type.as_str(),
            creator_id,
            new_room.capacity,
            new_room.amount_per_gift
        );

        let room = new_room.into_room(self.clock.now());

        // A retried escrow debit could charge twice, so one attempt only
        let room = self
            .retry
            .single_attempt()
            .run("create_room", || self.store.create_room(room.clone()))
            .await?;

        info!(
            "Gift room {} created, escrowed {}",
            room.id,
            escrow
        );
        self.audit.log_room_created(&room).await;

        Ok(room)
    }

    /// Room view for a share link; never mutates anything
    pub async fn get_room_details(
        &self,
        token: &str,
        device_fingerprint: Option<&str>,
        viewer: Option<Uuid>,
    ) -> AppResult<RoomDetails> {
        let room = self
            .store
            .find_room_by_token(token)
            .await?
            .ok_or(AppError::RoomNotFound)?;

        let creator = self
            .store
            .find_account(room.creator_id)
            .await?
            .map(|account| CreatorInfo::from(&account))
            .ok_or_else(|| AppError::NotFound("Room creator not found".to_string()))?;

        let mut reservation = None;
        if let Some(account_id) = viewer {
            reservation = self
                .store
                .find_active_reservation(room.id, &HolderRef::Account(account_id))
                .await?;
        }
        if reservation.is_none() {
            if let Some(raw) = device_fingerprint.filter(|fp| !fp.trim().is_empty()) {
                let hash = hash_fingerprint(raw, &self.config.device_salt);
                reservation = self.store.find_reservation_by_device(room.id, &hash).await?;
            }
        }

        Ok(RoomDetails {
            status: room.effective_status(self.clock.now()),
            spots_remaining: room.spots_remaining(),
            creator,
            reservation,
            room,
        })
    }

    pub async fn my_rooms(&self, creator_id: Uuid) -> AppResult<Vec<RoomSummary>> {
        let rooms = self.store.rooms_by_creator(creator_id, LISTING_LIMIT).await?;
        Ok(rooms.into_iter().map(|room| self.summarize(room)).collect())
    }

    pub async fn history(&self, account_id: Uuid) -> AppResult<GiftHistory> {
        let claims = self.store.claims_by_account(account_id, LISTING_LIMIT).await?;
        let rooms = self
            .store
            .rooms_by_creator(account_id, LISTING_LIMIT)
            .await?
            .into_iter()
            .map(|room| self.summarize(room))
            .filter(|summary| {
                matches!(
                    summary.effective_status,
                    RoomStatus::Expired | RoomStatus::Cancelled
                )
            })
            .collect();

        Ok(GiftHistory { claims, rooms })
    }
}
