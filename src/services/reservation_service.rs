use crate::clock::Clock;
use crate::config::GiftRoomConfig;
use crate::error::{AppError, AppResult};
use crate::models::{ContactInfo, GiftRoom, HolderRef, Reservation};
use crate::services::audit::AuditTrailService;
use crate::services::device_identity::hash_fingerprint;
use crate::services::rate_limit::RateLimiter;
use crate::services::retry::RetryPolicy;
use crate::store::{GiftRoomStore, JoinRequest};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const MAX_FINGERPRINT_LEN: usize = 512;

/// Who is asking to join, as seen by the HTTP layer
#[derive(Debug, Clone, Default)]
pub struct JoinCaller {
    pub account_id: Option<Uuid>,
    pub client_ip: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinResult {
    pub reservation: Reservation,
    pub room: GiftRoom,
    /// The holder already had a slot in this room; nothing new was taken
    pub already_reserved: bool,
}

/// Service for taking capacity slots in rooms
pub struct ReservationService {
    store: Arc<dyn GiftRoomStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditTrailService>,
    config: GiftRoomConfig,
    retry: RetryPolicy,
    limiter: RateLimiter,
}

impl ReservationService {
    pub fn new(
        store: Arc<dyn GiftRoomStore>,
        clock: Arc<dyn Clock>,
        audit: Arc<AuditTrailService>,
        config: GiftRoomConfig,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config);
        let limiter = RateLimiter::per_minute(config.join_rate_limit_per_minute);
        Self {
            store,
            clock,
            audit,
            config,
            retry,
            limiter,
        }
    }

    /// Reserve a slot in the room behind `room_token`.
    ///
    /// Authenticated callers hold the slot with their account; anonymous
    /// callers hold it with their hashed device fingerprint. Joining twice
    /// returns the existing reservation.
    pub async fn join(
        &self,
        room_token: &str,
        caller: JoinCaller,
        device_fingerprint: &str,
        contact: Option<ContactInfo>,
    ) -> AppResult<JoinResult> {
        let fingerprint = device_fingerprint.trim();
        if fingerprint.is_empty() {
            return Err(AppError::Validation("device_fingerprint is required".to_string()));
        }
        if fingerprint.len() > MAX_FINGERPRINT_LEN {
            return Err(AppError::Validation("device_fingerprint is too long".to_string()));
        }
        let contact = contact.filter(|c| !c.is_empty());
        if let Some(contact) = &contact {
            contact.validate()?;
        }

        let device_hash = hash_fingerprint(fingerprint, &self.config.device_salt);

        let mut keys = vec![format!("device:{}", device_hash)];
        if let Some(ip) = &caller.client_ip {
            keys.push(format!("ip:{}", ip));
        }
        if let Some(account_id) = caller.account_id {
            keys.push(format!("account:{}", account_id));
        }
        self.limiter.check(&keys, self.clock.now()).await?;

        let room = self
            .store
            .find_room_by_token(room_token)
            .await?
            .ok_or(AppError::RoomNotFound)?;

        let holder = match caller.account_id {
            Some(account_id) => HolderRef::Account(account_id),
            None => HolderRef::Device(device_hash.clone()),
        };

        debug!("Join attempt on room {} by {} holder", room.id, holder.kind());

        let request = JoinRequest {
            room_id: room.id,
            holder,
            device_fingerprint_hash: device_hash,
            contact,
            max_reservations_per_device: self.config.max_reservations_per_device,
            now: self.clock.now(),
        };

        let outcome = self
            .retry
            .run("join_room", || self.store.join_room(request.clone()))
            .await?;

        if outcome.created {
            info!(
                "Reservation {} created in room {} ({}/{})",
                outcome.reservation.id, outcome.room.id, outcome.room.joined_count, outcome.room.capacity
            );
            self.audit
                .log_reservation_created(&outcome.reservation, &outcome.room)
                .await;
        }

        Ok(JoinResult {
            reservation: outcome.reservation,
            room: outcome.room,
            already_reserved: !outcome.created,
        })
    }
}
