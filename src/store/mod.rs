//! Store handle for gift rooms and the wallet ledger.
//!
//! Every method that changes state is one atomic unit: either the whole
//! transition (balances, reservation, room counters, claim record) commits or
//! none of it does. Backends share the pure transition rules in this module so
//! the in-memory and Postgres stores decide identically.

pub mod memory;

pub use memory::MemoryStore;

use crate::error::{AppError, AppResult};
use crate::models::{
    Account, ContactInfo, GiftClaim, GiftRoom, HolderRef, Reservation, ReservationStatus,
    RoomStatus, RoomType, Wallet, WalletTransaction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Take a slot in a room
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub room_id: Uuid,
    pub holder: HolderRef,
    pub device_fingerprint_hash: String,
    pub contact: Option<ContactInfo>,
    /// Active reservations one device may hold on a public room
    pub max_reservations_per_device: i64,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub reservation: Reservation,
    pub room: GiftRoom,
    /// False when the holder already had a reservation and it was returned as-is
    pub created: bool,
}

/// Convert a held reservation into a wallet credit
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub reservation_id: Uuid,
    pub claimant_id: Uuid,
    /// Needed to bind an anonymous (device) hold to the claimant's account
    pub device_fingerprint_hash: Option<String>,
    pub referral_bonus: Decimal,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    pub claim: GiftClaim,
    pub reservation: Reservation,
    pub room: GiftRoom,
    /// True when the reservation had been claimed by an earlier call
    pub already_claimed: bool,
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub room_id: Uuid,
    pub creator_id: Uuid,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub room: GiftRoom,
    pub refund_amount: Decimal,
    pub unclaimed_count: i32,
    pub released_reservations: i32,
}

/// A room finalised by the expiration sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredRoom {
    pub room_id: Uuid,
    pub creator_id: Uuid,
    pub released_reservations: i32,
}

#[async_trait]
pub trait GiftRoomStore: Send + Sync {
    // Accounts and wallet ledger

    async fn create_account(
        &self,
        display_name: &str,
        referred_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> AppResult<Account>;

    async fn find_account(&self, id: Uuid) -> AppResult<Option<Account>>;

    /// Externally funded top-up; marks the account as funded
    async fn deposit(&self, account_id: Uuid, amount: Decimal, now: DateTime<Utc>) -> AppResult<Wallet>;

    async fn wallet(&self, account_id: Uuid) -> AppResult<Option<Wallet>>;

    async fn wallet_transactions(&self, account_id: Uuid, limit: i64) -> AppResult<Vec<WalletTransaction>>;

    // Rooms

    /// Debit the escrow from the creator and persist the room as `active`
    async fn create_room(&self, room: GiftRoom) -> AppResult<GiftRoom>;

    async fn find_room(&self, id: Uuid) -> AppResult<Option<GiftRoom>>;

    async fn find_room_by_token(&self, token: &str) -> AppResult<Option<GiftRoom>>;

    async fn rooms_by_creator(&self, creator_id: Uuid, limit: i64) -> AppResult<Vec<GiftRoom>>;

    // Reservations and claims

    async fn find_reservation(&self, id: Uuid) -> AppResult<Option<Reservation>>;

    async fn find_active_reservation(
        &self,
        room_id: Uuid,
        holder: &HolderRef,
    ) -> AppResult<Option<Reservation>>;

    async fn find_reservation_by_device(
        &self,
        room_id: Uuid,
        device_fingerprint_hash: &str,
    ) -> AppResult<Option<Reservation>>;

    async fn join_room(&self, request: JoinRequest) -> AppResult<JoinOutcome>;

    async fn claim_reservation(&self, request: ClaimRequest) -> AppResult<ClaimOutcome>;

    async fn find_claim_by_reservation(&self, reservation_id: Uuid) -> AppResult<Option<GiftClaim>>;

    async fn claims_by_account(&self, account_id: Uuid, limit: i64) -> AppResult<Vec<GiftClaim>>;

    // Expiry and refunds

    async fn refund_room(&self, request: RefundRequest) -> AppResult<RefundOutcome>;

    /// Finalise rooms whose `expires_at` is before `cutoff`, at most `limit` of them
    async fn expire_due_rooms(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<ExpiredRoom>>;
}

#[derive(Debug, Clone)]
pub enum JoinPlan {
    /// Holder already has a slot; hand it back so retries are safe
    Existing(Reservation),
    Insert,
}

/// Decide a join against the locked room row
pub fn plan_join(
    room: &GiftRoom,
    existing: Option<Reservation>,
    device_reservations: i64,
    request: &JoinRequest,
) -> AppResult<JoinPlan> {
    if let Some(existing) = existing {
        return Ok(JoinPlan::Existing(existing));
    }

    if request.holder.account_id() == Some(room.creator_id) {
        return Err(AppError::Validation(
            "Creators cannot join their own gift room".to_string(),
        ));
    }

    room.check_joinable(request.now)?;

    if room.room_type_enum() == RoomType::Public
        && device_reservations >= request.max_reservations_per_device
    {
        return Err(AppError::DeviceLimitReached);
    }

    Ok(JoinPlan::Insert)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimPlan {
    AlreadyClaimed,
    /// `rebind` moves an anonymous hold onto the claimant's account
    Claim { rebind: bool },
}

/// Decide a claim against the locked room and reservation rows.
///
/// `claimant_holds_other` is whether the claimant already has a different
/// active reservation in the same room.
pub fn plan_claim(
    reservation: &Reservation,
    room: &GiftRoom,
    request: &ClaimRequest,
    claimant_holds_other: bool,
) -> AppResult<ClaimPlan> {
    match reservation.status_enum() {
        ReservationStatus::Claimed => {
            return if reservation.claimed_by == Some(request.claimant_id) {
                Ok(ClaimPlan::AlreadyClaimed)
            } else {
                Err(AppError::Unauthorized(
                    "Reservation was claimed by another account".to_string(),
                ))
            };
        }
        ReservationStatus::Expired => return Err(AppError::GiftExpired),
        ReservationStatus::Held => {}
    }

    if room.status_enum() == RoomStatus::Cancelled {
        return Err(AppError::GiftExpired);
    }

    match reservation.holder()? {
        HolderRef::Account(holder) if holder == request.claimant_id => {
            Ok(ClaimPlan::Claim { rebind: false })
        }
        HolderRef::Account(_) => Err(AppError::Unauthorized(
            "Reservation belongs to another account".to_string(),
        )),
        HolderRef::Device(_) => {
            let same_device = request.device_fingerprint_hash.as_deref()
                == Some(reservation.device_fingerprint_hash.as_str());
            if !same_device {
                return Err(AppError::Unauthorized(
                    "Anonymous reservations can only be claimed from the device that made them"
                        .to_string(),
                ));
            }
            if claimant_holds_other {
                return Err(AppError::BusinessLogic(
                    "Account already holds a reservation in this room".to_string(),
                ));
            }
            Ok(ClaimPlan::Claim { rebind: true })
        }
    }
}

/// Bonus owed to the creator when the claimant is their first-time-funded referral
pub fn referral_bonus_due(claimant: &Account, creator_id: Uuid, bonus: Decimal) -> Option<Decimal> {
    let eligible = bonus > Decimal::ZERO
        && claimant.id != creator_id
        && claimant.referred_by == Some(creator_id)
        && !claimant.is_funded()
        && !claimant.referral_bonus_paid;

    eligible.then_some(bonus)
}
