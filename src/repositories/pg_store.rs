//! Postgres-backed [`GiftRoomStore`].
//!
//! Each state transition runs in one transaction. Rows are locked in a fixed
//! order (room, reservation, account, wallets by id) so concurrent joins,
//! claims, refunds and sweeps serialise on the room row instead of deadlocking.

use super::{
    AccountRepository, ClaimRepository, GiftRoomRepository, ReservationRepository,
    WalletRepository,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    Account, GiftClaim, GiftRoom, HolderRef, LedgerEntry, Reservation, TransactionType, Wallet,
    WalletTransaction,
};
use crate::store::{
    plan_claim, plan_join, referral_bonus_due, ClaimOutcome, ClaimPlan, ClaimRequest, ExpiredRoom,
    GiftRoomStore, JoinOutcome, JoinPlan, JoinRequest, RefundOutcome, RefundRequest,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

pub struct PgGiftRoomStore {
    pool: PgPool,
    accounts: AccountRepository,
    wallets: WalletRepository,
    rooms: GiftRoomRepository,
    reservations: ReservationRepository,
    claims: ClaimRepository,
}

impl PgGiftRoomStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            accounts: AccountRepository::new(pool.clone()),
            wallets: WalletRepository::new(pool.clone()),
            rooms: GiftRoomRepository::new(pool.clone()),
            reservations: ReservationRepository::new(pool.clone()),
            claims: ClaimRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl GiftRoomStore for PgGiftRoomStore {
    async fn create_account(
        &self,
        display_name: &str,
        referred_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> AppResult<Account> {
        if let Some(referrer) = referred_by {
            if self.accounts.find_by_id(referrer).await?.is_none() {
                return Err(AppError::NotFound(format!("Referrer {} not found", referrer)));
            }
        }

        Ok(self.accounts.create(display_name, referred_by, now).await?)
    }

    async fn find_account(&self, id: Uuid) -> AppResult<Option<Account>> {
        Ok(self.accounts.find_by_id(id).await?)
    }

    async fn deposit(&self, account_id: Uuid, amount: Decimal, now: DateTime<Utc>) -> AppResult<Wallet> {
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation("Deposit amount must be positive".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        AccountRepository::lock(&mut *tx, account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", account_id)))?;

        let wallet = WalletRepository::apply(
            &mut *tx,
            &LedgerEntry {
                account_id,
                amount,
                tx_type: TransactionType::Deposit,
                reference_id: None,
                description: "Wallet deposit",
            },
            now,
        )
        .await?;
        AccountRepository::mark_funded(&mut *tx, account_id, now).await?;

        tx.commit().await?;
        Ok(wallet)
    }

    async fn wallet(&self, account_id: Uuid) -> AppResult<Option<Wallet>> {
        Ok(self.wallets.get(account_id).await?)
    }

    async fn wallet_transactions(&self, account_id: Uuid, limit: i64) -> AppResult<Vec<WalletTransaction>> {
        Ok(self.wallets.transactions(account_id, limit).await?)
    }

    async fn create_room(&self, room: GiftRoom) -> AppResult<GiftRoom> {
        let mut tx = self.pool.begin().await?;

        AccountRepository::lock(&mut *tx, room.creator_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", room.creator_id)))?;

        WalletRepository::apply(
            &mut *tx,
            &LedgerEntry {
                account_id: room.creator_id,
                amount: room.escrow_total()?,
                tx_type: TransactionType::GiftEscrow,
                reference_id: Some(room.id),
                description: "Gift room escrow",
            },
            room.created_at,
        )
        .await?;
        let room = GiftRoomRepository::insert(&mut *tx, &room).await?;

        tx.commit().await?;
        debug!("Stored gift room {}", room.id);
        Ok(room)
    }

    async fn find_room(&self, id: Uuid) -> AppResult<Option<GiftRoom>> {
        Ok(self.rooms.find_by_id(id).await?)
    }

    async fn find_room_by_token(&self, token: &str) -> AppResult<Option<GiftRoom>> {
        Ok(self.rooms.find_by_token(token).await?)
    }

    async fn rooms_by_creator(&self, creator_id: Uuid, limit: i64) -> AppResult<Vec<GiftRoom>> {
        Ok(self.rooms.find_by_creator(creator_id, limit).await?)
    }

    async fn find_reservation(&self, id: Uuid) -> AppResult<Option<Reservation>> {
        Ok(self.reservations.find_by_id(id).await?)
    }

    async fn find_active_reservation(
        &self,
        room_id: Uuid,
        holder: &HolderRef,
    ) -> AppResult<Option<Reservation>> {
        Ok(self.reservations.find_active_for_holder(room_id, holder).await?)
    }

    async fn find_reservation_by_device(
        &self,
        room_id: Uuid,
        device_fingerprint_hash: &str,
    ) -> AppResult<Option<Reservation>> {
        Ok(self
            .reservations
            .find_active_for_device(room_id, device_fingerprint_hash)
            .await?)
    }

    async fn join_room(&self, request: JoinRequest) -> AppResult<JoinOutcome> {
        let mut tx = self.pool.begin().await?;

        let room = GiftRoomRepository::lock(&mut *tx, request.room_id)
            .await?
            .ok_or(AppError::RoomNotFound)?;
        let existing =
            ReservationRepository::active_for_holder(&mut *tx, room.id, &request.holder).await?;
        let device_count = ReservationRepository::count_active_for_device(
            &mut *tx,
            room.id,
            &request.device_fingerprint_hash,
        )
        .await?;

        match plan_join(&room, existing, device_count, &request)? {
            JoinPlan::Existing(reservation) => {
                // Nothing written; dropping the transaction releases the room lock
                Ok(JoinOutcome {
                    reservation,
                    room,
                    created: false,
                })
            }
            JoinPlan::Insert => {
                let reservation = Reservation::new(
                    room.id,
                    &request.holder,
                    request.device_fingerprint_hash.clone(),
                    request.contact.clone(),
                    request.now,
                );
                let reservation = ReservationRepository::insert(&mut *tx, &reservation).await?;

                let mut room = room;
                room.record_join();
                let room = GiftRoomRepository::save_state(&mut *tx, &room).await?;

                tx.commit().await?;
                Ok(JoinOutcome {
                    reservation,
                    room,
                    created: true,
                })
            }
        }
    }

    async fn claim_reservation(&self, request: ClaimRequest) -> AppResult<ClaimOutcome> {
        // Unlocked read only to learn the room; the room lock comes first
        let room_id = self
            .reservations
            .find_by_id(request.reservation_id)
            .await?
            .ok_or(AppError::ReservationNotFound)?
            .room_id;

        let mut tx = self.pool.begin().await?;

        let room = GiftRoomRepository::lock(&mut *tx, room_id)
            .await?
            .ok_or(AppError::RoomNotFound)?;
        let reservation = ReservationRepository::lock(&mut *tx, request.reservation_id)
            .await?
            .ok_or(AppError::ReservationNotFound)?;

        let claimant_holds_other = ReservationRepository::active_for_holder(
            &mut *tx,
            room.id,
            &HolderRef::Account(request.claimant_id),
        )
        .await?
        .map(|other| other.id != reservation.id)
        .unwrap_or(false);

        let rebind = match plan_claim(&reservation, &room, &request, claimant_holds_other)? {
            ClaimPlan::AlreadyClaimed => {
                let claim = ClaimRepository::find_by_reservation_in(&mut *tx, reservation.id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Claim record missing".to_string()))?;
                return Ok(ClaimOutcome {
                    claim,
                    reservation,
                    room,
                    already_claimed: true,
                });
            }
            ClaimPlan::Claim { rebind } => rebind,
        };

        let claimant = AccountRepository::lock(&mut *tx, request.claimant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", request.claimant_id)))?;
        let bonus = referral_bonus_due(&claimant, room.creator_id, request.referral_bonus);

        let mut wallet_ids = vec![claimant.id];
        if bonus.is_some() {
            wallet_ids.push(room.creator_id);
        }
        WalletRepository::lock_all(&mut *tx, &wallet_ids).await?;

        WalletRepository::apply(
            &mut *tx,
            &LedgerEntry {
                account_id: claimant.id,
                amount: room.amount_per_gift,
                tx_type: TransactionType::GiftClaim,
                reference_id: Some(reservation.id),
                description: "Gift room claim",
            },
            request.now,
        )
        .await?;
        AccountRepository::mark_funded(&mut *tx, claimant.id, request.now).await?;

        if let Some(bonus) = bonus {
            WalletRepository::apply(
                &mut *tx,
                &LedgerEntry {
                    account_id: room.creator_id,
                    amount: bonus,
                    tx_type: TransactionType::ReferralBonus,
                    reference_id: Some(reservation.id),
                    description: "Referral bonus",
                },
                request.now,
            )
            .await?;
            AccountRepository::mark_referral_bonus_paid(&mut *tx, claimant.id).await?;
        }

        let mut reservation = reservation;
        reservation.mark_claimed(claimant.id, rebind, request.now);
        let reservation = ReservationRepository::save_claimed(&mut *tx, &reservation).await?;

        let mut room = room;
        room.record_claim();
        let room = GiftRoomRepository::save_state(&mut *tx, &room).await?;

        let claim = GiftClaim::new(
            reservation.id,
            room.id,
            claimant.id,
            room.amount_per_gift,
            bonus,
            request.now,
        );
        let claim = ClaimRepository::insert(&mut *tx, &claim).await?;

        tx.commit().await?;
        Ok(ClaimOutcome {
            claim,
            reservation,
            room,
            already_claimed: false,
        })
    }

    async fn find_claim_by_reservation(&self, reservation_id: Uuid) -> AppResult<Option<GiftClaim>> {
        Ok(self.claims.find_by_reservation(reservation_id).await?)
    }

    async fn claims_by_account(&self, account_id: Uuid, limit: i64) -> AppResult<Vec<GiftClaim>> {
        Ok(self.claims.find_by_account(account_id, limit).await?)
    }

    async fn refund_room(&self, request: RefundRequest) -> AppResult<RefundOutcome> {
        let mut tx = self.pool.begin().await?;

        let mut room = GiftRoomRepository::lock(&mut *tx, request.room_id)
            .await?
            .ok_or(AppError::RoomNotFound)?;

        if room.creator_id != request.creator_id {
            return Err(AppError::Unauthorized(
                "Only the room creator can request a refund".to_string(),
            ));
        }

        let refund_amount = room.check_refundable(request.now)?;
        let unclaimed_count = room.unclaimed_count();

        let released = ReservationRepository::expire_held(&mut *tx, room.id, request.now).await?;
        room.mark_refunded(refund_amount, released, request.now);
        let room = GiftRoomRepository::save_state(&mut *tx, &room).await?;

        WalletRepository::apply(
            &mut *tx,
            &LedgerEntry {
                account_id: room.creator_id,
                amount: refund_amount,
                tx_type: TransactionType::GiftRefund,
                reference_id: Some(room.id),
                description: "Gift room refund",
            },
            request.now,
        )
        .await?;

        tx.commit().await?;
        Ok(RefundOutcome {
            room,
            refund_amount,
            unclaimed_count,
            released_reservations: released,
        })
    }

    async fn expire_due_rooms(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<ExpiredRoom>> {
        let mut tx = self.pool.begin().await?;

        let due = GiftRoomRepository::lock_due(&mut *tx, cutoff, limit).await?;
        let mut expired = Vec::with_capacity(due.len());

        for mut room in due {
            let released = ReservationRepository::expire_held(&mut *tx, room.id, now).await?;
            room.mark_expired(released);
            GiftRoomRepository::save_state(&mut *tx, &room).await?;
            expired.push(ExpiredRoom {
                room_id: room.id,
                creator_id: room.creator_id,
                released_reservations: released,
            });
        }

        tx.commit().await?;

        if !expired.is_empty() {
            info!("Expired {} gift rooms in Postgres", expired.len());
        }
        Ok(expired)
    }
}
