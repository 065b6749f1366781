//! Single-process store behind one async mutex.
//!
//! Each operation holds the lock for its whole transition, which makes the
//! backend serialisable by construction. It does not coordinate across
//! processes and is meant for local development and tests; production runs on
//! [`crate::repositories::PgGiftRoomStore`].

use super::{
    plan_claim, plan_join, referral_bonus_due, ClaimOutcome, ClaimPlan, ClaimRequest,
    ExpiredRoom, GiftRoomStore, JoinOutcome, JoinPlan, JoinRequest, RefundOutcome, RefundRequest,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    checked_ledger_add, Account, GiftClaim, GiftRoom, HolderRef, LedgerEntry, Reservation,
    ReservationStatus, RoomStatus, TransactionType, Wallet, WalletTransaction, MAX_LEDGER_AMOUNT,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<Uuid, Account>,
    wallets: HashMap<Uuid, Wallet>,
    transactions: Vec<WalletTransaction>,
    rooms: HashMap<Uuid, GiftRoom>,
    room_tokens: HashMap<String, Uuid>,
    reservations: HashMap<Uuid, Reservation>,
    /// Keyed by reservation id, one claim per reservation
    claims: HashMap<Uuid, GiftClaim>,
}

impl MemoryState {
    fn balance_of(&self, account_id: Uuid) -> Decimal {
        self.wallets
            .get(&account_id)
            .map(|w| w.balance)
            .unwrap_or(Decimal::ZERO)
    }

    /// Ledger primitive: apply one movement and record before/after values.
    /// Callers check every precondition before the first call so a failed
    /// operation never leaves a partial transition behind.
    fn apply(&mut self, entry: LedgerEntry, now: DateTime<Utc>) -> AppResult<Wallet> {
        let balance_before = self.balance_of(entry.account_id);
        let balance_after = if entry.tx_type.is_debit() {
            if balance_before < entry.amount {
                return Err(AppError::InsufficientBalance {
                    available: balance_before,
                    required: entry.amount,
                });
            }
            balance_before - entry.amount
        } else {
            checked_ledger_add(balance_before, entry.amount).ok_or_else(|| {
                AppError::Validation(format!(
                    "Balance would exceed the maximum of {}",
                    MAX_LEDGER_AMOUNT
                ))
            })?
        };

        let wallet = self
            .wallets
            .entry(entry.account_id)
            .or_insert_with(|| Wallet::empty(entry.account_id, now));
        wallet.balance = balance_after;
        wallet.updated_at = now;
        let wallet = wallet.clone();

        self.transactions.push(WalletTransaction {
            id: Uuid::new_v4(),
            account_id: entry.account_id,
            transaction_type: entry.tx_type.as_str().to_string(),
            amount: entry.amount,
            balance_before,
            balance_after,
            reference_id: entry.reference_id,
            description: Some(entry.description.to_string()),
            created_at: now,
        });

        Ok(wallet)
    }

    fn mark_funded(&mut self, account_id: Uuid, now: DateTime<Utc>) {
        if let Some(account) = self.accounts.get_mut(&account_id) {
            if account.first_funded_at.is_none() {
                account.first_funded_at = Some(now);
            }
        }
    }

    fn active_reservation(&self, room_id: Uuid, holder: &HolderRef) -> Option<Reservation> {
        self.reservations
            .values()
            .find(|r| r.room_id == room_id && r.is_active() && r.is_held_by(holder))
            .cloned()
    }

    fn active_device_reservations(&self, room_id: Uuid, device_hash: &str) -> i64 {
        self.reservations
            .values()
            .filter(|r| {
                r.room_id == room_id && r.is_active() && r.device_fingerprint_hash == device_hash
            })
            .count() as i64
    }

    /// Expire every held reservation of a room, returning how many were released
    fn release_held(&mut self, room_id: Uuid, now: DateTime<Utc>) -> i32 {
        let mut released = 0;
        for reservation in self.reservations.values_mut() {
            if reservation.room_id == room_id && reservation.status_enum() == ReservationStatus::Held {
                reservation.mark_expired(now);
                released += 1;
            }
        }
        released
    }
}

/// In-process [`GiftRoomStore`]
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GiftRoomStore for MemoryStore {
    async fn create_account(
        &self,
        display_name: &str,
        referred_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> AppResult<Account> {
        let mut state = self.state.lock().await;
        if let Some(referrer) = referred_by {
            if !state.accounts.contains_key(&referrer) {
                return Err(AppError::NotFound(format!("Referrer {} not found", referrer)));
            }
        }

        let account = Account::new(display_name.to_string(), referred_by, now);
        state.wallets.insert(account.id, Wallet::empty(account.id, now));
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_account(&self, id: Uuid) -> AppResult<Option<Account>> {
        Ok(self.state.lock().await.accounts.get(&id).cloned())
    }

    async fn deposit(&self, account_id: Uuid, amount: Decimal, now: DateTime<Utc>) -> AppResult<Wallet> {
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation("Deposit amount must be positive".to_string()));
        }

        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&account_id) {
            return Err(AppError::NotFound(format!("Account {} not found", account_id)));
        }

        let wallet = state.apply(
            LedgerEntry {
                account_id,
                amount,
                tx_type: TransactionType::Deposit,
                reference_id: None,
                description: "Wallet deposit",
            },
            now,
        )?;
        state.mark_funded(account_id, now);
        Ok(wallet)
    }

    async fn wallet(&self, account_id: Uuid) -> AppResult<Option<Wallet>> {
        Ok(self.state.lock().await.wallets.get(&account_id).cloned())
    }

    async fn wallet_transactions(&self, account_id: Uuid, limit: i64) -> AppResult<Vec<WalletTransaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.account_id == account_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn create_room(&self, room: GiftRoom) -> AppResult<GiftRoom> {
        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&room.creator_id) {
            return Err(AppError::NotFound(format!("Account {} not found", room.creator_id)));
        }
        if state.room_tokens.contains_key(&room.token) {
            return Err(AppError::BusinessLogic("Duplicate: room token".to_string()));
        }

        state.apply(
            LedgerEntry {
                account_id: room.creator_id,
                amount: room.escrow_total()?,
                tx_type: TransactionType::GiftEscrow,
                reference_id: Some(room.id),
                description: "Gift room escrow",
            },
            room.created_at,
        )?;

        state.room_tokens.insert(room.token.clone(), room.id);
        state.rooms.insert(room.id, room.clone());
        debug!("Stored gift room {} in memory", room.id);
        Ok(room)
    }

    async fn find_room(&self, id: Uuid) -> AppResult<Option<GiftRoom>> {
        Ok(self.state.lock().await.rooms.get(&id).cloned())
    }

    async fn find_room_by_token(&self, token: &str) -> AppResult<Option<GiftRoom>> {
        let state = self.state.lock().await;
        Ok(state
            .room_tokens
            .get(token)
            .and_then(|id| state.rooms.get(id))
            .cloned())
    }

    async fn rooms_by_creator(&self, creator_id: Uuid, limit: i64) -> AppResult<Vec<GiftRoom>> {
        let state = self.state.lock().await;
        let mut rooms: Vec<GiftRoom> = state
            .rooms
            .values()
            .filter(|r| r.creator_id == creator_id)
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rooms.truncate(limit.max(0) as usize);
        Ok(rooms)
    }

    async fn find_reservation(&self, id: Uuid) -> AppResult<Option<Reservation>> {
        Ok(self.state.lock().await.reservations.get(&id).cloned())
    }

    async fn find_active_reservation(
        &self,
        room_id: Uuid,
        holder: &HolderRef,
    ) -> AppResult<Option<Reservation>> {
        Ok(self.state.lock().await.active_reservation(room_id, holder))
    }

    async fn find_reservation_by_device(
        &self,
        room_id: Uuid,
        device_fingerprint_hash: &str,
    ) -> AppResult<Option<Reservation>> {
        let state = self.state.lock().await;
        Ok(state
            .reservations
            .values()
            .filter(|r| {
                r.room_id == room_id
                    && r.is_active()
                    && r.device_fingerprint_hash == device_fingerprint_hash
            })
            .min_by_key(|r| r.created_at)
            .cloned())
    }

    async fn join_room(&self, request: JoinRequest) -> AppResult<JoinOutcome> {
        let mut state = self.state.lock().await;
        let room = state
            .rooms
            .get(&request.room_id)
            .cloned()
            .ok_or(AppError::RoomNotFound)?;

        let existing = state.active_reservation(room.id, &request.holder);
        let device_count = state.active_device_reservations(room.id, &request.device_fingerprint_hash);

        match plan_join(&room, existing, device_count, &request)? {
            JoinPlan::Existing(reservation) => Ok(JoinOutcome {
                reservation,
                room,
                created: false,
            }),
            JoinPlan::Insert => {
                let reservation = Reservation::new(
                    room.id,
                    &request.holder,
                    request.device_fingerprint_hash.clone(),
                    request.contact.clone(),
                    request.now,
                );
                let mut room = room;
                room.record_join();

                state.reservations.insert(reservation.id, reservation.clone());
                state.rooms.insert(room.id, room.clone());

                Ok(JoinOutcome {
                    reservation,
                    room,
                    created: true,
                })
            }
        }
    }

    async fn claim_reservation(&self, request: ClaimRequest) -> AppResult<ClaimOutcome> {
        let mut state = self.state.lock().await;
        let reservation = state
            .reservations
            .get(&request.reservation_id)
            .cloned()
            .ok_or(AppError::ReservationNotFound)?;
        let room = state
            .rooms
            .get(&reservation.room_id)
            .cloned()
            .ok_or(AppError::RoomNotFound)?;

        let claimant_holds_other = state
            .active_reservation(room.id, &HolderRef::Account(request.claimant_id))
            .map(|other| other.id != reservation.id)
            .unwrap_or(false);

        let rebind = match plan_claim(&reservation, &room, &request, claimant_holds_other)? {
            ClaimPlan::AlreadyClaimed => {
                let claim = state
                    .claims
                    .get(&reservation.id)
                    .cloned()
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

        let claimant = state
            .accounts
            .get(&request.claimant_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", request.claimant_id)))?;
        let bonus = referral_bonus_due(&claimant, room.creator_id, request.referral_bonus);

        // Credits cannot fail past this point
        state.apply(
            LedgerEntry {
                account_id: claimant.id,
                amount: room.amount_per_gift,
                tx_type: TransactionType::GiftClaim,
                reference_id: Some(reservation.id),
                description: "Gift room claim",
            },
            request.now,
        )?;
        state.mark_funded(claimant.id, request.now);

        if let Some(bonus) = bonus {
            state.apply(
                LedgerEntry {
                    account_id: room.creator_id,
                    amount: bonus,
                    tx_type: TransactionType::ReferralBonus,
                    reference_id: Some(reservation.id),
                    description: "Referral bonus",
                },
                request.now,
            )?;
            if let Some(account) = state.accounts.get_mut(&claimant.id) {
                account.referral_bonus_paid = true;
            }
        }

        let mut reservation = reservation;
        reservation.mark_claimed(claimant.id, rebind, request.now);
        let mut room = room;
        room.record_claim();
        let claim = GiftClaim::new(
            reservation.id,
            room.id,
            claimant.id,
            room.amount_per_gift,
            bonus,
            request.now,
        );

        state.reservations.insert(reservation.id, reservation.clone());
        state.rooms.insert(room.id, room.clone());
        state.claims.insert(reservation.id, claim.clone());

        Ok(ClaimOutcome {
            claim,
            reservation,
            room,
            already_claimed: false,
        })
    }

    async fn find_claim_by_reservation(&self, reservation_id: Uuid) -> AppResult<Option<GiftClaim>> {
        Ok(self.state.lock().await.claims.get(&reservation_id).cloned())
    }

    async fn claims_by_account(&self, account_id: Uuid, limit: i64) -> AppResult<Vec<GiftClaim>> {
        let state = self.state.lock().await;
        let mut claims: Vec<GiftClaim> = state
            .claims
            .values()
            .filter(|c| c.account_id == account_id)
            .cloned()
            .collect();
        claims.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        claims.truncate(limit.max(0) as usize);
        Ok(claims)
    }

    async fn refund_room(&self, request: RefundRequest) -> AppResult<RefundOutcome> {
        let mut state = self.state.lock().await;
        let mut room = state
            .rooms
            .get(&request.room_id)
            .cloned()
            .ok_or(AppError::RoomNotFound)?;

        if room.creator_id != request.creator_id {
            return Err(AppError::Unauthorized(
                "Only the room creator can request a refund".to_string(),
            ));
        }

        let refund_amount = room.check_refundable(request.now)?;
        let unclaimed_count = room.unclaimed_count();

        let released = state.release_held(room.id, request.now);
        room.mark_refunded(refund_amount, released, request.now);
        state.apply(
            LedgerEntry {
                account_id: room.creator_id,
                amount: refund_amount,
                tx_type: TransactionType::GiftRefund,
                reference_id: Some(room.id),
                description: "Gift room refund",
            },
            request.now,
        )?;
        state.rooms.insert(room.id, room.clone());

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
        let mut state = self.state.lock().await;
        let mut due: Vec<GiftRoom> = state
            .rooms
            .values()
            .filter(|r| {
                matches!(r.status_enum(), RoomStatus::Active | RoomStatus::Full)
                    && r.expires_at < cutoff
            })
            .cloned()
            .collect();
        due.sort_by_key(|r| r.expires_at);
        due.truncate(limit.max(0) as usize);

        let mut expired = Vec::with_capacity(due.len());
        for mut room in due {
            let released = state.release_held(room.id, now);
            room.mark_expired(released);
            expired.push(ExpiredRoom {
                room_id: room.id,
                creator_id: room.creator_id,
                released_reservations: released,
            });
            state.rooms.insert(room.id, room);
        }

        Ok(expired)
    }
}
