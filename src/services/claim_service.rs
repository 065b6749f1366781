use crate::clock::Clock;
use crate::config::GiftRoomConfig;
use crate::error::AppResult;
use crate::models::GiftClaim;
use crate::services::audit::AuditTrailService;
use crate::services::device_identity::hash_fingerprint;
use crate::services::retry::RetryPolicy;
use crate::store::{ClaimRequest, GiftRoomStore};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ClaimResult {
    pub claim: GiftClaim,
    pub amount: Decimal,
    pub referral_bonus_awarded: bool,
    /// The reservation had been paid out by an earlier call
    pub already_claimed: bool,
}

/// Service converting reservations into wallet credits
pub struct ClaimService {
    store: Arc<dyn GiftRoomStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditTrailService>,
    config: GiftRoomConfig,
    retry: RetryPolicy,
}

impl ClaimService {
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

    /// Pay out a reservation to `claimant_id`, exactly once.
    ///
    /// `device_fingerprint` is only consulted for anonymous reservations, which
    /// can be bound to the claimant when it matches the device that joined.
    pub async fn claim(
        &self,
        reservation_id: Uuid,
        claimant_id: Uuid,
        device_fingerprint: Option<&str>,
    ) -> AppResult<ClaimResult> {
        let device_hash = device_fingerprint
            .map(str::trim)
            .filter(|fp| !fp.is_empty())
            .map(|fp| hash_fingerprint(fp, &self.config.device_salt));

        let request = ClaimRequest {
            reservation_id,
            claimant_id,
            device_fingerprint_hash: device_hash,
            referral_bonus: self.config.referral_bonus,
            now: self.clock.now(),
        };

        let outcome = self
            .retry
            .run("claim_reservation", || {
                self.store.claim_reservation(request.clone())
            })
            .await?;

        if outcome.already_claimed {
            info!("Reservation {} was already claimed, returning original payout", reservation_id);
        } else {
            info!(
                "Reservation {} claimed by {}: {} credited (room {} now {}/{})",
                reservation_id,
                claimant_id,
                outcome.claim.amount,
                outcome.room.id,
                outcome.room.claimed_count,
                outcome.room.capacity
            );
            self.audit.log_gift_claimed(&outcome.claim).await;
            if outcome.claim.referral_bonus_awarded {
                info!("Referral bonus paid to creator {}", outcome.room.creator_id);
                self.audit
                    .log_referral_bonus_paid(&outcome.claim, outcome.room.creator_id)
                    .await;
            }
        }

        Ok(ClaimResult {
            amount: outcome.claim.amount,
            referral_bonus_awarded: outcome.claim.referral_bonus_awarded,
            already_claimed: outcome.already_claimed,
            claim: outcome.claim,
        })
    }
}
