use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payout record, written exactly once per claimed reservation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct GiftClaim {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub room_id: Uuid,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub referral_bonus_awarded: bool,
    pub referral_bonus_amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl GiftClaim {
    pub fn new(
        reservation_id: Uuid,
        room_id: Uuid,
        account_id: Uuid,
        amount: Decimal,
        referral_bonus: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reservation_id,
            room_id,
            account_id,
            amount,
            referral_bonus_awarded: referral_bonus.is_some(),
            referral_bonus_amount: referral_bonus,
            created_at: now,
        }
    }
}
