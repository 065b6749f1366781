use crate::config::ALLOWED_EXPIRATION_HOURS;
use crate::error::{AppError, AppResult};
use crate::models::wallet::{checked_ledger_mul, MAX_LEDGER_AMOUNT};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const MAX_MESSAGE_LEN: usize = 500;

/// Kind of giveaway, which fixes the allowed capacity range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Personal,
    Group,
    Public,
}

impl RoomType {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "personal" => Ok(RoomType::Personal),
            "group" => Ok(RoomType::Group),
            "public" => Ok(RoomType::Public),
            _ => Err(format!("Invalid room type: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Personal => "personal",
            RoomType::Group => "group",
            RoomType::Public => "public",
        }
    }

    /// Inclusive capacity bounds
    pub fn capacity_bounds(&self) -> (i32, i32) {
        match self {
            RoomType::Personal => (1, 1),
            RoomType::Group => (2, 50),
            RoomType::Public => (2, 1000),
        }
    }
}

/// Room lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Active,
    Full,
    Expired,
    Cancelled,
}

impl RoomStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "active" => Ok(RoomStatus::Active),
            "full" => Ok(RoomStatus::Full),
            "expired" => Ok(RoomStatus::Expired),
            "cancelled" => Ok(RoomStatus::Cancelled),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Active => "active",
            RoomStatus::Full => "full",
            RoomStatus::Expired => "expired",
            RoomStatus::Cancelled => "cancelled",
        }
    }
}

impl From<RoomStatus> for String {
    fn from(status: RoomStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Capacity-limited pool of identical gifts, funded up front by its creator
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GiftRoom {
    pub id: Uuid,
    /// Unguessable share token used in claim links, never the internal id
    pub token: String,
    pub creator_id: Uuid,
    pub room_type: String, // Stored as TEXT, use RoomType enum for type safety
    pub capacity: i32,
    pub amount_per_gift: Decimal,
    pub joined_count: i32,
    pub claimed_count: i32,
    pub status: String, // Stored as TEXT, use RoomStatus enum for type safety
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub refund_amount: Option<Decimal>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl GiftRoom {
    /// Get room type as an enum
    pub fn room_type_enum(&self) -> RoomType {
        RoomType::from_str(&self.room_type).unwrap_or(RoomType::Personal)
    }

    /// Get the stored status as an enum
    pub fn status_enum(&self) -> RoomStatus {
        RoomStatus::from_str(&self.status).unwrap_or(RoomStatus::Active)
    }

    /// A room is open strictly before `expires_at`
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Status as observed at `now`; expiry is derived lazily until the sweep persists it
    pub fn effective_status(&self, now: DateTime<Utc>) -> RoomStatus {
        match self.status_enum() {
            RoomStatus::Cancelled => RoomStatus::Cancelled,
            RoomStatus::Expired => RoomStatus::Expired,
            _ if self.has_expired(now) => RoomStatus::Expired,
            stored => stored,
        }
    }

    pub fn spots_remaining(&self) -> i32 {
        (self.capacity - self.joined_count).max(0)
    }

    pub fn unclaimed_count(&self) -> i32 {
        self.capacity - self.claimed_count
    }

    /// Amount debited from the creator at creation
    pub fn escrow_total(&self) -> AppResult<Decimal> {
        escrow_for(self.amount_per_gift, self.capacity)
    }

    pub fn unclaimed_amount(&self) -> AppResult<Decimal> {
        escrow_for(self.amount_per_gift, self.unclaimed_count())
    }

    /// Whether a new reservation may be taken at `now`
    pub fn check_joinable(&self, now: DateTime<Utc>) -> AppResult<()> {
        match self.status_enum() {
            RoomStatus::Expired | RoomStatus::Cancelled => return Err(AppError::RoomExpired),
            RoomStatus::Full => return Err(AppError::RoomFull),
            RoomStatus::Active => {}
        }
        if self.has_expired(now) {
            return Err(AppError::RoomExpired);
        }
        if self.joined_count >= self.capacity {
            return Err(AppError::RoomFull);
        }
        Ok(())
    }

    pub fn record_join(&mut self) {
        self.joined_count += 1;
        if self.joined_count >= self.capacity {
            self.status = RoomStatus::Full.into();
        }
    }

    pub fn record_claim(&mut self) {
        self.claimed_count += 1;
    }

    /// Persist expiry; `released` held reservations no longer count as joined
    pub fn mark_expired(&mut self, released: i32) {
        self.joined_count = (self.joined_count - released).max(self.claimed_count);
        self.status = RoomStatus::Expired.into();
    }

    /// Refund amount the creator would receive at `now`
    pub fn check_refundable(&self, now: DateTime<Utc>) -> AppResult<Decimal> {
        match self.effective_status(now) {
            RoomStatus::Cancelled => Err(AppError::AlreadyRefunded),
            RoomStatus::Active | RoomStatus::Full => Err(AppError::RefundNotAvailable(format!(
                "room is still open until {}",
                self.expires_at.to_rfc3339()
            ))),
            RoomStatus::Expired if self.unclaimed_count() <= 0 => Err(AppError::NothingToRefund),
            RoomStatus::Expired => self.unclaimed_amount(),
        }
    }

    /// Terminal transition after the refund was credited
    pub fn mark_refunded(&mut self, amount: Decimal, released: i32, now: DateTime<Utc>) {
        self.joined_count = (self.joined_count - released).max(self.claimed_count);
        self.status = RoomStatus::Cancelled.into();
        self.refund_amount = Some(amount);
        self.refunded_at = Some(now);
    }
}

/// Validated request to open a room
#[derive(Debug, Clone)]
pub struct NewGiftRoom {
    pub creator_id: Uuid,
    pub room_type: RoomType,
    pub capacity: i32,
    pub amount_per_gift: Decimal,
    pub message: Option<String>,
    pub expiration_hours: i64,
}

impl NewGiftRoom {
    pub fn validate(&self, min_amount: Decimal) -> AppResult<()> {
        let (min_capacity, max_capacity) = self.room_type.capacity_bounds();
        if self.capacity < min_capacity || self.capacity > max_capacity {
            return Err(AppError::Validation(format!(
                "{} rooms take a capacity between {} and {}, got {}",
                self.room_type.as_str(),
                min_capacity,
                max_capacity,
                self.capacity
            )));
        }

        if self.amount_per_gift < min_amount {
            return Err(AppError::Validation(format!(
                "Amount per gift must be at least {}",
                min_amount
            )));
        }
        if self.amount_per_gift.normalize().scale() > 2 {
            return Err(AppError::Validation(
                "Amount per gift supports at most two decimal places".to_string(),
            ));
        }
        self.escrow_total()?;

        if let Some(message) = &self.message {
            if message.chars().count() > MAX_MESSAGE_LEN {
                return Err(AppError::Validation(format!(
                    "Message must be at most {} characters",
                    MAX_MESSAGE_LEN
                )));
            }
        }

        if !ALLOWED_EXPIRATION_HOURS.contains(&self.expiration_hours) {
            return Err(AppError::Validation(format!(
                "Expiration must be one of {:?} hours",
                ALLOWED_EXPIRATION_HOURS
            )));
        }

        Ok(())
    }

    pub fn escrow_total(&self) -> AppResult<Decimal> {
        escrow_for(self.amount_per_gift, self.capacity)
    }

    /// Materialize the room row with a fresh id and share token
    pub fn into_room(self, now: DateTime<Utc>) -> GiftRoom {
        let message = self
            .message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());

        GiftRoom {
            id: Uuid::new_v4(),
            token: generate_share_token(),
            creator_id: self.creator_id,
            room_type: self.room_type.as_str().to_string(),
            capacity: self.capacity,
            amount_per_gift: self.amount_per_gift,
            joined_count: 0,
            claimed_count: 0,
            status: RoomStatus::Active.into(),
            message,
            created_at: now,
            expires_at: now + Duration::hours(self.expiration_hours),
            refund_amount: None,
            refunded_at: None,
        }
    }
}

fn escrow_for(amount_per_gift: Decimal, count: i32) -> AppResult<Decimal> {
    checked_ledger_mul(amount_per_gift, count).ok_or_else(|| {
        AppError::Validation(format!(
            "{} gifts of {} exceed the maximum escrow of {}",
            count, amount_per_gift, MAX_LEDGER_AMOUNT
        ))
    })
}

/// 244 random bits, hex encoded
fn generate_share_token() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_room(room_type: RoomType, capacity: i32, amount: i64) -> NewGiftRoom {
        NewGiftRoom {
            creator_id: Uuid::new_v4(),
            room_type,
            capacity,
            amount_per_gift: Decimal::new(amount, 0),
            message: None,
            expiration_hours: 48,
        }
    }

    #[test]
    fn test_capacity_bounds_per_type() {
        let min = Decimal::new(50, 0);
        assert!(new_room(RoomType::Personal, 1, 500).validate(min).is_ok());
        assert!(new_room(RoomType::Personal, 2, 500).validate(min).is_err());
        assert!(new_room(RoomType::Group, 50, 500).validate(min).is_ok());
        assert!(new_room(RoomType::Group, 51, 500).validate(min).is_err());
        assert!(new_room(RoomType::Public, 1000, 500).validate(min).is_ok());
        assert!(new_room(RoomType::Public, 1, 500).validate(min).is_err());
    }

    #[test]
    fn test_minimum_amount_and_precision() {
        let min = Decimal::new(50, 0);
        assert!(new_room(RoomType::Group, 3, 49).validate(min).is_err());

        let mut fractional = new_room(RoomType::Group, 3, 50);
        fractional.amount_per_gift = Decimal::new(50125, 3);
        assert!(fractional.validate(min).is_err());

        fractional.amount_per_gift = Decimal::new(5050, 2);
        assert!(fractional.validate(min).is_ok());
    }

    #[test]
    fn test_expiration_and_message_limits() {
        let min = Decimal::new(50, 0);
        let mut room = new_room(RoomType::Group, 3, 100);
        room.expiration_hours = 12;
        assert!(room.validate(min).is_err());

        room.expiration_hours = 168;
        room.message = Some("x".repeat(MAX_MESSAGE_LEN + 1));
        assert!(room.validate(min).is_err());
    }

    #[test]
    fn test_tokens_are_unique_and_not_the_id() {
        let now = Utc::now();
        let a = new_room(RoomType::Group, 3, 100).into_room(now);
        let b = new_room(RoomType::Group, 3, 100).into_room(now);
        assert_ne!(a.token, b.token);
        assert_ne!(a.token, a.id.simple().to_string());
        assert_eq!(a.token.len(), 64);
        assert_eq!(a.expires_at, now + Duration::hours(48));
    }

    #[test]
    fn test_join_fills_room() {
        let now = Utc::now();
        let mut room = new_room(RoomType::Group, 2, 100).into_room(now);
        assert!(room.check_joinable(now).is_ok());
        room.record_join();
        assert_eq!(room.status_enum(), RoomStatus::Active);
        room.record_join();
        assert_eq!(room.status_enum(), RoomStatus::Full);
        assert!(matches!(room.check_joinable(now), Err(AppError::RoomFull)));
    }

    #[test]
    fn test_effective_status_expires_lazily() {
        let now = Utc::now();
        let room = new_room(RoomType::Group, 2, 100).into_room(now);
        assert_eq!(room.effective_status(now), RoomStatus::Active);
        let later = now + Duration::hours(49);
        assert_eq!(room.effective_status(later), RoomStatus::Expired);
        assert!(matches!(room.check_joinable(later), Err(AppError::RoomExpired)));
    }

    #[test]
    fn test_refund_rules() {
        let now = Utc::now();
        let mut room = new_room(RoomType::Group, 5, 200).into_room(now);
        room.joined_count = 3;
        room.claimed_count = 2;

        assert!(matches!(
            room.check_refundable(now),
            Err(AppError::RefundNotAvailable(_))
        ));

        let later = now + Duration::hours(49);
        assert_eq!(room.check_refundable(later).unwrap(), Decimal::new(600, 0));
        assert_eq!(room.escrow_total().unwrap(), Decimal::new(1000, 0));

        room.mark_refunded(Decimal::new(600, 0), 1, later);
        assert_eq!(room.joined_count, 2);
        assert_eq!(room.status_enum(), RoomStatus::Cancelled);
        assert!(matches!(room.check_refundable(later), Err(AppError::AlreadyRefunded)));
    }

    #[test]
    fn test_fully_claimed_room_has_nothing_to_refund() {
        let now = Utc::now();
        let mut room = new_room(RoomType::Group, 2, 200).into_room(now);
        room.joined_count = 2;
        room.claimed_count = 2;
        room.status = RoomStatus::Full.into();
        let later = now + Duration::hours(49);
        assert!(matches!(room.check_refundable(later), Err(AppError::NothingToRefund)));
    }

    #[test]
    fn test_escrow_beyond_money_range_is_rejected() {
        let min = Decimal::new(50, 0);
        let mut room = new_room(RoomType::Public, 1000, 100);
        room.amount_per_gift = Decimal::MAX.round_dp(0);
        assert!(matches!(room.validate(min), Err(AppError::Validation(_))));
        assert!(matches!(room.escrow_total(), Err(AppError::Validation(_))));

        // Each gift fits a column, the escrow total does not
        room.amount_per_gift = Decimal::new(1_000_000_000_000_000, 0);
        assert!(matches!(room.validate(min), Err(AppError::Validation(_))));

        room.amount_per_gift = Decimal::new(1_000_000_000_000, 0);
        assert!(room.validate(min).is_ok());
    }

    #[test]
    fn test_expiry_boundary_is_shared() {
        let now = Utc::now();
        let room = new_room(RoomType::Group, 2, 100).into_room(now);
        let at_expiry = room.expires_at;

        assert!(room.has_expired(at_expiry));
        assert_eq!(room.effective_status(at_expiry), RoomStatus::Expired);
        assert!(matches!(room.check_joinable(at_expiry), Err(AppError::RoomExpired)));
        assert_eq!(room.check_refundable(at_expiry).unwrap(), Decimal::new(200, 0));

        let just_before = at_expiry - Duration::milliseconds(1);
        assert_eq!(room.effective_status(just_before), RoomStatus::Active);
        assert!(room.check_joinable(just_before).is_ok());
    }
}
