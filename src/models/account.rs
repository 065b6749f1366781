use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Platform account as seen by the gift room service.
///
/// Identity itself belongs to the auth provider; this row carries only what
/// the referral program and creator display need.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub display_name: String,
    pub referred_by: Option<Uuid>,
    /// Set the first time any money lands in this account's wallet
    pub first_funded_at: Option<DateTime<Utc>>,
    pub referral_bonus_paid: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new Account (typically used for creating from API input)
    pub fn new(display_name: String, referred_by: Option<Uuid>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name,
            referred_by,
            first_funded_at: None,
            referral_bonus_paid: false,
            created_at: now,
        }
    }

    pub fn is_funded(&self) -> bool {
        self.first_funded_at.is_some()
    }
}

/// Public view of a room creator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatorInfo {
    pub id: Uuid,
    pub display_name: String,
}

impl From<&Account> for CreatorInfo {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            display_name: account.display_name.clone(),
        }
    }
}
