use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Who a reservation slot is bound to. Never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum HolderRef {
    Account(Uuid),
    /// Anonymous holder, keyed by the salted device fingerprint hash
    Device(String),
}

impl HolderRef {
    pub fn kind(&self) -> &'static str {
        match self {
            HolderRef::Account(_) => "account",
            HolderRef::Device(_) => "device",
        }
    }

    pub fn value(&self) -> String {
        match self {
            HolderRef::Account(id) => id.to_string(),
            HolderRef::Device(hash) => hash.clone(),
        }
    }

    pub fn parse(kind: &str, value: &str) -> Result<Self, String> {
        match kind {
            "account" => Uuid::parse_str(value)
                .map(HolderRef::Account)
                .map_err(|e| format!("Invalid account holder {}: {}", value, e)),
            "device" => Ok(HolderRef::Device(value.to_string())),
            _ => Err(format!("Invalid holder kind: {}", kind)),
        }
    }

    pub fn account_id(&self) -> Option<Uuid> {
        match self {
            HolderRef::Account(id) => Some(*id),
            HolderRef::Device(_) => None,
        }
    }
}

/// Reservation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Held,
    Claimed,
    Expired,
}

impl ReservationStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "held" => Ok(ReservationStatus::Held),
            "claimed" => Ok(ReservationStatus::Claimed),
            "expired" => Ok(ReservationStatus::Expired),
            _ => Err(format!("Invalid reservation status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Held => "held",
            ReservationStatus::Claimed => "claimed",
            ReservationStatus::Expired => "expired",
        }
    }
}

impl From<ReservationStatus> for String {
    fn from(status: ReservationStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Optional contact details left by anonymous holders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ContactInfo {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(name) = &self.name {
            if name.chars().count() > 100 {
                return Err(AppError::Validation("Contact name is too long".to_string()));
            }
        }
        if let Some(email) = &self.email {
            let email = email.trim();
            if email.len() > 254 || !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
                return Err(AppError::Validation(format!("Invalid email: {}", email)));
            }
        }
        if let Some(phone) = &self.phone {
            let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
            let allowed = phone
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'));
            if !allowed || !(7..=15).contains(&digits) {
                return Err(AppError::Validation(format!("Invalid phone number: {}", phone)));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.phone.is_none()
    }
}

/// A held claim slot in a room
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    pub id: Uuid,
    pub room_id: Uuid,
    pub holder_kind: String,
    pub holder_ref: String,
    pub device_fingerprint_hash: String,
    pub status: String, // Stored as TEXT, use ReservationStatus enum for type safety
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub claimed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn new(
        room_id: Uuid,
        holder: &HolderRef,
        device_fingerprint_hash: String,
        contact: Option<ContactInfo>,
        now: DateTime<Utc>,
    ) -> Self {
        let contact = contact.unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            room_id,
            holder_kind: holder.kind().to_string(),
            holder_ref: holder.value(),
            device_fingerprint_hash,
            status: ReservationStatus::Held.into(),
            contact_name: contact.name,
            contact_email: contact.email,
            contact_phone: contact.phone,
            claimed_by: None,
            created_at: now,
            claimed_at: None,
            expired_at: None,
        }
    }

    pub fn holder(&self) -> AppResult<HolderRef> {
        HolderRef::parse(&self.holder_kind, &self.holder_ref).map_err(AppError::Message)
    }

    /// Get status as an enum
    pub fn status_enum(&self) -> ReservationStatus {
        ReservationStatus::from_str(&self.status).unwrap_or(ReservationStatus::Held)
    }

    /// Held or claimed reservations occupy a slot
    pub fn is_active(&self) -> bool {
        matches!(
            self.status_enum(),
            ReservationStatus::Held | ReservationStatus::Claimed
        )
    }

    pub fn is_held_by(&self, holder: &HolderRef) -> bool {
        self.holder_kind == holder.kind() && self.holder_ref == holder.value()
    }

    pub fn mark_claimed(&mut self, claimant_id: Uuid, rebind: bool, now: DateTime<Utc>) {
        if rebind {
            let holder = HolderRef::Account(claimant_id);
            self.holder_kind = holder.kind().to_string();
            self.holder_ref = holder.value();
        }
        self.status = ReservationStatus::Claimed.into();
        self.claimed_by = Some(claimant_id);
        self.claimed_at = Some(now);
    }

    pub fn mark_expired(&mut self, now: DateTime<Utc>) {
        self.status = ReservationStatus::Expired.into();
        self.expired_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holder_ref_round_trips_through_columns() {
        let account = HolderRef::Account(Uuid::new_v4());
        assert_eq!(HolderRef::parse(account.kind(), &account.value()).unwrap(), account);

        let device = HolderRef::Device("abc123".to_string());
        assert_eq!(HolderRef::parse("device", "abc123").unwrap(), device);
        assert!(HolderRef::parse("wallet", "x").is_err());
    }

    #[test]
    fn test_contact_validation() {
        let ok = ContactInfo {
            name: Some("Ada".into()),
            email: Some("ada@example.com".into()),
            phone: Some("+234 803 000 0000".into()),
        };
        assert!(ok.validate().is_ok());

        let bad_email = ContactInfo {
            email: Some("not-an-email".into()),
            ..ContactInfo::default()
        };
        assert!(bad_email.validate().is_err());

        let bad_phone = ContactInfo {
            phone: Some("12ab".into()),
            ..ContactInfo::default()
        };
        assert!(bad_phone.validate().is_err());
    }

    #[test]
    fn test_claim_rebinds_anonymous_holder() {
        let now = Utc::now();
        let holder = HolderRef::Device("hash".into());
        let mut reservation = Reservation::new(Uuid::new_v4(), &holder, "hash".into(), None, now);
        assert!(reservation.is_held_by(&holder));

        let claimant = Uuid::new_v4();
        reservation.mark_claimed(claimant, true, now);
        assert!(reservation.is_held_by(&HolderRef::Account(claimant)));
        assert_eq!(reservation.status_enum(), ReservationStatus::Claimed);
        assert!(reservation.is_active());
    }
}
