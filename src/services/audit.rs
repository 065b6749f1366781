use crate::error::{AppError, AppResult};
use crate::models::{GiftClaim, GiftRoom, Reservation};
use crate::store::{ExpiredRoom, RefundOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: i64,
    pub event_type: String, // "room_created", "gift_claimed", "room_refunded", etc.
    pub room_id: Option<Uuid>,
    pub account_id: Option<Uuid>,
    pub details: serde_json::Value,
}

/// JSON-lines trail of every money-moving action
pub struct AuditTrailService {
    file_handle: Option<Arc<Mutex<std::fs::File>>>,
}

impl AuditTrailService {
    /// Create a new audit trail service writing to `audit_<date>.log` in `log_directory`
    pub fn new(log_directory: PathBuf) -> AppResult<Self> {
        // Ensure directory exists
        std::fs::create_dir_all(&log_directory)
            .map_err(|e| AppError::Message(format!("Failed to create log directory: {}", e)))?;

        let date = Utc::now().format("%Y-%m-%d");
        let log_file = log_directory.join(format!("audit_{}.log", date));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|e| AppError::Message(format!("Failed to open audit log file: {}", e)))?;

        info!("Audit trail initialized: {:?}", log_file);

        Ok(Self {
            file_handle: Some(Arc::new(Mutex::new(file))),
        })
    }

    /// Trail that drops every entry (tests and tooling)
    pub fn disabled() -> Self {
        Self { file_handle: None }
    }

    /// Log an audit entry
    pub async fn log(&self, entry: AuditLogEntry) -> AppResult<()> {
        let Some(handle) = &self.file_handle else {
            return Ok(());
        };

        let json = serde_json::to_string(&entry)?;

        let mut file = handle.lock().await;
        writeln!(file, "{}", json)
            .map_err(|e| AppError::Message(format!("Failed to write audit log: {}", e)))?;

        file.flush()
            .map_err(|e| AppError::Message(format!("Failed to flush audit log: {}", e)))?;

        Ok(())
    }

    /// The operation being audited has already committed, so a failed write
    /// is reported and swallowed.
    async fn record(&self, entry: AuditLogEntry) {
        let event_type = entry.event_type.clone();
        if let Err(e) = self.log(entry).await {
            warn!("Failed to write {} audit entry: {}", event_type, e);
        }
    }

    fn entry(
        at: DateTime<Utc>,
        event_type: &str,
        room_id: Option<Uuid>,
        account_id: Option<Uuid>,
        details: serde_json::Value,
    ) -> AuditLogEntry {
        AuditLogEntry {
            timestamp: at.timestamp(),
            event_type: event_type.to_string(),
            room_id,
            account_id,
            details,
        }
    }

    pub async fn log_room_created(&self, room: &GiftRoom) {
        self.record(Self::entry(
            room.created_at,
            "room_created",
            Some(room.id),
            Some(room.creator_id),
            serde_json::json!({
                "room_type": room.room_type,
                "capacity": room.capacity,
                "amount_per_gift": room.amount_per_gift.to_string(),
                "escrow_total": room.escrow_total().ok().map(|total| total.to_string()),
                "expires_at": room.expires_at.to_rfc3339(),
            }),
        ))
        .await
    }

    pub async fn log_reservation_created(&self, reservation: &Reservation, room: &GiftRoom) {
        self.record(Self::entry(
            reservation.created_at,
            "reservation_created",
            Some(room.id),
            reservation.holder().ok().and_then(|h| h.account_id()),
            serde_json::json!({
                "reservation_id": reservation.id.to_string(),
                "holder_kind": reservation.holder_kind,
                "joined_count": room.joined_count,
                "capacity": room.capacity,
            }),
        ))
        .await
    }

    pub async fn log_gift_claimed(&self, claim: &GiftClaim) {
        self.record(Self::entry(
            claim.created_at,
            "gift_claimed",
            Some(claim.room_id),
            Some(claim.account_id),
            serde_json::json!({
                "reservation_id": claim.reservation_id.to_string(),
                "claim_id": claim.id.to_string(),
                "amount": claim.amount.to_string(),
            }),
        ))
        .await
    }

    pub async fn log_referral_bonus_paid(&self, claim: &GiftClaim, creator_id: Uuid) {
        let amount = claim
            .referral_bonus_amount
            .map(|a| a.to_string())
            .unwrap_or_default();
        self.record(Self::entry(
            claim.created_at,
            "referral_bonus_paid",
            Some(claim.room_id),
            Some(creator_id),
            serde_json::json!({
                "reservation_id": claim.reservation_id.to_string(),
                "referred_account_id": claim.account_id.to_string(),
                "amount": amount,
            }),
        ))
        .await
    }

    pub async fn log_room_refunded(&self, outcome: &RefundOutcome) {
        let at = outcome.room.refunded_at.unwrap_or_else(Utc::now);
        self.record(Self::entry(
            at,
            "room_refunded",
            Some(outcome.room.id),
            Some(outcome.room.creator_id),
            serde_json::json!({
                "refund_amount": outcome.refund_amount.to_string(),
                "unclaimed_count": outcome.unclaimed_count,
                "released_reservations": outcome.released_reservations,
            }),
        ))
        .await
    }

    pub async fn log_rooms_expired(&self, rooms: &[ExpiredRoom], at: DateTime<Utc>) {
        if rooms.is_empty() {
            return;
        }
        let rooms: Vec<serde_json::Value> = rooms
            .iter()
            .map(|r| {
                serde_json::json!({
                    "room_id": r.room_id.to_string(),
                    "creator_id": r.creator_id.to_string(),
                    "released_reservations": r.released_reservations,
                })
            })
            .collect();
        self.record(Self::entry(
            at,
            "rooms_expired",
            None,
            None,
            serde_json::json!({ "rooms": rooms }),
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewGiftRoom, RoomType};
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_audit_trail_writes_json_lines() {
        let dir = std::env::temp_dir().join(format!("giftroom-audit-{}", Uuid::new_v4()));
        let audit = AuditTrailService::new(dir.clone()).unwrap();

        let room = NewGiftRoom {
            creator_id: Uuid::new_v4(),
            room_type: RoomType::Group,
            capacity: 3,
            amount_per_gift: Decimal::new(1000, 0),
            message: None,
            expiration_hours: 48,
        }
        .into_room(Utc::now());
        audit.log_room_created(&room).await;

        let file = std::fs::read_dir(&dir).unwrap().next().unwrap().unwrap().path();
        let contents = std::fs::read_to_string(file).unwrap();
        let entry: AuditLogEntry = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(entry.event_type, "room_created");
        assert_eq!(entry.room_id, Some(room.id));
        assert_eq!(entry.details["escrow_total"], "3000");

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_disabled_trail_accepts_entries() {
        let audit = AuditTrailService::disabled();
        audit.log_rooms_expired(&[], Utc::now()).await;
        assert!(audit
            .log(AuditLogEntry {
                timestamp: 0,
                event_type: "noop".into(),
                room_id: None,
                account_id: None,
                details: serde_json::Value::Null,
            })
            .await
            .is_ok());
    }
}
