//! Best-effort device identifiers.
//!
//! A device identifier is a correlation hint used to cap reservations per
//! device on public rooms. It is never an authorization credential: any client
//! can forge the signals it is derived from.
//!
//! When a client cannot supply any stable signal the identifier falls back to
//! a random value per call (`stable = false`). The same device then looks like
//! a new one on every request, which weakens the per-device cap for that
//! client. Per-IP and per-account rate limiting still apply.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Raw client signals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSignals {
    pub user_agent: Option<String>,
    pub screen_resolution: Option<String>,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub platform: Option<String>,
    /// Random token the client persisted from an earlier identification
    pub local_token: Option<String>,
}

impl DeviceSignals {
    fn stable_parts(&self) -> Vec<&str> {
        [
            &self.user_agent,
            &self.screen_resolution,
            &self.timezone,
            &self.language,
            &self.platform,
        ]
        .into_iter()
        .filter_map(|s| s.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device_id: String,
    /// Token the client should persist and send back next time
    pub local_token: String,
    /// False for the random fallback
    pub stable: bool,
}

fn random_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Derive a device identifier from client signals
pub fn device_identifier(signals: &DeviceSignals) -> DeviceIdentity {
    let parts = signals.stable_parts();
    let local_token = signals
        .local_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    if parts.is_empty() && local_token.is_none() {
        let token = random_token();
        return DeviceIdentity {
            device_id: format!("anon-{}", random_token()),
            local_token: token,
            stable: false,
        };
    }

    let local_token = local_token.unwrap_or_else(random_token);

    let mut hasher = Sha256::new();
    for part in &parts {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    hasher.update(local_token.as_bytes());

    DeviceIdentity {
        device_id: hex::encode(hasher.finalize()),
        local_token,
        stable: true,
    }
}

/// Salted hash of a client-supplied fingerprint; only this value is stored or compared
pub fn hash_fingerprint(raw: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(raw.trim().as_bytes());
    hex::encode(hasher.finalize())
}
