//! Session tokens issued on behalf of the platform's auth provider.
//!
//! Token format: `<account_id>.<issued_at>.<signature>` where the signature is
//! `hex(hmac_sha256(secret, account_id "." issued_at))`.

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Allowed clock skew for tokens issued slightly in the future
const MAX_FUTURE_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct SessionVerifier {
    secret: String,
    max_age_secs: i64,
    /// Accept a bare account UUID as a token
    dev_mode: bool,
}

impl SessionVerifier {
    pub fn new(secret: impl Into<String>, max_age_secs: i64, dev_mode: bool) -> Self {
        Self {
            secret: secret.into(),
            max_age_secs,
            dev_mode,
        }
    }

    fn mac(&self, message: &str) -> AppResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| AppError::Config(format!("Invalid session secret: {}", e)))?;
        mac.update(message.as_bytes());
        Ok(mac)
    }

    /// Issue a session token for an account
    pub fn issue(&self, account_id: Uuid, issued_at: DateTime<Utc>) -> AppResult<String> {
        let message = format!("{}.{}", account_id, issued_at.timestamp());
        let signature = hex::encode(self.mac(&message)?.finalize().into_bytes());
        Ok(format!("{}.{}", message, signature))
    }

    /// Verify a token and return the account it was issued to
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> AppResult<Uuid> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::Unauthorized("Missing session token".to_string()));
        }

        // In development mode, accept a bare account id
        if self.dev_mode {
            if let Ok(account_id) = Uuid::parse_str(token) {
                return Ok(account_id);
            }
        }

        let mut parts = token.splitn(3, '.');
        let (account, issued_at, signature) = match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(i), Some(s)) => (a, i, s),
            _ => return Err(AppError::Unauthorized("Malformed session token".to_string())),
        };

        let signature = hex::decode(signature)
            .map_err(|_| AppError::Unauthorized("Invalid session signature".to_string()))?;
        self.mac(&format!("{}.{}", account, issued_at))?
            .verify_slice(&signature)
            .map_err(|_| AppError::Unauthorized("Invalid session signature".to_string()))?;

        let issued_at: i64 = issued_at
            .parse()
            .map_err(|_| AppError::Unauthorized("Malformed session token".to_string()))?;
        let age = now.timestamp() - issued_at;
        if age > self.max_age_secs || age < -MAX_FUTURE_SKEW_SECS {
            return Err(AppError::Unauthorized("Session expired".to_string()));
        }

        Uuid::parse_str(account)
            .map_err(|_| AppError::Unauthorized("Malformed session token".to_string()))
    }
}
