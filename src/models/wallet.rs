//! Wallet balance and ledger models for fund tracking

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Spendable wallet balance of one account
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub account_id: Uuid,
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn empty(account_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            balance: Decimal::ZERO,
            updated_at: now,
        }
    }
}

/// Largest value a `NUMERIC(20, 2)` money column holds (999999999999999999.99)
pub const MAX_LEDGER_AMOUNT: Decimal = Decimal::from_parts(1_661_992_959, 1_808_227_885, 5, false, 2);

/// `a + b`, or `None` when the sum leaves the storable money range
pub fn checked_ledger_add(a: Decimal, b: Decimal) -> Option<Decimal> {
    a.checked_add(b).filter(|sum| *sum <= MAX_LEDGER_AMOUNT)
}

/// `amount × count`, or `None` when the product leaves the storable money range
pub fn checked_ledger_mul(amount: Decimal, count: i32) -> Option<Decimal> {
    amount
        .checked_mul(Decimal::from(count))
        .filter(|product| product.abs() <= MAX_LEDGER_AMOUNT)
}

/// Transaction types for fund movements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    GiftEscrow,
    GiftClaim,
    GiftRefund,
    ReferralBonus,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::GiftEscrow => "gift_escrow",
            Self::GiftClaim => "gift_claim",
            Self::GiftRefund => "gift_refund",
            Self::ReferralBonus => "referral_bonus",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(Self::Deposit),
            "gift_escrow" => Some(Self::GiftEscrow),
            "gift_claim" => Some(Self::GiftClaim),
            "gift_refund" => Some(Self::GiftRefund),
            "referral_bonus" => Some(Self::ReferralBonus),
            _ => None,
        }
    }

    /// Debits reduce the balance, everything else credits it
    pub fn is_debit(&self) -> bool {
        matches!(self, Self::GiftEscrow)
    }
}

/// Ledger entry with before/after values for the audit trail
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub transaction_type: String,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    /// Room or reservation the movement belongs to
    pub reference_id: Option<Uuid>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn tx_type(&self) -> Option<TransactionType> {
        TransactionType::from_str(&self.transaction_type)
    }
}

/// One balance movement to apply through the ledger
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub account_id: Uuid,
    pub amount: Decimal,
    pub tx_type: TransactionType,
    pub reference_id: Option<Uuid>,
    pub description: &'static str,
}
