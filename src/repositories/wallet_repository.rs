//! Repository for wallet balances and the ledger that moves them

use crate::error::RepositoryError;
use crate::models::{checked_ledger_add, LedgerEntry, Wallet, WalletTransaction, MAX_LEDGER_AMOUNT};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use uuid::Uuid;

const WALLET_COLUMNS: &str = "account_id, balance, updated_at";
const TRANSACTION_COLUMNS: &str = "id, account_id, transaction_type, amount, balance_before, \
     balance_after, reference_id, description, created_at";

pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get an account's wallet
    pub async fn get(&self, account_id: Uuid) -> Result<Option<Wallet>, RepositoryError> {
        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {} FROM wallets WHERE account_id = $1",
            WALLET_COLUMNS
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(wallet)
    }

    /// Get ledger history for an account
    pub async fn transactions(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> Result<Vec<WalletTransaction>, RepositoryError> {
        let transactions = sqlx::query_as::<_, WalletTransaction>(&format!(
            r#"
            SELECT {}
            FROM wallet_transactions
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    /// Lock several wallets in id order so concurrent transfers cannot deadlock
    pub async fn lock_all(conn: &mut PgConnection, account_ids: &[Uuid]) -> Result<(), RepositoryError> {
        let mut ids = account_ids.to_vec();
        ids.sort();
        ids.dedup();

        sqlx::query(
            r#"
            SELECT account_id FROM wallets
            WHERE account_id = ANY($1)
            ORDER BY account_id
            FOR UPDATE
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;

        Ok(())
    }

    /// Apply one ledger movement inside the caller's transaction.
    ///
    /// Reads the balance under a row lock, writes the new balance and records
    /// a transaction row with before/after values.
    pub async fn apply(
        conn: &mut PgConnection,
        entry: &LedgerEntry,
        now: DateTime<Utc>,
    ) -> Result<Wallet, RepositoryError> {
        // Get current balance with lock
        let current = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {} FROM wallets WHERE account_id = $1 FOR UPDATE",
            WALLET_COLUMNS
        ))
        .bind(entry.account_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Wallet for {} not found", entry.account_id)))?;

        let balance_before = current.balance;
        let balance_after = if entry.tx_type.is_debit() {
            if balance_before < entry.amount {
                return Err(RepositoryError::InsufficientBalance {
                    available: balance_before,
                    required: entry.amount,
                });
            }
            balance_before - entry.amount
        } else {
            checked_ledger_add(balance_before, entry.amount).ok_or_else(|| {
                RepositoryError::OutOfRange(format!(
                    "balance would exceed the maximum of {}",
                    MAX_LEDGER_AMOUNT
                ))
            })?
        };

        let updated = sqlx::query_as::<_, Wallet>(&format!(
            r#"
            UPDATE wallets
            SET balance = $2, updated_at = $3
            WHERE account_id = $1
            RETURNING {}
            "#,
            WALLET_COLUMNS
        ))
        .bind(entry.account_id)
        .bind(balance_after)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        // Record transaction
        sqlx::query(
            r#"
            INSERT INTO wallet_transactions
            (id, account_id, transaction_type, amount, balance_before, balance_after, reference_id, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.account_id)
        .bind(entry.tx_type.as_str())
        .bind(entry.amount)
        .bind(balance_before)
        .bind(balance_after)
        .bind(entry.reference_id)
        .bind(entry.description)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(updated)
    }
}
