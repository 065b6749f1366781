use crate::error::RepositoryError;
use crate::models::Account;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str =
    "id, display_name, referred_by, first_funded_at, referral_bonus_paid, created_at";

/// Repository for account data access
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    /// Create a new AccountRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new account together with its empty wallet
    pub async fn create(
        &self,
        display_name: &str,
        referred_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Account, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts (id, display_name, referred_by, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(display_name)
        .bind(referred_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO wallets (account_id, balance, updated_at)
            VALUES ($1, 0, $2)
            "#,
        )
        .bind(account.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(account)
    }

    /// Find an account by UUID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, RepositoryError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Lock an account row for the rest of the transaction
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Account>, RepositoryError> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE id = $1 FOR UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(account)
    }

    /// Record the first funding of an account; later calls keep the original time
    pub async fn mark_funded(
        conn: &mut PgConnection,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET first_funded_at = COALESCE(first_funded_at, $2)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn mark_referral_bonus_paid(conn: &mut PgConnection, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE accounts SET referral_bonus_paid = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
