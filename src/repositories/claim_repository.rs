use crate::error::RepositoryError;
use crate::models::GiftClaim;
use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use uuid::Uuid;

const CLAIM_COLUMNS: &str = "id, reservation_id, room_id, account_id, amount, \
     referral_bonus_awarded, referral_bonus_amount, created_at";

/// Repository for payout records
pub struct ClaimRepository {
    pool: PgPool,
}

impl ClaimRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a claim; the unique reservation_id makes a second payout impossible
    pub async fn insert(conn: &mut PgConnection, claim: &GiftClaim) -> Result<GiftClaim, RepositoryError> {
        let claim = sqlx::query_as::<_, GiftClaim>(&format!(
            r#"
            INSERT INTO gift_claims
            (id, reservation_id, room_id, account_id, amount, referral_bonus_awarded, referral_bonus_amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            CLAIM_COLUMNS
        ))
        .bind(claim.id)
        .bind(claim.reservation_id)
        .bind(claim.room_id)
        .bind(claim.account_id)
        .bind(claim.amount)
        .bind(claim.referral_bonus_awarded)
        .bind(claim.referral_bonus_amount)
        .bind(claim.created_at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(claim)
    }

    pub async fn find_by_reservation_in(
        conn: &mut PgConnection,
        reservation_id: Uuid,
    ) -> Result<Option<GiftClaim>, RepositoryError> {
        let claim = sqlx::query_as::<_, GiftClaim>(&format!(
            "SELECT {} FROM gift_claims WHERE reservation_id = $1",
            CLAIM_COLUMNS
        ))
        .bind(reservation_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(claim)
    }

    pub async fn find_by_reservation(&self, reservation_id: Uuid) -> Result<Option<GiftClaim>, RepositoryError> {
        let claim = sqlx::query_as::<_, GiftClaim>(&format!(
            "SELECT {} FROM gift_claims WHERE reservation_id = $1",
            CLAIM_COLUMNS
        ))
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(claim)
    }

    /// Claims received by an account, newest first
    pub async fn find_by_account(&self, account_id: Uuid, limit: i64) -> Result<Vec<GiftClaim>, RepositoryError> {
        let claims = sqlx::query_as::<_, GiftClaim>(&format!(
            r#"
            SELECT {}
            FROM gift_claims
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
            CLAIM_COLUMNS
        ))
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(claims)
    }
}
