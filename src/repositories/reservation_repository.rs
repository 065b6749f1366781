use crate::error::RepositoryError;
use crate::models::{HolderRef, Reservation};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use uuid::Uuid;

const RESERVATION_COLUMNS: &str = "id, room_id, holder_kind, holder_ref, device_fingerprint_hash, \
     status, contact_name, contact_email, contact_phone, claimed_by, created_at, claimed_at, expired_at";

/// Repository for reservation data access
pub struct ReservationRepository {
    pool: PgPool,
}

impl ReservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Reservation>, RepositoryError> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM gift_reservations WHERE id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reservation)
    }

    /// Held or claimed reservation of a holder in a room
    pub async fn find_active_for_holder(
        &self,
        room_id: Uuid,
        holder: &HolderRef,
    ) -> Result<Option<Reservation>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Self::active_for_holder(&mut *conn, room_id, holder).await
    }

    /// Oldest active reservation made from a device in a room
    pub async fn find_active_for_device(
        &self,
        room_id: Uuid,
        device_fingerprint_hash: &str,
    ) -> Result<Option<Reservation>, RepositoryError> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            SELECT {}
            FROM gift_reservations
            WHERE room_id = $1 AND device_fingerprint_hash = $2 AND status IN ('held', 'claimed')
            ORDER BY created_at ASC
            LIMIT 1
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(room_id)
        .bind(device_fingerprint_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reservation)
    }

    pub async fn active_for_holder(
        conn: &mut PgConnection,
        room_id: Uuid,
        holder: &HolderRef,
    ) -> Result<Option<Reservation>, RepositoryError> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            SELECT {}
            FROM gift_reservations
            WHERE room_id = $1 AND holder_kind = $2 AND holder_ref = $3
              AND status IN ('held', 'claimed')
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(room_id)
        .bind(holder.kind())
        .bind(holder.value())
        .fetch_optional(&mut *conn)
        .await?;

        Ok(reservation)
    }

    pub async fn count_active_for_device(
        conn: &mut PgConnection,
        room_id: Uuid,
        device_fingerprint_hash: &str,
    ) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM gift_reservations
            WHERE room_id = $1 AND device_fingerprint_hash = $2 AND status IN ('held', 'claimed')
            "#,
        )
        .bind(room_id)
        .bind(device_fingerprint_hash)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }

    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Reservation>, RepositoryError> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM gift_reservations WHERE id = $1 FOR UPDATE",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(reservation)
    }

    pub async fn insert(conn: &mut PgConnection, reservation: &Reservation) -> Result<Reservation, RepositoryError> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            INSERT INTO gift_reservations
            (id, room_id, holder_kind, holder_ref, device_fingerprint_hash, status,
             contact_name, contact_email, contact_phone, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(reservation.id)
        .bind(reservation.room_id)
        .bind(&reservation.holder_kind)
        .bind(&reservation.holder_ref)
        .bind(&reservation.device_fingerprint_hash)
        .bind(&reservation.status)
        .bind(&reservation.contact_name)
        .bind(&reservation.contact_email)
        .bind(&reservation.contact_phone)
        .bind(reservation.created_at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(reservation)
    }

    /// Persist the claimed state, including a rebound holder
    pub async fn save_claimed(conn: &mut PgConnection, reservation: &Reservation) -> Result<Reservation, RepositoryError> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            UPDATE gift_reservations
            SET status = $2, holder_kind = $3, holder_ref = $4, claimed_by = $5, claimed_at = $6
            WHERE id = $1 AND status = 'held'
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(reservation.id)
        .bind(&reservation.status)
        .bind(&reservation.holder_kind)
        .bind(&reservation.holder_ref)
        .bind(reservation.claimed_by)
        .bind(reservation.claimed_at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(reservation)
    }

    /// Expire every held reservation of a room, returning how many were released
    pub async fn expire_held(
        conn: &mut PgConnection,
        room_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<i32, RepositoryError> {
        let rows = sqlx::query(
            r#"
            UPDATE gift_reservations
            SET status = 'expired', expired_at = $2
            WHERE room_id = $1 AND status = 'held'
            "#,
        )
        .bind(room_id)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        Ok(rows as i32)
    }
}
