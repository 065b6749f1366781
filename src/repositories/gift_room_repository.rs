use crate::error::RepositoryError;
use crate::models::GiftRoom;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use uuid::Uuid;

const ROOM_COLUMNS: &str = "id, token, creator_id, room_type, capacity, amount_per_gift, \
     joined_count, claimed_count, status, message, created_at, expires_at, refund_amount, refunded_at";

/// Repository for gift room data access
pub struct GiftRoomRepository {
    pool: PgPool,
}

impl GiftRoomRepository {
    /// Create a new GiftRoomRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new room
    pub async fn insert(conn: &mut PgConnection, room: &GiftRoom) -> Result<GiftRoom, RepositoryError> {
        let room = sqlx::query_as::<_, GiftRoom>(&format!(
            r#"
            INSERT INTO gift_rooms
            (id, token, creator_id, room_type, capacity, amount_per_gift, joined_count,
             claimed_count, status, message, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            ROOM_COLUMNS
        ))
        .bind(room.id)
        .bind(&room.token)
        .bind(room.creator_id)
        .bind(&room.room_type)
        .bind(room.capacity)
        .bind(room.amount_per_gift)
        .bind(room.joined_count)
        .bind(room.claimed_count)
        .bind(&room.status)
        .bind(&room.message)
        .bind(room.created_at)
        .bind(room.expires_at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(room)
    }

    /// Find a room by UUID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<GiftRoom>, RepositoryError> {
        let room = sqlx::query_as::<_, GiftRoom>(&format!(
            "SELECT {} FROM gift_rooms WHERE id = $1",
            ROOM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(room)
    }

    /// Find a room by its share token
    pub async fn find_by_token(&self, token: &str) -> Result<Option<GiftRoom>, RepositoryError> {
        let room = sqlx::query_as::<_, GiftRoom>(&format!(
            "SELECT {} FROM gift_rooms WHERE token = $1",
            ROOM_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(room)
    }

    /// Rooms opened by a creator, newest first
    pub async fn find_by_creator(&self, creator_id: Uuid, limit: i64) -> Result<Vec<GiftRoom>, RepositoryError> {
        let rooms = sqlx::query_as::<_, GiftRoom>(&format!(
            r#"
            SELECT {}
            FROM gift_rooms
            WHERE creator_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
            ROOM_COLUMNS
        ))
        .bind(creator_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rooms)
    }

    /// Lock a room row; every state transition on a room starts here
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<GiftRoom>, RepositoryError> {
        let room = sqlx::query_as::<_, GiftRoom>(&format!(
            "SELECT {} FROM gift_rooms WHERE id = $1 FOR UPDATE",
            ROOM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(room)
    }

    /// Lock open rooms past `cutoff`, skipping rows another instance is already finalising
    pub async fn lock_due(
        conn: &mut PgConnection,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<GiftRoom>, RepositoryError> {
        let rooms = sqlx::query_as::<_, GiftRoom>(&format!(
            r#"
            SELECT {}
            FROM gift_rooms
            WHERE status IN ('active', 'full') AND expires_at < $1
            ORDER BY expires_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
            ROOM_COLUMNS
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rooms)
    }

    /// Write back counters and lifecycle fields of a locked room.
    ///
    /// The CHECK constraints on the table reject any write that would break
    /// `0 <= claimed_count <= joined_count <= capacity`.
    pub async fn save_state(conn: &mut PgConnection, room: &GiftRoom) -> Result<GiftRoom, RepositoryError> {
        let room = sqlx::query_as::<_, GiftRoom>(&format!(
            r#"
            UPDATE gift_rooms
            SET joined_count = $2, claimed_count = $3, status = $4,
                refund_amount = $5, refunded_at = $6
            WHERE id = $1
            RETURNING {}
            "#,
            ROOM_COLUMNS
        ))
        .bind(room.id)
        .bind(room.joined_count)
        .bind(room.claimed_count)
        .bind(&room.status)
        .bind(room.refund_amount)
        .bind(room.refunded_at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(room)
    }
}
