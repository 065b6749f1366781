//! HTTP surface of the gift room service.
//!
//! Every response uses the `{success, data?, error?}` envelope. Errors carry a
//! stable `code`, a human-readable `message` and whether a retry may help.

use crate::error::AppError;
use crate::models::{ContactInfo, GiftRoom, Wallet, WalletTransaction};
use crate::services::{device_identifier, CreateRoomInput, DeviceSignals, JoinCaller};
use crate::AppState;
use axum::async_trait;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{ConnectInfo, FromRequest, FromRequestParts, Path, Query, Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::request::Parts;
use http::{header, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

type SharedState = Arc<AppState>;

const WALLET_HISTORY_LIMIT: i64 = 50;

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

fn ok<T: Serialize>(data: T) -> Response {
    respond(StatusCode::OK, data)
}

fn respond<T: Serialize>(status: StatusCode, data: T) -> Response {
    let body = ApiResponse {
        success: true,
        data: Some(data),
        error: None,
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = if status.is_server_error() && !self.is_retryable() {
            error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            if status.is_server_error() {
                warn!("Request failed with transient error: {}", self);
            }
            self.to_string()
        };

        let retry_after_secs = match &self {
            AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let body: ApiResponse<()> = ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code: self.code().to_string(),
                message,
                retryable: self.is_retryable(),
                retry_after_secs,
            }),
        };

        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Response, AppError>;

// ============================================================================
// Extractors
// ============================================================================

/// JSON body whose rejections are reported inside the envelope
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| AppError::Validation(e.body_text()))?;
        Ok(ApiJson(value))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Authenticated account
pub struct Session(pub Uuid);

#[async_trait]
impl FromRequestParts<SharedState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;
        let account_id = state.sessions.verify(token, state.clock.now())?;
        Ok(Session(account_id))
    }
}

/// Optional session; a present but invalid token is still rejected
pub struct MaybeSession(pub Option<Uuid>);

#[async_trait]
impl FromRequestParts<SharedState> for MaybeSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        match bearer_token(parts) {
            Some(token) => Ok(MaybeSession(Some(
                state.sessions.verify(token, state.clock.now())?,
            ))),
            None => Ok(MaybeSession(None)),
        }
    }
}

/// Client address used for rate limiting.
///
/// The socket peer by default. With `TRUST_FORWARDED_FOR` set, the last
/// `X-Forwarded-For` hop, which is the one our own proxy appended; earlier
/// hops are whatever the client sent.
pub struct ClientIp(pub Option<String>);

#[async_trait]
impl FromRequestParts<SharedState> for ClientIp {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let forwarded = if state.config.trust_forwarded_for {
            parts
                .headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.rsplit(',').next())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        } else {
            None
        };

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(ClientIp(forwarded.or(peer)))
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: SharedState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/device/identify", post(identify_device))
        .route("/wallet", get(wallet))
        .route("/gift-rooms/create", post(create_room))
        .route("/gift-rooms/join", post(join_room))
        .route("/gift-rooms/claim", post(claim_gift))
        .route("/gift-rooms/refund", get(refund_preview).post(request_refund))
        .route("/gift-rooms/my-rooms", get(my_rooms))
        .route("/gift-rooms/history", get(history))
        .route("/gift-rooms/:token", get(room_details));

    if state.config.is_development() {
        router = router
            .route("/dev/accounts", post(dev_create_account))
            .route("/dev/deposit", post(dev_deposit));
    }

    router.with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    storage: &'static str,
    environment: String,
}

async fn health(State(state): State<SharedState>) -> Response {
    ok(HealthResponse {
        status: "ok",
        storage: state.config.storage_backend.as_str(),
        environment: state.config.environment.clone(),
    })
}

async fn identify_device(ApiJson(signals): ApiJson<DeviceSignals>) -> Response {
    ok(device_identifier(&signals))
}

#[derive(Serialize)]
struct WalletResponse {
    wallet: Wallet,
    transactions: Vec<WalletTransaction>,
}

async fn wallet(State(state): State<SharedState>, Session(account_id): Session) -> ApiResult {
    let wallet = state
        .store
        .wallet(account_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Wallet not found".to_string()))?;
    let transactions = state
        .store
        .wallet_transactions(account_id, WALLET_HISTORY_LIMIT)
        .await?;

    Ok(ok(WalletResponse {
        wallet,
        transactions,
    }))
}

#[derive(Deserialize)]
struct CreateRoomBody {
    #[serde(rename = "type")]
    room_type: String,
    capacity: i32,
    amount: Decimal,
    message: Option<String>,
    expiration_hours: Option<i64>,
}

#[derive(Serialize)]
struct CreateRoomResponse {
    token: String,
    room: GiftRoom,
}

async fn create_room(
    State(state): State<SharedState>,
    Session(creator_id): Session,
    ApiJson(body): ApiJson<CreateRoomBody>,
) -> ApiResult {
    let room = state
        .rooms
        .create_room(
            creator_id,
            CreateRoomInput {
                room_type: body.room_type,
                capacity: body.capacity,
                amount: body.amount,
                message: body.message,
                expiration_hours: body.expiration_hours,
            },
        )
        .await?;

    Ok(respond(
        StatusCode::CREATED,
        CreateRoomResponse {
            token: room.token.clone(),
            room,
        },
    ))
}

#[derive(Deserialize)]
struct RoomDetailsQuery {
    /// Raw fingerprint, the same value sent as `device_fingerprint` on join;
    /// it is salted and hashed server-side. `device_hash` is the legacy name.
    #[serde(alias = "device_hash")]
    device_fingerprint: Option<String>,
}

async fn room_details(
    State(state): State<SharedState>,
    MaybeSession(viewer): MaybeSession,
    Path(token): Path<String>,
    query: Result<Query<RoomDetailsQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let details = state
        .rooms
        .get_room_details(&token, query.device_fingerprint.as_deref(), viewer)
        .await?;
    Ok(ok(details))
}

#[derive(Deserialize)]
struct JoinBody {
    room_token: String,
    device_fingerprint: String,
    contact_info: Option<ContactInfo>,
}

async fn join_room(
    State(state): State<SharedState>,
    MaybeSession(account_id): MaybeSession,
    ClientIp(client_ip): ClientIp,
    ApiJson(body): ApiJson<JoinBody>,
) -> ApiResult {
    let result = state
        .reservations
        .join(
            &body.room_token,
            JoinCaller {
                account_id,
                client_ip,
            },
            &body.device_fingerprint,
            body.contact_info,
        )
        .await?;
    Ok(ok(result))
}

#[derive(Deserialize)]
struct ClaimBody {
    reservation_id: Uuid,
    device_fingerprint: Option<String>,
}

async fn claim_gift(
    State(state): State<SharedState>,
    Session(claimant_id): Session,
    ApiJson(body): ApiJson<ClaimBody>,
) -> ApiResult {
    let result = state
        .claims
        .claim(
            body.reservation_id,
            claimant_id,
            body.device_fingerprint.as_deref(),
        )
        .await?;
    Ok(ok(result))
}

#[derive(Deserialize)]
struct RefundQuery {
    room_id: Uuid,
}

async fn refund_preview(
    State(state): State<SharedState>,
    Session(creator_id): Session,
    query: Result<Query<RefundQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let preview = state.refunds.preview(query.room_id, creator_id).await?;
    Ok(ok(preview))
}

#[derive(Deserialize)]
struct RefundBody {
    room_id: Uuid,
}

async fn request_refund(
    State(state): State<SharedState>,
    Session(creator_id): Session,
    ApiJson(body): ApiJson<RefundBody>,
) -> ApiResult {
    let result = state.refunds.refund(body.room_id, creator_id).await?;
    Ok(ok(result))
}

async fn my_rooms(State(state): State<SharedState>, Session(creator_id): Session) -> ApiResult {
    Ok(ok(state.rooms.my_rooms(creator_id).await?))
}

async fn history(State(state): State<SharedState>, Session(account_id): Session) -> ApiResult {
    Ok(ok(state.rooms.history(account_id).await?))
}

// Development stand-ins for the auth provider and the payment gateway

#[derive(Deserialize)]
struct DevAccountBody {
    display_name: String,
    referred_by: Option<Uuid>,
}

#[derive(Serialize)]
struct DevAccountResponse {
    account_id: Uuid,
    session_token: String,
}

async fn dev_create_account(
    State(state): State<SharedState>,
    ApiJson(body): ApiJson<DevAccountBody>,
) -> ApiResult {
    let name = body.display_name.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(AppError::Validation(
            "display_name must be 1 to 100 characters".to_string(),
        ));
    }

    let now = state.clock.now();
    let account = state.store.create_account(name, body.referred_by, now).await?;
    let session_token = state.sessions.issue(account.id, now)?;

    Ok(respond(
        StatusCode::CREATED,
        DevAccountResponse {
            account_id: account.id,
            session_token,
        },
    ))
}

#[derive(Deserialize)]
struct DevDepositBody {
    amount: Decimal,
}

async fn dev_deposit(
    State(state): State<SharedState>,
    Session(account_id): Session,
    ApiJson(body): ApiJson<DevDepositBody>,
) -> ApiResult {
    let wallet = state
        .store
        .deposit(account_id, body.amount, state.clock.now())
        .await?;
    Ok(ok(wallet))
}
