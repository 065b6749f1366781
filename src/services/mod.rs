pub mod audit;
pub mod claim_service;
pub mod device_identity;
pub mod expiration;
pub mod rate_limit;
pub mod refund_service;
pub mod reservation_service;
pub mod retry;
pub mod room_service;

pub use audit::AuditTrailService;
pub use claim_service::{ClaimResult, ClaimService};
pub use device_identity::{device_identifier, hash_fingerprint, DeviceIdentity, DeviceSignals};
pub use expiration::ExpirationSweeper;
pub use rate_limit::RateLimiter;
pub use refund_service::{RefundPreview, RefundResult, RefundService};
pub use reservation_service::{JoinCaller, JoinResult, ReservationService};
pub use retry::RetryPolicy;
pub use room_service::{CreateRoomInput, GiftHistory, RoomDetails, RoomService, RoomSummary};
