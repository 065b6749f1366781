//! Gift Room Backend Library
//!
//! Capacity-limited gift pools funded from a creator's wallet: escrow at
//! creation, race-free reservations, exactly-once claims and refunds.
//! This module exposes the backend components for use by the binary and tests.

pub mod auth;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod http_service;
pub mod models;
pub mod repositories;
pub mod services;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};

use auth::SessionVerifier;
use clock::Clock;
use services::{
    AuditTrailService, ClaimService, ExpirationSweeper, RefundService, ReservationService,
    RoomService,
};
use std::sync::Arc;
use store::GiftRoomStore;

/// Application state containing the store handle and services
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn GiftRoomStore>,
    pub clock: Arc<dyn Clock>,
    pub audit: Arc<AuditTrailService>,
    pub sessions: SessionVerifier,
    pub rooms: RoomService,
    pub reservations: ReservationService,
    pub claims: ClaimService,
    pub refunds: RefundService,
}

impl AppState {
    /// Wire services around an explicitly provided store
    pub fn new(
        config: AppConfig,
        store: Arc<dyn GiftRoomStore>,
        clock: Arc<dyn Clock>,
        audit: Arc<AuditTrailService>,
    ) -> Self {
        let gift_rooms = config.gift_rooms.clone();
        let sessions = SessionVerifier::new(
            config.session_secret.clone(),
            config.session_max_age_secs,
            config.is_development(),
        );

        Self {
            rooms: RoomService::new(store.clone(), clock.clone(), audit.clone(), gift_rooms.clone()),
            reservations: ReservationService::new(
                store.clone(),
                clock.clone(),
                audit.clone(),
                gift_rooms.clone(),
            ),
            claims: ClaimService::new(store.clone(), clock.clone(), audit.clone(), gift_rooms.clone()),
            refunds: RefundService::new(store.clone(), clock.clone(), audit.clone(), &gift_rooms),
            sessions,
            config,
            store,
            clock,
            audit,
        }
    }

    /// Expiration sweeper sharing this state's store, clock and audit trail
    pub fn sweeper(&self) -> ExpirationSweeper {
        ExpirationSweeper::new(
            self.store.clone(),
            self.clock.clone(),
            self.audit.clone(),
            &self.config.gift_rooms,
        )
    }
}
