pub mod account_repository;
pub mod wallet_repository;
pub mod gift_room_repository;
pub mod reservation_repository;
pub mod claim_repository;
pub mod pg_store;

// Re-export all repositories for convenient access
pub use account_repository::AccountRepository;
pub use wallet_repository::WalletRepository;
pub use gift_room_repository::GiftRoomRepository;
pub use reservation_repository::ReservationRepository;
pub use claim_repository::ClaimRepository;
pub use pg_store::PgGiftRoomStore;
