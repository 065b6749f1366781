//! Domain models for the gift room backend.
//!
//! This module contains the database-backed models for rooms, reservations,
//! claims and the wallet ledger they move money through.

pub mod account;
pub mod claim;
pub mod gift_room;
pub mod reservation;
pub mod wallet;

// Re-export all models for convenient access
pub use account::{Account, CreatorInfo};
pub use claim::GiftClaim;
pub use gift_room::{GiftRoom, NewGiftRoom, RoomStatus, RoomType, MAX_MESSAGE_LEN};
pub use reservation::{ContactInfo, HolderRef, Reservation, ReservationStatus};
pub use wallet::{
    checked_ledger_add, checked_ledger_mul, LedgerEntry, TransactionType, Wallet, WalletTransaction,
    MAX_LEDGER_AMOUNT,
};
