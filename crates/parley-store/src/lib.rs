//! # parley-store
//!
//! Durable record store for the Parley messaging core, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model. No business rules live here; authorization, validation, and
//! event publication are the core's responsibility.

pub mod conversations;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod preferences;
pub mod presence;
pub mod reactions;
pub mod receipts;
pub mod users;

mod columns;
mod error;

pub use conversations::direct_pair_key;
pub use database::Database;
pub use error::StoreError;
