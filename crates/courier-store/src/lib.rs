//! # courier-store
//!
//! Local durable cache for the Courier sync engine, backed by SQLite.
//!
//! The cache mirrors every server-confirmed conversation, message and user
//! profile so the UI can render instantly on cold start, before the remote
//! feed responds.  It is advisory: the live snapshot always supersedes it.
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed upsert/scan helpers.

pub mod conversations;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
