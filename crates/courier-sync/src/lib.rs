//! # courier-sync
//!
//! The offline-first synchronization core.
//!
//! [`SyncEngine`] reconciles three sources of truth into one ordered,
//! deduplicated message view per conversation: the local durable cache
//! (fastest, possibly stale), the in-memory pending-send map (authoritative
//! for in-flight optimistic sends), and the remote live feed (authoritative
//! for everything once it arrives).  It also owns optimistic send/retry,
//! idempotent delivery/read receipts, and the unread-badge projection.
//!
//! Nothing in here is fatal: a failed subscription, write, or cache
//! operation degrades to staleness or a retryable `Failed` record, never a
//! crash of the reconciliation loop.

pub mod conversations;
pub mod engine;
pub mod projector;
pub mod receipts;
pub mod reconcile;
pub mod send;
pub mod session;

mod error;

pub use engine::SyncEngine;
pub use error::{Result, SyncError};
pub use session::{SendMetric, SyncSession};
