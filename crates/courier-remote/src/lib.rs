//! # courier-remote
//!
//! Remote collaborator contracts and the live feed adapter.
//!
//! The remote document store is abstracted behind the [`RemoteStore`]
//! trait: filtered collection subscriptions that deliver *full snapshots*
//! on every change, single-document merge updates, and atomic
//! set-membership receipt writes.  [`MemoryRemote`] is a complete in-memory
//! implementation used by tests and local development.
//!
//! The out-of-core collaborators (AI text service, push sender) are narrow
//! request/response traits the engine calls through; their internals are
//! someone else's problem.

pub mod memory;
pub mod push;
pub mod store;
pub mod subscription;
pub mod text;

mod error;

pub use error::{RemoteError, Result};
pub use memory::MemoryRemote;
pub use push::{NoopPushSender, PushPayload, PushSender};
pub use store::{MessageDraft, RemoteStore};
pub use subscription::{snapshot_channel, SnapshotSender, Subscription, Unsubscribe};
pub use text::{TextOutput, TextRequest, TextResponse, TextService};
