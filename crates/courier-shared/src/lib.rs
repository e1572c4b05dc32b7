//! # courier-shared
//!
//! Domain types shared by every Courier crate: identifiers, the message and
//! conversation models, validation, and the constants that tune the sync
//! engine.  Everything here is plain data, no I/O.

pub mod constants;
pub mod conversation;
pub mod error;
pub mod message;
pub mod types;

pub use conversation::{Conversation, LastMessage, UserProfile};
pub use error::ValidationError;
pub use message::{ImageRef, Message, MessageStatus};
pub use types::{ClientSendId, ConversationId, ConversationKind, MessageId, UserId};
