//! The abstract remote document store contract.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use courier_shared::{
    ClientSendId, Conversation, ConversationId, ConversationKind, ImageRef, LastMessage, Message,
    MessageId, UserId,
};

use crate::error::Result;
use crate::subscription::Subscription;

/// Payload of a message create.  The server assigns the id and the
/// authoritative timestamp; `client_send_id` is carried as an opaque
/// correlation field and echoed back in snapshots.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub text: String,
    pub image: Option<ImageRef>,
    pub client_send_id: ClientSendId,
    pub client_sent_at: DateTime<Utc>,
}

impl MessageDraft {
    pub fn from_message(message: &Message) -> Option<Self> {
        Some(Self {
            conversation_id: message.conversation_id.clone(),
            sender_id: message.sender_id.clone(),
            text: message.text.clone(),
            image: message.image.clone(),
            client_send_id: message.client_send_id?,
            client_sent_at: message.client_sent_at.unwrap_or_else(Utc::now),
        })
    }
}

/// Document-oriented remote store: filtered/ordered subscriptions that
/// re-deliver full snapshots on every change, merge updates, and atomic
/// set-membership receipt writes safe under concurrent clients.
///
/// Receipt sets only ever grow; the store must apply membership adds as a
/// union, never a replace.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Persist a new message.  Returns the server-assigned id.
    async fn create_message(&self, draft: MessageDraft) -> Result<MessageId>;

    /// Atomic union-add of `user` to the message's `delivered_to` set, with
    /// the receipt timestamp recorded on first delivery.
    async fn add_delivery_receipt(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        user: &UserId,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Atomic union-add of `user` to the message's `read_by` set.
    async fn add_read_receipt(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        user: &UserId,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Merge-update the conversation's denormalized `last_message` summary
    /// and bump `updated_at`.
    async fn update_conversation_summary(
        &self,
        conversation_id: &ConversationId,
        summary: LastMessage,
    ) -> Result<()>;

    /// Union-add `user` to `last_message.read_by` on the conversation
    /// document, keeping list-view unread markers consistent.
    async fn patch_last_message_read_by(
        &self,
        conversation_id: &ConversationId,
        user: &UserId,
    ) -> Result<()>;

    /// Find the direct conversation for an unordered user pair, if any.
    async fn find_direct_conversation(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Option<ConversationId>>;

    /// Create a conversation document.  The caller validates participant
    /// counts; the store only assigns identity.
    async fn create_conversation(
        &self,
        kind: ConversationKind,
        name: Option<String>,
        participants: BTreeSet<UserId>,
    ) -> Result<ConversationId>;

    /// Fetch a single conversation document.
    async fn get_conversation(&self, id: &ConversationId) -> Result<Conversation>;

    /// Subscribe to all conversations `user` participates in, ordered by
    /// `updated_at` descending.  Delivers the current snapshot immediately
    /// and a fresh full snapshot on every change.
    fn subscribe_conversations(&self, user: &UserId) -> Subscription<Vec<Conversation>>;

    /// Subscribe to all messages of a conversation, ordered by server
    /// timestamp ascending, with the same snapshot semantics.
    fn subscribe_messages(&self, conversation_id: &ConversationId) -> Subscription<Vec<Message>>;
}
