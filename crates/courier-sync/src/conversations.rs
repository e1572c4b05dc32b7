//! Conversation directory: the live conversation list and thread creation.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use courier_shared::{Conversation, ConversationId, ConversationKind, UserId, ValidationError};

use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};
use crate::projector;

impl SyncEngine {
    /// Start following the user's conversation list.
    ///
    /// Cached conversations are published immediately for cold start, then
    /// every live snapshot is mirrored to the cache and re-projected into
    /// the unread badge.  The list outlives conversation switches, so it
    /// carries no generation guard.
    pub fn start(&self) {
        let cached = self
            .with_store(|db| db.list_conversations())
            .unwrap_or_else(|e| {
                warn!(error = %e, "conversation cache read failed, rendering remote-only");
                Vec::new()
            });
        if !cached.is_empty() {
            self.publish_conversations(cached, true);
        }

        let mut subscription = self.remote.subscribe_conversations(&self.me);
        let engine = self.clone();
        tokio::spawn(async move {
            while let Some(snapshot) = subscription.recv().await {
                engine.handle_conversation_snapshot(snapshot);
            }
            debug!("conversation feed ended");
        });
        info!(user = %self.me, "conversation list sync started");
    }

    fn handle_conversation_snapshot(&self, snapshot: Vec<Conversation>) {
        self.with_store(|db| {
            for conversation in &snapshot {
                if let Err(e) = db.upsert_conversation(conversation) {
                    warn!(conversation = %conversation.id, error = %e, "conversation cache mirror failed");
                }
            }
        });
        self.publish_conversations(snapshot, false);
    }

    fn publish_conversations(&self, conversations: Vec<Conversation>, from_cache: bool) {
        let badge = projector::unread_total(&conversations, &self.me);
        debug!(count = conversations.len(), badge, from_cache, "conversation list updated");
        self.session.set_conversations(conversations.clone());
        let _ = self.conversations_tx.send(conversations);
        let _ = self.badge_tx.send(badge);
    }

    /// The direct conversation with `other`, creating it if it does not
    /// exist.  Never creates a duplicate thread for the same pair.
    pub async fn get_or_create_direct(&self, other: &UserId) -> Result<ConversationId> {
        let participants: BTreeSet<UserId> =
            [self.me.clone(), other.clone()].into_iter().collect();
        if participants.len() != 2 {
            return Err(SyncError::Validation(
                ValidationError::DirectParticipantCount(participants.len()),
            ));
        }

        if let Some(existing) = self
            .remote
            .find_direct_conversation(&self.me, other)
            .await?
        {
            debug!(conversation = %existing, other = %other, "reusing direct conversation");
            return Ok(existing);
        }

        let id = self
            .remote
            .create_conversation(ConversationKind::Direct, None, participants)
            .await?;
        info!(conversation = %id, other = %other, "created direct conversation");
        Ok(id)
    }

    /// Create a group conversation.  The current user is always included.
    pub async fn create_group(
        &self,
        name: impl Into<String>,
        members: BTreeSet<UserId>,
    ) -> Result<ConversationId> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SyncError::Validation(ValidationError::MissingGroupName));
        }

        let mut participants = members;
        participants.insert(self.me.clone());
        if participants.len() < courier_shared::constants::GROUP_MIN_PARTICIPANTS {
            return Err(SyncError::Validation(
                ValidationError::GroupParticipantCount(participants.len()),
            ));
        }

        let id = self
            .remote
            .create_conversation(ConversationKind::Group, Some(name), participants)
            .await?;
        info!(conversation = %id, "created group conversation");
        Ok(id)
    }
}
