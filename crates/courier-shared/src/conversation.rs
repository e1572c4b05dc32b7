//! Conversation and user-profile models.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DIRECT_PARTICIPANTS, GROUP_MIN_PARTICIPANTS};
use crate::error::ValidationError;
use crate::types::{ConversationId, ConversationKind, UserId};

/// Denormalized summary of the newest message, kept on the conversation so
/// the list view can render previews and unread markers without loading the
/// message collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastMessage {
    pub text: String,
    pub sender_id: UserId,
    pub timestamp: DateTime<Utc>,
    pub read_by: BTreeSet<UserId>,
}

/// A conversation thread: a direct pair or a named group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    /// Group name; direct conversations are unnamed.
    pub name: Option<String>,
    pub participants: BTreeSet<UserId>,
    pub last_message: Option<LastMessage>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Check structural invariants: a direct conversation has exactly two
    /// participants, a group at least three and a name.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.kind {
            ConversationKind::Direct => {
                if self.participants.len() != DIRECT_PARTICIPANTS {
                    return Err(ValidationError::DirectParticipantCount(
                        self.participants.len(),
                    ));
                }
            }
            ConversationKind::Group => {
                if self.participants.len() < GROUP_MIN_PARTICIPANTS {
                    return Err(ValidationError::GroupParticipantCount(
                        self.participants.len(),
                    ));
                }
                if self.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
                    return Err(ValidationError::MissingGroupName);
                }
            }
        }
        Ok(())
    }

    /// Every participant except `me`.
    pub fn other_participants<'a>(&'a self, me: &'a UserId) -> impl Iterator<Item = &'a UserId> {
        self.participants.iter().filter(move |p| *p != me)
    }

    /// The single counterpart of a direct conversation, if any.
    pub fn direct_counterpart<'a>(&'a self, me: &'a UserId) -> Option<&'a UserId> {
        match self.kind {
            ConversationKind::Direct => self.other_participants(me).next(),
            ConversationKind::Group => None,
        }
    }
}

/// Cached snapshot of a user profile, enough to render names, avatars and
/// address push notifications without a network round trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Device push token, if the user has registered one.
    pub push_token: Option<String>,
    pub created_at: DateTime<Utc>,
}
