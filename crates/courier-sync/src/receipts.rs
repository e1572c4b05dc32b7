//! Read receipts and the read-indicator derivation.
//!
//! Delivery receipts are issued by the engine's snapshot loop (see
//! `engine.rs`); this module covers the externally driven side: marking
//! messages read once the UI reports them visible, and deriving which
//! single message shows the read indicator.

use chrono::{DateTime, Utc};
use tracing::debug;

use courier_shared::constants::{LAST_MESSAGE_TOLERANCE_MS, READ_RECEIPT_CHUNK};
use courier_shared::{Conversation, ConversationId, ConversationKind, Message, UserId};

use crate::engine::SyncEngine;
use crate::error::Result;

impl SyncEngine {
    /// Mark messages as read by the current user.
    ///
    /// Provisional records are filtered out (nothing to acknowledge yet),
    /// the rest are written in fixed-size chunks, and individual write
    /// failures (e.g. a message deleted remotely) never abort the batch.
    /// When the newest marked message matches the conversation's
    /// `last_message` summary within a small tolerance, the summary's
    /// `read_by` is patched too, keeping list-view unread markers correct.
    pub async fn mark_as_read(
        &self,
        conversation_id: &ConversationId,
        messages: &[Message],
    ) -> Result<()> {
        let me = &self.me;
        let now = Utc::now();

        let mut targets: Vec<(courier_shared::MessageId, DateTime<Utc>)> = messages
            .iter()
            .filter(|m| m.is_persisted() && m.sender_id != *me && !m.read_by.contains(me))
            .filter_map(|m| m.id.clone().map(|id| (id, m.order_timestamp())))
            .collect();
        if targets.is_empty() {
            return Ok(());
        }

        for chunk in targets.chunks(READ_RECEIPT_CHUNK) {
            for (message_id, _) in chunk {
                if let Err(e) = self
                    .remote
                    .add_read_receipt(conversation_id, message_id, me, now)
                    .await
                {
                    debug!(message = %message_id, error = %e, "read receipt dropped");
                }
            }
        }

        targets.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        if let Some((_, newest_ts)) = targets.last() {
            if let Some(summary_ts) = self.summary_timestamp(conversation_id) {
                let skew = (summary_ts - *newest_ts).num_milliseconds().abs();
                if skew <= LAST_MESSAGE_TOLERANCE_MS {
                    if let Err(e) = self
                        .remote
                        .patch_last_message_read_by(conversation_id, me)
                        .await
                    {
                        debug!(conversation = %conversation_id, error = %e, "last-message read patch dropped");
                    }
                }
            }
        }
        Ok(())
    }

    /// The `last_message` summary timestamp, from session state first and
    /// the cache as fallback.
    fn summary_timestamp(&self, conversation_id: &ConversationId) -> Option<DateTime<Utc>> {
        if let Some(conversation) = self.session.conversation(conversation_id) {
            return conversation.last_message.map(|lm| lm.timestamp);
        }
        self.with_store(|db| db.get_conversation(conversation_id))
            .ok()
            .and_then(|c| c.last_message)
            .map(|lm| lm.timestamp)
    }
}

/// The most recent message read by the relevant counterpart(s): the single
/// message that shows a read indicator in the UI.
///
/// Walks the list from newest to oldest.  For a direct conversation the
/// one other participant must appear in `read_by`; for a group, any other
/// participant counts.  Ties on identical display timestamps prefer the
/// greater store-assigned id.
pub fn last_read_message<'a>(
    conversation: &Conversation,
    messages: &'a [Message],
    me: &UserId,
) -> Option<&'a Message> {
    let mut ordered: Vec<&Message> = messages.iter().collect();
    ordered.sort_by(|a, b| {
        b.order_timestamp()
            .cmp(&a.order_timestamp())
            .then_with(|| b.id.cmp(&a.id))
    });

    ordered.into_iter().find(|m| match conversation.kind {
        ConversationKind::Direct => conversation
            .direct_counterpart(me)
            .map_or(false, |other| m.read_by.contains(other)),
        ConversationKind::Group => conversation
            .other_participants(me)
            .any(|p| m.read_by.contains(p)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;
    use courier_shared::{MessageId, MessageStatus};

    fn ts(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, sec).unwrap()
    }

    fn confirmed(id: &str, sec: u32, read_by: &[&str]) -> Message {
        let mut m = Message::provisional(
            ConversationId::new("c1"),
            UserId::new("u1"),
            "hi",
            None,
        );
        m.id = Some(MessageId::new(id));
        m.status = MessageStatus::Sent;
        m.timestamp = Some(ts(sec));
        m.read_by = read_by.iter().map(|u| UserId::new(*u)).collect();
        m
    }

    fn direct() -> Conversation {
        Conversation {
            id: ConversationId::new("c1"),
            kind: ConversationKind::Direct,
            name: None,
            participants: [UserId::new("u1"), UserId::new("u2")].into_iter().collect(),
            last_message: None,
            updated_at: Utc::now(),
        }
    }

    fn group() -> Conversation {
        Conversation {
            id: ConversationId::new("c1"),
            kind: ConversationKind::Group,
            name: Some("plans".into()),
            participants: ["u1", "u2", "u3"].iter().map(|u| UserId::new(*u)).collect(),
            last_message: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn direct_requires_the_counterpart() {
        let me = UserId::new("u1");
        let messages = vec![
            confirmed("m1", 10, &["u1", "u2"]),
            confirmed("m2", 20, &["u1"]),
        ];
        let hit = last_read_message(&direct(), &messages, &me).unwrap();
        assert_eq!(hit.id, Some(MessageId::new("m1")));
    }

    #[test]
    fn group_counts_any_other_participant() {
        let me = UserId::new("u1");
        let messages = vec![
            confirmed("m1", 10, &["u3"]),
            confirmed("m2", 20, &["u1"]),
        ];
        let hit = last_read_message(&group(), &messages, &me).unwrap();
        assert_eq!(hit.id, Some(MessageId::new("m1")));
    }

    #[test]
    fn nothing_read_yields_none() {
        let me = UserId::new("u1");
        let messages = vec![confirmed("m1", 10, &["u1"])];
        assert!(last_read_message(&direct(), &messages, &me).is_none());

        let empty: Vec<Message> = Vec::new();
        assert!(last_read_message(&direct(), &empty, &me).is_none());
    }

    #[test]
    fn identical_timestamps_prefer_greater_id() {
        let me = UserId::new("u1");
        let messages = vec![
            confirmed("m1", 10, &["u2"]),
            confirmed("m2", 10, &["u2"]),
        ];
        let hit = last_read_message(&direct(), &messages, &me).unwrap();
        assert_eq!(hit.id, Some(MessageId::new("m2")));
    }

    #[test]
    fn newest_match_wins() {
        let me = UserId::new("u1");
        let mut newest = confirmed("m3", 30, &["u2"]);
        newest.read_by = BTreeSet::from([UserId::new("u2")]);
        let messages = vec![
            confirmed("m1", 10, &["u2"]),
            confirmed("m2", 20, &[]),
            newest,
        ];
        let hit = last_read_message(&direct(), &messages, &me).unwrap();
        assert_eq!(hit.id, Some(MessageId::new("m3")));
    }
}
