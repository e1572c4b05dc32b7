//! Unread projection over conversation summaries.
//!
//! A derived read-model: it consumes the denormalized `last_message`
//! summaries and never touches message collections, so the list view and
//! app badge stay correct without loading any conversation.

use serde::Serialize;

use courier_shared::{Conversation, ConversationId, UserId};

/// Per-conversation unread state plus the app badge total.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UnreadSummary {
    pub unread: Vec<ConversationId>,
    pub total: u32,
}

/// Whether the conversation shows an unread marker for `me`: someone else
/// sent the last message and `me` has not read it.
pub fn is_unread(conversation: &Conversation, me: &UserId) -> bool {
    conversation
        .last_message
        .as_ref()
        .map_or(false, |last| last.sender_id != *me && !last.read_by.contains(me))
}

pub fn unread_summary(conversations: &[Conversation], me: &UserId) -> UnreadSummary {
    let unread: Vec<ConversationId> = conversations
        .iter()
        .filter(|c| is_unread(c, me))
        .map(|c| c.id.clone())
        .collect();
    let total = unread.len() as u32;
    UnreadSummary { unread, total }
}

pub fn unread_total(conversations: &[Conversation], me: &UserId) -> u32 {
    unread_summary(conversations, me).total
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_shared::{ConversationKind, LastMessage};

    fn conversation(id: &str, last: Option<LastMessage>) -> Conversation {
        Conversation {
            id: ConversationId::new(id),
            kind: ConversationKind::Direct,
            name: None,
            participants: [UserId::new("u1"), UserId::new("u2")].into_iter().collect(),
            last_message: last,
            updated_at: Utc::now(),
        }
    }

    fn last_from(sender: &str, read_by: &[&str]) -> LastMessage {
        LastMessage {
            text: "hi".into(),
            sender_id: UserId::new(sender),
            timestamp: Utc::now(),
            read_by: read_by.iter().map(|u| UserId::new(*u)).collect(),
        }
    }

    #[test]
    fn own_last_message_is_never_unread() {
        let me = UserId::new("u1");
        let c = conversation("c1", Some(last_from("u1", &["u1"])));
        assert!(!is_unread(&c, &me));
    }

    #[test]
    fn unread_until_read_receipt_lands() {
        let me = UserId::new("u1");
        let mut c = conversation("c1", Some(last_from("u2", &["u2"])));
        assert!(is_unread(&c, &me));

        if let Some(last) = c.last_message.as_mut() {
            last.read_by.insert(me.clone());
        }
        assert!(!is_unread(&c, &me));
    }

    #[test]
    fn empty_conversations_count_zero() {
        let me = UserId::new("u1");
        let c = conversation("c1", None);
        assert!(!is_unread(&c, &me));
        assert_eq!(unread_total(&[c], &me), 0);
    }

    #[test]
    fn badge_totals_across_conversations() {
        let me = UserId::new("u1");
        let list = vec![
            conversation("c1", Some(last_from("u2", &["u2"]))),
            conversation("c2", Some(last_from("u1", &["u1"]))),
            conversation("c3", Some(last_from("u2", &["u2"]))),
        ];
        let summary = unread_summary(&list, &me);
        assert_eq!(summary.total, 2);
        assert_eq!(
            summary.unread,
            vec![ConversationId::new("c1"), ConversationId::new("c3")]
        );
    }
}
