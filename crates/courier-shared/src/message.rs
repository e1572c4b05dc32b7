//! The message model and its lifecycle states.
//!
//! A message is created provisionally (`Sending`), confirmed by the remote
//! store (`Sent`, server id and timestamp assigned), then mutated in place
//! by receipt updates.  Delivery and read state are *not* status values:
//! they are orthogonal receipt sets layered on top of `Sent`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ClientSendId, ConversationId, MessageId, UserId};

/// Send lifecycle of a single message, from the local client's perspective.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Created locally, remote write still in flight.
    Sending,
    /// Confirmed by the remote store.
    Sent,
    /// The remote write failed; the record is kept for manual retry.
    Failed,
}

/// Reference to an already-uploaded image attachment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Remote-store identity.  `None` while the message is provisional.
    pub id: Option<MessageId>,
    /// Client correlation id, present on everything this client sent.
    pub client_send_id: Option<ClientSendId>,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub text: String,
    pub image: Option<ImageRef>,
    /// Authoritative server timestamp, set once confirmed.
    pub timestamp: Option<DateTime<Utc>>,
    /// Client wall-clock at send time; orders the message until confirmation.
    pub client_sent_at: Option<DateTime<Utc>>,
    pub status: MessageStatus,
    /// Users who have received the message.  Grows monotonically.
    pub delivered_to: BTreeSet<UserId>,
    /// Users who have read the message.  Grows monotonically.
    pub read_by: BTreeSet<UserId>,
    /// Per-user delivery timestamps.
    pub delivered_receipts: BTreeMap<UserId, DateTime<Utc>>,
    /// Per-user read timestamps.
    pub read_receipts: BTreeMap<UserId, DateTime<Utc>>,
    /// True when this copy came from the local cache rather than a live
    /// snapshot.  Never persisted.
    #[serde(default, skip_serializing)]
    pub from_cache: bool,
    /// Measured send round-trip in milliseconds, filled in on the server
    /// echo of a message this client sent.  Instrumentation only.
    #[serde(default, skip_serializing)]
    pub round_trip_ms: Option<u64>,
}

impl Message {
    /// Build a provisional message for an optimistic send.
    pub fn provisional(
        conversation_id: ConversationId,
        sender_id: UserId,
        text: impl Into<String>,
        image: Option<ImageRef>,
    ) -> Self {
        Self {
            id: None,
            client_send_id: Some(ClientSendId::new()),
            conversation_id,
            sender_id,
            text: text.into(),
            image,
            timestamp: None,
            client_sent_at: Some(Utc::now()),
            status: MessageStatus::Sending,
            delivered_to: BTreeSet::new(),
            read_by: BTreeSet::new(),
            delivered_receipts: BTreeMap::new(),
            read_receipts: BTreeMap::new(),
            from_cache: false,
            round_trip_ms: None,
        }
    }

    /// Whether the remote store has assigned an identity yet.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// The timestamp used to order this message for display.
    ///
    /// Fallback chain: confirmed server timestamp, then the client send
    /// timestamp, then the earliest receipt timestamp, then now.
    pub fn order_timestamp(&self) -> DateTime<Utc> {
        if let Some(ts) = self.timestamp {
            return ts;
        }
        if let Some(ts) = self.client_sent_at {
            return ts;
        }
        self.delivered_receipts
            .values()
            .chain(self.read_receipts.values())
            .min()
            .copied()
            .unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn msg() -> Message {
        Message::provisional(
            ConversationId::new("c1"),
            UserId::new("u1"),
            "hello",
            None,
        )
    }

    #[test]
    fn provisional_starts_sending_without_identity() {
        let m = msg();
        assert_eq!(m.status, MessageStatus::Sending);
        assert!(m.id.is_none());
        assert!(m.client_send_id.is_some());
        assert!(!m.is_persisted());
    }

    #[test]
    fn order_timestamp_prefers_server_time() {
        let mut m = msg();
        let server = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let client = Utc.with_ymd_and_hms(2025, 3, 1, 11, 59, 58).unwrap();
        m.client_sent_at = Some(client);
        m.timestamp = Some(server);
        assert_eq!(m.order_timestamp(), server);
    }

    #[test]
    fn order_timestamp_falls_back_to_client_time() {
        let mut m = msg();
        let client = Utc.with_ymd_and_hms(2025, 3, 1, 11, 59, 58).unwrap();
        m.client_sent_at = Some(client);
        assert_eq!(m.order_timestamp(), client);
    }

    #[test]
    fn order_timestamp_falls_back_to_earliest_receipt() {
        let mut m = msg();
        m.client_sent_at = None;
        let early = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 3, 1, 11, 0, 0).unwrap();
        m.read_receipts.insert(UserId::new("u2"), late);
        m.delivered_receipts.insert(UserId::new("u3"), early);
        assert_eq!(m.order_timestamp(), early);
    }
}
