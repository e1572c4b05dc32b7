//! Cache operations for confirmed [`Message`] records.
//!
//! Only server-confirmed messages are cached; provisional records live in
//! the sync session's pending map and never touch the database.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rusqlite::params;

use courier_shared::{ClientSendId, ConversationId, ImageRef, Message, MessageId, MessageStatus, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Insert-or-replace a confirmed message by its remote id.
    ///
    /// A record missing its id, sender, or content is rejected whole and
    /// logged; nothing is partially written.
    pub fn upsert_message(&self, message: &Message) -> Result<()> {
        let id = match &message.id {
            Some(id) => id,
            None => {
                tracing::warn!(conversation = %message.conversation_id, "rejecting cache write: message has no id");
                return Err(StoreError::InvalidRecord("id"));
            }
        };
        if message.conversation_id.as_str().is_empty() {
            tracing::warn!(id = %id, "rejecting cache write: empty conversation id");
            return Err(StoreError::InvalidRecord("conversation_id"));
        }
        if message.sender_id.as_str().is_empty() {
            tracing::warn!(id = %id, "rejecting cache write: empty sender id");
            return Err(StoreError::InvalidRecord("sender_id"));
        }
        if message.text.is_empty() && message.image.is_none() {
            tracing::warn!(id = %id, "rejecting cache write: no text and no image");
            return Err(StoreError::InvalidRecord("text"));
        }
        let timestamp = message.order_timestamp();

        self.conn().execute(
            "INSERT OR REPLACE INTO messages
                (id, client_send_id, conversation_id, sender_id, text, image,
                 timestamp, delivered_to, read_by, delivered_receipts, read_receipts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id.as_str(),
                message.client_send_id.map(|c| c.to_string()),
                message.conversation_id.as_str(),
                message.sender_id.as_str(),
                message.text,
                message
                    .image
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                timestamp.to_rfc3339(),
                serde_json::to_string(&message.delivered_to)?,
                serde_json::to_string(&message.read_by)?,
                serde_json::to_string(&message.delivered_receipts)?,
                serde_json::to_string(&message.read_receipts)?,
            ],
        )?;
        Ok(())
    }

    /// All cached messages of a conversation, oldest first.
    pub fn get_messages_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, client_send_id, conversation_id, sender_id, text, image,
                    timestamp, delivered_to, read_by, delivered_receipts, read_receipts
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY timestamp ASC",
        )?;

        let rows = stmt.query_map(params![conversation_id.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Fetch a single cached message by its remote id.
    pub fn get_message(&self, id: &MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, client_send_id, conversation_id, sender_id, text, image,
                        timestamp, delivered_to, read_by, delivered_receipts, read_receipts
                 FROM messages WHERE id = ?1",
                params![id.as_str()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let client_send_id: Option<String> = row.get(1)?;
    let conversation_id: String = row.get(2)?;
    let sender_id: String = row.get(3)?;
    let text: String = row.get(4)?;
    let image_json: Option<String> = row.get(5)?;
    let ts_str: String = row.get(6)?;
    let delivered_to_json: String = row.get(7)?;
    let read_by_json: String = row.get(8)?;
    let delivered_receipts_json: String = row.get(9)?;
    let read_receipts_json: String = row.get(10)?;

    let client_send_id: Option<ClientSendId> = client_send_id
        .map(|s| {
            uuid::Uuid::parse_str(&s).map(ClientSendId).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
        })
        .transpose()?;

    let image: Option<ImageRef> = image_json
        .map(|j| serde_json::from_str(&j))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let delivered_to: BTreeSet<UserId> = decode_json(7, &delivered_to_json)?;
    let read_by: BTreeSet<UserId> = decode_json(8, &read_by_json)?;
    let delivered_receipts: BTreeMap<UserId, DateTime<Utc>> =
        decode_json(9, &delivered_receipts_json)?;
    let read_receipts: BTreeMap<UserId, DateTime<Utc>> = decode_json(10, &read_receipts_json)?;

    Ok(Message {
        id: Some(MessageId::new(id)),
        client_send_id,
        conversation_id: ConversationId::new(conversation_id),
        sender_id: UserId::new(sender_id),
        text,
        image,
        timestamp: Some(timestamp),
        client_sent_at: None,
        status: MessageStatus::Sent,
        delivered_to,
        read_by,
        delivered_receipts,
        read_receipts,
        from_cache: true,
        round_trip_ms: None,
    })
}

fn decode_json<T: serde::de::DeserializeOwned>(col: usize, json: &str) -> rusqlite::Result<T> {
    serde_json::from_str(json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
    })
}
