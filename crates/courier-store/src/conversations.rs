//! Cache operations for [`Conversation`] records.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::params;

use courier_shared::{Conversation, ConversationId, ConversationKind, LastMessage, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Insert-or-replace a conversation by primary key.
    ///
    /// Structurally invalid records (wrong participant count for the kind)
    /// are rejected and logged rather than cached.
    pub fn upsert_conversation(&self, conversation: &Conversation) -> Result<()> {
        if let Err(e) = conversation.validate() {
            tracing::warn!(id = %conversation.id, error = %e, "rejecting cache write: invalid conversation");
            return Err(StoreError::InvalidRecord("participants"));
        }

        self.conn().execute(
            "INSERT OR REPLACE INTO conversations
                (id, kind, name, participants, last_message, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                conversation.id.as_str(),
                conversation.kind.as_str(),
                conversation.name,
                serde_json::to_string(&conversation.participants)?,
                conversation
                    .last_message
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                conversation.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All cached conversations, most recently updated first.
    pub fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, kind, name, participants, last_message, updated_at
             FROM conversations
             ORDER BY updated_at DESC",
        )?;

        let rows = stmt.query_map([], row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }

    /// Fetch a single cached conversation.
    pub fn get_conversation(&self, id: &ConversationId) -> Result<Conversation> {
        self.conn()
            .query_row(
                "SELECT id, kind, name, participants, last_message, updated_at
                 FROM conversations
                 WHERE id = ?1",
                params![id.as_str()],
                row_to_conversation,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }
}

/// Map a `rusqlite::Row` to a [`Conversation`].
fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let id: String = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let name: Option<String> = row.get(2)?;
    let participants_json: String = row.get(3)?;
    let last_message_json: Option<String> = row.get(4)?;
    let updated_str: String = row.get(5)?;

    let kind = ConversationKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown conversation kind: {kind_str}").into(),
        )
    })?;

    let participants: BTreeSet<UserId> =
        serde_json::from_str(&participants_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let last_message: Option<LastMessage> = last_message_json
        .map(|j| serde_json::from_str(&j))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let updated_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&updated_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Conversation {
        id: ConversationId::new(id),
        kind,
        name,
        participants,
        last_message,
        updated_at,
    })
}
