//! Optimistic send and manual retry.
//!
//! A send becomes visible synchronously, before any network I/O: the
//! provisional record enters the pending map, the metrics map and the
//! visible list in one session turn.  The remote write carries the
//! correlation id so the reconciliation engine can retire the provisional
//! copy when the server echo shows up in a snapshot.

use std::collections::BTreeSet;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use courier_remote::{MessageDraft, PushPayload};
use courier_shared::constants::MAX_PUSH_BODY_CHARS;
use courier_shared::{
    ClientSendId, ConversationId, ImageRef, LastMessage, Message, ValidationError,
};

use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};
use crate::session::SendMetric;

impl SyncEngine {
    /// Send a message optimistically.
    ///
    /// The provisional record is visible with status `Sending` before this
    /// function first awaits.  On remote failure the record flips to
    /// `Failed` (text and image preserved for retry) and the error is
    /// returned; all failures are retryable by user action.
    pub async fn send_message(
        &self,
        conversation_id: &ConversationId,
        text: impl Into<String>,
        image: Option<ImageRef>,
    ) -> Result<ClientSendId> {
        let text = text.into();
        if text.trim().is_empty() && image.is_none() {
            return Err(SyncError::Validation(ValidationError::EmptyMessage));
        }

        let provisional = Message::provisional(
            conversation_id.clone(),
            self.me.clone(),
            text.clone(),
            image,
        );
        let send_id = provisional
            .client_send_id
            .unwrap_or_else(ClientSendId::new);
        let draft = MessageDraft {
            conversation_id: conversation_id.clone(),
            sender_id: self.me.clone(),
            text: text.clone(),
            image: provisional.image.clone(),
            client_send_id: send_id,
            client_sent_at: provisional.client_sent_at.unwrap_or_else(Utc::now),
        };
        let metric = SendMetric {
            conversation_id: conversation_id.clone(),
            sent_at: Instant::now(),
            failed: false,
        };

        // Instant visibility, before the first await.
        if let Some(visible) = self.session.stage_send(provisional, metric) {
            let _ = self.visible_tx.send(visible);
        }

        match self.remote.create_message(draft).await {
            Ok(message_id) => {
                info!(message = %message_id, send = %send_id, conversation = %conversation_id, "message sent");
                // Denormalized summary and push fan-out are best effort;
                // the send already succeeded and never rolls back.
                let engine = self.clone();
                let conversation_id = conversation_id.clone();
                tokio::spawn(async move {
                    engine.after_send_effects(&conversation_id, &text).await;
                });
                Ok(send_id)
            }
            Err(e) => {
                warn!(send = %send_id, conversation = %conversation_id, error = %e, "send failed");
                if let Some(visible) = self.session.mark_send_failed(conversation_id, send_id) {
                    let _ = self.visible_tx.send(visible);
                }
                Err(SyncError::Remote(e))
            }
        }
    }

    /// Re-issue a failed send.
    ///
    /// The failed record and its metric entry are removed first, then the
    /// preserved text and image go through [`Self::send_message`] again
    /// under a fresh correlation id.  A concurrent duplicate retry finds no
    /// failed record and gets [`SyncError::NoFailedSend`].
    pub async fn retry_send(
        &self,
        conversation_id: &ConversationId,
        send_id: ClientSendId,
    ) -> Result<ClientSendId> {
        let (failed, visible) = self
            .session
            .take_failed(conversation_id, send_id)
            .ok_or(SyncError::NoFailedSend(send_id))?;
        let _ = self.visible_tx.send(visible);

        info!(send = %send_id, conversation = %conversation_id, "retrying failed send");
        self.send_message(conversation_id, failed.text, failed.image)
            .await
    }

    /// Post-send side effects: update the conversation's `last_message`
    /// summary and fan a push notification out to the other participants.
    /// Failures here are logged and never surfaced to the sender.
    async fn after_send_effects(&self, conversation_id: &ConversationId, text: &str) {
        let mut read_by = BTreeSet::new();
        read_by.insert(self.me.clone());
        let summary = LastMessage {
            text: text.to_string(),
            sender_id: self.me.clone(),
            timestamp: Utc::now(),
            read_by,
        };
        if let Err(e) = self
            .remote
            .update_conversation_summary(conversation_id, summary)
            .await
        {
            warn!(conversation = %conversation_id, error = %e, "last-message summary update failed");
        }

        let conversation = match self.remote.get_conversation(conversation_id).await {
            Ok(c) => c,
            Err(e) => {
                debug!(conversation = %conversation_id, error = %e, "skipping push fan-out");
                return;
            }
        };

        let sender_name = self
            .with_store(|db| db.get_user(&self.me))
            .ok()
            .flatten()
            .and_then(|p| p.display_name)
            .unwrap_or_else(|| self.me.to_string());
        let body = truncate_body(text);

        for participant in conversation.other_participants(&self.me) {
            let token = self
                .with_store(|db| db.get_user(participant))
                .ok()
                .flatten()
                .and_then(|p| p.push_token);
            let Some(token) = token else {
                debug!(user = %participant, "no push token cached, skipping");
                continue;
            };
            let payload = PushPayload {
                title: sender_name.clone(),
                body: body.clone(),
                data: [(
                    "conversationId".to_string(),
                    conversation_id.to_string(),
                )]
                .into_iter()
                .collect(),
                badge: None,
            };
            if let Err(e) = self.push.send(&token, payload).await {
                debug!(user = %participant, error = %e, "push fan-out failed");
            }
        }
    }
}

fn truncate_body(text: &str) -> String {
    if text.chars().count() <= MAX_PUSH_BODY_CHARS {
        text.to_string()
    } else {
        let mut body: String = text.chars().take(MAX_PUSH_BODY_CHARS - 1).collect();
        body.push('…');
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_bodies_pass_through() {
        assert_eq!(truncate_body("hi"), "hi");
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundaries() {
        let long = "é".repeat(MAX_PUSH_BODY_CHARS + 20);
        let body = truncate_body(&long);
        assert_eq!(body.chars().count(), MAX_PUSH_BODY_CHARS);
        assert!(body.ends_with('…'));
    }
}
