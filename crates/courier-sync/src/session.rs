//! Per-view synchronization state.
//!
//! [`SyncSession`] owns every piece of mutable state the engine's
//! interleaved async operations race against: the pending-send map, the
//! send-metrics map, the delivery-dedupe set, the active-conversation
//! pointer with its generation counter, and the committed visible lists.
//! All of it lives behind one mutex and every method is a single
//! read-modify-write turn; nothing holds the lock across an await.
//!
//! The generation counter is the staleness guard: it increments on every
//! conversation switch, async callbacks capture it at subscribe time, and
//! [`SyncSession::apply_snapshot`] silently discards results whose
//! generation no longer matches.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Instant;

use courier_remote::Unsubscribe;
use courier_shared::{ClientSendId, Conversation, ConversationId, Message, MessageId, MessageStatus, UserId};

use crate::reconcile::{self, sort_for_display};

/// Instrumentation entry for one optimistic send.
#[derive(Debug, Clone)]
pub struct SendMetric {
    pub conversation_id: ConversationId,
    pub sent_at: Instant,
    pub failed: bool,
}

#[derive(Default)]
struct SessionState {
    active: Option<ConversationId>,
    generation: u64,
    pending: HashMap<ConversationId, BTreeMap<ClientSendId, Message>>,
    metrics: HashMap<ClientSendId, SendMetric>,
    delivery_seen: HashSet<MessageId>,
    visible: Vec<Message>,
    conversations: Vec<Conversation>,
    feed_stop: Option<Unsubscribe>,
}

/// Shared mutable session state, partitioned by conversation.
#[derive(Default)]
pub struct SyncSession {
    state: Mutex<SessionState>,
}

impl SyncSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Switch the active conversation.
    ///
    /// Tears down the previous feed, discards the previous conversation's
    /// pending and metrics partitions, resets the delivery-dedupe set, and
    /// bumps the generation.  Returns the new generation for callbacks to
    /// capture.
    pub fn begin_conversation(&self, conversation: &ConversationId) -> u64 {
        let mut st = self.lock();
        if let Some(stop) = st.feed_stop.take() {
            stop.unsubscribe();
        }
        if let Some(prev) = st.active.take() {
            st.pending.remove(&prev);
            st.metrics.retain(|_, m| m.conversation_id != prev);
        }
        st.delivery_seen.clear();
        st.visible.clear();
        st.active = Some(conversation.clone());
        st.generation += 1;
        st.generation
    }

    /// Leave the active conversation without entering a new one.
    pub fn end_conversation(&self) {
        let mut st = self.lock();
        if let Some(stop) = st.feed_stop.take() {
            stop.unsubscribe();
        }
        if let Some(prev) = st.active.take() {
            st.pending.remove(&prev);
            st.metrics.retain(|_, m| m.conversation_id != prev);
        }
        st.delivery_seen.clear();
        st.visible.clear();
        st.generation += 1;
    }

    /// Attach the feed teardown handle for the given generation.  A handle
    /// arriving after the conversation already switched is cancelled on the
    /// spot.
    pub fn set_feed_stop(&self, generation: u64, stop: Unsubscribe) {
        let mut st = self.lock();
        if st.generation == generation {
            st.feed_stop = Some(stop);
        } else {
            stop.unsubscribe();
        }
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// The committed visible message list of the active conversation.
    pub fn visible(&self) -> Vec<Message> {
        self.lock().visible.clone()
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.lock().conversations.clone()
    }

    pub fn set_conversations(&self, conversations: Vec<Conversation>) {
        self.lock().conversations = conversations;
    }

    pub fn conversation(&self, id: &ConversationId) -> Option<Conversation> {
        self.lock().conversations.iter().find(|c| c.id == *id).cloned()
    }

    pub fn metric(&self, id: ClientSendId) -> Option<SendMetric> {
        self.lock().metrics.get(&id).cloned()
    }

    pub fn pending_count(&self, conversation: &ConversationId) -> usize {
        self.lock()
            .pending
            .get(conversation)
            .map_or(0, |m| m.len())
    }

    /// Insert a provisional send into the pending map, the metrics map and
    /// (when its conversation is active) the visible list, all in one
    /// synchronous turn.  Returns the updated visible list if it changed.
    pub fn stage_send(&self, message: Message, metric: SendMetric) -> Option<Vec<Message>> {
        let send_id = match message.client_send_id {
            Some(id) => id,
            None => {
                tracing::error!("provisional message without correlation id, dropping");
                return None;
            }
        };
        let mut st = self.lock();
        let conversation = message.conversation_id.clone();
        st.metrics.insert(send_id, metric);
        st.pending
            .entry(conversation.clone())
            .or_default()
            .insert(send_id, message.clone());

        if st.active.as_ref() == Some(&conversation) {
            st.visible.push(message);
            sort_for_display(&mut st.visible);
            Some(st.visible.clone())
        } else {
            None
        }
    }

    /// Flip a pending send to `Failed` everywhere it is visible.  The text
    /// and image stay in place so a retry needs no retyping.
    pub fn mark_send_failed(
        &self,
        conversation: &ConversationId,
        send_id: ClientSendId,
    ) -> Option<Vec<Message>> {
        let mut st = self.lock();
        if let Some(entry) = st
            .pending
            .get_mut(conversation)
            .and_then(|m| m.get_mut(&send_id))
        {
            entry.status = MessageStatus::Failed;
        }
        if let Some(metric) = st.metrics.get_mut(&send_id) {
            metric.failed = true;
        }

        let mut changed = false;
        for m in &mut st.visible {
            if m.client_send_id == Some(send_id) && m.id.is_none() {
                m.status = MessageStatus::Failed;
                changed = true;
            }
        }
        changed.then(|| st.visible.clone())
    }

    /// Remove a failed send so it can be re-issued.  Returns the removed
    /// record (for its text/image) and the updated visible list.  Yields
    /// `None` unless the record exists and is `Failed`, which is what
    /// suppresses concurrent duplicate retries.
    pub fn take_failed(
        &self,
        conversation: &ConversationId,
        send_id: ClientSendId,
    ) -> Option<(Message, Vec<Message>)> {
        let mut st = self.lock();
        let map = st.pending.get_mut(conversation)?;
        if map.get(&send_id)?.status != MessageStatus::Failed {
            return None;
        }
        let removed = map.remove(&send_id)?;
        st.metrics.remove(&send_id);
        st.visible
            .retain(|m| m.client_send_id != Some(send_id) || m.id.is_some());
        Some((removed, st.visible.clone()))
    }

    /// Select the messages of a snapshot that still need a delivery
    /// receipt from `viewer`, marking them as processed *before* any write
    /// is issued.  That ordering is what keeps a slow receipt write from
    /// being re-triggered by the next snapshot.
    pub fn delivery_targets(
        &self,
        generation: u64,
        viewer: &UserId,
        snapshot: &[Message],
    ) -> Vec<MessageId> {
        let mut st = self.lock();
        if st.generation != generation {
            return Vec::new();
        }
        snapshot
            .iter()
            .filter(|m| m.sender_id != *viewer && !m.delivered_to.contains(viewer))
            .filter_map(|m| m.id.clone())
            .filter(|id| st.delivery_seen.insert(id.clone()))
            .collect()
    }

    /// Reconcile a full snapshot against the pending map and commit the
    /// result, unless the session has moved on (staleness guard).
    ///
    /// On commit: promoted sends leave the pending map, their metrics are
    /// retired after stamping the measured round trip onto the confirmed
    /// echo, and the merged list becomes the visible list.
    pub fn apply_snapshot(
        &self,
        generation: u64,
        conversation: &ConversationId,
        snapshot: Vec<Message>,
    ) -> Option<Vec<Message>> {
        let mut guard = self.lock();
        let st = &mut *guard;
        if st.generation != generation || st.active.as_ref() != Some(conversation) {
            tracing::debug!(conversation = %conversation, "discarding stale snapshot");
            return None;
        }

        let empty = BTreeMap::new();
        let pending = st.pending.get(conversation).unwrap_or(&empty);
        let outcome = reconcile::reconcile(pending, snapshot);

        let mut merged = outcome.merged;
        for m in &mut merged {
            if m.id.is_some() {
                if let Some(send_id) = m.client_send_id {
                    if let Some(metric) = st.metrics.get(&send_id) {
                        m.round_trip_ms = Some(metric.sent_at.elapsed().as_millis() as u64);
                    }
                }
            }
        }

        if let Some(map) = st.pending.get_mut(conversation) {
            for send_id in &outcome.promoted {
                map.remove(send_id);
                st.metrics.remove(send_id);
            }
        }

        st.visible = merged.clone();
        Some(merged)
    }
}
