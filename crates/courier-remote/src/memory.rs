//! In-memory [`RemoteStore`] implementation.
//!
//! Behaves like the real document store from the engine's point of view:
//! server-assigned ids and monotonic-ish timestamps, full-snapshot fan-out
//! to every matching subscription on each commit, and union-merge receipt
//! writes.  Backs every integration test; also usable for local
//! development without a backend.
//!
//! Test hooks: [`MemoryRemote::set_offline`] makes every write fail with
//! `Unavailable`, and [`MemoryRemote::pause_writes`] holds message creates
//! in flight so optimistic state can be observed mid-send.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

use courier_shared::{
    Conversation, ConversationId, ConversationKind, LastMessage, Message, MessageId,
    MessageStatus, UserId,
};

use crate::error::{RemoteError, Result};
use crate::store::{MessageDraft, RemoteStore};
use crate::subscription::{snapshot_channel, SnapshotSender, Subscription};

#[derive(Default)]
struct State {
    conversations: BTreeMap<ConversationId, Conversation>,
    messages: BTreeMap<ConversationId, BTreeMap<MessageId, Message>>,
    conversation_subs: Vec<(UserId, SnapshotSender<Vec<Conversation>>)>,
    message_subs: Vec<(ConversationId, SnapshotSender<Vec<Message>>)>,
    next_seq: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl State {
    /// Server timestamps never repeat or go backwards, even if the host
    /// clock does.
    fn server_timestamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + Duration::milliseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_seq += 1;
        // Zero-padded so lexicographic id order matches commit order.
        format!("{prefix}{:08}", self.next_seq)
    }

    fn message_snapshot(&self, conversation_id: &ConversationId) -> Vec<Message> {
        let mut snapshot: Vec<Message> = self
            .messages
            .get(conversation_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        snapshot.sort_by(|a, b| {
            a.order_timestamp()
                .cmp(&b.order_timestamp())
                .then_with(|| a.id.cmp(&b.id))
        });
        snapshot
    }

    fn conversation_snapshot(&self, user: &UserId) -> Vec<Conversation> {
        let mut snapshot: Vec<Conversation> = self
            .conversations
            .values()
            .filter(|c| c.participants.contains(user))
            .cloned()
            .collect();
        snapshot.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        snapshot
    }

    fn publish_messages(&mut self, conversation_id: &ConversationId) {
        let snapshot = self.message_snapshot(conversation_id);
        self.message_subs.retain(|(id, sender)| {
            if id != conversation_id {
                return sender.is_live();
            }
            sender.publish(snapshot.clone())
        });
    }

    fn publish_conversations(&mut self) {
        let snapshots: Vec<(usize, Vec<Conversation>)> = self
            .conversation_subs
            .iter()
            .enumerate()
            .map(|(i, (user, _))| (i, self.conversation_snapshot(user)))
            .collect();
        let mut live = vec![true; self.conversation_subs.len()];
        for (i, snapshot) in snapshots {
            live[i] = self.conversation_subs[i].1.publish(snapshot);
        }
        let mut keep = live.into_iter();
        self.conversation_subs.retain(|_| keep.next().unwrap_or(false));
    }
}

/// In-memory remote document store.
pub struct MemoryRemote {
    state: Mutex<State>,
    offline: AtomicBool,
    paused_tx: watch::Sender<bool>,
    delivery_writes: AtomicU64,
}

impl MemoryRemote {
    pub fn new() -> Self {
        let (paused_tx, _) = watch::channel(false);
        Self {
            state: Mutex::new(State::default()),
            offline: AtomicBool::new(false),
            paused_tx,
            delivery_writes: AtomicU64::new(0),
        }
    }

    /// Number of delivery-receipt writes accepted so far.  Lets tests
    /// assert the receipt tracker's exactly-once behavior.
    pub fn delivery_receipt_writes(&self) -> u64 {
        self.delivery_writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent write fail with [`RemoteError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Hold message creates in flight until unpaused.  Takes effect even
    /// when no create is parked yet.
    pub fn pause_writes(&self, paused: bool) {
        self.paused_tx.send_replace(paused);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RemoteError::Unavailable("simulated outage".into()))
        } else {
            Ok(())
        }
    }

    async fn await_unpaused(&self) {
        let mut rx = self.paused_tx.subscribe();
        while *rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn create_message(&self, draft: MessageDraft) -> Result<MessageId> {
        self.await_unpaused().await;
        self.check_online()?;

        let mut state = self.lock();
        if !state.conversations.contains_key(&draft.conversation_id) {
            return Err(RemoteError::NotFound);
        }

        let id = MessageId::new(state.next_id("m"));
        let timestamp = state.server_timestamp();

        // The sender has trivially received and read their own message.
        let mut delivered_to = BTreeSet::new();
        delivered_to.insert(draft.sender_id.clone());
        let mut delivered_receipts = BTreeMap::new();
        delivered_receipts.insert(draft.sender_id.clone(), timestamp);

        let message = Message {
            id: Some(id.clone()),
            client_send_id: Some(draft.client_send_id),
            conversation_id: draft.conversation_id.clone(),
            sender_id: draft.sender_id.clone(),
            text: draft.text,
            image: draft.image,
            timestamp: Some(timestamp),
            client_sent_at: Some(draft.client_sent_at),
            status: MessageStatus::Sent,
            delivered_to: delivered_to.clone(),
            read_by: delivered_to,
            delivered_receipts: delivered_receipts.clone(),
            read_receipts: delivered_receipts,
            from_cache: false,
            round_trip_ms: None,
        };

        state
            .messages
            .entry(draft.conversation_id.clone())
            .or_default()
            .insert(id.clone(), message);
        state.publish_messages(&draft.conversation_id);

        tracing::debug!(id = %id, conversation = %draft.conversation_id, "message committed");
        Ok(id)
    }

    async fn add_delivery_receipt(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        user: &UserId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.check_online()?;

        let mut state = self.lock();
        let message = state
            .messages
            .get_mut(conversation_id)
            .and_then(|m| m.get_mut(message_id))
            .ok_or(RemoteError::NotFound)?;
        self.delivery_writes.fetch_add(1, Ordering::SeqCst);

        let changed = message.delivered_to.insert(user.clone());
        message.delivered_receipts.entry(user.clone()).or_insert(at);
        if changed {
            state.publish_messages(conversation_id);
        }
        Ok(())
    }

    async fn add_read_receipt(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        user: &UserId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.check_online()?;

        let mut state = self.lock();
        let message = state
            .messages
            .get_mut(conversation_id)
            .and_then(|m| m.get_mut(message_id))
            .ok_or(RemoteError::NotFound)?;

        // Reading implies delivery; keep the invariant without a second write.
        let mut changed = message.read_by.insert(user.clone());
        message.read_receipts.entry(user.clone()).or_insert(at);
        changed |= message.delivered_to.insert(user.clone());
        message.delivered_receipts.entry(user.clone()).or_insert(at);

        if changed {
            state.publish_messages(conversation_id);
        }
        Ok(())
    }

    async fn update_conversation_summary(
        &self,
        conversation_id: &ConversationId,
        summary: LastMessage,
    ) -> Result<()> {
        self.check_online()?;

        let mut state = self.lock();
        let updated_at = state.server_timestamp();
        let conversation = state
            .conversations
            .get_mut(conversation_id)
            .ok_or(RemoteError::NotFound)?;
        conversation.last_message = Some(summary);
        conversation.updated_at = updated_at;
        state.publish_conversations();
        Ok(())
    }

    async fn patch_last_message_read_by(
        &self,
        conversation_id: &ConversationId,
        user: &UserId,
    ) -> Result<()> {
        self.check_online()?;

        let mut state = self.lock();
        let conversation = state
            .conversations
            .get_mut(conversation_id)
            .ok_or(RemoteError::NotFound)?;
        let changed = match conversation.last_message.as_mut() {
            Some(last) => last.read_by.insert(user.clone()),
            None => false,
        };
        if changed {
            state.publish_conversations();
        }
        Ok(())
    }

    async fn find_direct_conversation(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Option<ConversationId>> {
        self.check_online()?;

        let pair: BTreeSet<UserId> = [a.clone(), b.clone()].into_iter().collect();
        let state = self.lock();
        Ok(state
            .conversations
            .values()
            .find(|c| c.kind == ConversationKind::Direct && c.participants == pair)
            .map(|c| c.id.clone()))
    }

    async fn create_conversation(
        &self,
        kind: ConversationKind,
        name: Option<String>,
        participants: BTreeSet<UserId>,
    ) -> Result<ConversationId> {
        self.check_online()?;

        let mut state = self.lock();
        let id = ConversationId::new(state.next_id("c"));
        let updated_at = state.server_timestamp();
        state.conversations.insert(
            id.clone(),
            Conversation {
                id: id.clone(),
                kind,
                name,
                participants,
                last_message: None,
                updated_at,
            },
        );
        state.publish_conversations();
        Ok(id)
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<Conversation> {
        self.check_online()?;

        let state = self.lock();
        state
            .conversations
            .get(id)
            .cloned()
            .ok_or(RemoteError::NotFound)
    }

    fn subscribe_conversations(&self, user: &UserId) -> Subscription<Vec<Conversation>> {
        let (sender, subscription) = snapshot_channel();
        let mut state = self.lock();
        sender.publish(state.conversation_snapshot(user));
        state.conversation_subs.push((user.clone(), sender));
        subscription
    }

    fn subscribe_messages(&self, conversation_id: &ConversationId) -> Subscription<Vec<Message>> {
        let (sender, subscription) = snapshot_channel();
        let mut state = self.lock();
        sender.publish(state.message_snapshot(conversation_id));
        state.message_subs.push((conversation_id.clone(), sender));
        subscription
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_shared::ClientSendId;

    async fn direct(remote: &MemoryRemote) -> ConversationId {
        remote
            .create_conversation(
                ConversationKind::Direct,
                None,
                [UserId::new("u1"), UserId::new("u2")].into_iter().collect(),
            )
            .await
            .unwrap()
    }

    fn draft(conversation: &ConversationId, sender: &str, text: &str) -> MessageDraft {
        MessageDraft {
            conversation_id: conversation.clone(),
            sender_id: UserId::new(sender),
            text: text.into(),
            image: None,
            client_send_id: ClientSendId::new(),
            client_sent_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscription_gets_initial_and_change_snapshots() {
        let remote = MemoryRemote::new();
        let conversation = direct(&remote).await;

        let mut sub = remote.subscribe_messages(&conversation);
        assert_eq!(sub.recv().await.unwrap().len(), 0);

        remote
            .create_message(draft(&conversation, "u1", "hi"))
            .await
            .unwrap();
        let snapshot = sub.recv().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].text, "hi");
        assert_eq!(snapshot[0].status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn server_timestamps_are_strictly_increasing() {
        let remote = MemoryRemote::new();
        let conversation = direct(&remote).await;

        remote
            .create_message(draft(&conversation, "u1", "a"))
            .await
            .unwrap();
        remote
            .create_message(draft(&conversation, "u1", "b"))
            .await
            .unwrap();

        let mut sub = remote.subscribe_messages(&conversation);
        let snapshot = sub.recv().await.unwrap();
        assert!(snapshot[0].timestamp.unwrap() < snapshot[1].timestamp.unwrap());
    }

    #[tokio::test]
    async fn receipts_are_union_merged_and_monotonic() {
        let remote = MemoryRemote::new();
        let conversation = direct(&remote).await;
        let id = remote
            .create_message(draft(&conversation, "u1", "hi"))
            .await
            .unwrap();

        let u2 = UserId::new("u2");
        let first = Utc::now();
        remote
            .add_delivery_receipt(&conversation, &id, &u2, first)
            .await
            .unwrap();
        // Concurrent duplicate: set membership unchanged, first timestamp kept.
        remote
            .add_delivery_receipt(&conversation, &id, &u2, first + Duration::seconds(5))
            .await
            .unwrap();

        let mut sub = remote.subscribe_messages(&conversation);
        let snapshot = sub.recv().await.unwrap();
        assert!(snapshot[0].delivered_to.contains(&u2));
        assert_eq!(snapshot[0].delivered_receipts.get(&u2), Some(&first));
    }

    #[tokio::test]
    async fn read_receipt_implies_delivery() {
        let remote = MemoryRemote::new();
        let conversation = direct(&remote).await;
        let id = remote
            .create_message(draft(&conversation, "u1", "hi"))
            .await
            .unwrap();

        let u2 = UserId::new("u2");
        remote
            .add_read_receipt(&conversation, &id, &u2, Utc::now())
            .await
            .unwrap();

        let mut sub = remote.subscribe_messages(&conversation);
        let snapshot = sub.recv().await.unwrap();
        assert!(snapshot[0].read_by.contains(&u2));
        assert!(snapshot[0].delivered_to.contains(&u2));
    }

    #[tokio::test]
    async fn direct_conversation_unique_per_pair() {
        let remote = MemoryRemote::new();
        let conversation = direct(&remote).await;

        let found = remote
            .find_direct_conversation(&UserId::new("u2"), &UserId::new("u1"))
            .await
            .unwrap();
        assert_eq!(found, Some(conversation));

        let missing = remote
            .find_direct_conversation(&UserId::new("u1"), &UserId::new("u3"))
            .await
            .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn pausing_before_a_send_holds_the_create() {
        let remote = MemoryRemote::new();
        let conversation = direct(&remote).await;

        remote.pause_writes(true);
        let create = remote.create_message(draft(&conversation, "u1", "hi"));
        tokio::pin!(create);

        // The create must park, not commit.
        let held = tokio::time::timeout(std::time::Duration::from_millis(50), &mut create).await;
        assert!(held.is_err());

        remote.pause_writes(false);
        create.await.unwrap();
    }

    #[tokio::test]
    async fn offline_writes_fail_transiently() {
        let remote = MemoryRemote::new();
        let conversation = direct(&remote).await;

        remote.set_offline(true);
        let err = remote
            .create_message(draft(&conversation, "u1", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Unavailable(_)));

        remote.set_offline(false);
        remote
            .create_message(draft(&conversation, "u1", "hi"))
            .await
            .unwrap();
    }
}
