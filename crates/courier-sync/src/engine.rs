//! The sync engine: wires the session, the local cache, and the remote
//! feed together.
//!
//! One engine instance serves one signed-in user.  Opening a conversation
//! renders the cache instantly, then follows the live feed; every snapshot
//! is mirrored to the cache, reconciled against pending sends, and
//! committed behind the generation-based staleness guard.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use courier_remote::{PushSender, RemoteStore};
use courier_shared::{Conversation, ConversationId, Message, UserId};
use courier_store::Database;

use crate::session::SyncSession;

/// Handle to the synchronization core.  Cheap to clone; all clones share
/// the same session and cache.
#[derive(Clone)]
pub struct SyncEngine {
    pub(crate) me: UserId,
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) push: Arc<dyn PushSender>,
    pub(crate) store: Arc<Mutex<Database>>,
    pub(crate) session: Arc<SyncSession>,
    pub(crate) visible_tx: Arc<watch::Sender<Vec<Message>>>,
    pub(crate) conversations_tx: Arc<watch::Sender<Vec<Conversation>>>,
    pub(crate) badge_tx: Arc<watch::Sender<u32>>,
}

impl SyncEngine {
    pub fn new(
        me: UserId,
        remote: Arc<dyn RemoteStore>,
        push: Arc<dyn PushSender>,
        store: Database,
    ) -> Self {
        let (visible_tx, _) = watch::channel(Vec::new());
        let (conversations_tx, _) = watch::channel(Vec::new());
        let (badge_tx, _) = watch::channel(0);
        Self {
            me,
            remote,
            push,
            store: Arc::new(Mutex::new(store)),
            session: Arc::new(SyncSession::new()),
            visible_tx: Arc::new(visible_tx),
            conversations_tx: Arc::new(conversations_tx),
            badge_tx: Arc::new(badge_tx),
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.me
    }

    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    /// Observe the active conversation's committed message list.
    pub fn watch_visible(&self) -> watch::Receiver<Vec<Message>> {
        self.visible_tx.subscribe()
    }

    /// Observe the conversation list.
    pub fn watch_conversations(&self) -> watch::Receiver<Vec<Conversation>> {
        self.conversations_tx.subscribe()
    }

    /// Observe the unread badge count.
    pub fn watch_badge(&self) -> watch::Receiver<u32> {
        self.badge_tx.subscribe()
    }

    /// Current committed message list (same data as [`Self::watch_visible`]).
    pub fn visible_messages(&self) -> Vec<Message> {
        self.session.visible()
    }

    pub(crate) fn with_store<T>(&self, f: impl FnOnce(&Database) -> T) -> T {
        let guard = self
            .store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    /// Make `conversation` the active conversation.
    ///
    /// Renders cached messages merged with pending sends immediately, then
    /// follows the live feed until the next switch.  Safe to call while a
    /// previous conversation is still streaming: its feed is unsubscribed
    /// and any in-flight callback is disarmed by the generation bump.
    pub fn open_conversation(&self, conversation: ConversationId) {
        let generation = self.session.begin_conversation(&conversation);
        info!(conversation = %conversation, generation, "opening conversation");

        // Cold start from the cache; failures degrade to remote-only.
        let cached = self
            .with_store(|db| db.get_messages_for_conversation(&conversation))
            .unwrap_or_else(|e| {
                warn!(conversation = %conversation, error = %e, "cache read failed, rendering remote-only");
                Vec::new()
            });
        if let Some(visible) = self
            .session
            .apply_snapshot(generation, &conversation, cached)
        {
            let _ = self.visible_tx.send(visible);
        }

        let mut subscription = self.remote.subscribe_messages(&conversation);
        self.session
            .set_feed_stop(generation, subscription.unsubscribe_handle());

        let engine = self.clone();
        tokio::spawn(async move {
            while let Some(snapshot) = subscription.recv().await {
                if !engine
                    .handle_message_snapshot(generation, &conversation, snapshot)
                    .await
                {
                    break;
                }
            }
            debug!(conversation = %conversation, generation, "message feed ended");
        });
    }

    /// Leave the active conversation and tear its feed down.
    pub fn close_conversation(&self) {
        self.session.end_conversation();
        let _ = self.visible_tx.send(Vec::new());
    }

    /// Process one live snapshot.  Returns `false` once the snapshot is
    /// stale, which also ends the feed loop.
    async fn handle_message_snapshot(
        &self,
        generation: u64,
        conversation: &ConversationId,
        snapshot: Vec<Message>,
    ) -> bool {
        if !self.session.is_current(generation) {
            return false;
        }

        // Mirror every confirmed record to the cache before surfacing it.
        self.with_store(|db| {
            for message in snapshot.iter().filter(|m| m.is_persisted()) {
                if let Err(e) = db.upsert_message(message) {
                    warn!(conversation = %conversation, error = %e, "cache mirror failed");
                }
            }
        });

        // Claim delivery receipts before any await so the next snapshot
        // cannot re-trigger them.
        let receipt_targets = self
            .session
            .delivery_targets(generation, &self.me, &snapshot);

        let committed = match self
            .session
            .apply_snapshot(generation, conversation, snapshot)
        {
            Some(visible) => visible,
            None => return false,
        };
        let _ = self.visible_tx.send(committed);

        let now = Utc::now();
        for message_id in receipt_targets {
            if let Err(e) = self
                .remote
                .add_delivery_receipt(conversation, &message_id, &self.me, now)
                .await
            {
                // Dropped silently: the message stays unacknowledged
                // remotely and is retried on a later subscription session.
                debug!(message = %message_id, error = %e, "delivery receipt dropped");
            }
        }
        true
    }

    /// Wipe the local cache.  The remote copy is untouched and the cache
    /// refills from live snapshots.
    pub fn clear_local_cache(&self) -> crate::Result<()> {
        self.with_store(|db| db.clear_all_cache())?;
        Ok(())
    }
}
