//! End-to-end engine tests against the in-memory remote.
//!
//! Each test drives one or two [`SyncEngine`] instances through the public
//! surface and observes results through the watch channels, so nothing
//! here sleeps to "let things settle": every wait is on an actual state
//! change.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use courier_remote::{MemoryRemote, MessageDraft, NoopPushSender, RemoteStore};
use courier_shared::{ClientSendId, ConversationId, MessageStatus, UserId};
use courier_store::Database;
use courier_sync::{SyncEngine, SyncError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn engine(user: &str, remote: &Arc<MemoryRemote>) -> SyncEngine {
    init_tracing();
    let store = Database::open_in_memory().expect("in-memory store");
    SyncEngine::new(
        UserId::new(user),
        remote.clone() as Arc<dyn RemoteStore>,
        Arc::new(NoopPushSender),
        store,
    )
}

/// Wait (bounded) until the watched value satisfies `pred`, returning it.
async fn wait_for<T: Clone>(
    rx: &mut watch::Receiver<T>,
    what: &str,
    mut pred: impl FnMut(&T) -> bool,
) -> T {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let current = rx.borrow();
                if pred(&current) {
                    return current.clone();
                }
            }
            rx.changed().await.expect("watch sender dropped");
        }
    })
    .await;
    match result {
        Ok(value) => value,
        Err(_) => panic!("timed out waiting for {what}"),
    }
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
async fn send_is_visible_before_the_remote_commits() {
    let remote = Arc::new(MemoryRemote::new());
    let engine = engine("u1", &remote);
    let conversation = engine
        .get_or_create_direct(&UserId::new("u2"))
        .await
        .unwrap();
    engine.open_conversation(conversation.clone());
    let mut visible = engine.watch_visible();

    // Hold the remote write in flight and send.
    remote.pause_writes(true);
    let sender = engine.clone();
    let target = conversation.clone();
    let send = tokio::spawn(async move { sender.send_message(&target, "hello", None).await });

    let provisional = wait_for(&mut visible, "provisional message", |v| !v.is_empty()).await;
    assert_eq!(provisional.len(), 1);
    assert_eq!(provisional[0].status, MessageStatus::Sending);
    assert!(provisional[0].id.is_none());
    assert_eq!(engine.session().pending_count(&conversation), 1);

    // Release the write; the server echo retires the provisional record.
    remote.pause_writes(false);
    let send_id = send.await.unwrap().unwrap();

    let committed = wait_for(&mut visible, "committed message", |v| {
        v.iter().any(|m| m.status == MessageStatus::Sent)
    })
    .await;
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].client_send_id, Some(send_id));
    assert!(committed[0].id.is_some());
    assert!(committed[0].round_trip_ms.is_some());
    assert_eq!(engine.session().pending_count(&conversation), 0);
}

#[tokio::test]
async fn failed_send_is_kept_for_retry() {
    let remote = Arc::new(MemoryRemote::new());
    let engine = engine("u1", &remote);
    let conversation = engine
        .get_or_create_direct(&UserId::new("u2"))
        .await
        .unwrap();
    engine.open_conversation(conversation.clone());
    let mut visible = engine.watch_visible();

    remote.set_offline(true);
    let err = engine
        .send_message(&conversation, "are you there", None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Remote(_)));

    let failed = wait_for(&mut visible, "failed message", |v| {
        v.iter().any(|m| m.status == MessageStatus::Failed)
    })
    .await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].text, "are you there");
    let send_id = failed[0].client_send_id.unwrap();

    remote.set_offline(false);
    let retried_id = engine.retry_send(&conversation, send_id).await.unwrap();
    assert_ne!(retried_id, send_id);

    let committed = wait_for(&mut visible, "retried message", |v| {
        v.iter().any(|m| m.status == MessageStatus::Sent)
    })
    .await;
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].text, "are you there");

    // The failed record was consumed; a duplicate retry has nothing to do.
    let err = engine.retry_send(&conversation, send_id).await.unwrap_err();
    assert!(matches!(err, SyncError::NoFailedSend(_)));
}

#[tokio::test]
async fn delivery_receipts_are_written_once_per_message() {
    let remote = Arc::new(MemoryRemote::new());
    let reader = engine("u2", &remote);
    let conversation = reader
        .get_or_create_direct(&UserId::new("u1"))
        .await
        .unwrap();
    remote
        .create_message(draft(&conversation, "u1", "first"))
        .await
        .unwrap();
    remote
        .create_message(draft(&conversation, "u1", "second"))
        .await
        .unwrap();

    reader.open_conversation(conversation.clone());
    let mut visible = reader.watch_visible();
    let u2 = UserId::new("u2");
    wait_for(&mut visible, "delivery receipts", |v| {
        v.len() == 2 && v.iter().all(|m| m.delivered_to.contains(&u2))
    })
    .await;

    // Each receipt write triggers another snapshot; none of them may
    // re-issue a receipt already sent.
    assert_eq!(remote.delivery_receipt_writes(), 2);
}

#[tokio::test]
async fn switching_conversations_discards_the_old_feed() {
    let remote = Arc::new(MemoryRemote::new());
    let engine = engine("u1", &remote);
    let first = engine
        .get_or_create_direct(&UserId::new("u2"))
        .await
        .unwrap();
    let second = engine
        .get_or_create_direct(&UserId::new("u3"))
        .await
        .unwrap();
    remote
        .create_message(draft(&first, "u2", "old thread"))
        .await
        .unwrap();

    engine.open_conversation(first.clone());
    let mut visible = engine.watch_visible();
    wait_for(&mut visible, "first conversation", |v| v.len() == 1).await;

    engine.open_conversation(second.clone());
    wait_for(&mut visible, "empty second conversation", |v| v.is_empty()).await;

    // Traffic on the abandoned thread must not leak into the active view.
    remote
        .create_message(draft(&first, "u2", "late arrival"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.visible_messages().is_empty());
}

#[tokio::test]
async fn direct_conversations_are_reused_not_duplicated() {
    let remote = Arc::new(MemoryRemote::new());
    let engine = engine("u1", &remote);
    let other = UserId::new("u2");

    let first = engine.get_or_create_direct(&other).await.unwrap();
    let second = engine.get_or_create_direct(&other).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn badge_counts_unread_and_clears_after_reading() {
    let remote = Arc::new(MemoryRemote::new());
    let alice = engine("u1", &remote);
    let bob = engine("u2", &remote);
    bob.start();
    let mut badge = bob.watch_badge();

    let conversation = alice
        .get_or_create_direct(&UserId::new("u2"))
        .await
        .unwrap();
    alice
        .send_message(&conversation, "ping", None)
        .await
        .unwrap();
    wait_for(&mut badge, "unread badge", |b| *b == 1).await;

    bob.open_conversation(conversation.clone());
    let mut visible = bob.watch_visible();
    let messages = wait_for(&mut visible, "incoming message", |v| v.len() == 1).await;
    bob.mark_as_read(&conversation, &messages).await.unwrap();
    wait_for(&mut badge, "cleared badge", |b| *b == 0).await;
}

#[tokio::test]
async fn cold_start_renders_the_cache_before_the_feed() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    let remote = Arc::new(MemoryRemote::new());
    let warm = SyncEngine::new(
        UserId::new("u2"),
        remote.clone() as Arc<dyn RemoteStore>,
        Arc::new(NoopPushSender),
        Database::open_at(&path).unwrap(),
    );
    let conversation = warm.get_or_create_direct(&UserId::new("u1")).await.unwrap();
    remote
        .create_message(draft(&conversation, "u1", "remember me"))
        .await
        .unwrap();
    warm.open_conversation(conversation.clone());
    let mut visible = warm.watch_visible();
    wait_for(&mut visible, "mirrored message", |v| v.len() == 1).await;
    warm.close_conversation();

    // Fresh process, unreachable backend: the cached copy still renders.
    let empty_remote = Arc::new(MemoryRemote::new());
    let cold = SyncEngine::new(
        UserId::new("u2"),
        empty_remote as Arc<dyn RemoteStore>,
        Arc::new(NoopPushSender),
        Database::open_at(&path).unwrap(),
    );
    cold.open_conversation(conversation);

    let rendered = cold.visible_messages();
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].text, "remember me");
    assert!(rendered[0].from_cache);
}
