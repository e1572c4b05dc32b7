//! Live feed subscriptions built on a latest-value watch slot.
//!
//! A subscription delivers full materialized snapshots, not deltas; the
//! consumer diffs against its own prior state.  Publishing conflates: a
//! snapshot the consumer has not picked up yet is replaced by the newer
//! one, never queued behind it, so a slow consumer always observes the
//! newest committed state next.  Unsubscribing is idempotent and stops
//! further deliveries, but a snapshot published just before may still be
//! observed; consumers guard against stale results themselves (generation
//! counter in the sync engine).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Producer half held by the remote store implementation.
pub struct SnapshotSender<T> {
    tx: watch::Sender<Option<T>>,
    cancelled: Arc<AtomicBool>,
}

impl<T> SnapshotSender<T> {
    /// Whether the consumer still wants snapshots.
    pub fn is_live(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    /// Publish the newest snapshot, replacing any the consumer has not
    /// picked up yet.  Returns `false` when the subscription is gone (the
    /// producer should drop this sender).
    pub fn publish(&self, snapshot: T) -> bool {
        if !self.is_live() {
            return false;
        }
        self.tx.send_replace(Some(snapshot));
        true
    }
}

/// Handle that stops a subscription.  Cloneable; calling
/// [`Unsubscribe::unsubscribe`] more than once is a no-op.
#[derive(Clone)]
pub struct Unsubscribe {
    cancelled: Arc<AtomicBool>,
}

impl Unsubscribe {
    pub fn unsubscribe(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Consumer half: a stream of full snapshots plus the unsubscribe handle.
pub struct Subscription<T> {
    rx: watch::Receiver<Option<T>>,
    unsubscribe: Unsubscribe,
}

impl<T> Subscription<T> {
    /// A handle that can stop this subscription from elsewhere.
    pub fn unsubscribe_handle(&self) -> Unsubscribe {
        self.unsubscribe.clone()
    }
}

impl<T: Clone> Subscription<T> {
    /// Receive the newest unseen snapshot.  Returns `None` once
    /// unsubscribed or the producer went away.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            if self.unsubscribe.is_cancelled() {
                return None;
            }
            self.rx.changed().await.ok()?;
            if self.unsubscribe.is_cancelled() {
                return None;
            }
            if let Some(snapshot) = self.rx.borrow().clone() {
                return Some(snapshot);
            }
        }
    }
}

/// Create a connected sender/subscription pair.  The slot starts empty;
/// nothing is delivered until the first publish.
pub fn snapshot_channel<T>() -> (SnapshotSender<T>, Subscription<T>) {
    let (tx, rx) = watch::channel(None);
    let cancelled = Arc::new(AtomicBool::new(false));
    (
        SnapshotSender {
            tx,
            cancelled: cancelled.clone(),
        },
        Subscription {
            rx,
            unsubscribe: Unsubscribe { cancelled },
        },
    )
}
