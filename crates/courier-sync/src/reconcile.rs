//! Pure reconciliation of pending records against a snapshot.
//!
//! Each remote snapshot (and the initial cache load) is a full materialized
//! list.  Merging it with the pending-send map is a pure function, so the
//! dedup, promotion, and ordering invariants are all unit-testable without
//! a backend: exactly one record per logical message survives, either the
//! provisional copy or the confirmed one, never both.

use std::collections::{BTreeMap, HashSet};

use courier_shared::{ClientSendId, Message};

/// Result of one merge pass.
#[derive(Debug)]
pub struct ReconcileOutcome {
    /// The display list: surviving pending records plus the snapshot,
    /// ordered by the display timestamp with store id as the tie-break.
    pub merged: Vec<Message>,
    /// Pending sends whose correlation id appeared in the snapshot; the
    /// caller retires them from the pending map and metrics.
    pub promoted: Vec<ClientSendId>,
}

/// Merge the pending-send map with a full snapshot (live or cached).
///
/// A pending record whose `client_send_id` appears in the snapshot has
/// been confirmed: the snapshot copy wins and the provisional one is
/// reported in `promoted`.
pub fn reconcile(
    pending: &BTreeMap<ClientSendId, Message>,
    snapshot: Vec<Message>,
) -> ReconcileOutcome {
    let confirmed: HashSet<ClientSendId> = snapshot
        .iter()
        .filter_map(|m| m.client_send_id)
        .collect();

    let promoted: Vec<ClientSendId> = pending
        .keys()
        .filter(|id| confirmed.contains(id))
        .copied()
        .collect();

    let survivors = pending
        .iter()
        .filter(|(id, _)| !confirmed.contains(id))
        .map(|(_, m)| m.clone());

    let mut merged: Vec<Message> = snapshot.into_iter().chain(survivors).collect();
    sort_for_display(&mut merged);

    ReconcileOutcome { merged, promoted }
}

/// Order messages for display: display timestamp ascending, then
/// store-assigned id (provisional records, which have none, sort first
/// among equals).
pub fn sort_for_display(messages: &mut [Message]) {
    messages.sort_by(|a, b| {
        a.order_timestamp()
            .cmp(&b.order_timestamp())
            .then_with(|| a.id.cmp(&b.id))
    });
}
