//! Push notification sender contract.
//!
//! Delivery mechanics live outside the core; the engine only needs a
//! fire-and-forget call shape for the post-send fan-out.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Payload handed to the platform push service.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    /// Opaque routing data (e.g. the conversation to open on tap).
    pub data: BTreeMap<String, String>,
    /// App badge count, when the caller knows it.
    pub badge: Option<u32>,
}

#[async_trait]
pub trait PushSender: Send + Sync + 'static {
    /// Fire-and-forget delivery to one device token.
    async fn send(&self, token: &str, payload: PushPayload) -> Result<()>;
}

/// Sender that logs and drops every notification.  Default for tests and
/// headless environments.
pub struct NoopPushSender;

#[async_trait]
impl PushSender for NoopPushSender {
    async fn send(&self, token: &str, payload: PushPayload) -> Result<()> {
        tracing::debug!(token, title = %payload.title, "push notification dropped (noop sender)");
        Ok(())
    }
}
