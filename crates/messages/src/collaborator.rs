//! Narrow interfaces to the gateway's outbound API.
//!
//! Classification never calls these; they are injected into the dispatcher
//! and into plugins at composition time.

use async_trait::async_trait;

use crate::record::MediaKind;

/// Turns attachment references in message markup into downloadable URLs.
#[async_trait]
pub trait AttachmentResolver: Send + Sync {
    /// Resolve the attachment of kind `kind` described by `markup`, found in
    /// message `message_id`.
    async fn resolve(
        &self,
        kind: MediaKind,
        markup: &str,
        message_id: &str,
    ) -> anyhow::Result<String>;
}

/// Sends messages back through the gateway.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send `text` to a contact or group, mentioning the ids in `at` (only
    /// meaningful in groups).
    async fn send_text(&self, to: &str, text: &str, at: &[String]) -> anyhow::Result<()>;
}
