//! Point-to-point channels between execution contexts.
//!
//! Each context owns exactly one inbox; everyone else talks to it through
//! cloned handles. Delivery is FIFO per sender-to-receiver channel only;
//! messages from different senders interleave arbitrarily at the receiver.

use tokio::sync::{mpsc, oneshot};

use super::{RelayAction, RelayEnvelope, RelayError, RelayResult};

/// Create the inbox for a new context and the handle others use to reach it.
pub fn channel() -> (ContextHandle, ContextInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ContextHandle { tx }, ContextInbox { rx })
}

/// Sending side of a context channel. Cheap to clone.
#[derive(Clone)]
pub struct ContextHandle {
    tx: mpsc::UnboundedSender<RelayEnvelope>,
}

impl ContextHandle {
    /// Send an action and await its single reply.
    pub async fn request(&self, action: RelayAction) -> RelayResult {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RelayEnvelope::new(action, Some(reply_tx)))
            .map_err(|_| RelayError::ChannelClosed)?;

        reply_rx.await.map_err(|_| RelayError::ReplyDropped)?
    }

    /// Send an action without asking for a reply.
    pub fn notify(&self, action: RelayAction) -> Result<(), RelayError> {
        self.tx
            .send(RelayEnvelope::new(action, None))
            .map_err(|_| RelayError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving side of a context channel. Owned by exactly one context.
pub struct ContextInbox {
    rx: mpsc::UnboundedReceiver<RelayEnvelope>,
}

impl ContextInbox {
    /// Next envelope, or `None` once every handle has been dropped.
    pub async fn next(&mut self) -> Option<RelayEnvelope> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_request_receives_reply() {
        let (handle, mut inbox) = channel();

        let server = tokio::spawn(async move {
            let mut envelope = inbox.next().await.unwrap();
            assert!(envelope.expects_reply());
            envelope.respond(Ok(json!({"pong": true})));
        });

        let result = handle.request(RelayAction::GetUserStatus).await.unwrap();
        assert_eq!(result["pong"], true);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_notify_carries_no_reply_slot() {
        let (handle, mut inbox) = channel();
        handle.notify(RelayAction::StartPatternCollection).unwrap();

        let envelope = inbox.next().await.unwrap();
        assert!(!envelope.expects_reply());
    }

    #[tokio::test]
    async fn test_request_to_closed_context_fails() {
        let (handle, inbox) = channel();
        drop(inbox);

        let result = handle.request(RelayAction::GetUserStatus).await;
        assert_eq!(result.unwrap_err(), RelayError::ChannelClosed);
    }

    #[tokio::test]
    async fn test_dropped_envelope_reports_reply_dropped() {
        let (handle, mut inbox) = channel();

        let server = tokio::spawn(async move {
            let envelope = inbox.next().await.unwrap();
            drop(envelope); // context dies before answering
        });

        let result = handle.request(RelayAction::GetUserStatus).await;
        assert_eq!(result.unwrap_err(), RelayError::ReplyDropped);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_fifo_per_sender() {
        let (handle, mut inbox) = channel();
        for _ in 0..3 {
            handle.notify(RelayAction::StartPatternCollection).unwrap();
        }
        handle.notify(RelayAction::StopPatternCollection).unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            let envelope = inbox.next().await.unwrap();
            seen.push(format!("{:?}", envelope.action));
        }
        assert_eq!(seen[3], "StopPatternCollection");
    }
}
