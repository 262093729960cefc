// Keystroke Guard: Cross-Context Relay
// Message contract between isolated execution contexts

pub mod bus;
pub mod hub;

pub use bus::{channel, ContextHandle, ContextInbox};
pub use hub::{Fetcher, Hub, HttpFetcher, StatusStore};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::models::StatusReport;

/// Enumerated action contract carried by relay messages.
///
/// Contexts cannot share memory; everything crossing a context boundary is
/// one of these serialized actions plus an optional one-shot reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "camelCase")]
pub enum RelayAction {
    /// Outbound HTTP performed by the hub on behalf of the sender.
    FetchData(FetchRequest),
    GetUserStatus,
    UpdateUserStatus(StatusReport),
    ToggleMonitoring,
    StartPatternCollection,
    StopPatternCollection,
    GetPattern,
    TransferPatternToHost,
}

/// Request payload of `fetchData`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl FetchRequest {
    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        FetchRequest {
            url: url.into(),
            method: "POST".to_string(),
            headers: HashMap::new(),
            body: Some(body),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        FetchRequest {
            url: url.into(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
        }
    }
}

/// Successful `fetchData` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub status: u16,
    pub data: Value,
}

/// Relay failure modes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("relay channel closed")]
    ChannelClosed,
    #[error("reply dropped before completion")]
    ReplyDropped,
    #[error("unsupported action for this context: {0}")]
    Unsupported(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("handler failed: {0}")]
    Handler(String),
}

pub type RelayResult = Result<Value, RelayError>;

/// One message in flight: an action plus at most one reply slot. The slot
/// is consumed on first use; later responses are no-ops.
pub struct RelayEnvelope {
    pub action: RelayAction,
    reply: Option<oneshot::Sender<RelayResult>>,
}

impl RelayEnvelope {
    pub fn new(action: RelayAction, reply: Option<oneshot::Sender<RelayResult>>) -> Self {
        RelayEnvelope { action, reply }
    }

    /// Invoke the reply callback. At most one response is ever delivered;
    /// if the sender did not ask for one (or already got one) the result
    /// is dropped.
    pub fn respond(&mut self, result: RelayResult) {
        if let Some(tx) = self.reply.take() {
            let _ = tx.send(result);
        }
    }

    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }
}

/// Fire-and-forget notifications pushed from the hub to attached UI
/// contexts. A context with no live listener silently misses these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RelayBroadcast {
    StatusUpdate(StatusReport),
}

/// Wire shape of a relay response: `{success, data}` on success,
/// `{success: false, error}` on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<RelayResult> for RelayResponse {
    fn from(result: RelayResult) -> Self {
        match result {
            Ok(data) => RelayResponse {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(e) => RelayResponse {
                success: false,
                data: None,
                error: Some(e.to_string()),
            },
        }
    }
}
