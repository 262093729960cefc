//! The coordination hub context.
//!
//! The hub is the only context permitted to perform outbound HTTP on behalf
//! of others: capture and UI contexts are barred from cross-origin calls by
//! their environment, so `fetchData` requests funnel through here. It also
//! owns the user status record and pushes status changes to every attached
//! UI context as fire-and-forget broadcasts.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;

use super::bus::{ContextHandle, ContextInbox};
use super::{FetchOutcome, FetchRequest, RelayAction, RelayBroadcast, RelayEnvelope, RelayError, RelayResult};
use crate::models::StatusReport;

/// Shared handle to the hub's user status record.
#[derive(Clone, Default)]
pub struct StatusStore(Arc<RwLock<StatusReport>>);

impl StatusStore {
    pub fn get(&self) -> StatusReport {
        self.0.read().clone()
    }

    pub fn set(&self, report: StatusReport) {
        *self.0.write() = report;
    }
}

/// Outbound HTTP seam so the hub can be exercised without a network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, RelayError>;
}

/// Production fetcher backed by reqwest.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        HttpFetcher {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, RelayError> {
        let method = request
            .method
            .parse::<reqwest::Method>()
            .map_err(|_| RelayError::Fetch(format!("unsupported method: {}", request.method)))?;

        // Normalize headers: JSON content type first, caller headers on top.
        let mut builder = self
            .http
            .request(method, &request.url)
            .header("Content-Type", "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RelayError::Fetch(e.to_string()))?;

        let status = response.status().as_u16();
        let data: Value = response
            .json()
            .await
            .map_err(|e| RelayError::Fetch(format!("invalid response body: {}", e)))?;

        Ok(FetchOutcome { status, data })
    }
}

/// Action-keyed router for the hub context.
pub struct Hub {
    inbox: ContextInbox,
    status: StatusStore,
    ui_contexts: Vec<mpsc::UnboundedSender<RelayBroadcast>>,
    fetcher: Arc<dyn Fetcher>,
    capture: Option<ContextHandle>,
}

impl Hub {
    /// Build a hub and the handle other contexts use to reach it.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> (Hub, ContextHandle) {
        let (handle, inbox) = super::bus::channel();
        let hub = Hub {
            inbox,
            status: StatusStore::default(),
            ui_contexts: Vec::new(),
            fetcher,
            capture: None,
        };
        (hub, handle)
    }

    pub fn status_store(&self) -> StatusStore {
        self.status.clone()
    }

    /// Attach a UI context for broadcasts. Dropping the returned receiver
    /// detaches it; missed broadcasts are not retried or queued.
    pub fn attach_ui(&mut self) -> mpsc::UnboundedReceiver<RelayBroadcast> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.ui_contexts.push(tx);
        rx
    }

    /// Register the capture context so monitoring and pattern actions can
    /// be forwarded to it.
    pub fn set_capture_context(&mut self, handle: ContextHandle) {
        self.capture = Some(handle);
    }

    /// Serve envelopes until every sender handle is dropped.
    pub async fn run(mut self) {
        while let Some(envelope) = self.inbox.next().await {
            self.dispatch(envelope).await;
        }
        debug!("hub shutting down: all context handles dropped");
    }

    async fn dispatch(&mut self, mut envelope: RelayEnvelope) {
        let result = self.handle_action(envelope.action.clone()).await;
        if let Err(e) = &result {
            warn!("hub action failed: {}", e);
        }
        envelope.respond(result);
    }

    async fn handle_action(&mut self, action: RelayAction) -> RelayResult {
        match action {
            RelayAction::FetchData(request) => {
                debug!("relaying fetch to {}", request.url);
                let outcome = self.fetcher.fetch(request).await?;
                serde_json::to_value(outcome).map_err(|e| RelayError::Handler(e.to_string()))
            }
            RelayAction::GetUserStatus => {
                serde_json::to_value(self.status.get()).map_err(|e| RelayError::Handler(e.to_string()))
            }
            RelayAction::UpdateUserStatus(report) => {
                self.status.set(report.clone());
                self.broadcast(RelayBroadcast::StatusUpdate(report));
                Ok(Value::Null)
            }
            // Monitoring and pattern actions belong to the capture context;
            // the hub only forwards them.
            forwarded @ (RelayAction::ToggleMonitoring
            | RelayAction::StartPatternCollection
            | RelayAction::StopPatternCollection
            | RelayAction::GetPattern
            | RelayAction::TransferPatternToHost) => match &self.capture {
                Some(capture) => capture.request(forwarded).await,
                None => Err(RelayError::Unsupported(format!("{:?}", forwarded))),
            },
        }
    }

    fn broadcast(&mut self, broadcast: RelayBroadcast) {
        // Fire-and-forget: dead listeners are pruned, nothing is queued.
        self.ui_contexts.retain(|ui| ui.send(broadcast.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserStatusKind;
    use serde_json::json;

    struct StaticFetcher {
        outcome: FetchOutcome,
    }

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, _request: FetchRequest) -> Result<FetchOutcome, RelayError> {
            Ok(self.outcome.clone())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl Fetcher for FailingFetcher {
        async fn fetch(&self, _request: FetchRequest) -> Result<FetchOutcome, RelayError> {
            Err(RelayError::Fetch("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_fetch_data_relays_through_fetcher() {
        let fetcher = Arc::new(StaticFetcher {
            outcome: FetchOutcome {
                status: 200,
                data: json!({"anomaly_score": 0.12}),
            },
        });
        let (hub, handle) = Hub::new(fetcher);
        tokio::spawn(hub.run());

        let request = FetchRequest::post_json("http://localhost:8080/auth/predict", json!({}));
        let value = handle.request(RelayAction::FetchData(request)).await.unwrap();
        assert_eq!(value["status"], 200);
        assert_eq!(value["data"]["anomaly_score"], 0.12);
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates_as_error() {
        let (hub, handle) = Hub::new(Arc::new(FailingFetcher));
        tokio::spawn(hub.run());

        let request = FetchRequest::get("http://localhost:8080/health");
        let result = handle.request(RelayAction::FetchData(request)).await;
        assert!(matches!(result, Err(RelayError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_status_update_broadcasts_to_attached_ui() {
        let (mut hub, handle) = Hub::new(Arc::new(FailingFetcher));
        let mut ui = hub.attach_ui();
        tokio::spawn(hub.run());

        let report = StatusReport {
            status: UserStatusKind::AnomalyDetected,
            anomaly_score: 0.91,
            is_enabled: true,
        };
        handle
            .request(RelayAction::UpdateUserStatus(report))
            .await
            .unwrap();

        match ui.recv().await.unwrap() {
            RelayBroadcast::StatusUpdate(update) => {
                assert_eq!(update.status, UserStatusKind::AnomalyDetected);
                assert_eq!(update.anomaly_score, 0.91);
            }
        }

        let status = handle.request(RelayAction::GetUserStatus).await.unwrap();
        assert_eq!(status["status"], "anomaly_detected");
    }

    #[tokio::test]
    async fn test_detached_ui_silently_misses_broadcasts() {
        let (mut hub, handle) = Hub::new(Arc::new(FailingFetcher));
        let ui = hub.attach_ui();
        drop(ui); // listener goes away before the broadcast
        tokio::spawn(hub.run());

        let report = StatusReport {
            status: UserStatusKind::Normal,
            anomaly_score: 0.05,
            is_enabled: true,
        };
        // Update succeeds even though nobody is listening.
        handle
            .request(RelayAction::UpdateUserStatus(report))
            .await
            .unwrap();

        let status = handle.request(RelayAction::GetUserStatus).await.unwrap();
        assert_eq!(status["status"], "normal");
    }

    #[tokio::test]
    async fn test_pattern_action_without_capture_context_is_unsupported() {
        let (hub, handle) = Hub::new(Arc::new(FailingFetcher));
        tokio::spawn(hub.run());

        let result = handle.request(RelayAction::StartPatternCollection).await;
        assert!(matches!(result, Err(RelayError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_pattern_action_forwarded_to_capture_context() {
        let (mut hub, handle) = Hub::new(Arc::new(FailingFetcher));
        let (capture_handle, mut capture_inbox) = super::super::bus::channel();
        hub.set_capture_context(capture_handle);
        tokio::spawn(hub.run());

        tokio::spawn(async move {
            let mut envelope = capture_inbox.next().await.unwrap();
            assert!(matches!(envelope.action, RelayAction::ToggleMonitoring));
            envelope.respond(Ok(json!({"monitoring": false})));
        });

        let value = handle.request(RelayAction::ToggleMonitoring).await.unwrap();
        assert_eq!(value["monitoring"], false);
    }
}
