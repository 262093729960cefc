//! Relay-facing loop for a capture/verification context.
//!
//! Wraps a [`VerificationSession`] in an inbox so other contexts can drive
//! monitoring and pattern collection over the bus, and owns the
//! cross-boundary channel into a hosting page for pattern transfers.

use chrono::Utc;
use log::debug;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::models::{PatternTransfer, StatusReport, UserStatusKind};
use crate::relay::{ContextHandle, ContextInbox, RelayAction, RelayError, RelayResult};

use super::registration::PageContext;
use super::session::{SubmitOutcome, VerdictOutcome, VerificationSession};

pub struct SessionContext {
    inbox: ContextInbox,
    session: VerificationSession,
    host_sink: Option<mpsc::UnboundedSender<PatternTransfer>>,
}

impl SessionContext {
    /// Wrap a session and return the handle other contexts use to reach it.
    pub fn new(session: VerificationSession) -> (Self, ContextHandle) {
        let (handle, inbox) = crate::relay::channel();
        let context = SessionContext {
            inbox,
            session,
            host_sink: None,
        };
        (context, handle)
    }

    pub fn session(&self) -> &VerificationSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut VerificationSession {
        &mut self.session
    }

    /// Attach the hosting page. Transfers are fire-and-forget; if the page
    /// goes away its patterns are silently dropped.
    pub fn attach_host_page(&mut self) -> mpsc::UnboundedReceiver<PatternTransfer> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.host_sink = Some(tx);
        rx
    }

    /// Merge a pattern received from another context's transfer event into
    /// this context's own buffer.
    pub fn merge_host_pattern(&mut self, transfer: PatternTransfer) {
        self.session.agent_mut().merge_external(transfer.pattern);
    }

    /// Run a submission trigger and push the resulting status to the hub,
    /// which fans it out to attached UI contexts.
    pub async fn submit_and_report(
        &mut self,
        urgent: bool,
        page: &PageContext,
        hub: &ContextHandle,
    ) -> SubmitOutcome {
        let outcome = self.session.try_submit(urgent, page).await;

        let report = match &outcome {
            SubmitOutcome::Submitted(VerdictOutcome::Normal { score }) => Some(StatusReport {
                status: UserStatusKind::Normal,
                anomaly_score: *score,
                is_enabled: true,
            }),
            SubmitOutcome::Submitted(VerdictOutcome::Suspicious { score }) => Some(StatusReport {
                status: UserStatusKind::Suspicious,
                anomaly_score: *score,
                is_enabled: true,
            }),
            SubmitOutcome::Submitted(VerdictOutcome::StepUpRequired { score }) => {
                Some(StatusReport {
                    status: UserStatusKind::AnomalyDetected,
                    anomaly_score: *score,
                    is_enabled: true,
                })
            }
            SubmitOutcome::TrustedFastPath => Some(StatusReport {
                status: UserStatusKind::Normal,
                anomaly_score: 0.0,
                is_enabled: true,
            }),
            // Suppressed triggers and network failures change nothing.
            _ => None,
        };

        if let Some(report) = report {
            if let Err(e) = hub.request(RelayAction::UpdateUserStatus(report)).await {
                debug!("status report not delivered: {}", e);
            }
        }

        outcome
    }

    /// Serve relay actions until every sender handle is dropped.
    pub async fn run(mut self) {
        while let Some(mut envelope) = self.inbox.next().await {
            let result = self.handle_action(&envelope.action);
            envelope.respond(result);
        }
        debug!("session context shutting down");
    }

    fn handle_action(&mut self, action: &RelayAction) -> RelayResult {
        match action {
            RelayAction::ToggleMonitoring => {
                let monitoring = self.session.agent_mut().toggle_monitoring();
                Ok(json!({ "monitoring": monitoring }))
            }
            RelayAction::StartPatternCollection => {
                self.session.agent_mut().start_pattern_collection();
                Ok(json!({ "collecting": true }))
            }
            RelayAction::StopPatternCollection => {
                let size = self.session.agent_mut().stop_pattern_collection();
                Ok(json!({ "collecting": false, "size": size }))
            }
            RelayAction::GetPattern => {
                let agent = self.session.agent();
                let pattern = serde_json::to_value(agent.pattern_events())
                    .map_err(|e| RelayError::Handler(e.to_string()))?;
                Ok(json!({
                    "pattern": pattern,
                    "length": agent.pattern_len(),
                    "collecting": agent.is_collecting_pattern(),
                }))
            }
            RelayAction::TransferPatternToHost => {
                let pattern = self.session.agent_mut().take_pattern();
                if pattern.is_empty() {
                    debug!("no pattern to transfer");
                    return Ok(Value::Null);
                }

                let transfer = PatternTransfer {
                    pattern,
                    timestamp: Utc::now(),
                    identifier: self.session.identifier().map(str::to_string),
                };

                match &self.host_sink {
                    Some(sink) => {
                        let _ = sink.send(transfer);
                    }
                    None => debug!("no host page attached; pattern dropped"),
                }
                Ok(Value::Null)
            }
            other => Err(RelayError::Unsupported(format!("{:?}", other))),
        }
    }
}
