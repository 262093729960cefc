// Keystroke Guard: Verification Session
// Drives the login decision from captured keystrokes through the external
// verdict into UI effects and, when needed, the OTP step-up cycle.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::{ApiError, AuthApi};
use crate::biometrics::capture::CaptureAgent;
use crate::biometrics::vectorizer::vectorize;
use crate::models::{AnomalyVerdict, AuthAttempt, AuthRecommendation, FieldContext, Identifier, KeyEventKind};
use crate::utils::mask_identifier;

use super::effects::UiEffects;
use super::grace::GraceRegistry;
use super::otp::{OtpChallenge, OtpDenied, OtpFailure, OtpPolicy};
use super::registration::PageContext;

/// Verification state machine positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    Idle,
    Collecting,
    Submitted,
    Normal,
    Suspicious,
    /// Challenge active, awaiting a code.
    OtpPending,
    /// A code is in flight to the service.
    OtpVerifying,
    Verified,
    /// Attempt limit hit; countdown running.
    OtpBlocked,
    /// Challenge canceled; login stays blocked until a new cycle succeeds.
    LockedIdle,
}

/// Session policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Minimum matched key pairs before a submission may leave the device.
    pub min_matched_pairs: usize,
    /// Password length that auto-triggers analysis on key release.
    pub min_password_length: usize,
    /// Window during which a second submission trigger is ignored.
    pub debounce_ms: i64,
    /// Score at or above which step-up verification is demanded.
    pub anomaly_threshold: f64,
    /// Score at or above which a warning is shown without lockout.
    pub suspicious_threshold: f64,
    /// Forward accepted vectors for incremental model training.
    pub forward_training: bool,
    pub otp: OtpPolicy,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        VerificationConfig {
            min_matched_pairs: 5,
            min_password_length: 8,
            debounce_ms: 3000,
            anomaly_threshold: 0.8,
            suspicious_threshold: 0.5,
            forward_training: true,
            otp: OtpPolicy::default(),
        }
    }
}

/// Verification failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("verification blocked for {remaining_secs}s")]
    OtpExhausted { remaining_secs: i64 },
    #[error("code resend available in {remaining_secs}s")]
    ResendCooldown { remaining_secs: i64 },
}

impl From<ApiError> for VerificationError {
    fn from(e: ApiError) -> Self {
        VerificationError::Network(e.to_string())
    }
}

impl From<OtpDenied> for VerificationError {
    fn from(e: OtpDenied) -> Self {
        match e {
            OtpDenied::Blocked { remaining_secs } => {
                VerificationError::OtpExhausted { remaining_secs }
            }
            OtpDenied::ResendCooldown { remaining_secs } => {
                VerificationError::ResendCooldown { remaining_secs }
            }
        }
    }
}

/// Why a submission trigger was silently dropped. Expected control flow,
/// logged but never surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    Debounced,
    InFlight,
    RegistrationPage,
    InsufficientPairs,
    NoPasswordField,
}

/// What a verdict did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum VerdictOutcome {
    Normal { score: f64 },
    Suspicious { score: f64 },
    StepUpRequired { score: f64 },
}

/// Result of a submission trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The attempt reached the service and its verdict was applied.
    Submitted(VerdictOutcome),
    /// A live grace window skipped collection and the anomaly check.
    TrustedFastPath,
    /// A safeguard dropped the trigger; collection continues.
    Suppressed(SuppressReason),
    /// The network call failed. Buffers were cleared regardless.
    Failed(String),
}

/// Progress of an OTP code entry.
#[derive(Debug, Clone, PartialEq)]
pub enum OtpProgress {
    Verified,
    Rejected { remaining: u32 },
    Blocked { until: DateTime<Utc>, remaining_secs: i64 },
}

/// Controller for one context's verification flow.
///
/// Owns the capture agent, the submission safeguards (debounce, in-flight
/// guard, minimum-pair check, registration suppression), the OTP challenge,
/// and every state transition in between. All UI consequences go through
/// the injected [`UiEffects`] adapter.
pub struct VerificationSession {
    config: VerificationConfig,
    state: VerificationState,
    agent: CaptureAgent,
    api: Arc<dyn AuthApi>,
    ui: Arc<dyn UiEffects>,
    grace: GraceRegistry,
    identifier: Option<Identifier>,
    in_flight: bool,
    last_submission: Option<DateTime<Utc>>,
    otp: Option<OtpChallenge>,
}

impl VerificationSession {
    pub fn new(
        config: VerificationConfig,
        agent: CaptureAgent,
        api: Arc<dyn AuthApi>,
        ui: Arc<dyn UiEffects>,
        grace: GraceRegistry,
    ) -> Self {
        VerificationSession {
            config,
            state: VerificationState::Idle,
            agent,
            api,
            ui,
            grace,
            identifier: None,
            in_flight: false,
            last_submission: None,
            otp: None,
        }
    }

    pub fn state(&self) -> VerificationState {
        self.state
    }

    pub fn set_identifier(&mut self, identifier: impl Into<Identifier>) {
        self.identifier = Some(identifier.into());
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Attempts without a known identifier run under an anonymous token.
    fn effective_identifier(&self) -> String {
        self.identifier.clone().unwrap_or_else(|| "anonymous".to_string())
    }

    pub fn agent(&self) -> &CaptureAgent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut CaptureAgent {
        &mut self.agent
    }

    fn otp_active(&self) -> bool {
        self.otp.is_some()
    }

    /// Explicitly begin collecting. Resets the capture buffer.
    pub fn start_collection(&mut self) {
        if self.otp_active() {
            debug!("collection not started: step-up challenge active");
            return;
        }
        self.agent.start();
        self.state = VerificationState::Collecting;
    }

    /// Implicit trigger: a credential field gained focus.
    pub fn focus_credential_field(&mut self) {
        if self.state == VerificationState::Idle {
            self.start_collection();
        }
    }

    /// Record a key press; Enter on a password field triggers submission.
    pub async fn on_key_press(
        &mut self,
        key: &str,
        code: &str,
        field: FieldContext,
        page: &PageContext,
    ) -> Option<SubmitOutcome> {
        self.agent.intercept(KeyEventKind::KeyDown, key, code, field);

        if field == FieldContext::Password && key == "Enter" {
            return Some(self.try_submit(true, page).await);
        }
        None
    }

    /// Record a key release; a sufficiently long password triggers
    /// submission before the form is ever sent.
    pub async fn on_key_release(
        &mut self,
        key: &str,
        code: &str,
        field: FieldContext,
        field_value_len: usize,
        page: &PageContext,
    ) -> Option<SubmitOutcome> {
        self.agent.intercept(KeyEventKind::KeyUp, key, code, field);

        if field == FieldContext::Password && field_value_len >= self.config.min_password_length {
            return Some(self.try_submit(false, page).await);
        }
        None
    }

    /// Form-submission trigger. Only password-bearing forms qualify.
    pub async fn on_form_submit(
        &mut self,
        page: &PageContext,
        has_password_field: bool,
    ) -> SubmitOutcome {
        if !has_password_field {
            debug!("form submit ignored: no password field");
            return SubmitOutcome::Suppressed(SuppressReason::NoPasswordField);
        }
        self.try_submit(true, page).await
    }

    /// Run the guard chain and, if everything passes, submit the vectorized
    /// buffer for a verdict.
    pub async fn try_submit(&mut self, urgent: bool, page: &PageContext) -> SubmitOutcome {
        let now = Utc::now();
        let identifier = self.effective_identifier();

        // Registration pages suppress unconditionally: the user is enrolling
        // a profile there, not proving one.
        if page.is_registration_page() {
            debug!("submission suppressed: registration page");
            return SubmitOutcome::Suppressed(SuppressReason::RegistrationPage);
        }

        // Trusted fast-path: a live grace window skips collection and the
        // anomaly check entirely.
        if self.grace.in_grace(&identifier, now) {
            info!(
                "grace window open for {}: anomaly check skipped",
                mask_identifier(&identifier)
            );
            self.state = VerificationState::Verified;
            self.ui.enable_credential_inputs();
            self.ui.clear_warning();
            return SubmitOutcome::TrustedFastPath;
        }

        if let Some(previous) = self.last_submission {
            if now - previous < Duration::milliseconds(self.config.debounce_ms) {
                debug!("submission suppressed: within debounce window");
                return SubmitOutcome::Suppressed(SuppressReason::Debounced);
            }
        }

        if self.in_flight {
            debug!("submission suppressed: analysis already in flight");
            return SubmitOutcome::Suppressed(SuppressReason::InFlight);
        }

        let snapshot = self.agent.snapshot_general();
        let vector = vectorize(&snapshot);
        if vector.len() < self.config.min_matched_pairs {
            debug!(
                "submission suppressed: {} of {} matched pairs",
                vector.len(),
                self.config.min_matched_pairs
            );
            return SubmitOutcome::Suppressed(SuppressReason::InsufficientPairs);
        }

        // The buffer is spent from here on, whatever the call returns.
        self.agent.take_general();
        let attempt = AuthAttempt::new(identifier, vector, urgent);
        self.last_submission = Some(now);
        self.in_flight = true;
        self.state = VerificationState::Submitted;
        info!(
            "submitting attempt {} ({} pairs, urgent: {})",
            attempt.id,
            attempt.vector.len(),
            urgent
        );

        let result = self.api.predict(&attempt).await;
        // The guard resets on every exit path so a failed call can never
        // wedge future submissions.
        self.in_flight = false;

        match result {
            Ok(verdict) => {
                let outcome = self.apply_verdict(&attempt, &verdict).await;
                SubmitOutcome::Submitted(outcome)
            }
            Err(e) => {
                warn!("prediction call failed: {}", e);
                self.state = VerificationState::Collecting;
                SubmitOutcome::Failed(e.to_string())
            }
        }
    }

    async fn apply_verdict(
        &mut self,
        attempt: &AuthAttempt,
        verdict: &AnomalyVerdict,
    ) -> VerdictOutcome {
        let score = verdict.score;
        let step_up = verdict.is_anomalous
            || score >= self.config.anomaly_threshold
            || matches!(
                verdict.recommendation,
                Some(AuthRecommendation::AdditionalFactorRequired | AuthRecommendation::Block)
            );

        if step_up {
            info!(
                "step-up required for {} (score {:.2})",
                mask_identifier(&attempt.identifier),
                score
            );
            self.otp = Some(OtpChallenge::new(self.config.otp.clone(), Utc::now()));
            self.state = VerificationState::OtpPending;
            self.ui.disable_credential_inputs();
            self.ui.show_warning(score);
            return VerdictOutcome::StepUpRequired { score };
        }

        if score >= self.config.suspicious_threshold {
            info!(
                "suspicious pattern for {} (score {:.2})",
                mask_identifier(&attempt.identifier),
                score
            );
            self.state = VerificationState::Suspicious;
            self.ui.show_warning(score);
            return VerdictOutcome::Suspicious { score };
        }

        self.state = VerificationState::Normal;
        self.ui.enable_credential_inputs();
        self.ui.clear_warning();

        if self.config.forward_training {
            let vectors = std::slice::from_ref(&attempt.vector);
            if let Err(e) = self.api.train(&attempt.identifier, vectors).await {
                // Training is advisory; the login decision already stands.
                warn!("training forward failed: {}", e);
            }
        }

        VerdictOutcome::Normal { score }
    }

    /// Check a one-time code against the service.
    pub async fn submit_otp(&mut self, code: &str) -> Result<OtpProgress, VerificationError> {
        let now = Utc::now();
        let identifier = self.effective_identifier();

        {
            let challenge = self
                .otp
                .as_mut()
                .ok_or_else(|| VerificationError::Validation("no active challenge".to_string()))?;

            if !challenge.code_format_ok(code) {
                return Err(VerificationError::Validation(format!(
                    "code must be {} digits",
                    challenge.policy().code_length
                )));
            }

            challenge.can_attempt(now)?;
        }

        self.state = VerificationState::OtpVerifying;
        let result = self.api.verify_otp(&identifier, code).await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.state = VerificationState::OtpPending;
                return Err(e.into());
            }
        };

        if outcome.verified {
            info!("step-up verified for {}", mask_identifier(&identifier));
            self.otp = None;
            self.grace.mark_verified(&identifier, Utc::now());
            self.state = VerificationState::Verified;
            self.ui.enable_credential_inputs();
            self.ui.clear_warning();
            return Ok(OtpProgress::Verified);
        }

        let challenge = self
            .otp
            .as_mut()
            .ok_or_else(|| VerificationError::Validation("no active challenge".to_string()))?;

        match challenge.register_failure(Utc::now()) {
            OtpFailure::RemainingAttempts(remaining) => {
                debug!(
                    "wrong code for {}: {} attempts left",
                    mask_identifier(&identifier),
                    remaining
                );
                self.state = VerificationState::OtpPending;
                Ok(OtpProgress::Rejected { remaining })
            }
            OtpFailure::Blocked { until } => {
                warn!(
                    "otp attempts exhausted for {}: blocked until {}",
                    mask_identifier(&identifier),
                    until
                );
                self.state = VerificationState::OtpBlocked;
                let remaining_secs = (until - Utc::now()).num_seconds().max(0);
                Ok(OtpProgress::Blocked { until, remaining_secs })
            }
        }
    }

    /// Ask the service to dispatch a fresh code. Rate-limited by the
    /// challenge's own cooldown, independent of the attempt counter.
    pub async fn resend_otp(&mut self) -> Result<(), VerificationError> {
        let now = Utc::now();
        let identifier = self.effective_identifier();

        {
            let challenge = self
                .otp
                .as_ref()
                .ok_or_else(|| VerificationError::Validation("no active challenge".to_string()))?;
            challenge.can_resend(now)?;
        }

        let outcome = self.api.resend_otp(&identifier).await?;
        if let Some(challenge) = self.otp.as_mut() {
            challenge.mark_resent(Utc::now());
        }
        debug!(
            "otp resent for {}: {}",
            mask_identifier(&identifier),
            outcome.message
        );
        Ok(())
    }

    /// Abandon the challenge. Login stays blocked until a new OTP cycle
    /// succeeds; inputs are left disabled.
    pub fn cancel_otp(&mut self) {
        if self.otp.take().is_some() {
            info!("step-up challenge canceled; login remains blocked");
        }
        self.state = VerificationState::LockedIdle;
    }

    /// Display countdown for an active block, in whole seconds.
    pub fn otp_block_remaining_secs(&self) -> Option<i64> {
        self.otp
            .as_ref()
            .and_then(|c| c.block_remaining_secs(Utc::now()))
    }
}
