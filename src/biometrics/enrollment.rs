//! Typing-profile enrollment.
//!
//! After registration the user retypes their password until the model
//! accepts a sample as consistent. Every screened vector is kept; the
//! accepted batch is handed to the training endpoint so the profile starts
//! from more than a single observation.

use std::sync::Arc;

use log::{info, warn};

use crate::api::AuthApi;
use crate::models::{AuthAttempt, FeatureVector, Identifier, RawInputEvent};
use crate::utils::mask_identifier;
use crate::verification::session::VerificationError;

use super::vectorizer::vectorize;

/// Progress of one enrollment attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentProgress {
    /// Sample judged inconsistent; the user should retype.
    Rejected { attempt: u32 },
    /// Sample accepted; collected vectors were forwarded for training.
    Completed { attempts: u32, accepted: bool },
}

/// One user's enrollment loop.
pub struct EnrollmentSession {
    identifier: Identifier,
    password: String,
    api: Arc<dyn AuthApi>,
    attempt: u32,
    collected: Vec<FeatureVector>,
}

impl EnrollmentSession {
    pub fn new(
        identifier: impl Into<Identifier>,
        password: impl Into<String>,
        api: Arc<dyn AuthApi>,
    ) -> Self {
        EnrollmentSession {
            identifier: identifier.into(),
            password: password.into(),
            api,
            attempt: 0,
            collected: Vec::new(),
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn collected(&self) -> &[FeatureVector] {
        &self.collected
    }

    /// Screen one password entry and its captured pattern.
    ///
    /// A wrong password or an unusable pattern fails validation without
    /// consuming an attempt; the pattern is discarded either way.
    pub async fn submit_attempt(
        &mut self,
        entered_password: &str,
        pattern: &[RawInputEvent],
    ) -> Result<EnrollmentProgress, VerificationError> {
        if entered_password != self.password {
            return Err(VerificationError::Validation(
                "password does not match".to_string(),
            ));
        }

        let vector = vectorize(pattern);
        if vector.is_empty() {
            return Err(VerificationError::Validation(
                "no usable typing pattern captured".to_string(),
            ));
        }

        self.attempt += 1;
        self.collected.push(vector.clone());

        let attempt = AuthAttempt::new(self.identifier.clone(), vector, false);
        let verdict = self.api.predict(&attempt).await?;

        if verdict.is_anomalous {
            info!(
                "enrollment sample {} rejected for {} (score {:.2})",
                self.attempt,
                mask_identifier(&self.identifier),
                verdict.score
            );
            return Ok(EnrollmentProgress::Rejected {
                attempt: self.attempt,
            });
        }

        let accepted = match self.api.train(&self.identifier, &self.collected).await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(
                    "training submission failed for {}: {}",
                    mask_identifier(&self.identifier),
                    e
                );
                false
            }
        };

        info!(
            "enrollment complete for {} after {} attempts ({} vectors)",
            mask_identifier(&self.identifier),
            self.attempt,
            self.collected.len()
        );
        Ok(EnrollmentProgress::Completed {
            attempts: self.attempt,
            accepted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, OtpOutcome};
    use crate::models::{AnomalyVerdict, FieldContext, KeyEventKind};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct ScriptedApi {
        anomalous: Mutex<VecDeque<bool>>,
        trained_batches: Mutex<Vec<usize>>,
    }

    impl ScriptedApi {
        fn new(script: &[bool]) -> Self {
            ScriptedApi {
                anomalous: Mutex::new(script.iter().copied().collect()),
                trained_batches: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AuthApi for ScriptedApi {
        async fn predict(&self, _attempt: &AuthAttempt) -> Result<AnomalyVerdict, ApiError> {
            let is_anomalous = self.anomalous.lock().pop_front().unwrap_or(false);
            Ok(AnomalyVerdict {
                score: if is_anomalous { 0.9 } else { 0.1 },
                is_anomalous,
                confidence: None,
                recommendation: None,
            })
        }

        async fn train(&self, _id: &str, vectors: &[FeatureVector]) -> Result<bool, ApiError> {
            self.trained_batches.lock().push(vectors.len());
            Ok(true)
        }

        async fn verify_otp(&self, _id: &str, _code: &str) -> Result<OtpOutcome, ApiError> {
            unreachable!("enrollment never verifies codes")
        }

        async fn resend_otp(&self, _id: &str) -> Result<OtpOutcome, ApiError> {
            unreachable!("enrollment never resends codes")
        }
    }

    fn typed_pattern() -> Vec<RawInputEvent> {
        let mut events = Vec::new();
        for (i, key) in ["s", "e", "c", "r", "e", "t"].iter().enumerate() {
            let t = i as f64 * 180.0;
            events.push(RawInputEvent::new(
                KeyEventKind::KeyDown,
                *key,
                *key,
                t,
                FieldContext::Password,
            ));
            events.push(RawInputEvent::new(
                KeyEventKind::KeyUp,
                *key,
                *key,
                t + 70.0,
                FieldContext::Password,
            ));
        }
        events
    }

    #[tokio::test]
    async fn test_enrollment_retries_until_accepted() {
        let api = Arc::new(ScriptedApi::new(&[true, true, false]));
        let mut session = EnrollmentSession::new("user@example.com", "secret", api.clone());

        for expected in [1, 2] {
            let progress = session
                .submit_attempt("secret", &typed_pattern())
                .await
                .unwrap();
            assert_eq!(progress, EnrollmentProgress::Rejected { attempt: expected });
        }

        let progress = session
            .submit_attempt("secret", &typed_pattern())
            .await
            .unwrap();
        assert_eq!(
            progress,
            EnrollmentProgress::Completed {
                attempts: 3,
                accepted: true
            }
        );

        // All three screened vectors went out in one training batch.
        assert_eq!(*api.trained_batches.lock(), vec![3]);
    }

    #[tokio::test]
    async fn test_password_mismatch_consumes_nothing() {
        let api = Arc::new(ScriptedApi::new(&[false]));
        let mut session = EnrollmentSession::new("user@example.com", "secret", api);

        let error = session
            .submit_attempt("wrong", &typed_pattern())
            .await
            .unwrap_err();
        assert!(matches!(error, VerificationError::Validation(_)));
        assert_eq!(session.attempt(), 0);
        assert!(session.collected().is_empty());
    }

    #[tokio::test]
    async fn test_pairless_pattern_fails_validation() {
        let api = Arc::new(ScriptedApi::new(&[false]));
        let mut session = EnrollmentSession::new("user@example.com", "secret", api);

        let only_downs = vec![RawInputEvent::new(
            KeyEventKind::KeyDown,
            "s",
            "KeyS",
            0.0,
            FieldContext::Password,
        )];
        let error = session
            .submit_attempt("secret", &only_downs)
            .await
            .unwrap_err();
        assert!(matches!(error, VerificationError::Validation(_)));
        assert_eq!(session.attempt(), 0);
    }
}
