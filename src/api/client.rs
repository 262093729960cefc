//! Typed client for the external authentication service.
//!
//! The service is opaque: prediction, incremental training, and OTP
//! verification are reached over three JSON endpoints and nothing else is
//! assumed about it. `AuthApi` is the seam the verification layer depends
//! on; `HttpApiClient` talks to the service directly (hub context) and
//! `RelayApiClient` routes the same contract through the relay bus for
//! contexts that cannot make cross-origin calls themselves.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{AnomalyVerdict, AuthAttempt, AuthRecommendation, FeatureVector};
use crate::relay::{ContextHandle, FetchRequest, RelayAction, RelayError};

pub const PREDICT_ENDPOINT: &str = "/auth/predict";
pub const TRAIN_ENDPOINT: &str = "/auth/train";
pub const VERIFY_ENDPOINT: &str = "/auth/verify";

/// API failure modes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("service returned status {status}: {message}")]
    Service { status: u16, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        ApiError::Network(e.to_string())
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    identifier: &'a str,
    keystroke_vector: &'a FeatureVector,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    anomaly_score: Option<f64>,
    #[serde(default)]
    is_anomalous: Option<bool>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    recommendation: Option<AuthRecommendation>,
}

impl PredictResponse {
    /// The service may answer with a score, a boolean, or both.
    fn into_verdict(self) -> AnomalyVerdict {
        let is_anomalous = self.is_anomalous.unwrap_or(false);
        let score = self
            .anomaly_score
            .unwrap_or(if is_anomalous { 1.0 } else { 0.0 });

        AnomalyVerdict {
            score,
            is_anomalous,
            confidence: self.confidence,
            recommendation: self.recommendation,
        }
    }
}

#[derive(Debug, Serialize)]
struct TrainRequest<'a> {
    identifier: &'a str,
    vectors: &'a [FeatureVector],
}

#[derive(Debug, Deserialize)]
struct TrainResponse {
    is_acceptable: bool,
}

/// Which OTP operation a verify call performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationType {
    LoginAnomaly,
    ResendOtp,
}

#[derive(Debug, Serialize)]
struct OtpRequest<'a> {
    identifier: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    otp_code: Option<&'a str>,
    verification_type: VerificationType,
}

/// Result of an OTP verify or resend call.
#[derive(Debug, Clone, Deserialize)]
pub struct OtpOutcome {
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub message: String,
}

/// Contract with the external authentication service.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Submit an attempt's vector for an anomaly verdict.
    async fn predict(&self, attempt: &AuthAttempt) -> Result<AnomalyVerdict, ApiError>;

    /// Forward accepted vectors for incremental model training.
    async fn train(&self, identifier: &str, vectors: &[FeatureVector]) -> Result<bool, ApiError>;

    /// Check a one-time code entered by the user.
    async fn verify_otp(&self, identifier: &str, code: &str) -> Result<OtpOutcome, ApiError>;

    /// Ask the service to dispatch a fresh one-time code.
    async fn resend_otp(&self, identifier: &str) -> Result<OtpOutcome, ApiError>;
}

/// Direct HTTP implementation, used inside the hub context.
pub struct HttpApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpApiClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        let value: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::Service {
                status: status.as_u16(),
                message: value["error"].as_str().unwrap_or("request failed").to_string(),
            });
        }

        Ok(value)
    }
}

#[async_trait]
impl AuthApi for HttpApiClient {
    async fn predict(&self, attempt: &AuthAttempt) -> Result<AnomalyVerdict, ApiError> {
        let request = PredictRequest {
            identifier: &attempt.identifier,
            keystroke_vector: &attempt.vector,
        };
        let value = self.post_json(PREDICT_ENDPOINT, &request).await?;
        decode_verdict(value)
    }

    async fn train(&self, identifier: &str, vectors: &[FeatureVector]) -> Result<bool, ApiError> {
        let request = TrainRequest { identifier, vectors };
        let value = self.post_json(TRAIN_ENDPOINT, &request).await?;
        decode_training(value)
    }

    async fn verify_otp(&self, identifier: &str, code: &str) -> Result<OtpOutcome, ApiError> {
        let request = OtpRequest {
            identifier,
            otp_code: Some(code),
            verification_type: VerificationType::LoginAnomaly,
        };
        let value = self.post_json(VERIFY_ENDPOINT, &request).await?;
        decode_otp(value)
    }

    async fn resend_otp(&self, identifier: &str) -> Result<OtpOutcome, ApiError> {
        let request = OtpRequest {
            identifier,
            otp_code: None,
            verification_type: VerificationType::ResendOtp,
        };
        let value = self.post_json(VERIFY_ENDPOINT, &request).await?;
        decode_otp(value)
    }
}

/// Bus-routed implementation for capture/UI contexts: every call becomes a
/// `fetchData` action executed by the hub.
pub struct RelayApiClient {
    hub: ContextHandle,
    base_url: String,
}

impl RelayApiClient {
    pub fn new(hub: ContextHandle, base_url: impl Into<String>) -> Self {
        RelayApiClient {
            hub,
            base_url: base_url.into(),
        }
    }

    async fn post_json<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let body = serde_json::to_value(body).map_err(|e| ApiError::Decode(e.to_string()))?;

        let outcome = self
            .hub
            .request(RelayAction::FetchData(FetchRequest::post_json(url, body)))
            .await?;

        let status = outcome["status"].as_u64().unwrap_or(0) as u16;
        let data = outcome["data"].clone();

        if !(200..300).contains(&status) {
            return Err(ApiError::Service {
                status,
                message: data["error"].as_str().unwrap_or("request failed").to_string(),
            });
        }

        Ok(data)
    }
}

#[async_trait]
impl AuthApi for RelayApiClient {
    async fn predict(&self, attempt: &AuthAttempt) -> Result<AnomalyVerdict, ApiError> {
        let request = PredictRequest {
            identifier: &attempt.identifier,
            keystroke_vector: &attempt.vector,
        };
        let value = self.post_json(PREDICT_ENDPOINT, &request).await?;
        decode_verdict(value)
    }

    async fn train(&self, identifier: &str, vectors: &[FeatureVector]) -> Result<bool, ApiError> {
        let request = TrainRequest { identifier, vectors };
        let value = self.post_json(TRAIN_ENDPOINT, &request).await?;
        decode_training(value)
    }

    async fn verify_otp(&self, identifier: &str, code: &str) -> Result<OtpOutcome, ApiError> {
        let request = OtpRequest {
            identifier,
            otp_code: Some(code),
            verification_type: VerificationType::LoginAnomaly,
        };
        let value = self.post_json(VERIFY_ENDPOINT, &request).await?;
        decode_otp(value)
    }

    async fn resend_otp(&self, identifier: &str) -> Result<OtpOutcome, ApiError> {
        let request = OtpRequest {
            identifier,
            otp_code: None,
            verification_type: VerificationType::ResendOtp,
        };
        let value = self.post_json(VERIFY_ENDPOINT, &request).await?;
        decode_otp(value)
    }
}

fn decode_verdict(value: Value) -> Result<AnomalyVerdict, ApiError> {
    let response: PredictResponse =
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))?;
    Ok(response.into_verdict())
}

fn decode_training(value: Value) -> Result<bool, ApiError> {
    let response: TrainResponse =
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))?;
    Ok(response.is_acceptable)
}

fn decode_otp(value: Value) -> Result<OtpOutcome, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_predict_request_wire_shape() {
        let attempt = AuthAttempt::new(
            "user@example.com",
            FeatureVector(vec![[100.0, 0.0], [80.0, 150.0]]),
            true,
        );
        let request = PredictRequest {
            identifier: &attempt.identifier,
            keystroke_vector: &attempt.vector,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["identifier"], "user@example.com");
        assert_eq!(json["keystroke_vector"][1][0], 80.0);
    }

    #[test]
    fn test_verdict_from_score_only_response() {
        let verdict = decode_verdict(json!({"anomaly_score": 0.42})).unwrap();
        assert_eq!(verdict.score, 0.42);
        assert!(!verdict.is_anomalous);
    }

    #[test]
    fn test_verdict_from_boolean_only_response() {
        let verdict = decode_verdict(json!({"is_anomalous": true})).unwrap();
        assert!(verdict.is_anomalous);
        assert_eq!(verdict.score, 1.0);
    }

    #[test]
    fn test_verdict_with_recommendation() {
        let verdict = decode_verdict(json!({
            "anomaly_score": 0.87,
            "is_anomalous": true,
            "confidence": 0.93,
            "recommendation": "additional_factor_required"
        }))
        .unwrap();

        assert_eq!(
            verdict.recommendation,
            Some(AuthRecommendation::AdditionalFactorRequired)
        );
        assert_eq!(verdict.confidence, Some(0.93));
    }

    #[test]
    fn test_otp_request_wire_shape() {
        let verify = OtpRequest {
            identifier: "user@example.com",
            otp_code: Some("123456"),
            verification_type: VerificationType::LoginAnomaly,
        };
        let json = serde_json::to_value(&verify).unwrap();
        assert_eq!(json["otp_code"], "123456");
        assert_eq!(json["verification_type"], "login_anomaly");

        let resend = OtpRequest {
            identifier: "user@example.com",
            otp_code: None,
            verification_type: VerificationType::ResendOtp,
        };
        let json = serde_json::to_value(&resend).unwrap();
        assert!(json.get("otp_code").is_none());
        assert_eq!(json["verification_type"], "resend_otp");
    }

    #[tokio::test]
    async fn test_relay_client_routes_through_hub_fetch() {
        let (hub_handle, mut hub_inbox) = crate::relay::channel();

        tokio::spawn(async move {
            let mut envelope = hub_inbox.next().await.unwrap();
            let url = match &envelope.action {
                RelayAction::FetchData(request) => request.url.clone(),
                other => panic!("unexpected action {:?}", other),
            };
            assert!(url.ends_with(PREDICT_ENDPOINT));
            envelope.respond(Ok(json!({
                "status": 200,
                "data": {"anomaly_score": 0.15, "is_anomalous": false}
            })));
        });

        let client = RelayApiClient::new(hub_handle, "http://localhost:8080");
        let attempt = AuthAttempt::new("user@example.com", FeatureVector(vec![[90.0, 0.0]]), false);
        let verdict = client.predict(&attempt).await.unwrap();
        assert_eq!(verdict.score, 0.15);
    }

    #[tokio::test]
    async fn test_relay_client_maps_service_errors() {
        let (hub_handle, mut hub_inbox) = crate::relay::channel();

        tokio::spawn(async move {
            let mut envelope = hub_inbox.next().await.unwrap();
            envelope.respond(Ok(json!({
                "status": 503,
                "data": {"error": "model unavailable"}
            })));
        });

        let client = RelayApiClient::new(hub_handle, "http://localhost:8080");
        let attempt = AuthAttempt::new("user@example.com", FeatureVector(vec![[90.0, 0.0]]), false);
        let error = client.predict(&attempt).await.unwrap_err();
        match error {
            ApiError::Service { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "model unavailable");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
