// Keystroke Guard: Core Data Model
// Shared types for the capture, analysis, and verification layers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Define core types
pub type Identifier = String;
pub type TimestampMs = f64;

/// Kind of a raw keyboard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEventKind {
    KeyDown,
    KeyUp,
}

/// Which input field produced an event. The capture layer only needs enough
/// context to recognize credential fields; everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldContext {
    Password,
    Email,
    Other,
}

impl FieldContext {
    fn other() -> Self {
        FieldContext::Other
    }

    pub fn is_credential(&self) -> bool {
        matches!(self, FieldContext::Password | FieldContext::Email)
    }
}

/// A single raw keyboard event as recorded by the capture agent.
///
/// The timestamp is capture-local and monotonic, taken at the moment of
/// interception rather than dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInputEvent {
    #[serde(rename = "type")]
    pub kind: KeyEventKind,
    pub key: String,
    pub code: String,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: TimestampMs,
    #[serde(default = "FieldContext::other")]
    pub field: FieldContext,
}

impl RawInputEvent {
    pub fn new(
        kind: KeyEventKind,
        key: impl Into<String>,
        code: impl Into<String>,
        timestamp_ms: TimestampMs,
        field: FieldContext,
    ) -> Self {
        RawInputEvent {
            kind,
            key: key.into(),
            code: code.into(),
            timestamp_ms,
            field,
        }
    }
}

/// Ordered dwell/flight feature vector, one `[dwell_ms, flight_ms]` entry
/// per matched key pair, chronological by key-down time.
///
/// Serializes as `number[][]`, the shape the prediction contract expects.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(pub Vec<[f64; 2]>);

impl FeatureVector {
    pub fn new() -> Self {
        FeatureVector(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pairs(&self) -> &[[f64; 2]] {
        &self.0
    }

    /// Dwell time of the i-th pair in milliseconds.
    pub fn dwell(&self, index: usize) -> Option<f64> {
        self.0.get(index).map(|p| p[0])
    }

    /// Flight time of the i-th pair in milliseconds (0 for the first pair).
    pub fn flight(&self, index: usize) -> Option<f64> {
        self.0.get(index).map(|p| p[1])
    }

    pub fn dwells(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().map(|p| p[0])
    }

    /// Flights between consecutive pairs. The leading zero of the first pair
    /// is not a real inter-key gap and is skipped here.
    pub fn flights(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().skip(1).map(|p| p[1])
    }
}

impl From<Vec<[f64; 2]>> for FeatureVector {
    fn from(pairs: Vec<[f64; 2]>) -> Self {
        FeatureVector(pairs)
    }
}

/// Recommendation attached to a verdict by the prediction service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthRecommendation {
    Allow,
    AdditionalFactorRequired,
    Block,
}

/// Verdict returned by the external anomaly model. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub score: f64,
    pub is_anomalous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<AuthRecommendation>,
}

/// One submission of behavioral data for a login decision.
///
/// Created when a submission trigger fires; dropped once a verdict is
/// applied or the attempt is aborted by a safeguard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthAttempt {
    pub id: String,
    pub identifier: Identifier,
    pub vector: FeatureVector,
    pub urgent: bool,
    pub created_at: DateTime<Utc>,
}

impl AuthAttempt {
    pub fn new(identifier: impl Into<Identifier>, vector: FeatureVector, urgent: bool) -> Self {
        AuthAttempt {
            id: crate::utils::generate_id("attempt"),
            identifier: identifier.into(),
            vector,
            urgent,
            created_at: Utc::now(),
        }
    }
}

/// Coarse user status held by the hub and mirrored by UI contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatusKind {
    Unknown,
    Normal,
    Suspicious,
    AnomalyDetected,
}

/// Status record served by `getUserStatus` and pushed on `updateUserStatus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: UserStatusKind,
    pub anomaly_score: f64,
    pub is_enabled: bool,
}

impl Default for StatusReport {
    fn default() -> Self {
        StatusReport {
            status: UserStatusKind::Unknown,
            anomaly_score: 0.0,
            is_enabled: true,
        }
    }
}

/// Payload of the cross-boundary event a hosting page receives when the
/// capture context transfers its pattern buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternTransfer {
    pub pattern: Vec<RawInputEvent>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<Identifier>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_vector_serializes_as_nested_arrays() {
        let vector = FeatureVector(vec![[100.0, 0.0], [80.0, 150.0]]);
        let json = serde_json::to_string(&vector).unwrap();
        assert_eq!(json, "[[100.0,0.0],[80.0,150.0]]");

        let parsed: FeatureVector = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, vector);
    }

    #[test]
    fn test_raw_event_round_trip() {
        let json = r#"{
            "type": "keydown",
            "key": "a",
            "code": "KeyA",
            "timestamp": 1024.5,
            "field": "password"
        }"#;

        let event: RawInputEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.kind, KeyEventKind::KeyDown);
        assert_eq!(event.field, FieldContext::Password);
        assert!(event.field.is_credential());
    }

    #[test]
    fn test_flights_skip_leading_zero() {
        let vector = FeatureVector(vec![[100.0, 0.0], [80.0, 150.0], [90.0, 120.0]]);
        let flights: Vec<f64> = vector.flights().collect();
        assert_eq!(flights, vec![150.0, 120.0]);
    }
}
