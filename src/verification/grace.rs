//! Post-verification grace windows.
//!
//! A successful step-up buys a bounded window during which later attempts
//! for the same identifier skip collection and the anomaly check entirely.
//! That trusted fast-path is a deliberate security/usability trade-off, and
//! it binds to the identifier only, not to the originating session or
//! device.
//!
//! Expiry is implicit: lookups compare absolute timestamps and never mutate
//! the record, so there is nothing to tear down.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::models::Identifier;

#[derive(Clone)]
pub struct GraceRegistry {
    windows: Arc<RwLock<HashMap<Identifier, DateTime<Utc>>>>,
    duration: Duration,
}

impl GraceRegistry {
    pub fn new(duration_secs: i64) -> Self {
        GraceRegistry {
            windows: Arc::new(RwLock::new(HashMap::new())),
            duration: Duration::seconds(duration_secs),
        }
    }

    /// Record a successful step-up verification for this identifier.
    pub fn mark_verified(&self, identifier: &str, now: DateTime<Utc>) {
        self.windows.write().insert(identifier.to_string(), now);
    }

    /// Whether the identifier is inside an open grace window. Read-only.
    pub fn in_grace(&self, identifier: &str, now: DateTime<Utc>) -> bool {
        self.windows
            .read()
            .get(identifier)
            .map(|verified_at| now < *verified_at + self.duration)
            .unwrap_or(false)
    }

    /// Seconds left in the identifier's window, for display purposes only.
    pub fn remaining_secs(&self, identifier: &str, now: DateTime<Utc>) -> Option<i64> {
        self.windows.read().get(identifier).and_then(|verified_at| {
            let remaining = (*verified_at + self.duration - now).num_seconds();
            (remaining > 0).then_some(remaining)
        })
    }
}
