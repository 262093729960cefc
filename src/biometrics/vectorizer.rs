//! Dwell/flight vectorization of raw keystroke events.
//!
//! This is the deterministic front half of the behavioral pipeline: a list
//! of raw key events in, a `FeatureVector` out, no side effects and no
//! failure modes. Anything that cannot be paired is dropped silently.

use crate::models::{FeatureVector, KeyEventKind, RawInputEvent, TimestampMs};

/// A key-down matched with its release.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPair {
    pub key: String,
    pub press_time_ms: f64,
    pub start_timestamp_ms: TimestampMs,
}

/// Match each key-down to the earliest still-unclaimed later key-up of the
/// same key. A key-up is consumed by at most one pair; key-downs without a
/// match are dropped, never an error.
///
/// Under key auto-repeat (several key-downs before any key-up) the greedy
/// rule can pair a repeat's key-down with the wrong release at extreme
/// typing speed. That is an accepted approximation of this matcher, not a
/// defect to compensate for.
pub fn match_key_pairs(events: &[RawInputEvent]) -> Vec<KeyPair> {
    let mut key_downs: Vec<&RawInputEvent> = events
        .iter()
        .filter(|e| e.kind == KeyEventKind::KeyDown)
        .collect();
    let mut key_ups: Vec<&RawInputEvent> = events
        .iter()
        .filter(|e| e.kind == KeyEventKind::KeyUp)
        .collect();

    key_downs.sort_by(|a, b| a.timestamp_ms.total_cmp(&b.timestamp_ms));
    key_ups.sort_by(|a, b| a.timestamp_ms.total_cmp(&b.timestamp_ms));

    let mut claimed = vec![false; key_ups.len()];
    let mut pairs = Vec::with_capacity(key_downs.len());

    for down in key_downs {
        let matched = key_ups.iter().enumerate().find(|(i, up)| {
            !claimed[*i] && up.key == down.key && up.timestamp_ms > down.timestamp_ms
        });

        if let Some((i, up)) = matched {
            claimed[i] = true;
            pairs.push(KeyPair {
                key: down.key.clone(),
                press_time_ms: up.timestamp_ms - down.timestamp_ms,
                start_timestamp_ms: down.timestamp_ms,
            });
        }
    }

    // Key-downs were walked in chronological order, so pairs already are.
    pairs
}

/// Convert raw keystroke events into an ordered dwell/flight vector.
///
/// `vector[i] = [dwell, flight]` where dwell is the hold duration of the
/// i-th matched pair and flight is the gap to the previous pair's key-down
/// (0 for the first pair). Values are rounded to one decimal millisecond.
/// Empty or pairless input yields an empty vector.
pub fn vectorize(events: &[RawInputEvent]) -> FeatureVector {
    let pairs = match_key_pairs(events);

    let mut vector = Vec::with_capacity(pairs.len());
    for (i, pair) in pairs.iter().enumerate() {
        let flight = if i == 0 {
            0.0
        } else {
            pair.start_timestamp_ms - pairs[i - 1].start_timestamp_ms
        };
        vector.push([round_ms(pair.press_time_ms), round_ms(flight)]);
    }

    FeatureVector(vector)
}

fn round_ms(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
