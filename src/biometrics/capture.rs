//! Per-context keystroke capture with an explicit start/stop lifecycle.
//!
//! One agent instance owns its buffers exclusively; nothing else mutates
//! them. Two buffers are fed from the same event stream: a long-lived,
//! bounded general buffer and a short-lived pattern buffer driven by
//! explicit start/stop around a verification or enrollment flow. Appends
//! are synchronous so the handler can never hold up input dispatch.

use std::collections::VecDeque;
use std::time::Instant;

use log::debug;

use crate::models::{FieldContext, KeyEventKind, RawInputEvent, TimestampMs};

pub struct CaptureAgent {
    monitoring: bool,
    collecting_pattern: bool,
    general: VecDeque<RawInputEvent>,
    pattern: Vec<RawInputEvent>,
    general_cap: usize,
    origin: Instant,
}

impl CaptureAgent {
    pub fn new(general_cap: usize) -> Self {
        CaptureAgent {
            monitoring: false,
            collecting_pattern: false,
            general: VecDeque::new(),
            pattern: Vec::new(),
            general_cap,
            origin: Instant::now(),
        }
    }

    /// Milliseconds since this agent was created. Monotonic, capture-local.
    pub fn now_ms(&self) -> TimestampMs {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    /// Reset the general buffer and begin monitoring.
    pub fn start(&mut self) {
        self.general.clear();
        self.monitoring = true;
        debug!("capture agent started");
    }

    /// Stop monitoring and freeze the general buffer, returning its size.
    pub fn stop(&mut self) -> usize {
        self.monitoring = false;
        debug!("capture agent stopped with {} events", self.general.len());
        self.general.len()
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    pub fn toggle_monitoring(&mut self) -> bool {
        self.monitoring = !self.monitoring;
        self.monitoring
    }

    /// Intercept a key event, stamping it at the moment of interception.
    ///
    /// The stamp is taken here rather than passed in because listeners must
    /// observe events before page logic can stop their propagation on
    /// sensitive fields. Returns whether the event was recorded.
    pub fn intercept(
        &mut self,
        kind: KeyEventKind,
        key: impl Into<String>,
        code: impl Into<String>,
        field: FieldContext,
    ) -> bool {
        if !self.monitoring {
            return false;
        }

        let event = RawInputEvent::new(kind, key, code, self.now_ms(), field);
        self.record(event);
        true
    }

    /// Append a pre-stamped event. Used by the interception path and by
    /// replayed/merged samples that already carry capture-time stamps.
    pub fn record(&mut self, event: RawInputEvent) {
        if !self.monitoring {
            return;
        }

        if self.collecting_pattern {
            self.pattern.push(event.clone());
        }

        self.general.push_back(event);
        while self.general.len() > self.general_cap {
            self.general.pop_front();
        }
    }

    /// Reset the pattern buffer and begin exact-match collection.
    pub fn start_pattern_collection(&mut self) {
        self.pattern.clear();
        self.collecting_pattern = true;
        debug!("pattern collection started");
    }

    /// Freeze the pattern buffer, returning its size.
    pub fn stop_pattern_collection(&mut self) -> usize {
        self.collecting_pattern = false;
        debug!("pattern collection stopped with {} events", self.pattern.len());
        self.pattern.len()
    }

    pub fn is_collecting_pattern(&self) -> bool {
        self.collecting_pattern
    }

    /// Merge externally captured, pre-stamped events into the pattern
    /// buffer (the cross-boundary transfer path).
    pub fn merge_external(&mut self, events: Vec<RawInputEvent>) {
        if !self.monitoring {
            debug!("external pattern dropped: monitoring disabled");
            return;
        }
        self.pattern.extend(events);
    }

    pub fn general_len(&self) -> usize {
        self.general.len()
    }

    pub fn pattern_len(&self) -> usize {
        self.pattern.len()
    }

    pub fn pattern_events(&self) -> &[RawInputEvent] {
        &self.pattern
    }

    /// Copy of the general buffer without disturbing it. Used when a guard
    /// may still reject the submission and collection must continue.
    pub fn snapshot_general(&self) -> Vec<RawInputEvent> {
        self.general.iter().cloned().collect()
    }

    /// Hand the general buffer off for vectorization, clearing it.
    pub fn take_general(&mut self) -> Vec<RawInputEvent> {
        self.general.drain(..).collect()
    }

    /// Hand the pattern buffer off, clearing it.
    pub fn take_pattern(&mut self) -> Vec<RawInputEvent> {
        std::mem::take(&mut self.pattern)
    }

    /// Drop everything recorded so far without touching lifecycle flags.
    pub fn clear(&mut self) {
        self.general.clear();
        self.pattern.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(agent: &mut CaptureAgent, key: &str) {
        agent.intercept(KeyEventKind::KeyDown, key, key, FieldContext::Password);
        agent.intercept(KeyEventKind::KeyUp, key, key, FieldContext::Password);
    }

    #[test]
    fn test_events_dropped_while_monitoring_disabled() {
        let mut agent = CaptureAgent::new(50);
        assert!(!agent.intercept(
            KeyEventKind::KeyDown,
            "a",
            "KeyA",
            FieldContext::Password
        ));
        assert_eq!(agent.general_len(), 0);

        agent.start();
        press(&mut agent, "a");
        assert_eq!(agent.general_len(), 2);
    }

    #[test]
    fn test_start_resets_general_buffer() {
        let mut agent = CaptureAgent::new(50);
        agent.start();
        press(&mut agent, "a");
        assert_eq!(agent.stop(), 2);

        agent.start();
        assert_eq!(agent.general_len(), 0);
    }

    #[test]
    fn test_pattern_buffer_independent_of_general() {
        let mut agent = CaptureAgent::new(50);
        agent.start();
        press(&mut agent, "a");

        // Pattern collection starts empty even with general history.
        agent.start_pattern_collection();
        assert_eq!(agent.pattern_len(), 0);

        press(&mut agent, "b");
        assert_eq!(agent.pattern_len(), 2);
        assert_eq!(agent.general_len(), 4);

        // Stopping pattern collection leaves the general stream running.
        assert_eq!(agent.stop_pattern_collection(), 2);
        press(&mut agent, "c");
        assert_eq!(agent.pattern_len(), 2);
        assert_eq!(agent.general_len(), 6);
    }

    #[test]
    fn test_general_buffer_trims_oldest_at_cap() {
        let mut agent = CaptureAgent::new(4);
        agent.start();
        for key in ["a", "b", "c"] {
            press(&mut agent, key);
        }

        assert_eq!(agent.general_len(), 4);
        let events = agent.take_general();
        // "a" events were trimmed first.
        assert!(events.iter().all(|e| e.key != "a"));
    }

    #[test]
    fn test_take_pattern_clears_buffer() {
        let mut agent = CaptureAgent::new(50);
        agent.start();
        agent.start_pattern_collection();
        press(&mut agent, "a");

        let pattern = agent.take_pattern();
        assert_eq!(pattern.len(), 2);
        assert_eq!(agent.pattern_len(), 0);
    }

    #[test]
    fn test_merge_external_extends_pattern() {
        let mut agent = CaptureAgent::new(50);
        agent.start();
        agent.start_pattern_collection();

        let external = vec![
            RawInputEvent::new(KeyEventKind::KeyDown, "x", "KeyX", 10.0, FieldContext::Other),
            RawInputEvent::new(KeyEventKind::KeyUp, "x", "KeyX", 90.0, FieldContext::Other),
        ];
        agent.merge_external(external);
        assert_eq!(agent.pattern_len(), 2);
    }

    #[test]
    fn test_intercept_stamps_monotonically() {
        let mut agent = CaptureAgent::new(50);
        agent.start();
        press(&mut agent, "a");
        press(&mut agent, "b");

        let events = agent.take_general();
        for pair in events.windows(2) {
            assert!(pair[1].timestamp_ms >= pair[0].timestamp_ms);
        }
    }
}
