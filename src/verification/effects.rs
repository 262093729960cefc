//! UI capability seam for the verification state machine.
//!
//! The state machine never touches a concrete rendering technology; it
//! drives whatever implements this trait. Adapters decide what "disable the
//! login form" or "show a warning" means on their surface.

use parking_lot::Mutex;

/// Side effects the verification flow may apply to its page.
pub trait UiEffects: Send + Sync {
    /// Disable every credential input and submit control on the page.
    fn disable_credential_inputs(&self);

    /// Re-enable previously disabled credential inputs.
    fn enable_credential_inputs(&self);

    /// Show a dismissible warning banner carrying the anomaly score.
    fn show_warning(&self, score: f64);

    /// Remove the warning banner if present.
    fn clear_warning(&self);
}

/// Adapter for headless operation: effects are logged and dropped.
pub struct NullUi;

impl UiEffects for NullUi {
    fn disable_credential_inputs(&self) {
        log::debug!("ui: disable credential inputs");
    }

    fn enable_credential_inputs(&self) {
        log::debug!("ui: enable credential inputs");
    }

    fn show_warning(&self, score: f64) {
        log::debug!("ui: show warning (score {:.2})", score);
    }

    fn clear_warning(&self) {
        log::debug!("ui: clear warning");
    }
}

/// A recorded UI effect, in application order.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    InputsDisabled,
    InputsEnabled,
    WarningShown(f64),
    WarningCleared,
}

/// Recording adapter used by tests and diagnostics.
#[derive(Default)]
pub struct RecordingUi {
    events: Mutex<Vec<UiEvent>>,
}

impl RecordingUi {
    pub fn new() -> Self {
        RecordingUi::default()
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().clone()
    }

    pub fn last(&self) -> Option<UiEvent> {
        self.events.lock().last().cloned()
    }
}

impl UiEffects for RecordingUi {
    fn disable_credential_inputs(&self) {
        self.events.lock().push(UiEvent::InputsDisabled);
    }

    fn enable_credential_inputs(&self) {
        self.events.lock().push(UiEvent::InputsEnabled);
    }

    fn show_warning(&self, score: f64) {
        self.events.lock().push(UiEvent::WarningShown(score));
    }

    fn clear_warning(&self) {
        self.events.lock().push(UiEvent::WarningCleared);
    }
}
