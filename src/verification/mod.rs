// Keystroke Guard: Verification Layer
// The state machine gating credential submission, its OTP step-up cycle,
// and the safeguards around both

pub mod context;
pub mod effects;
pub mod grace;
pub mod otp;
pub mod registration;
pub mod session;

pub use context::SessionContext;
pub use effects::{NullUi, RecordingUi, UiEffects, UiEvent};
pub use grace::GraceRegistry;
pub use otp::{format_countdown, OtpChallenge, OtpDenied, OtpFailure, OtpPolicy};
pub use registration::{PageContext, REGISTRATION_KEYWORDS};
pub use session::{
    OtpProgress, SubmitOutcome, SuppressReason, VerdictOutcome, VerificationConfig,
    VerificationError, VerificationSession, VerificationState,
};
