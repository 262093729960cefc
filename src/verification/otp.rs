//! One-time-code challenge state.
//!
//! Pure bookkeeping: attempt counting, the lockout window, and the resend
//! cooldown. The session layer owns the actual verify/resend calls. All
//! three timers are independent absolute timestamps. Displayed countdowns
//! tick at one-second resolution for the UI, but every gate here compares
//! timestamps, never tick counts.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Challenge policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpPolicy {
    pub max_attempts: u32,
    pub block_duration_secs: i64,
    pub resend_cooldown_secs: i64,
    pub code_length: usize,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        OtpPolicy {
            max_attempts: 5,
            block_duration_secs: 30 * 60,
            resend_cooldown_secs: 60,
            code_length: 6,
        }
    }
}

/// Why a challenge interaction was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtpDenied {
    #[error("challenge blocked for {remaining_secs}s")]
    Blocked { remaining_secs: i64 },
    #[error("resend available in {remaining_secs}s")]
    ResendCooldown { remaining_secs: i64 },
}

/// Result of registering a failed code entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpFailure {
    /// Wrong code, challenge still open.
    RemainingAttempts(u32),
    /// Attempt limit reached; blocked until the given instant.
    Blocked { until: DateTime<Utc> },
}

/// An active step-up challenge.
#[derive(Debug, Clone)]
pub struct OtpChallenge {
    policy: OtpPolicy,
    attempts: u32,
    blocked_until: Option<DateTime<Utc>>,
    resend_available_at: DateTime<Utc>,
}

impl OtpChallenge {
    /// A fresh challenge. The first code was just dispatched, so resend is
    /// immediately on cooldown.
    pub fn new(policy: OtpPolicy, now: DateTime<Utc>) -> Self {
        let resend_available_at = now + Duration::seconds(policy.resend_cooldown_secs);
        OtpChallenge {
            policy,
            attempts: 0,
            blocked_until: None,
            resend_available_at,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    /// Whether a code entry may proceed right now. A lapsed block resets
    /// the attempt counter and reopens the challenge.
    pub fn can_attempt(&mut self, now: DateTime<Utc>) -> Result<(), OtpDenied> {
        if let Some(until) = self.blocked_until {
            if now < until {
                return Err(OtpDenied::Blocked {
                    remaining_secs: countdown_secs(until, now),
                });
            }
            self.blocked_until = None;
            self.attempts = 0;
        }
        Ok(())
    }

    /// Record a wrong code. At the attempt limit the challenge blocks for
    /// the configured duration.
    pub fn register_failure(&mut self, now: DateTime<Utc>) -> OtpFailure {
        self.attempts += 1;
        if self.attempts >= self.policy.max_attempts {
            let until = now + Duration::seconds(self.policy.block_duration_secs);
            self.blocked_until = Some(until);
            OtpFailure::Blocked { until }
        } else {
            OtpFailure::RemainingAttempts(self.policy.max_attempts - self.attempts)
        }
    }

    pub fn register_success(&mut self) {
        self.attempts = 0;
        self.blocked_until = None;
    }

    /// Whether a resend may be dispatched right now.
    pub fn can_resend(&self, now: DateTime<Utc>) -> Result<(), OtpDenied> {
        if now < self.resend_available_at {
            return Err(OtpDenied::ResendCooldown {
                remaining_secs: countdown_secs(self.resend_available_at, now),
            });
        }
        Ok(())
    }

    pub fn mark_resent(&mut self, now: DateTime<Utc>) {
        self.resend_available_at = now + Duration::seconds(self.policy.resend_cooldown_secs);
    }

    /// Display countdown for the block, in whole seconds.
    pub fn block_remaining_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.blocked_until.and_then(|until| {
            let remaining = countdown_secs(until, now);
            (remaining > 0).then_some(remaining)
        })
    }

    /// Whether the entered text even has the shape of a code.
    pub fn code_format_ok(&self, code: &str) -> bool {
        code.len() == self.policy.code_length && code.chars().all(|c| c.is_ascii_digit())
    }
}

fn countdown_secs(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (until - now).num_seconds().max(0)
}

/// Format a second count as `M:SS` for countdown displays.
pub fn format_countdown(secs: i64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
