//! Registration-page detection.
//!
//! Behavioral screening must never fire on a sign-up form: the user is
//! enrolling a typing profile there, not proving one. Detection is
//! deliberately broad: URL, title, a confirm-password field, or heading
//! text each suffice on their own.

use log::debug;

/// Keywords that mark a page as a registration flow.
pub const REGISTRATION_KEYWORDS: &[&str] = &[
    "register",
    "registration",
    "signup",
    "sign-up",
    "sign_up",
    "join",
    "create",
];

/// The page facts the detector needs, extracted by whatever hosts the
/// capture context.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub url: String,
    pub title: String,
    pub has_confirm_field: bool,
    pub headings: Vec<String>,
}

impl PageContext {
    pub fn login(url: impl Into<String>) -> Self {
        PageContext {
            url: url.into(),
            ..PageContext::default()
        }
    }

    /// Whether this page looks like a registration flow.
    pub fn is_registration_page(&self) -> bool {
        let url = self.url.to_lowercase();
        let title = self.title.to_lowercase();

        let keyword_hit = REGISTRATION_KEYWORDS
            .iter()
            .any(|k| url.contains(k) || title.contains(k));

        let heading_hit = self.headings.iter().any(|heading| {
            let heading = heading.to_lowercase();
            REGISTRATION_KEYWORDS.iter().any(|k| heading.contains(k))
        });

        let detected = keyword_hit || self.has_confirm_field || heading_hit;
        if detected {
            debug!("registration page detected: {}", self.url);
        }
        detected
    }
}
