//! Handler for the credential sign-in form.
//!
//! Overlays the account email, password, and a "remember me" flag onto the
//! form's hidden state. A post-submission error here means bad credentials,
//! which no retry can fix, so this is the only handler with a critical error
//! policy.

use once_cell::sync::Lazy;
use scraper::Selector;

use crate::challenges::core::{ChallengeSubmission, FormDescriptor, ResponseSnapshot};

use super::{ChallengeHandler, ErrorCheck, ErrorPolicy, HandlerError, build_selector};

const SIGN_IN_FORM_MARKER: &str = "form[name='signIn']";

static SIGN_IN_FORM: Lazy<Selector> = Lazy::new(|| build_selector(SIGN_IN_FORM_MARKER));

/// Fills in and submits the credential form.
pub struct SignInHandler {
    username: String,
    password: String,
}

impl SignInHandler {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Build the credential submission from the current page.
    pub fn build_submission(
        &self,
        snapshot: &ResponseSnapshot,
    ) -> Result<ChallengeSubmission, HandlerError> {
        let form = FormDescriptor::first_matching(snapshot, &SIGN_IN_FORM, SIGN_IN_FORM_MARKER)?;
        let payload = form.payload(vec![
            ("email".to_string(), self.username.clone()),
            ("password".to_string(), self.password.clone()),
            ("rememberMe".to_string(), "true".to_string()),
        ]);
        let url = form.resolve_action(snapshot.url(), None)?;

        Ok(ChallengeSubmission::new(form.method, url, payload))
    }
}

impl ChallengeHandler for SignInHandler {
    fn name(&self) -> &'static str {
        "sign_in"
    }

    fn error_check(&self) -> ErrorCheck {
        ErrorCheck::auth_error_box(ErrorPolicy::Critical)
    }
}
