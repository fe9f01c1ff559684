//! Handler for the MFA one-time passcode form.

use once_cell::sync::Lazy;
use scraper::Selector;

use crate::challenges::core::{ChallengeSubmission, FormDescriptor, ResponseSnapshot};
use crate::external_deps::operator::OperatorIo;

use super::{ChallengeHandler, ErrorCheck, ErrorPolicy, HandlerError, build_selector};

const MFA_FORM_MARKER: &str = "form[id='auth-mfa-form']";

static MFA_FORM: Lazy<Selector> = Lazy::new(|| build_selector(MFA_FORM_MARKER));

/// Collects the passcode sent to the operator's device and submits it. The
/// "remember device" flag is cleared so every login stays challenged.
pub struct MfaCodeHandler;

impl MfaCodeHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn build_submission(
        &self,
        snapshot: &ResponseSnapshot,
        io: &dyn OperatorIo,
    ) -> Result<ChallengeSubmission, HandlerError> {
        let otp = io
            .prompt("--> Enter the one-time passcode sent to your device")
            .await?;
        io.echo("");

        let form = FormDescriptor::first_matching(snapshot, &MFA_FORM, MFA_FORM_MARKER)?;
        let payload = form.payload(vec![
            ("otpCode".to_string(), otp),
            ("rememberDevice".to_string(), String::new()),
        ]);
        let url = form.resolve_action(snapshot.url(), None)?;

        Ok(ChallengeSubmission::new(form.method, url, payload))
    }
}

impl Default for MfaCodeHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeHandler for MfaCodeHandler {
    fn name(&self) -> &'static str {
        "mfa_code"
    }

    fn error_check(&self) -> ErrorCheck {
        ErrorCheck::auth_error_box(ErrorPolicy::Recoverable)
    }
}
