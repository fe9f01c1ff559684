//! Handler for the one-time passcode form raised by the CAPTCHA flow.
//!
//! Unlike the MFA form this variant resolves relative actions against the
//! site root and leaves the "remember device" field alone.

use once_cell::sync::Lazy;
use scraper::Selector;
use url::Url;

use crate::challenges::core::{ChallengeSubmission, FormDescriptor, ResponseSnapshot};
use crate::external_deps::operator::OperatorIo;

use super::{ChallengeHandler, ErrorCheck, ErrorPolicy, HandlerError, build_selector};

const OTP_FORM_MARKER: &str = "form[id='verification-code-form']";

static OTP_FORM: Lazy<Selector> = Lazy::new(|| build_selector(OTP_FORM_MARKER));

/// Collects and submits the verification code.
pub struct CaptchaOtpHandler {
    base_url: Url,
}

impl CaptchaOtpHandler {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
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

        let form = FormDescriptor::first_matching(snapshot, &OTP_FORM, OTP_FORM_MARKER)?;
        let payload = form.payload(vec![("otpCode".to_string(), otp)]);
        let url = form.resolve_action(snapshot.url(), Some(&self.base_url))?;

        Ok(ChallengeSubmission::new(form.method, url, payload))
    }
}

impl ChallengeHandler for CaptchaOtpHandler {
    fn name(&self) -> &'static str {
        "captcha_otp"
    }

    fn error_check(&self) -> ErrorCheck {
        ErrorCheck::auth_error_box(ErrorPolicy::Recoverable)
    }
}
