//! Challenge handler registry.
//!
//! Each submodule handles one challenge page: it extracts the page's form,
//! overlays handler-specific field values, and returns a planned
//! [`ChallengeSubmission`](crate::challenges::core::ChallengeSubmission) for
//! the session to execute. After submission the session inspects the result
//! for the handler's declared error container under the handler's policy.

pub mod captcha_otp;
pub mod captcha_v1;
pub mod captcha_v2;
pub mod mfa_code;
pub mod mfa_device;
pub mod sign_in;

use once_cell::sync::Lazy;
use scraper::Selector;
use thiserror::Error;

use crate::challenges::core::FormError;

/// Common handler interface.
pub trait ChallengeHandler {
    fn name(&self) -> &'static str;

    /// How a post-submission error container is treated.
    fn error_check(&self) -> ErrorCheck;
}

/// Whether a post-submission error aborts the whole flow or only costs an
/// attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// The error cannot be retried productively (bad credentials); the flow
    /// terminates.
    Critical,
    /// The error is reported to the operator and the loop continues.
    Recoverable,
}

/// Declares where a handler's error messages appear and how to react.
#[derive(Clone, Copy)]
pub struct ErrorCheck {
    pub selector: &'static Selector,
    pub policy: ErrorPolicy,
}

impl ErrorCheck {
    /// The standard auth error container shared by the credential and MFA
    /// forms.
    pub fn auth_error_box(policy: ErrorPolicy) -> Self {
        Self {
            selector: &AUTH_ERROR_BOX,
            policy,
        }
    }
}

static AUTH_ERROR_BOX: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div[id='auth-error-message-box']")
        .expect("invalid auth error box selector")
});

/// Failures while preparing a challenge submission.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Form(#[from] FormError),
    #[error("base url '{0}' does not accept the cvf sub-path: {1}")]
    InvalidCvfBase(String, url::ParseError),
    #[error("captcha image not found on the challenge page")]
    MissingCaptchaImage,
    #[error("captcha image source '{0}' does not resolve to a URL: {1}")]
    InvalidImageUrl(String, url::ParseError),
    #[error("the device selection form offers no one-time passcode destinations")]
    NoOtpDevices,
    #[error("'{0}' is not a valid device selection (expected 1-{1})")]
    InvalidDeviceSelection(String, usize),
    #[error("operator input failed: {0}")]
    OperatorIo(#[from] std::io::Error),
}

pub(crate) fn build_selector(selector: &str) -> Selector {
    Selector::parse(selector)
        .unwrap_or_else(|err| panic!("invalid handler selector `{selector}`: {err:?}"))
}
