//! Handler for the CVF widget CAPTCHA presentation.
//!
//! The challenge image sits inside a dedicated page-content container and the
//! form posts its payload as a body. Relative form actions on these pages
//! resolve against the `/ap/cvf/` sub-path rather than the page URL.

use once_cell::sync::Lazy;
use scraper::Selector;
use url::Url;

use crate::challenges::core::{ChallengeSubmission, FormDescriptor, ResponseSnapshot};

use super::{ChallengeHandler, ErrorCheck, ErrorPolicy, HandlerError, build_selector};

const CAPTCHA_FORM_MARKER: &str = "form[class*='cvf-widget-form-captcha']";
const SOLUTION_FIELD: &str = "cvf_captcha_input";
const CVF_PATH_PREFIX: &str = "/ap/cvf/";

static CAPTCHA_FORM: Lazy<Selector> = Lazy::new(|| build_selector(CAPTCHA_FORM_MARKER));
static CAPTCHA_IMAGE: Lazy<Selector> =
    Lazy::new(|| build_selector("div[id='cvf-page-content'] img[alt='captcha']"));
static CVF_ALERT: Lazy<Selector> = Lazy::new(|| build_selector("div[class*='cvf-widget-alert']"));

/// Solves the widget CAPTCHA form.
pub struct CaptchaV1Handler {
    cvf_prefix: Url,
}

impl CaptchaV1Handler {
    pub fn new(base_url: &Url) -> Result<Self, HandlerError> {
        let cvf_prefix = base_url
            .join(CVF_PATH_PREFIX)
            .map_err(|err| HandlerError::InvalidCvfBase(base_url.to_string(), err))?;
        Ok(Self { cvf_prefix })
    }

    /// Locate the challenge image inside the page-content container.
    pub fn image_url(&self, snapshot: &ResponseSnapshot) -> Result<Url, HandlerError> {
        let src = snapshot
            .element_attr(&CAPTCHA_IMAGE, "src")
            .ok_or(HandlerError::MissingCaptchaImage)?;
        snapshot
            .url()
            .join(&src)
            .map_err(|err| HandlerError::InvalidImageUrl(src, err))
    }

    /// Overlay the CAPTCHA solution onto the widget form.
    pub fn build_submission(
        &self,
        snapshot: &ResponseSnapshot,
        solution: &str,
    ) -> Result<ChallengeSubmission, HandlerError> {
        let form = FormDescriptor::first_matching(snapshot, &CAPTCHA_FORM, CAPTCHA_FORM_MARKER)?;
        let payload = form.payload(vec![(SOLUTION_FIELD.to_string(), solution.to_string())]);
        let url = form.resolve_action(snapshot.url(), Some(&self.cvf_prefix))?;

        Ok(ChallengeSubmission::new(form.method, url, payload))
    }
}

impl ChallengeHandler for CaptchaV1Handler {
    fn name(&self) -> &'static str {
        "captcha_v1"
    }

    fn error_check(&self) -> ErrorCheck {
        ErrorCheck {
            selector: &CVF_ALERT,
            policy: ErrorPolicy::Recoverable,
        }
    }
}
