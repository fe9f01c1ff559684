//! Handler for the inline character CAPTCHA presentation.
//!
//! This variant has no stable form identifier: the form is recognised by the
//! prefixed id of its answer input, and the challenge image sits directly
//! inside the form. The payload travels as query parameters even when the
//! form nominally posts; the asymmetry with the widget variant is preserved
//! as an observed external contract.

use once_cell::sync::Lazy;
use scraper::Selector;
use url::Url;

use crate::challenges::core::{
    ChallengeSubmission, FormDescriptor, PayloadEncoding, ResponseSnapshot,
};

use super::{ChallengeHandler, ErrorCheck, ErrorPolicy, HandlerError, build_selector};

const CAPTCHA_INPUT_MARKER: &str = "input[id^='captchacharacters']";
const SOLUTION_FIELD: &str = "field-keywords";

static CAPTCHA_INPUT: Lazy<Selector> = Lazy::new(|| build_selector(CAPTCHA_INPUT_MARKER));
static FORM: Lazy<Selector> = Lazy::new(|| build_selector("form"));
static IMAGE: Lazy<Selector> = Lazy::new(|| build_selector("img"));
static ALERT_INFO: Lazy<Selector> = Lazy::new(|| build_selector("div[class*='a-alert-info']"));

/// Solves the inline character CAPTCHA form.
pub struct CaptchaV2Handler {
    base_url: Url,
}

impl CaptchaV2Handler {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    /// Locate the challenge image directly inside the recognised form.
    pub fn image_url(&self, snapshot: &ResponseSnapshot) -> Result<Url, HandlerError> {
        let document = snapshot.document();
        let src = document
            .select(&FORM)
            .find(|form| form.select(&CAPTCHA_INPUT).next().is_some())
            .and_then(|form| form.select(&IMAGE).next())
            .and_then(|img| img.attr("src"))
            .map(str::to_string)
            .ok_or(HandlerError::MissingCaptchaImage)?;

        snapshot
            .url()
            .join(&src)
            .map_err(|err| HandlerError::InvalidImageUrl(src, err))
    }

    /// Overlay the CAPTCHA solution and plan a query-parameter submission.
    pub fn build_submission(
        &self,
        snapshot: &ResponseSnapshot,
        solution: &str,
    ) -> Result<ChallengeSubmission, HandlerError> {
        let form = FormDescriptor::containing(snapshot, &CAPTCHA_INPUT, CAPTCHA_INPUT_MARKER)?;
        let payload = form.payload(vec![(SOLUTION_FIELD.to_string(), solution.to_string())]);
        let url = form.resolve_action(snapshot.url(), Some(&self.base_url))?;

        Ok(ChallengeSubmission::new(form.method, url, payload)
            .with_encoding(PayloadEncoding::Query))
    }
}

impl ChallengeHandler for CaptchaV2Handler {
    fn name(&self) -> &'static str {
        "captcha_v2"
    }

    fn error_check(&self) -> ErrorCheck {
        ErrorCheck {
            selector: &ALERT_INFO,
            policy: ErrorPolicy::Recoverable,
        }
    }
}
