//! Captcha provider integrations.
//!
//! These adapters give the login flow a unified interface for automated
//! image-captcha solvers. The session stays agnostic of vendor details: it
//! hands the provider an image URL, makes exactly one automated attempt, and
//! falls back to manual operator transcription when the provider comes back
//! empty-handed.

mod twocaptcha;

pub use twocaptcha::TwoCaptchaProvider;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Literal answer some solvers return when they give up on an image.
const NOT_SOLVED_MARKER: &str = "not solved";

/// High-level configuration that controls captcha solving behaviour.
#[derive(Debug, Clone)]
pub struct CaptchaConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Transcription produced by an automated solver.
#[derive(Debug, Clone)]
pub struct CaptchaSolution {
    pub text: String,
}

impl CaptchaSolution {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Whether this solution is unusable and manual resolution is required:
    /// an empty transcription or the literal "not solved" marker, compared
    /// case-insensitively.
    pub fn needs_manual_resolution(&self) -> bool {
        let text = self.text.trim();
        text.is_empty() || text.eq_ignore_ascii_case(NOT_SOLVED_MARKER)
    }
}

/// Common result type returned by captcha providers.
pub type CaptchaResult = Result<CaptchaSolution, CaptchaError>;

/// Shared interface implemented by captcha vendors.
#[async_trait]
pub trait CaptchaProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Attempt one automated solve of the challenge image.
    async fn solve(&self, image_url: &Url) -> CaptchaResult;
}

/// Errors surfaced by captcha providers.
#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("captcha provider misconfigured: {0}")]
    Configuration(String),
    #[error("captcha provider request failed: {0}")]
    Provider(String),
    #[error("captcha solving timed out after {0:?}")]
    Timeout(Duration),
    #[error("captcha error: {0}")]
    Other(String),
}
