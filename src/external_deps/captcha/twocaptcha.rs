//! TwoCaptcha image-to-text adapter.
//!
//! Uploads the challenge image as base64 to `in.php` and polls `res.php`
//! until the transcription is ready or the configured timeout elapses. The
//! provider fetches the image with its own client; challenge images are
//! served without session cookies.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tokio::time::{Instant, sleep};
use url::Url;

use super::{CaptchaConfig, CaptchaError, CaptchaProvider, CaptchaResult, CaptchaSolution};

const SUBMIT_URL: &str = "https://2captcha.com/in.php";
const RESULT_URL: &str = "https://2captcha.com/res.php";
const NOT_READY: &str = "CAPCHA_NOT_READY";

/// Adapter for the TwoCaptcha service.
#[derive(Debug, Clone)]
pub struct TwoCaptchaProvider {
    api_key: String,
    config: CaptchaConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: u8,
    request: String,
}

impl TwoCaptchaProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_config(api_key, CaptchaConfig::default())
    }

    pub fn with_config(api_key: impl Into<String>, config: CaptchaConfig) -> Self {
        Self {
            api_key: api_key.into(),
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_image(&self, image_url: &Url) -> Result<Vec<u8>, CaptchaError> {
        let response = self
            .client
            .get(image_url.as_str())
            .send()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn submit(&self, image: &[u8]) -> Result<String, CaptchaError> {
        let params = [
            ("key", self.api_key.as_str()),
            ("method", "base64"),
            ("json", "1"),
        ];
        let body = [("body", STANDARD.encode(image))];

        let response: ApiResponse = self
            .client
            .post(SUBMIT_URL)
            .query(&params)
            .form(&body)
            .send()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))?
            .json()
            .await
            .map_err(|err| CaptchaError::Provider(err.to_string()))?;

        if response.status != 1 {
            return Err(CaptchaError::Provider(response.request));
        }
        Ok(response.request)
    }

    async fn poll(&self, task_id: &str) -> CaptchaResult {
        let deadline = Instant::now() + self.config.timeout;

        loop {
            sleep(self.config.poll_interval).await;
            if Instant::now() >= deadline {
                return Err(CaptchaError::Timeout(self.config.timeout));
            }

            let params = [
                ("key", self.api_key.as_str()),
                ("action", "get"),
                ("id", task_id),
                ("json", "1"),
            ];
            let response: ApiResponse = self
                .client
                .get(RESULT_URL)
                .query(&params)
                .send()
                .await
                .map_err(|err| CaptchaError::Provider(err.to_string()))?
                .json()
                .await
                .map_err(|err| CaptchaError::Provider(err.to_string()))?;

            if response.status == 1 {
                return Ok(CaptchaSolution::new(response.request));
            }
            if response.request != NOT_READY {
                return Err(CaptchaError::Provider(response.request));
            }
        }
    }
}

#[async_trait]
impl CaptchaProvider for TwoCaptchaProvider {
    fn name(&self) -> &'static str {
        "twocaptcha"
    }

    async fn solve(&self, image_url: &Url) -> CaptchaResult {
        if self.api_key.trim().is_empty() {
            return Err(CaptchaError::Configuration("empty api key".into()));
        }

        let image = self.fetch_image(image_url).await?;
        let task_id = self.submit(&image).await?;
        self.poll(&task_id).await
    }
}
