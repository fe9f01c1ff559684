//! High level login orchestration.
//!
//! Wires together the transport, the challenge detectors, and the per-page
//! handlers into an authenticated session: `login` drives the challenge loop
//! until the authenticated state is reached or the attempt budget runs out,
//! and afterwards plain requests ride on the established cookies.

use std::path::PathBuf;
use std::sync::Arc;

use http::Method;
use thiserror::Error;
use url::Url;

use crate::challenges::core::{ChallengeSubmission, PayloadEncoding, ResponseSnapshot};
use crate::challenges::detectors::{self, ChallengeType};
use crate::challenges::handlers::{
    ChallengeHandler, ErrorCheck, ErrorPolicy, HandlerError, captcha_otp::CaptchaOtpHandler,
    captcha_v1::CaptchaV1Handler, captcha_v2::CaptchaV2Handler, mfa_code::MfaCodeHandler,
    mfa_device::MfaDeviceSelectHandler, sign_in::SignInHandler,
};
use crate::external_deps::captcha::{CaptchaError, CaptchaProvider};
use crate::external_deps::operator::{ConsoleIo, OperatorIo};
use crate::transport::{
    CookieStore, HttpClient, RequestOptions, ReqwestHttpClient, Transport, TransportError,
    unique_path,
};

const DEFAULT_BASE_URL: &str = "https://www.amazon.com";
const DEFAULT_MAX_AUTH_ATTEMPTS: usize = 10;
const SIGN_IN_PATH: &str = "/gp/sign-in.html";
const SIGN_OUT_PATH: &str = "/gp/sign-out.html";

/// Result alias used across the session layer.
pub type SessionResult<T> = Result<T, SessionError>;

/// High-level error surfaced by the session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Auth(String),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("challenge handling failed: {0}")]
    Handler(#[from] HandlerError),
    #[error("captcha provider error: {0}")]
    Captcha(#[from] CaptchaError),
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

struct SessionConfig {
    username: String,
    password: String,
    base_url: Url,
    debug: bool,
    max_auth_attempts: usize,
    output_dir: PathBuf,
    cookie_jar_path: Option<PathBuf>,
    io: Option<Arc<dyn OperatorIo>>,
    captcha_provider: Option<Arc<dyn CaptchaProvider>>,
    http_client: Option<Arc<dyn HttpClient>>,
}

/// Builder for [`AmazonSession`].
pub struct AmazonSessionBuilder {
    config: SessionConfig,
}

impl AmazonSessionBuilder {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            config: SessionConfig {
                username: username.into(),
                password: password.into(),
                base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url must parse"),
                debug: false,
                max_auth_attempts: DEFAULT_MAX_AUTH_ATTEMPTS,
                output_dir: std::env::temp_dir().join("amazonorders"),
                cookie_jar_path: None,
                io: None,
                captcha_provider: None,
                http_client: None,
            },
        }
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.config.base_url = base_url;
        self
    }

    /// Enables verbose logging plus an HTML capture of every response under
    /// the output directory.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn with_max_auth_attempts(mut self, attempts: usize) -> Self {
        self.config.max_auth_attempts = attempts;
        self
    }

    /// Directory for debug captures and challenge images.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Location of the persisted cookie jar. Defaults to `cookies.json`
    /// inside the output directory.
    pub fn with_cookie_jar_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cookie_jar_path = Some(path.into());
        self
    }

    pub fn with_operator_io(mut self, io: Arc<dyn OperatorIo>) -> Self {
        self.config.io = Some(io);
        self
    }

    pub fn with_captcha_provider(mut self, provider: Arc<dyn CaptchaProvider>) -> Self {
        self.config.captcha_provider = Some(provider);
        self
    }

    /// Override the HTTP client, primarily for tests.
    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.config.http_client = Some(client);
        self
    }

    pub fn build(self) -> SessionResult<AmazonSession> {
        let config = self.config;

        let client: Arc<dyn HttpClient> = match config.http_client {
            Some(client) => client,
            None => Arc::new(ReqwestHttpClient::new()?),
        };
        let cookie_jar_path = config
            .cookie_jar_path
            .unwrap_or_else(|| config.output_dir.join("cookies.json"));
        let transport = Transport::new(
            client,
            &config.base_url,
            cookie_jar_path,
            config.debug,
            config.output_dir,
        )?;

        Ok(AmazonSession {
            transport,
            username: config.username,
            password: config.password,
            base_url: config.base_url,
            max_auth_attempts: config.max_auth_attempts,
            io: config.io.unwrap_or_else(|| Arc::new(ConsoleIo::new())),
            captcha_provider: config.captcha_provider,
            authenticated: false,
        })
    }
}

/// An authenticated (or authenticating) session against the storefront.
pub struct AmazonSession {
    transport: Transport,
    username: String,
    password: String,
    base_url: Url,
    max_auth_attempts: usize,
    io: Arc<dyn OperatorIo>,
    captcha_provider: Option<Arc<dyn CaptchaProvider>>,
    authenticated: bool,
}

impl AmazonSession {
    pub fn builder(
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> AmazonSessionBuilder {
        AmazonSessionBuilder::new(username, password)
    }

    /// Drive the challenge loop until authenticated.
    ///
    /// Fetches the sign-in page, classifies each response, and dispatches
    /// the matching handler. Each handled challenge costs one attempt; the
    /// loop stops with an error once `max_auth_attempts` challenges have
    /// been handled without reaching the authenticated state.
    pub async fn login(&mut self) -> SessionResult<()> {
        let sign_in_url = self.base_url.join(SIGN_IN_PATH)?;
        self.transport
            .execute(Method::GET, sign_in_url, RequestOptions::new())
            .await?;

        let mut attempts = 0;
        loop {
            let snapshot = self
                .transport
                .snapshot()
                .cloned()
                .ok_or_else(|| SessionError::Auth("no response to classify".to_string()))?;
            let challenge = detectors::classify(&snapshot, self.transport.cookies());
            log::debug!("challenge detected: {challenge:?} at {}", snapshot.url());

            match challenge {
                ChallengeType::Authenticated => {
                    log::debug!("successfully logged in");
                    self.authenticated = true;
                    return Ok(());
                }
                ChallengeType::Unknown => {
                    return Err(SessionError::Auth(format!(
                        "An error occurred, this is an unknown page: {}. Enable debug mode to \
                         capture the page to a file.",
                        snapshot.url()
                    )));
                }
                challenge => {
                    if attempts >= self.max_auth_attempts {
                        return Err(SessionError::Auth(
                            "Max authentication flow attempts reached.".to_string(),
                        ));
                    }
                    attempts += 1;
                    self.dispatch(challenge, &snapshot).await?;
                }
            }
        }
    }

    /// Sign out and discard all session state, including the jar file.
    pub async fn logout(&mut self) -> SessionResult<()> {
        let sign_out_url = self.base_url.join(SIGN_OUT_PATH)?;
        self.transport
            .execute(Method::GET, sign_out_url, RequestOptions::new())
            .await?;

        self.transport.remove_cookie_jar()?;
        self.transport.reset();
        self.authenticated = false;
        Ok(())
    }

    /// Execute a request on the session's cookies.
    pub async fn request(
        &mut self,
        method: Method,
        url: Url,
        options: RequestOptions,
    ) -> SessionResult<&ResponseSnapshot> {
        Ok(self.transport.execute(method, url, options).await?)
    }

    pub async fn get(&mut self, url: Url) -> SessionResult<&ResponseSnapshot> {
        self.request(Method::GET, url, RequestOptions::new()).await
    }

    pub async fn post(
        &mut self,
        url: Url,
        fields: Vec<(String, String)>,
    ) -> SessionResult<&ResponseSnapshot> {
        self.request(Method::POST, url, RequestOptions::form(fields))
            .await
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn cookies(&self) -> &CookieStore {
        self.transport.cookies()
    }

    /// Most recent response, if any request has run.
    pub fn last_response(&self) -> Option<&ResponseSnapshot> {
        self.transport.snapshot()
    }

    async fn dispatch(
        &mut self,
        challenge: ChallengeType,
        snapshot: &ResponseSnapshot,
    ) -> SessionResult<()> {
        match challenge {
            ChallengeType::SignIn => {
                let handler = SignInHandler::new(&self.username, &self.password);
                let submission = handler.build_submission(snapshot)?;
                self.submit(submission, handler.error_check()).await
            }
            ChallengeType::Captcha1 => {
                let handler = CaptchaV1Handler::new(&self.base_url)?;
                let image_url = handler.image_url(snapshot)?;
                let solution = self.resolve_captcha(&image_url).await?;
                let submission = handler.build_submission(snapshot, &solution)?;
                self.submit(submission, handler.error_check()).await
            }
            ChallengeType::Captcha2 => {
                let handler = CaptchaV2Handler::new(self.base_url.clone());
                let image_url = handler.image_url(snapshot)?;
                let solution = self.resolve_captcha(&image_url).await?;
                let submission = handler.build_submission(snapshot, &solution)?;
                self.submit(submission, handler.error_check()).await
            }
            ChallengeType::MfaDeviceSelect => {
                let handler = MfaDeviceSelectHandler::new();
                let submission = handler.build_submission(snapshot, self.io.as_ref()).await?;
                self.submit(submission, handler.error_check()).await
            }
            ChallengeType::MfaCode => {
                let handler = MfaCodeHandler::new();
                let submission = handler.build_submission(snapshot, self.io.as_ref()).await?;
                self.submit(submission, handler.error_check()).await
            }
            ChallengeType::CaptchaOtp => {
                let handler = CaptchaOtpHandler::new(self.base_url.clone());
                let submission = handler.build_submission(snapshot, self.io.as_ref()).await?;
                self.submit(submission, handler.error_check()).await
            }
            // Handled by the login loop before dispatch.
            ChallengeType::Authenticated | ChallengeType::Unknown => Ok(()),
        }
    }

    async fn submit(
        &mut self,
        submission: ChallengeSubmission,
        check: ErrorCheck,
    ) -> SessionResult<()> {
        let options = match submission.encoding {
            PayloadEncoding::Form => RequestOptions::form(submission.fields),
            PayloadEncoding::Query => RequestOptions::query(submission.fields),
        };
        self.transport
            .execute(submission.method, submission.url, options)
            .await?;
        self.handle_errors(check)
    }

    /// Inspect the current response for the handler's error container.
    /// Critical errors abort the flow; recoverable ones are reported to the
    /// operator and the loop keeps (and pays for) another attempt.
    fn handle_errors(&self, check: ErrorCheck) -> SessionResult<()> {
        let Some(snapshot) = self.transport.snapshot() else {
            return Ok(());
        };
        let Some(message) = snapshot.element_text(check.selector) else {
            return Ok(());
        };

        match check.policy {
            ErrorPolicy::Critical => Err(SessionError::Auth(format!(
                "An error occurred: {message}"
            ))),
            ErrorPolicy::Recoverable => {
                log::warn!("recoverable challenge error: {message}");
                self.io.echo(&format!("An error occurred: {message}"));
                Ok(())
            }
        }
    }

    /// Obtain a captcha transcription: one automated provider attempt when a
    /// provider is configured, falling back to the operator when the provider
    /// returns an unusable solution. Provider failures propagate.
    async fn resolve_captcha(&mut self, image_url: &Url) -> SessionResult<String> {
        if let Some(provider) = self.captcha_provider.clone() {
            log::debug!("solving captcha via {}", provider.name());
            let solution = provider.solve(image_url).await?;
            if !solution.needs_manual_resolution() {
                return Ok(solution.text);
            }
            log::debug!("captcha solution unusable, deferring to the operator");
        }
        self.prompt_for_captcha(image_url).await
    }

    async fn prompt_for_captcha(&mut self, image_url: &Url) -> SessionResult<String> {
        let bytes = self.transport.fetch_bytes(image_url).await?;
        let dir = self.transport.output_dir().to_path_buf();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(TransportError::Io)?;
        }
        let path = unique_path(&dir, "captcha", "jpg");
        std::fs::write(&path, &bytes).map_err(TransportError::Io)?;

        self.io.echo("Info: The Captcha couldn't be auto-solved.");
        self.io
            .echo(&format!("--> View the Captcha: {}", path.display()));
        let answer = self
            .io
            .prompt("--> Enter the characters shown in the image")
            .await
            .map_err(HandlerError::OperatorIo)?;
        self.io.echo("");
        Ok(answer)
    }
}
