//! # amazonorders-rs
//!
//! A Rust-first take on logging an automated client into Amazon's
//! challenge-gated sign-in flow, inspired by the classic Python
//! amazon-orders.
//!
//! The session drives the login state machine end to end: it fetches the
//! sign-in page, classifies each response against a fixed set of known
//! challenge pages (credentials, image captchas, one-time passcodes), and
//! dispatches the matching handler until the authenticated state is reached.
//! Cookies persist to a JSON jar between runs, so subsequent sessions can
//! skip the flow entirely.
//!
//! ## Features
//!
//! - Async challenge loop with a configurable attempt budget
//! - Both image captcha variants plus the OTP verification page
//! - MFA device selection and one-time passcode entry via operator prompts
//! - Optional automated captcha solving with operator fallback
//! - Cookie jar persistence across sessions
//! - Debug captures of every response page
//!
//! ## Example
//!
//! ```no_run
//! use amazonorders_rs::AmazonSession;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = AmazonSession::builder("user@example.com", "password").build()?;
//!     session.login().await?;
//!     let orders = session
//!         .get("https://www.amazon.com/gp/css/order-history".parse()?)
//!         .await?;
//!     println!("{}", orders.body());
//!     Ok(())
//! }
//! ```

mod session;

pub mod challenges;
pub mod external_deps;
pub mod transport;

pub use crate::session::{AmazonSession, AmazonSessionBuilder, SessionError, SessionResult};

pub use crate::challenges::core::{
    ChallengeSubmission,
    FormDescriptor,
    FormError,
    PayloadEncoding,
    ResponseSnapshot,
};

pub use crate::challenges::detectors::ChallengeType;

pub use crate::external_deps::captcha::{
    CaptchaError,
    CaptchaProvider,
    CaptchaResult,
    CaptchaSolution,
    TwoCaptchaProvider,
};

pub use crate::external_deps::operator::{ConsoleIo, OperatorIo};

pub use crate::transport::{
    CookieStore,
    HttpClient,
    HttpClientError,
    RawResponse,
    RequestOptions,
    ReqwestHttpClient,
    Transport,
    TransportError,
};

/// Crate version, as compiled.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
