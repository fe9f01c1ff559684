//! Integrations that rely on the world outside the session.
//!
//! This module groups the captcha provider adapters and the operator
//! input/output boundary that bridge the login flow with external services
//! and with a human operator.

pub mod captcha;
pub mod operator;

pub use captcha::{CaptchaConfig, CaptchaError, CaptchaProvider, CaptchaResult, CaptchaSolution};
pub use operator::{ConsoleIo, OperatorIo};
