//! Handler for the MFA device selection form.
//!
//! When an account has several one-time-passcode destinations registered,
//! the service asks which device should receive the code. The handler lists
//! every destination through the operator boundary, numbered from 1, blocks
//! for a selection, and overlays the chosen device context.

use once_cell::sync::Lazy;
use scraper::Selector;

use crate::challenges::core::{ChallengeSubmission, FormDescriptor, ResponseSnapshot};
use crate::external_deps::operator::OperatorIo;

use super::{ChallengeHandler, ErrorCheck, ErrorPolicy, HandlerError, build_selector};

const DEVICE_FORM_MARKER: &str = "form[id='auth-select-device-form']";
const DEVICE_CONTEXT_FIELD: &str = "otpDeviceContext";

static DEVICE_FORM: Lazy<Selector> = Lazy::new(|| build_selector(DEVICE_FORM_MARKER));
static DEVICE_CONTEXTS: Lazy<Selector> = Lazy::new(|| {
    build_selector("form[id='auth-select-device-form'] input[name='otpDeviceContext']")
});

/// Prompts the operator for a passcode destination.
pub struct MfaDeviceSelectHandler;

impl MfaDeviceSelectHandler {
    pub fn new() -> Self {
        Self
    }

    /// Enumerate the offered devices, collect the operator's pick, and build
    /// the selection submission.
    pub async fn build_submission(
        &self,
        snapshot: &ResponseSnapshot,
        io: &dyn OperatorIo,
    ) -> Result<ChallengeSubmission, HandlerError> {
        let contexts = device_contexts(snapshot);
        if contexts.is_empty() {
            return Err(HandlerError::NoOtpDevices);
        }

        for (i, context) in contexts.iter().enumerate() {
            io.echo(&format!("{}: {}", i + 1, context.trim()));
        }

        let answer = io
            .prompt("--> Enter where you would like your one-time passcode sent")
            .await?;
        io.echo("");

        let selection: usize = answer
            .trim()
            .parse()
            .ok()
            .filter(|n| (1..=contexts.len()).contains(n))
            .ok_or_else(|| HandlerError::InvalidDeviceSelection(answer.clone(), contexts.len()))?;

        let form = FormDescriptor::first_matching(snapshot, &DEVICE_FORM, DEVICE_FORM_MARKER)?;
        let payload = form.payload(vec![(
            DEVICE_CONTEXT_FIELD.to_string(),
            contexts[selection - 1].clone(),
        )]);
        let url = form.resolve_action(snapshot.url(), None)?;

        Ok(ChallengeSubmission::new(form.method, url, payload))
    }
}

impl Default for MfaDeviceSelectHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeHandler for MfaDeviceSelectHandler {
    fn name(&self) -> &'static str {
        "mfa_device_select"
    }

    fn error_check(&self) -> ErrorCheck {
        ErrorCheck::auth_error_box(ErrorPolicy::Recoverable)
    }
}

/// Raw values of every device context input inside the selection form.
fn device_contexts(snapshot: &ResponseSnapshot) -> Vec<String> {
    snapshot
        .document()
        .select(&DEVICE_CONTEXTS)
        .filter_map(|input| input.attr("value"))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use std::io;
    use std::sync::Mutex;
    use url::Url;

    use async_trait::async_trait;

    struct ScriptedIo {
        answers: Mutex<Vec<String>>,
        echoed: Mutex<Vec<String>>,
    }

    impl ScriptedIo {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().rev().map(|s| s.to_string()).collect()),
                echoed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl OperatorIo for ScriptedIo {
        fn echo(&self, message: &str) {
            self.echoed.lock().unwrap().push(message.to_string());
        }

        async fn prompt(&self, _message: &str) -> io::Result<String> {
            Ok(self.answers.lock().unwrap().pop().expect("no scripted answer"))
        }
    }

    fn snapshot() -> ResponseSnapshot {
        ResponseSnapshot::new(
            200,
            Url::parse("https://www.amazon.com/ap/mfa/new-otp").unwrap(),
            r#"<form id="auth-select-device-form" method="post" action="/ap/mfa/new-otp">
                <input type="hidden" name="workflowState" value="state"/>
                <input type="radio" name="otpDeviceContext" value="sms to *** 111 "/>
                <input type="radio" name="otpDeviceContext" value="voice to *** 222 "/>
            </form>"#
                .to_string(),
        )
    }

    #[tokio::test]
    async fn selecting_two_overlays_the_second_context() {
        let io = ScriptedIo::new(&["2"]);
        let handler = MfaDeviceSelectHandler::new();
        let submission = handler.build_submission(&snapshot(), &io).await.unwrap();

        assert_eq!(submission.method, Method::POST);
        assert_eq!(
            submission.field("otpDeviceContext"),
            Some("voice to *** 222 ")
        );
        assert_eq!(submission.field("workflowState"), Some("state"));

        let echoed = io.echoed.lock().unwrap();
        assert_eq!(echoed[0], "1: sms to *** 111");
        assert_eq!(echoed[1], "2: voice to *** 222");
    }

    #[tokio::test]
    async fn out_of_range_selection_is_rejected() {
        let io = ScriptedIo::new(&["3"]);
        let handler = MfaDeviceSelectHandler::new();
        let err = handler
            .build_submission(&snapshot(), &io)
            .await
            .expect_err("should reject");
        assert!(matches!(err, HandlerError::InvalidDeviceSelection(_, 2)));
    }

    #[tokio::test]
    async fn form_without_devices_is_rejected() {
        let empty = ResponseSnapshot::new(
            200,
            Url::parse("https://www.amazon.com/ap/mfa/new-otp").unwrap(),
            r#"<form id="auth-select-device-form"></form>"#.to_string(),
        );
        let io = ScriptedIo::new(&[]);
        let handler = MfaDeviceSelectHandler::new();
        let err = handler
            .build_submission(&empty, &io)
            .await
            .expect_err("should reject");
        assert!(matches!(err, HandlerError::NoOtpDevices));
    }
}
