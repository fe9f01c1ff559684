//! Page classification.
//!
//! Every iteration of the login loop re-derives which challenge the current
//! page represents. Classification is an ordered table of structural markers
//! evaluated first-match-wins, because transitional pages can carry more than
//! one marker at a time; the table makes the precedence testable on its own,
//! away from any handler logic.

use once_cell::sync::Lazy;
use scraper::Selector;

use crate::challenges::core::ResponseSnapshot;
use crate::transport::CookieStore;

/// Session token cookie set once credentials are accepted.
pub const SESSION_TOKEN_COOKIE: &str = "session-token";
/// Primary auth cookie accompanying a signed-in session.
pub const PRIMARY_AUTH_COOKIE: &str = "x-main";

/// Body fragment shown to anonymous visitors.
const SIGN_IN_PROMPT_MARKER: &str = "Hello, sign in";
/// Navigation fragment only present for signed-in sessions.
const SIGNED_IN_NAV_MARKER: &str = "nav-item-signout";

/// Closed set of page states the login loop can encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeType {
    SignIn,
    Captcha1,
    Captcha2,
    MfaDeviceSelect,
    MfaCode,
    CaptchaOtp,
    Authenticated,
    Unknown,
}

struct ChallengeMarker {
    label: ChallengeType,
    selector: Selector,
}

impl ChallengeMarker {
    fn new(label: ChallengeType, selector: &str) -> Self {
        Self {
            label,
            selector: build_selector(selector),
        }
    }
}

/// Ordered marker table. Earlier entries win when several markers coexist:
/// a page showing both the sign-in form and a CAPTCHA widget is still a
/// sign-in page first.
static MARKERS: Lazy<Vec<ChallengeMarker>> = Lazy::new(|| {
    vec![
        ChallengeMarker::new(ChallengeType::SignIn, "form[name='signIn']"),
        ChallengeMarker::new(ChallengeType::Captcha1, "form[class*='cvf-widget-form-captcha']"),
        ChallengeMarker::new(ChallengeType::Captcha2, "input[id^='captchacharacters']"),
        ChallengeMarker::new(ChallengeType::MfaDeviceSelect, "form[id='auth-select-device-form']"),
        ChallengeMarker::new(ChallengeType::MfaCode, "form[id='auth-mfa-form']"),
        ChallengeMarker::new(ChallengeType::CaptchaOtp, "form[id='verification-code-form']"),
    ]
});

/// Classify the current page.
///
/// The authenticated short-circuit runs before any form marker: either the
/// cookie store already holds a full set of auth cookies, or the page itself
/// shows a signed-in navigation bar without the sign-in prompt.
pub fn classify(snapshot: &ResponseSnapshot, cookies: &CookieStore) -> ChallengeType {
    if auth_cookies_stored(cookies)
        || (!snapshot.body().contains(SIGN_IN_PROMPT_MARKER)
            && snapshot.body().contains(SIGNED_IN_NAV_MARKER))
    {
        return ChallengeType::Authenticated;
    }

    for marker in MARKERS.iter() {
        if snapshot.has_element(&marker.selector) {
            return marker.label;
        }
    }

    ChallengeType::Unknown
}

/// Whether the cookie store already holds both cookies of a signed-in
/// session.
pub fn auth_cookies_stored(cookies: &CookieStore) -> bool {
    cookies.get(SESSION_TOKEN_COOKIE).is_some_and(|v| !v.is_empty())
        && cookies.get(PRIMARY_AUTH_COOKIE).is_some_and(|v| !v.is_empty())
}

fn build_selector(selector: &str) -> Selector {
    Selector::parse(selector)
        .unwrap_or_else(|err| panic!("invalid challenge marker selector `{selector}`: {err:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn snapshot(body: &str) -> ResponseSnapshot {
        ResponseSnapshot::new(
            200,
            Url::parse("https://www.amazon.com/ap/signin").unwrap(),
            body.to_string(),
        )
    }

    #[test]
    fn sign_in_form_classifies_as_sign_in() {
        let snap = snapshot(r#"Hello, sign in <form name="signIn"></form>"#);
        assert_eq!(classify(&snap, &CookieStore::new()), ChallengeType::SignIn);
    }

    #[test]
    fn sign_in_wins_over_captcha_on_transitional_pages() {
        let snap = snapshot(
            r#"Hello, sign in
               <form name="signIn"></form>
               <form class="cvf-widget cvf-widget-form-captcha"></form>
               <input id="captchacharacters-0"/>"#,
        );
        assert_eq!(classify(&snap, &CookieStore::new()), ChallengeType::SignIn);
    }

    #[test]
    fn captcha_widget_form_classifies_as_captcha_1() {
        let snap = snapshot(
            r#"Hello, sign in <form class="cvf-widget-form cvf-widget-form-captcha"></form>"#,
        );
        assert_eq!(classify(&snap, &CookieStore::new()), ChallengeType::Captcha1);
    }

    #[test]
    fn prefixed_captcha_input_classifies_as_captcha_2() {
        let snap = snapshot(r#"Hello, sign in <input id="captchacharacters-7" name="field"/>"#);
        assert_eq!(classify(&snap, &CookieStore::new()), ChallengeType::Captcha2);
    }

    #[test]
    fn mfa_forms_classify_by_id() {
        let cookies = CookieStore::new();
        let device = snapshot(r#"Hello, sign in <form id="auth-select-device-form"></form>"#);
        assert_eq!(classify(&device, &cookies), ChallengeType::MfaDeviceSelect);

        let code = snapshot(r#"Hello, sign in <form id="auth-mfa-form"></form>"#);
        assert_eq!(classify(&code, &cookies), ChallengeType::MfaCode);

        let otp = snapshot(r#"Hello, sign in <form id="verification-code-form"></form>"#);
        assert_eq!(classify(&otp, &cookies), ChallengeType::CaptchaOtp);
    }

    #[test]
    fn stored_auth_cookies_short_circuit_form_markers() {
        let mut cookies = CookieStore::new();
        cookies.insert(SESSION_TOKEN_COOKIE, "tok");
        cookies.insert(PRIMARY_AUTH_COOKIE, "main");

        let snap = snapshot(r#"Hello, sign in <form name="signIn"></form>"#);
        assert_eq!(classify(&snap, &cookies), ChallengeType::Authenticated);
    }

    #[test]
    fn one_auth_cookie_is_not_enough() {
        let mut cookies = CookieStore::new();
        cookies.insert(SESSION_TOKEN_COOKIE, "tok");

        let snap = snapshot(r#"Hello, sign in <form name="signIn"></form>"#);
        assert_eq!(classify(&snap, &cookies), ChallengeType::SignIn);
    }

    #[test]
    fn signed_in_navigation_classifies_as_authenticated() {
        let snap = snapshot(r#"<div id="nav-item-signout">Sign Out</div>"#);
        assert_eq!(
            classify(&snap, &CookieStore::new()),
            ChallengeType::Authenticated
        );
    }

    #[test]
    fn sign_in_prompt_blocks_the_navigation_marker() {
        let snap = snapshot(r#"Hello, sign in <div id="nav-item-signout"></div>"#);
        assert_eq!(classify(&snap, &CookieStore::new()), ChallengeType::Unknown);
    }

    #[test]
    fn unrecognised_page_is_unknown() {
        let snap = snapshot("<html><body><p>service unavailable</p></body></html>");
        assert_eq!(classify(&snap, &CookieStore::new()), ChallengeType::Unknown);
    }
}
