//! Session transport.
//!
//! Executes every HTTP request of the login flow with a fixed browser
//! baseline header set, manages the cookie header itself so each redirect
//! hop's `Set-Cookie` is captured, replaces the current [`ResponseSnapshot`],
//! and checkpoints the cookie jar file after every request. When debug mode
//! is on, each response body is also written to a uniquely named capture
//! file for diagnostics.

pub mod cookies;
mod reqwest_client;

pub use cookies::CookieStore;
pub use reqwest_client::ReqwestHttpClient;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE, COOKIE, LOCATION, ORIGIN, REFERER,
    USER_AGENT,
};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use thiserror::Error;
use url::Url;

use crate::challenges::core::ResponseSnapshot;

/// Redirect hops followed per request before giving up.
const MAX_REDIRECTS: usize = 10;

/// Contract that abstracts the underlying HTTP client.
///
/// Implementations perform exactly one request/response exchange: no
/// redirect following and no cookie handling, both of which belong to the
/// [`Transport`]. Keeping the seam this narrow is what lets the whole login
/// flow run against a scripted stub in tests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        form: Option<&[(String, String)]>,
    ) -> Result<RawResponse, HttpClientError>;
}

/// Minimal response representation returned by the client abstraction.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: Url,
}

impl RawResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status) && self.location().is_some()
    }
}

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("http transport error: {0}")]
    Transport(String),
}

/// Failures at the transport layer. None of these are retried; they
/// propagate to the caller of the login flow.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http client error: {0}")]
    Client(#[from] HttpClientError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cookie jar file '{0}' is not a valid cookie map: {1}")]
    CookieJar(String, String),
    #[error("invalid header value for '{0}'")]
    InvalidHeader(String),
    #[error("redirect '{0}' does not resolve to a URL: {1}")]
    InvalidRedirect(String, url::ParseError),
    #[error("too many redirects while requesting {0}")]
    TooManyRedirects(String),
}

/// Payload attached to a request.
#[derive(Debug, Clone)]
pub enum Payload {
    /// URL-encoded request body.
    Form(Vec<(String, String)>),
    /// Pairs appended to the URL's query string.
    Query(Vec<(String, String)>),
}

/// Per-request options layered on top of the baseline.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: HeaderMap,
    pub payload: Option<Payload>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn form(fields: Vec<(String, String)>) -> Self {
        Self {
            headers: HeaderMap::new(),
            payload: Some(Payload::Form(fields)),
        }
    }

    pub fn query(fields: Vec<(String, String)>) -> Self {
        Self {
            headers: HeaderMap::new(),
            payload: Some(Payload::Query(fields)),
        }
    }
}

/// Request executor bound to one session's cookie state.
pub struct Transport {
    client: Arc<dyn HttpClient>,
    base_headers: HeaderMap,
    cookies: CookieStore,
    cookie_jar_path: PathBuf,
    debug: bool,
    output_dir: PathBuf,
    last_snapshot: Option<ResponseSnapshot>,
}

impl Transport {
    /// Build a transport seeded from the persisted cookie jar, when one
    /// exists at the configured path.
    pub fn new(
        client: Arc<dyn HttpClient>,
        base_url: &Url,
        cookie_jar_path: PathBuf,
        debug: bool,
        output_dir: PathBuf,
    ) -> Result<Self, TransportError> {
        let cookies = CookieStore::load(&cookie_jar_path)?;
        Ok(Self {
            client,
            base_headers: base_headers(base_url)?,
            cookies,
            cookie_jar_path,
            debug,
            output_dir,
            last_snapshot: None,
        })
    }

    /// Execute a request: baseline headers merged over caller extras,
    /// redirects followed manually, cookies captured on every hop and
    /// persisted afterwards, snapshot replaced.
    pub async fn execute(
        &mut self,
        method: Method,
        url: Url,
        options: RequestOptions,
    ) -> Result<&ResponseSnapshot, TransportError> {
        let mut headers = options.headers;
        for (name, value) in self.base_headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        let (url, form) = match options.payload {
            Some(Payload::Form(fields)) => (url, Some(fields)),
            Some(Payload::Query(fields)) => (append_query(url, &fields), None),
            None => (url, None),
        };

        log::debug!("{method} request to {url}");
        let response = self.send_with_redirects(method, url, headers, form).await?;

        let body = String::from_utf8_lossy(&response.body).into_owned();
        let snapshot = ResponseSnapshot::new(response.status, response.url, body);
        log::debug!("response: {} - {}", snapshot.url(), snapshot.status());

        self.cookies.persist(&self.cookie_jar_path)?;

        if self.debug {
            self.capture_page(&snapshot)?;
        }

        Ok(&*self.last_snapshot.insert(snapshot))
    }

    /// Fetch raw bytes (challenge images) on the session's cookies without
    /// touching the snapshot or the jar file.
    pub async fn fetch_bytes(&mut self, url: &Url) -> Result<Bytes, TransportError> {
        let mut headers = self.base_headers.clone();
        self.insert_cookie_header(&mut headers)?;

        let response = self.client.send(&Method::GET, url, &headers, None).await?;
        self.cookies.record_response(&response.headers);
        Ok(response.body)
    }

    /// Most recent response, if any request has run.
    pub fn snapshot(&self) -> Option<&ResponseSnapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn cookies(&self) -> &CookieStore {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut CookieStore {
        &mut self.cookies
    }

    pub fn cookie_jar_path(&self) -> &Path {
        &self.cookie_jar_path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Delete the jar file. Idempotent.
    pub fn remove_cookie_jar(&self) -> Result<(), TransportError> {
        CookieStore::remove_jar(&self.cookie_jar_path)
    }

    /// Discard in-memory cookie state and the current snapshot.
    pub fn reset(&mut self) {
        self.cookies.clear();
        self.last_snapshot = None;
    }

    async fn send_with_redirects(
        &mut self,
        mut method: Method,
        mut url: Url,
        headers: HeaderMap,
        mut form: Option<Vec<(String, String)>>,
    ) -> Result<RawResponse, TransportError> {
        for _ in 0..=MAX_REDIRECTS {
            let mut hop_headers = headers.clone();
            self.insert_cookie_header(&mut hop_headers)?;

            let response = self
                .client
                .send(&method, &url, &hop_headers, form.as_deref())
                .await?;
            self.cookies.record_response(&response.headers);

            if !response.is_redirect() {
                return Ok(response);
            }

            let Some(location) = response.location() else {
                return Ok(response);
            };
            let next = response
                .url
                .join(location)
                .map_err(|err| TransportError::InvalidRedirect(location.to_string(), err))?;
            log::debug!("redirect {} -> {}", response.status, next);

            // Browsers downgrade 301/302/303 to a bodyless GET; 307/308
            // replay the original method and payload.
            if matches!(response.status, 301 | 302 | 303) {
                method = Method::GET;
                form = None;
            }
            url = next;
        }

        Err(TransportError::TooManyRedirects(url.to_string()))
    }

    fn insert_cookie_header(&self, headers: &mut HeaderMap) -> Result<(), TransportError> {
        if let Some(cookie) = self.cookies.cookie_header() {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|_| TransportError::InvalidHeader("cookie".into()))?;
            headers.insert(COOKIE, value);
        }
        Ok(())
    }

    fn capture_page(&self, snapshot: &ResponseSnapshot) -> Result<(), TransportError> {
        if !self.output_dir.exists() {
            std::fs::create_dir_all(&self.output_dir)?;
        }

        let stem = page_stem(snapshot.url());
        let path = unique_path(&self.output_dir, &stem, "html");
        std::fs::write(&path, snapshot.body())?;
        log::debug!("response written to {}", path.display());
        Ok(())
    }
}

/// Derive a capture file stem from the URL's path component.
fn page_stem(url: &Url) -> String {
    let name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("")
        .trim_end_matches(".html");
    if name.is_empty() {
        "page".to_string()
    } else {
        name.to_string()
    }
}

/// First free `{stem}_{n}.{ext}` path in `dir`, so repeated requests to the
/// same logical page never overwrite prior captures.
pub(crate) fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let mut i = 0;
    loop {
        let candidate = dir.join(format!("{stem}_{i}.{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}

fn append_query(mut url: Url, fields: &[(String, String)]) -> Url {
    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in fields {
            pairs.append_pair(name, value);
        }
    }
    url
}

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Fixed baseline headers so the target service treats requests as coming
/// from a standard browser session. Accept-Encoding is left to the client so
/// responses stay auto-decompressed.
fn base_headers(base_url: &Url) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();

    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,\
             image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );

    let origin = base_url.as_str().trim_end_matches('/').to_string();
    headers.insert(
        ORIGIN,
        HeaderValue::from_str(&origin).map_err(|_| TransportError::InvalidHeader("origin".into()))?,
    );
    headers.insert(
        REFERER,
        HeaderValue::from_str(&format!("{origin}/ap/signin"))
            .map_err(|_| TransportError::InvalidHeader("referer".into()))?,
    );

    let static_pairs = [
        ("sec-ch-ua", "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\""),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", "\"macOS\""),
        ("sec-ch-viewport-width", "1393"),
        ("sec-fetch-dest", "document"),
        ("sec-fetch-mode", "navigate"),
        ("sec-fetch-site", "same-origin"),
        ("sec-fetch-user", "?1"),
        ("viewport-width", "1393"),
    ];
    for (name, value) in static_pairs {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }

    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::SET_COOKIE;
    use std::sync::Mutex;

    struct RecordedRequest {
        method: Method,
        url: Url,
        headers: HeaderMap,
        form: Option<Vec<(String, String)>>,
    }

    struct StubClient {
        responses: Mutex<Vec<RawResponse>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl StubClient {
        fn new(responses: Vec<RawResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().rev().collect()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for StubClient {
        async fn send(
            &self,
            method: &Method,
            url: &Url,
            headers: &HeaderMap,
            form: Option<&[(String, String)]>,
        ) -> Result<RawResponse, HttpClientError> {
            self.requests.lock().unwrap().push(RecordedRequest {
                method: method.clone(),
                url: url.clone(),
                headers: headers.clone(),
                form: form.map(|fields| fields.to_vec()),
            });
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop()
                .expect("no more stub responses"))
        }
    }

    fn response(status: u16, url: &str, headers: HeaderMap, body: &str) -> RawResponse {
        RawResponse {
            status,
            headers,
            body: Bytes::from(body.to_string()),
            url: Url::parse(url).unwrap(),
        }
    }

    fn base_url() -> Url {
        Url::parse("https://www.amazon.com").unwrap()
    }

    fn transport(client: Arc<StubClient>, dir: &Path) -> Transport {
        Transport::new(
            client,
            &base_url(),
            dir.join("cookies.json"),
            false,
            dir.to_path_buf(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn baseline_headers_are_always_present() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(StubClient::new(vec![response(
            200,
            "https://www.amazon.com/gp/sign-in.html",
            HeaderMap::new(),
            "<html></html>",
        )]));
        let mut transport = transport(client.clone(), dir.path());

        let mut options = RequestOptions::new();
        options
            .headers
            .insert(USER_AGENT, HeaderValue::from_static("caller-agent"));
        transport
            .execute(
                Method::GET,
                Url::parse("https://www.amazon.com/gp/sign-in.html").unwrap(),
                options,
            )
            .await
            .unwrap();

        let requests = client.requests.lock().unwrap();
        let sent = &requests[0].headers;
        // Baseline wins over caller-supplied values.
        assert_eq!(sent.get(USER_AGENT).unwrap(), BROWSER_USER_AGENT);
        assert_eq!(sent.get(ORIGIN).unwrap(), "https://www.amazon.com");
        assert_eq!(
            sent.get(REFERER).unwrap(),
            "https://www.amazon.com/ap/signin"
        );
    }

    #[tokio::test]
    async fn cookies_are_persisted_after_every_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("session-id=abc; Path=/"),
        );
        let client = Arc::new(StubClient::new(vec![response(
            200,
            "https://www.amazon.com/",
            headers,
            "ok",
        )]));
        let mut transport = transport(client, dir.path());

        transport
            .execute(Method::GET, base_url(), RequestOptions::new())
            .await
            .unwrap();

        let reloaded = CookieStore::load(&dir.path().join("cookies.json")).unwrap();
        assert_eq!(reloaded.get("session-id"), Some("abc"));
        assert_eq!(reloaded.as_map(), transport.cookies().as_map());
    }

    #[tokio::test]
    async fn redirects_downgrade_to_get_and_capture_hop_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let mut redirect_headers = HeaderMap::new();
        redirect_headers.insert(LOCATION, HeaderValue::from_static("/ap/landing"));
        redirect_headers.append(SET_COOKIE, HeaderValue::from_static("hop-cookie=1"));

        let client = Arc::new(StubClient::new(vec![
            response(
                302,
                "https://www.amazon.com/ap/signin",
                redirect_headers,
                "",
            ),
            response(200, "https://www.amazon.com/ap/landing", HeaderMap::new(), "landed"),
        ]));
        let mut transport = transport(client.clone(), dir.path());

        let snapshot = transport
            .execute(
                Method::POST,
                Url::parse("https://www.amazon.com/ap/signin").unwrap(),
                RequestOptions::form(vec![("email".into(), "user@example.com".into())]),
            )
            .await
            .unwrap();

        assert_eq!(snapshot.status(), 200);
        assert_eq!(snapshot.body(), "landed");
        assert_eq!(transport.cookies().get("hop-cookie"), Some("1"));

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, Method::POST);
        assert!(requests[0].form.is_some());
        assert_eq!(requests[1].method, Method::GET);
        assert!(requests[1].form.is_none());
        assert_eq!(
            requests[1].url.as_str(),
            "https://www.amazon.com/ap/landing"
        );
    }

    #[tokio::test]
    async fn query_payload_is_appended_to_the_url() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(StubClient::new(vec![response(
            200,
            "https://www.amazon.com/errors/validateCaptcha",
            HeaderMap::new(),
            "ok",
        )]));
        let mut transport = transport(client.clone(), dir.path());

        transport
            .execute(
                Method::GET,
                Url::parse("https://www.amazon.com/errors/validateCaptcha").unwrap(),
                RequestOptions::query(vec![("field-keywords".into(), "XYZ".into())]),
            )
            .await
            .unwrap();

        let requests = client.requests.lock().unwrap();
        assert!(requests[0].form.is_none());
        assert_eq!(
            requests[0].url.as_str(),
            "https://www.amazon.com/errors/validateCaptcha?field-keywords=XYZ"
        );
    }

    #[tokio::test]
    async fn stored_cookies_ride_on_requests() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(StubClient::new(vec![response(
            200,
            "https://www.amazon.com/",
            HeaderMap::new(),
            "ok",
        )]));
        let mut transport = transport(client.clone(), dir.path());
        transport.cookies_mut().insert("session-token", "tok");

        transport
            .execute(Method::GET, base_url(), RequestOptions::new())
            .await
            .unwrap();

        let requests = client.requests.lock().unwrap();
        assert_eq!(
            requests[0].headers.get(COOKIE).unwrap(),
            "session-token=tok"
        );
    }

    #[tokio::test]
    async fn debug_captures_get_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(StubClient::new(vec![
            response(200, "https://www.amazon.com/gp/sign-in.html", HeaderMap::new(), "one"),
            response(200, "https://www.amazon.com/gp/sign-in.html", HeaderMap::new(), "two"),
        ]));
        let mut transport = Transport::new(
            client,
            &base_url(),
            dir.path().join("cookies.json"),
            true,
            dir.path().to_path_buf(),
        )
        .unwrap();

        let url = Url::parse("https://www.amazon.com/gp/sign-in.html").unwrap();
        transport
            .execute(Method::GET, url.clone(), RequestOptions::new())
            .await
            .unwrap();
        transport
            .execute(Method::GET, url, RequestOptions::new())
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("sign-in_0.html")).unwrap(),
            "one"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("sign-in_1.html")).unwrap(),
            "two"
        );
    }
}
