//! Core data structures shared across challenge classification and handling layers.

use http::Method;
use scraper::{Html, Selector};
use url::Url;

/// Immutable pairing of raw response metadata and its parsed document form.
///
/// Only the most recent snapshot is retained by the transport; each request
/// replaces it wholesale. The HTML body is stored as text and parsed on
/// demand so the snapshot stays `Send` across await points.
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    status: u16,
    url: Url,
    body: String,
}

impl ResponseSnapshot {
    pub fn new(status: u16, url: Url, body: String) -> Self {
        Self { status, url, body }
    }

    /// HTTP status code of the final response hop.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Final URL after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Raw response body text.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Parse the body into a queryable document.
    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }

    /// Whether any element matches the selector.
    pub fn has_element(&self, selector: &Selector) -> bool {
        self.document().select(selector).next().is_some()
    }

    /// Text content of the first element matching the selector, trimmed.
    pub fn element_text(&self, selector: &Selector) -> Option<String> {
        let document = self.document();
        let element = document.select(selector).next()?;
        let text = element.text().collect::<String>().trim().to_string();
        Some(text)
    }

    /// Value of `attr` on the first element matching the selector.
    pub fn element_attr(&self, selector: &Selector, attr: &str) -> Option<String> {
        let document = self.document();
        let element = document.select(selector).next()?;
        element.attr(attr).map(str::to_string)
    }
}

/// How a submission payload travels on the wire.
///
/// The two CAPTCHA presentations differ here: the widget form posts a body
/// while the inline form passes its fields as query parameters. Both are
/// preserved as observed external contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    /// URL-encoded request body.
    Form,
    /// Query parameters appended to the target URL.
    Query,
}

/// Planned submission produced by a challenge handler.
///
/// Field order follows the source form's input order so the payload mirrors
/// what a browser would send.
#[derive(Debug, Clone)]
pub struct ChallengeSubmission {
    pub method: Method,
    pub url: Url,
    pub fields: Vec<(String, String)>,
    pub encoding: PayloadEncoding,
}

impl ChallengeSubmission {
    pub fn new(method: Method, url: Url, fields: Vec<(String, String)>) -> Self {
        Self {
            method,
            url,
            fields,
            encoding: PayloadEncoding::Form,
        }
    }

    pub fn with_encoding(mut self, encoding: PayloadEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Value of a payload field, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}
