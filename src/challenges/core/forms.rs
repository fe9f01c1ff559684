//! Form extraction helpers.
//!
//! Challenge pages are driven by plain HTML forms. Handlers pull a
//! [`FormDescriptor`] out of the current snapshot, overlay their own fields
//! onto the captured values, and hand the result back for submission. Keeping
//! extraction separate from submission lets handlers be exercised against
//! synthetic descriptors without a live document.

use http::Method;
use scraper::{ElementRef, Selector};
use thiserror::Error;
use url::Url;

use super::types::ResponseSnapshot;

/// Structured extraction of a submittable form: declared method, raw action
/// attribute, and the ordered name/value pairs of its inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormDescriptor {
    pub method: Method,
    pub action: Option<String>,
    pub fields: Vec<(String, String)>,
}

/// Failures while locating or resolving a form.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("no form matching '{0}' in the current page")]
    NotFound(String),
    #[error("form action '{0}' does not resolve to a URL: {1}")]
    InvalidAction(String, url::ParseError),
}

impl FormDescriptor {
    /// Extract the first form matching `selector` from the snapshot. The
    /// `marker` names the selector in error messages.
    pub fn first_matching(
        snapshot: &ResponseSnapshot,
        selector: &Selector,
        marker: &str,
    ) -> Result<Self, FormError> {
        let document = snapshot.document();
        document
            .select(selector)
            .next()
            .map(Self::from_element)
            .ok_or_else(|| FormError::NotFound(marker.to_string()))
    }

    /// Extract the first form that contains an element matching `inner`.
    ///
    /// Used for pages where the form itself carries no stable identifier and
    /// only one of its inputs does.
    pub fn containing(
        snapshot: &ResponseSnapshot,
        inner: &Selector,
        marker: &str,
    ) -> Result<Self, FormError> {
        static FORM: once_cell::sync::Lazy<Selector> =
            once_cell::sync::Lazy::new(|| Selector::parse("form").expect("invalid form selector"));

        let document = snapshot.document();
        document
            .select(&FORM)
            .find(|form| form.select(inner).next().is_some())
            .map(Self::from_element)
            .ok_or_else(|| FormError::NotFound(marker.to_string()))
    }

    pub(crate) fn from_element(form: ElementRef<'_>) -> Self {
        static INPUT: once_cell::sync::Lazy<Selector> =
            once_cell::sync::Lazy::new(|| Selector::parse("input").expect("invalid input selector"));

        let method = match form.attr("method") {
            Some(raw) if raw.eq_ignore_ascii_case("post") => Method::POST,
            _ => Method::GET,
        };

        // Only inputs carrying both a name and a value are captured; unnamed
        // or valueless inputs are the ones handlers fill in themselves.
        // Repeated names (radio groups) collapse to one field keeping the
        // first position and the last value.
        let mut fields: Vec<(String, String)> = Vec::new();
        for input in form.select(&INPUT) {
            let (Some(name), Some(value)) = (input.attr("name"), input.attr("value")) else {
                continue;
            };
            if let Some(slot) = fields.iter_mut().find(|(key, _)| key == name) {
                slot.1 = value.to_string();
            } else {
                fields.push((name.to_string(), value.to_string()));
            }
        }

        Self {
            method,
            action: form.attr("action").map(str::to_string),
            fields,
        }
    }

    /// Resolve the submission target. A missing action falls back to the
    /// page's own URL; a relative action resolves against `prefix` when one
    /// is given, otherwise against the page URL, the way a browser would.
    pub fn resolve_action(
        &self,
        page_url: &Url,
        prefix: Option<&Url>,
    ) -> Result<Url, FormError> {
        let Some(action) = self.action.as_deref() else {
            return Ok(page_url.clone());
        };

        if action.starts_with("http") {
            return Url::parse(action)
                .map_err(|err| FormError::InvalidAction(action.to_string(), err));
        }

        let base = prefix.unwrap_or(page_url);
        base.join(action)
            .map_err(|err| FormError::InvalidAction(action.to_string(), err))
    }

    /// Copy the captured fields and overlay handler-specific values. An
    /// overlay replaces an existing field's value in place (preserving
    /// order) or appends when the field is new.
    pub fn payload(&self, overlays: Vec<(String, String)>) -> Vec<(String, String)> {
        let mut fields = self.fields.clone();
        for (name, value) in overlays {
            if let Some(slot) = fields.iter_mut().find(|(key, _)| *key == name) {
                slot.1 = value;
            } else {
                fields.push((name, value));
            }
        }
        fields
    }
}
