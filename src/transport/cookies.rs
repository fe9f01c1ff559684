//! Persisted cookie store.
//!
//! Amazon session cookies are kept as a flat name -> value map, checkpointed
//! to a JSON file after every request so the session survives process
//! restarts. The file is fully overwritten each time; a persistence failure
//! therefore shows up as a missing file, never a corrupted partial one.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use http::HeaderMap;
use http::header::SET_COOKIE;

use super::TransportError;

/// In-memory cookie state shared by every request on a session.
#[derive(Debug, Clone, Default)]
pub struct CookieStore {
    cookies: HashMap<String, String>,
}

impl CookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load cookies from a previously persisted jar file. A missing file
    /// yields an empty store; a present but unreadable file is an error.
    pub fn load(path: &Path) -> Result<Self, TransportError> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let raw = fs::read_to_string(path)?;
        let cookies: HashMap<String, String> = serde_json::from_str(&raw)
            .map_err(|err| TransportError::CookieJar(path.display().to_string(), err.to_string()))?;

        Ok(Self { cookies })
    }

    /// Overwrite the jar file with the current cookie state. The old file is
    /// removed before the new one is written.
    pub fn persist(&self, path: &Path) -> Result<(), TransportError> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
            && !dir.exists()
        {
            fs::create_dir_all(dir)?;
        }

        if path.exists() {
            fs::remove_file(path)?;
        }

        let raw = serde_json::to_string(&self.cookies)
            .map_err(|err| TransportError::CookieJar(path.display().to_string(), err.to_string()))?;
        fs::write(path, raw)?;

        Ok(())
    }

    /// Delete the jar file. Idempotent: a missing file is not an error.
    pub fn remove_jar(path: &Path) -> Result<(), TransportError> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Record every `Set-Cookie` header from a response hop.
    pub fn record_response(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            if let Ok(raw) = value.to_str()
                && let Some((name, value)) = parse_set_cookie(raw)
            {
                self.cookies.insert(name, value);
            }
        }
    }

    /// Render the `Cookie` request header for the current state, or `None`
    /// when the store is empty.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let mut pairs: Vec<_> = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        pairs.sort();
        Some(pairs.join("; "))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.cookies
    }
}

/// Extract the name/value pair from a raw `Set-Cookie` value, ignoring
/// attributes such as Path, Expires, and Secure.
fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn records_set_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("session-token=abc123; Path=/; Secure; HttpOnly"),
        );
        headers.append(SET_COOKIE, HeaderValue::from_static("x-main=xyz"));

        let mut store = CookieStore::new();
        store.record_response(&headers);

        assert_eq!(store.get("session-token"), Some("abc123"));
        assert_eq!(store.get("x-main"), Some("xyz"));
    }

    #[test]
    fn later_set_cookie_replaces_earlier_value() {
        let mut store = CookieStore::new();
        store.insert("session-id", "old");

        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("session-id=new"));
        store.record_response(&headers);

        assert_eq!(store.get("session-id"), Some("new"));
    }

    #[test]
    fn ignores_malformed_set_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("no-equals-sign"));
        headers.append(SET_COOKIE, HeaderValue::from_static("=orphan-value"));

        let mut store = CookieStore::new();
        store.record_response(&headers);
        assert!(store.is_empty());
    }

    #[test]
    fn cookie_header_joins_pairs() {
        let mut store = CookieStore::new();
        assert_eq!(store.cookie_header(), None);

        store.insert("a", "1");
        store.insert("b", "2");
        assert_eq!(store.cookie_header().as_deref(), Some("a=1; b=2"));
    }

    #[test]
    fn jar_round_trip_preserves_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");

        let mut store = CookieStore::new();
        store.insert("session-token", "abc123");
        store.insert("x-main", "xyz");
        store.persist(&path).unwrap();

        let reloaded = CookieStore::load(&path).unwrap();
        assert_eq!(reloaded.as_map(), store.as_map());
    }

    #[test]
    fn load_missing_jar_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = CookieStore::load(&dir.path().join("missing.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn remove_jar_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");

        CookieStore::new().persist(&path).unwrap();
        CookieStore::remove_jar(&path).unwrap();
        assert!(!path.exists());
        CookieStore::remove_jar(&path).unwrap();
    }
}
