//! Reqwest-based implementation of the `HttpClient` trait.

use async_trait::async_trait;
use http::{HeaderMap, Method};
use reqwest::{Client, redirect::Policy};
use url::Url;

use super::{HttpClient, HttpClientError, RawResponse, TransportError};

/// Reqwest-backed client used for live sessions.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Creates a client with redirects disabled so the transport can record
    /// cookies on every hop before following the redirect itself.
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(|err| {
                TransportError::Client(HttpClientError::Transport(err.to_string()))
            })?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client. The client should already have
    /// redirects disabled; otherwise intermediate 30x responses, and the
    /// cookies they set, are never observed.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        form: Option<&[(String, String)]>,
    ) -> Result<RawResponse, HttpClientError> {
        let mut builder = self
            .client
            .request(method.clone(), url.as_str())
            .headers(headers.clone());

        if let Some(fields) = form {
            builder = builder.form(fields);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| HttpClientError::Transport(err.to_string()))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| HttpClientError::Transport(err.to_string()))?;

        Ok(RawResponse {
            status,
            headers,
            body,
            url,
        })
    }
}
