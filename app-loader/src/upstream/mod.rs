//! Outbound HTTP to upstream apps.
//!
//! Every call takes the request-scoped [`CookieJar`] explicitly: cookies it
//! holds are sent, and `Set-Cookie` headers in the reply are folded back in.

pub mod cookies;

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::error::UpstreamError;
pub use cookies::CookieJar;

/// One outbound request: a GET, or a form submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub method: String,
    pub url: Url,
    /// Sent `application/x-www-form-urlencoded` when not empty
    pub form: Vec<(String, String)>,
}

impl UpstreamRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            form: Vec::new(),
        }
    }

    pub fn form(method: impl Into<String>, url: Url, form: Vec<(String, String)>) -> Self {
        Self {
            method: method.into(),
            url,
            form,
        }
    }

    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Snapshot of one upstream response
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// URL of the request that produced this response
    pub url: Url,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl UpstreamResponse {
    pub fn new(url: Url, status: u16, body: impl Into<String>) -> Self {
        Self {
            url,
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Anything below 400: redirects count as success, the follower resolves them
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    pub fn is_3xx(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// First value of a header, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `Location` of a redirect response, `None` for anything else
    pub fn redirect_location(&self) -> Option<&str> {
        if self.is_3xx() {
            self.header("location")
        } else {
            None
        }
    }

    pub fn document(&self) -> &str {
        &self.body
    }
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn execute(
        &self,
        request: &UpstreamRequest,
        jar: &mut CookieJar,
    ) -> Result<UpstreamResponse, UpstreamError>;
}

/// reqwest-backed client; redirects are left to the redirect follower
#[derive(Clone, Debug)]
pub struct HttpUpstream {
    http_client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> Result<Self, UpstreamError> {
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn execute(
        &self,
        request: &UpstreamRequest,
        jar: &mut CookieJar,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| UpstreamError::InvalidMethod(request.method.clone()))?;

        let mut builder = self.http_client.request(method, request.url.clone());
        if let Some(cookie_header) = jar.header_for(&request.url) {
            builder = builder.header(reqwest::header::COOKIE, cookie_header);
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        tracing::debug!(method = %request.method, url = %request.url, "Sending upstream request");

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let url = response.url().clone();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        for (name, value) in &headers {
            if name.eq_ignore_ascii_case("set-cookie") {
                jar.absorb_set_cookie(&url, value);
            }
        }

        let body = response.text().await?;
        tracing::debug!(status, url = %url, cookies = jar.len(), "Upstream responded");

        Ok(UpstreamResponse {
            url,
            status,
            headers,
            body,
        })
    }
}
