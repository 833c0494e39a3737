// app-loader/tests/support/mod.rs
#![allow(dead_code)]

use app_loader::error::{StoreError, UpstreamError};
use app_loader::store::{KeyValueStore, MemoryStore};
use app_loader::upstream::{CookieJar, UpstreamClient, UpstreamRequest, UpstreamResponse};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const ROUNDCUBE_LOGIN_PAGE: &str = r#"<html><body>
<form name="form" method="post" action="./?_task=login">
<input type="hidden" name="_token" value="tok&amp;42">
<input name="_user" id="rcmloginuser" type="text">
<input name="_pass" id="rcmloginpwd" type="password">
<button type="submit" id="rcmloginsubmit">Login</button>
</form></body></html>"#;

pub const ROUNDCUBE_INBOX: &str = "<html><body><div id=\"messagelist\">Inbox</div></body></html>";

type Handler = dyn Fn(&UpstreamRequest, &CookieJar) -> Result<UpstreamResponse, UpstreamError> + Send + Sync;

/// Upstream double answering from a closure, recording every request
pub struct ScriptedUpstream {
    handler: Box<Handler>,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl ScriptedUpstream {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&UpstreamRequest, &CookieJar) -> Result<UpstreamResponse, UpstreamError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<UpstreamRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "POST")
            .collect()
    }
}

#[async_trait]
impl UpstreamClient for ScriptedUpstream {
    async fn execute(
        &self,
        request: &UpstreamRequest,
        jar: &mut CookieJar,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.requests.lock().unwrap().push(request.clone());
        let response = (self.handler)(request, jar)?;
        for (name, value) in &response.headers {
            if name.eq_ignore_ascii_case("set-cookie") {
                jar.absorb_set_cookie(&request.url, value);
            }
        }
        Ok(response)
    }
}

/// A small Roundcube: password `secret` logs in, sessions can be revoked
#[derive(Clone, Default)]
pub struct FakeRoundcube {
    issued: Arc<AtomicUsize>,
    revoked: Arc<Mutex<HashSet<String>>>,
}

impl FakeRoundcube {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke_all(&self) {
        let issued = self.issued.load(Ordering::SeqCst);
        let mut revoked = self.revoked.lock().unwrap();
        for n in 1..=issued {
            revoked.insert(format!("auth-{}", n));
        }
    }

    pub fn upstream(&self) -> ScriptedUpstream {
        let server = self.clone();
        ScriptedUpstream::new(move |request, jar| Ok(server.handle(request, jar)))
    }

    fn handle(&self, request: &UpstreamRequest, jar: &CookieJar) -> UpstreamResponse {
        let url = request.url.clone();
        if request.method == "POST" {
            if request.form_value("_pass") == Some("secret") {
                let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
                return UpstreamResponse::new(url, 302, "")
                    .with_header("Location", "./?_task=mail")
                    .with_header("Set-Cookie", format!("roundcube_sessauth=auth-{}; Path=/; HttpOnly", n));
            }
            return UpstreamResponse::new(url, 200, ROUNDCUBE_LOGIN_PAGE);
        }

        let authenticated = jar.get("roundcube_sessauth").is_some_and(|c| {
            !self.revoked.lock().unwrap().contains(&c.value)
        });
        if authenticated {
            UpstreamResponse::new(url, 200, ROUNDCUBE_INBOX)
        } else {
            UpstreamResponse::new(url, 200, ROUNDCUBE_LOGIN_PAGE)
                .with_header("Set-Cookie", "roundcube_sessid=pre-login; Path=/")
        }
    }
}

/// Store whose every operation fails
pub struct BrokenStore;

#[async_trait]
impl KeyValueStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn set_if_absent(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<bool, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
}

/// In-memory store that records the key and TTL of every write
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    writes: Mutex<Vec<(String, Duration)>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<(String, Duration)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeyValueStore for RecordingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.writes.lock().unwrap().push((key.to_string(), ttl));
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }
}

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}
