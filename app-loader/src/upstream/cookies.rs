// app-loader/src/upstream/cookies.rs
use actix_web::cookie::time::OffsetDateTime;
use actix_web::cookie::Cookie;
use common::StoredCookie;
use url::Url;

/// Cookies accumulated across the upstream calls of one load request.
///
/// Keyed by cookie name: a later `Set-Cookie` replaces an earlier one and an
/// expired or emptied cookie is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<StoredCookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cookies(cookies: Vec<StoredCookie>) -> Self {
        let mut jar = Self::new();
        for cookie in cookies {
            jar.add(cookie);
        }
        jar
    }

    pub fn cookies(&self) -> &[StoredCookie] {
        &self.cookies
    }

    pub fn into_cookies(self) -> Vec<StoredCookie> {
        self.cookies
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&StoredCookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    /// Add a cookie, replacing any cookie with the same name in place
    pub fn add(&mut self, cookie: StoredCookie) {
        match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.cookies.retain(|c| c.name != name);
    }

    /// Apply one `Set-Cookie` header received from `origin`
    pub fn absorb_set_cookie(&mut self, origin: &Url, header: &str) {
        let parsed = match Cookie::parse(header.to_string()) {
            Ok(cookie) => cookie,
            Err(e) => {
                tracing::debug!("Ignoring unparseable Set-Cookie from {}: {}", origin, e);
                return;
            }
        };

        let expired = parsed.max_age().is_some_and(|age| age.is_zero() || age.is_negative())
            || parsed
                .expires_datetime()
                .is_some_and(|at| at <= OffsetDateTime::now_utc());

        if expired || parsed.value().is_empty() {
            self.remove(parsed.name());
            return;
        }

        let domain = parsed
            .domain()
            .map(|d| d.trim_start_matches('.').to_ascii_lowercase())
            .or_else(|| origin.host_str().map(|h| h.to_ascii_lowercase()));

        let path = parsed
            .path()
            .map(str::to_string)
            .unwrap_or_else(|| default_path(origin));

        self.add(StoredCookie {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            path: Some(path),
        });
    }

    /// Value for a `Cookie` request header, `None` when nothing applies
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let request_path = url.path();

        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| c.domain.as_deref().map_or(true, |d| domain_matches(&host, d)))
            .filter(|c| c.path.as_deref().map_or(true, |p| path_matches(request_path, p)))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}

// RFC 6265 5.1.4: directory of the request path
fn default_path(origin: &Url) -> String {
    let path = origin.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain || (host.ends_with(domain) && host[..host.len() - domain.len()].ends_with('.'))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}
