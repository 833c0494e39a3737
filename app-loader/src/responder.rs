// app-loader/src/responder.rs
use actix_web::{http::header, HttpResponse};
use common::Config;
use url::Url;

/// Path, below the platform or app root, that replays a cached transition
pub const TRANSITION_PATH: &str = "__cloudos__/api/app/auth/";

/// Builds the browser-facing redirect that hands a transition off
#[derive(Debug, Clone)]
pub struct TransitionResponder {
    /// `scheme://hostname[:port]` of the platform
    platform_root: String,
    hostname: String,
}

impl TransitionResponder {
    pub fn new(public_uri_base: &str, hostname: impl Into<String>) -> Result<Self, url::ParseError> {
        let public = Url::parse(public_uri_base)?;
        let hostname = hostname.into();
        let platform_root = match public.port() {
            Some(port) => format!("{}://{}:{}", public.scheme(), hostname, port),
            None => format!("{}://{}", public.scheme(), hostname),
        };
        Ok(Self {
            platform_root,
            hostname,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, url::ParseError> {
        Self::new(&config.public_uri_base, config.hostname.clone())
    }

    /// Where the browser picks up transition `id` for the app at `app_url`.
    ///
    /// Apps served from the platform's own host all share the platform
    /// root, virtual-hostname apps get the endpoint below their own URL.
    pub fn transition_location(&self, app_url: &str, id: &str) -> String {
        let same_host = Url::parse(app_url)
            .ok()
            .and_then(|url| url.host_str().map(|h| h.eq_ignore_ascii_case(&self.hostname)))
            .unwrap_or(false);

        let mut base = if same_host {
            self.platform_root.clone()
        } else {
            app_url
                .split_once('?')
                .map_or(app_url, |(path, _)| path)
                .to_string()
        };
        if !base.ends_with('/') {
            base.push('/');
        }
        format!("{}{}{}", base, TRANSITION_PATH, id)
    }
}

/// 307 to `location`
pub fn temporary_redirect(location: &str) -> HttpResponse {
    HttpResponse::TemporaryRedirect()
        .insert_header((header::LOCATION, location))
        .finish()
}
