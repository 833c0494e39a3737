//! Session orchestration.
//!
//! [`AppLoader::load_app`] turns one inbound request into a redirect that
//! carries the browser into an authenticated app session:
//!
//! 1. a cached transition for the account/app is replayed against the app
//!    and its cookies are reused when it still lands on an authenticated page;
//! 2. otherwise the app home is fetched with a fresh cookie jar and, if it
//!    shows a login form, the profile's login request is submitted;
//! 3. a post-login redirect may lead to a registration form (submitted once),
//!    to a login landing page, or anywhere else (relayed to the browser);
//! 4. whatever the outcome, the cookies gathered so far (or the reused ones)
//!    are cached as a new transition aimed at the requested app, and the
//!    browser is sent to the transition endpoint.
//!
//! Failed logins and registrations are not errors: the user ends up on the
//! app's own page and can log in by hand.

use actix_web::HttpResponse;
use common::{Account, AuthTransition, Config};
use std::sync::Arc;
use url::Url;

use crate::error::{LoaderError, LoaderResult, UpstreamError};
use crate::profile::{AppRuntime, AuthProfile, LoginContext, RedirectKind};
use crate::redirects::follow_redirects;
use crate::responder::{temporary_redirect, TransitionResponder};
use crate::store::KeyValueStore;
use crate::transition_cache::TransitionCache;
use crate::upstream::{CookieJar, UpstreamClient, UpstreamRequest, UpstreamResponse};

/// Where the browser goes next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Pick up the cached session at the transition endpoint
    Transition { transition_id: String, location: String },
    /// Upstream redirected somewhere off-app; the browser goes there as-is
    Relay { transition_id: String, location: String },
}

impl LoadOutcome {
    pub fn location(&self) -> &str {
        match self {
            LoadOutcome::Transition { location, .. } | LoadOutcome::Relay { location, .. } => location,
        }
    }

    pub fn transition_id(&self) -> &str {
        match self {
            LoadOutcome::Transition { transition_id, .. }
            | LoadOutcome::Relay { transition_id, .. } => transition_id,
        }
    }

    pub fn into_response(self) -> HttpResponse {
        temporary_redirect(self.location())
    }
}

pub struct AppLoader {
    public_uri_base: String,
    cache: TransitionCache,
    upstream: Arc<dyn UpstreamClient>,
    responder: TransitionResponder,
}

impl AppLoader {
    pub fn new(
        public_uri_base: impl Into<String>,
        cache: TransitionCache,
        upstream: Arc<dyn UpstreamClient>,
        responder: TransitionResponder,
    ) -> Self {
        Self {
            public_uri_base: public_uri_base.into(),
            cache,
            upstream,
            responder,
        }
    }

    pub fn from_config(
        config: &Config,
        store: Arc<dyn KeyValueStore>,
        upstream: Arc<dyn UpstreamClient>,
    ) -> Result<Self, url::ParseError> {
        let ttl = std::time::Duration::from_secs(config.cache.ttl_secs);
        Ok(Self::new(
            config.public_uri_base.clone(),
            TransitionCache::with_ttl(store, ttl),
            upstream,
            TransitionResponder::from_config(config)?,
        ))
    }

    pub fn cache(&self) -> &TransitionCache {
        &self.cache
    }

    /// Absolute URL of `app` on this platform
    pub fn app_url(&self, app: &AppRuntime) -> LoaderResult<Url> {
        let url = app.details.app_url(&self.public_uri_base);
        Url::parse(&url).map_err(|source| LoaderError::InvalidAppUrl { url, source })
    }

    pub async fn load_app(
        &self,
        account: &Account,
        app: &AppRuntime,
        ctx: &LoginContext,
    ) -> LoaderResult<LoadOutcome> {
        let app_url = self.app_url(app)?;
        let profile = app.profile.as_ref();
        let app_home = app_url
            .join(profile.home_path())
            .map_err(|source| LoaderError::InvalidAppUrl {
                url: format!("{}{}", app_url, profile.home_path()),
                source,
            })?;

        // If already logged in once, verify the session still works and reuse it
        tracing::info!("load_app: looking for pre-existing auth transition for {} on {}", account.name, app.name());
        if let Some(cached) = self.cache.lookup(account, app_url.as_str()).await {
            tracing::info!("load_app: found auth transition {}, verifying", cached.uuid);
            if let Some(jar) = self.verify_cached(&cached, profile, &app_home).await? {
                tracing::info!("load_app: auth transition {} is still valid, sending to app", cached.uuid);
                // Variants share the cached session, each needs its own destination
                return self.send_to_app(account, &app_url, app_home.as_str(), jar).await;
            }
            tracing::info!("load_app: auth transition {} no longer logs in, discarding", cached.uuid);
            self.cache.invalidate(&cached).await;
        }

        // Fresh jar; the home page often sets cookies and tokens the login needs
        let mut jar = CookieJar::new();
        let response = self
            .upstream
            .execute(&UpstreamRequest::get(app_home.clone()), &mut jar)
            .await?;
        let page = match follow_redirects(self.upstream.as_ref(), response, &mut jar).await? {
            Some(page) if page.is_success() && profile.is_login_page(page.document()) => page,
            Some(_) => {
                // error page, or no login gate: let the app speak for itself
                return self.send_to_app(account, &app_url, app_home.as_str(), jar).await;
            }
            None => {
                tracing::warn!("load_app: too many redirects loading {}, sending to main app page", app_home);
                return self.send_to_app(account, &app_url, app_home.as_str(), jar).await;
            }
        };

        tracing::info!("load_app: attempting login for {} account {}", app.name(), account.name);
        let login = profile.build_login_request(account, &page, ctx, &app_url)?;
        let response = self.upstream.execute(&login, &mut jar).await?;
        if !response.is_success() || profile.is_login_page(response.document()) {
            tracing::warn!("load_app: login to {} failed for {}, sending to main app page", app.name(), account.name);
            return self.send_to_app(account, &app_url, app_home.as_str(), jar).await;
        }

        let Some(location) = response.redirect_location().map(str::to_string) else {
            return self.send_to_app(account, &app_url, app_home.as_str(), jar).await;
        };
        let Some(kind) = profile.classify_redirect(&location) else {
            return self.send_to_app(account, &app_url, app_home.as_str(), jar).await;
        };

        match kind {
            RedirectKind::Registration => {
                let Some(resolved) = follow_redirects(self.upstream.as_ref(), response, &mut jar).await? else {
                    tracing::warn!("load_app: too many redirects after login, sending to main app page");
                    return self.send_to_app(account, &app_url, app_home.as_str(), jar).await;
                };
                if resolved.is_success() && profile.is_registration_page(resolved.document()) {
                    self.attempt_registration(account, profile, &resolved, ctx, &app_url, &mut jar)
                        .await?;
                }
                self.send_to_app(account, &app_url, app_home.as_str(), jar).await
            }
            RedirectKind::Login => {
                let Some(resolved) = follow_redirects(self.upstream.as_ref(), response, &mut jar).await? else {
                    tracing::warn!("load_app: too many redirects after login, sending to main app page");
                    return self.send_to_app(account, &app_url, app_home.as_str(), jar).await;
                };
                if resolved.is_success() && !profile.is_login_page(resolved.document()) {
                    let landing = resolved.url.to_string();
                    return self.send_to_app(account, &app_url, &landing, jar).await;
                }
                self.send_to_app(account, &app_url, app_home.as_str(), jar).await
            }
            RedirectKind::Relay => self.relay(account, &app_url, &location, jar).await,
        }
    }

    /// Replay the cached cookies against the app home. Returns the jar,
    /// including anything the app refreshed, when the session still works.
    async fn verify_cached(
        &self,
        cached: &AuthTransition,
        profile: &dyn AuthProfile,
        app_home: &Url,
    ) -> LoaderResult<Option<CookieJar>> {
        let mut jar = CookieJar::from_cookies(cached.cookies.clone());
        let response = self
            .upstream
            .execute(&UpstreamRequest::get(app_home.clone()), &mut jar)
            .await?;
        let resolved = follow_redirects(self.upstream.as_ref(), response, &mut jar).await?;

        let valid = match resolved {
            Some(page) => {
                tracing::info!("load_app: verification returned {}, checking for a login page", page.status);
                page.is_success() && !profile.is_login_page(page.document())
            }
            None => false,
        };
        Ok(valid.then_some(jar))
    }

    async fn attempt_registration(
        &self,
        account: &Account,
        profile: &dyn AuthProfile,
        page: &UpstreamResponse,
        ctx: &LoginContext,
        app_url: &Url,
        jar: &mut CookieJar,
    ) -> LoaderResult<()> {
        let Some(request) = profile.build_registration_request(account, page, ctx, app_url)? else {
            tracing::warn!("load_app: registration page found but no registration form configured");
            return Ok(());
        };

        tracing::info!("load_app: registering account {} at {}", account.name, request.url);
        let response = self.upstream.execute(&request, jar).await?;
        if !response.is_success() || profile.is_registration_page(response.document()) {
            tracing::warn!("load_app: registration failed for {}, sending to main app page", account.name);
        }
        Ok(())
    }

    /// Hand an unclassified redirect back to the browser
    async fn relay(
        &self,
        account: &Account,
        app_url: &Url,
        location: &str,
        jar: CookieJar,
    ) -> LoaderResult<LoadOutcome> {
        let outcome = self.send_to_app(account, app_url, location, jar).await?;
        let off_app = Url::parse(location)
            .ok()
            .is_some_and(|target| target.host_str() != app_url.host_str());

        if !off_app {
            return Ok(outcome);
        }
        tracing::info!("load_app: relaying redirect to {}", location);
        Ok(LoadOutcome::Relay {
            transition_id: outcome.transition_id().to_string(),
            location: location.to_string(),
        })
    }

    /// Cache the cookies gathered so far and point the browser at the
    /// transition endpoint; `location` is resolved against the app URL
    pub async fn send_to_app(
        &self,
        account: &Account,
        app_url: &Url,
        location: &str,
        jar: CookieJar,
    ) -> LoaderResult<LoadOutcome> {
        let destination = app_url.join(location).map_err(UpstreamError::from)?;
        let transition = AuthTransition::new(destination.to_string(), jar.into_cookies());

        self.cache.store(account, app_url.as_str(), &transition).await?;

        Ok(LoadOutcome::Transition {
            location: self.responder.transition_location(app_url.as_str(), &transition.uuid),
            transition_id: transition.uuid,
        })
    }
}
