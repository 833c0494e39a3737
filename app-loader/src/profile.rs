//! Per-app login behaviour.
//!
//! The loader drives every app through the [`AuthProfile`] capability set;
//! [`ConfigurableAuthProfile`] implements it from an [`AppAuthConfig`] and the
//! [`AppRegistry`] maps app names to their runtime at request time.

use common::{Account, AppAuthConfig, AppRuntimeDetails, Config};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};
use url::Url;

use crate::error::{ProfileError, UpstreamError};
use crate::upstream::{UpstreamRequest, UpstreamResponse};

const TOKEN_ACCOUNT_NAME: &str = "{{account.name}}";
const TOKEN_ACCOUNT_PASSWORD: &str = "{{account.password}}";
const TOKEN_TIMEZONE_NAME: &str = "{{timezone-name}}";
const TOKEN_TIMEZONE_OFFSET: &str = "{{timezone-offset}}";

/// Field value meaning "copy the same-named input from the fetched page"
const PASS_THROUGH: &str = "pass";

static INPUT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<input\b[^>]*>").expect("valid input tag regex"));
static TAG_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\b(name|value)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid attribute regex")
});

/// Request-scoped values for the `{{timezone-*}}` tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginContext {
    pub timezone_name: String,
    pub timezone_offset: String,
}

impl LoginContext {
    pub fn new(timezone_name: impl Into<String>, timezone_offset: impl Into<String>) -> Self {
        Self {
            timezone_name: timezone_name.into(),
            timezone_offset: timezone_offset.into(),
        }
    }
}

/// How a post-login redirect is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    Registration,
    Login,
    /// Neither pattern matched, hand the location to the browser as-is
    Relay,
}

pub trait AuthProfile: Send + Sync {
    /// Path of the app's landing page, relative to the app URL
    fn home_path(&self) -> &str;

    fn is_login_page(&self, document: &str) -> bool;

    fn is_registration_page(&self, document: &str) -> bool;

    fn build_login_request(
        &self,
        account: &Account,
        page: &UpstreamResponse,
        ctx: &LoginContext,
        app_url: &Url,
    ) -> Result<UpstreamRequest, UpstreamError>;

    /// `None` when the app has no registration form
    fn build_registration_request(
        &self,
        account: &Account,
        page: &UpstreamResponse,
        ctx: &LoginContext,
        app_url: &Url,
    ) -> Result<Option<UpstreamRequest>, UpstreamError>;

    /// `None` when the profile defines no redirect rules at all
    fn classify_redirect(&self, location: &str) -> Option<RedirectKind>;
}

/// Auth profile driven entirely by configuration
#[derive(Debug, Clone)]
pub struct ConfigurableAuthProfile {
    config: AppAuthConfig,
    registration_redirect: Option<Regex>,
    login_redirect: Option<Regex>,
}

impl ConfigurableAuthProfile {
    pub fn new(app: &str, config: AppAuthConfig) -> Result<Self, ProfileError> {
        let registration_redirect = compile_pattern(app, "registration_redirect", &config.registration_redirect)?;
        let login_redirect = compile_pattern(app, "login_redirect", &config.login_redirect)?;
        Ok(Self {
            config,
            registration_redirect,
            login_redirect,
        })
    }

    pub fn config(&self) -> &AppAuthConfig {
        &self.config
    }
}

// Patterns must match the whole location
fn compile_pattern(
    app: &str,
    kind: &'static str,
    pattern: &Option<String>,
) -> Result<Option<Regex>, ProfileError> {
    match pattern.as_deref() {
        Some(p) if !p.is_empty() => Regex::new(&format!("^(?:{})$", p))
            .map(Some)
            .map_err(|source| ProfileError::InvalidPattern {
                app: app.to_string(),
                kind,
                source,
            }),
        _ => Ok(None),
    }
}

fn contains_any(document: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| !m.is_empty() && document.contains(m.as_str()))
}

fn render_fields(
    fields: &BTreeMap<String, String>,
    account: &Account,
    page: &UpstreamResponse,
    ctx: &LoginContext,
) -> Vec<(String, String)> {
    fields
        .iter()
        .map(|(name, template)| {
            let value = if template == PASS_THROUGH {
                input_value(page.document(), name).unwrap_or_else(|| {
                    tracing::debug!("No input named {} on {}, sending empty value", name, page.url);
                    String::new()
                })
            } else {
                template
                    .replace(TOKEN_ACCOUNT_NAME, &account.name)
                    .replace(TOKEN_ACCOUNT_PASSWORD, &account.password)
                    .replace(TOKEN_TIMEZONE_NAME, &ctx.timezone_name)
                    .replace(TOKEN_TIMEZONE_OFFSET, &ctx.timezone_offset)
            };
            (name.clone(), value)
        })
        .collect()
}

/// Value of the first `<input>` named `name` in an HTML document
pub fn input_value(document: &str, name: &str) -> Option<String> {
    INPUT_TAG.find_iter(document).find_map(|tag| {
        let mut tag_name = None;
        let mut tag_value = None;
        for attr in TAG_ATTR.captures_iter(tag.as_str()) {
            let raw = attr
                .get(2)
                .or_else(|| attr.get(3))
                .or_else(|| attr.get(4))
                .map_or("", |m| m.as_str());
            if attr[1].eq_ignore_ascii_case("name") {
                tag_name = Some(raw);
            } else {
                tag_value = Some(raw);
            }
        }
        (tag_name == Some(name)).then(|| unescape(tag_value.unwrap_or_default()))
    })
}

fn unescape(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

impl AuthProfile for ConfigurableAuthProfile {
    fn home_path(&self) -> &str {
        &self.config.home_path
    }

    fn is_login_page(&self, document: &str) -> bool {
        contains_any(document, &self.config.login_page_markers)
    }

    fn is_registration_page(&self, document: &str) -> bool {
        contains_any(document, &self.config.registration_page_markers)
    }

    fn build_login_request(
        &self,
        account: &Account,
        page: &UpstreamResponse,
        ctx: &LoginContext,
        app_url: &Url,
    ) -> Result<UpstreamRequest, UpstreamError> {
        let target = app_url.join(&self.config.login_path)?;
        let form = render_fields(&self.config.login_fields, account, page, ctx);
        Ok(UpstreamRequest::form(self.config.login_method.clone(), target, form))
    }

    fn build_registration_request(
        &self,
        account: &Account,
        page: &UpstreamResponse,
        ctx: &LoginContext,
        app_url: &Url,
    ) -> Result<Option<UpstreamRequest>, UpstreamError> {
        let Some(fields) = &self.config.registration_fields else {
            return Ok(None);
        };
        // Registration forms usually post back to the page they live on
        let target = match self.config.registration_path.as_deref() {
            Some(path) => app_url.join(path)?,
            None => page.url.clone(),
        };
        let form = render_fields(fields, account, page, ctx);
        Ok(Some(UpstreamRequest::form(
            self.config.registration_method.clone(),
            target,
            form,
        )))
    }

    fn classify_redirect(&self, location: &str) -> Option<RedirectKind> {
        if self.registration_redirect.is_none() && self.login_redirect.is_none() {
            return None;
        }
        // Registration wins when both patterns match
        if self.registration_redirect.as_ref().is_some_and(|re| re.is_match(location)) {
            Some(RedirectKind::Registration)
        } else if self.login_redirect.as_ref().is_some_and(|re| re.is_match(location)) {
            Some(RedirectKind::Login)
        } else {
            Some(RedirectKind::Relay)
        }
    }
}

/// An installed app: where it lives and how to log into it
#[derive(Clone)]
pub struct AppRuntime {
    pub details: AppRuntimeDetails,
    pub profile: Arc<dyn AuthProfile>,
}

impl AppRuntime {
    pub fn new(details: AppRuntimeDetails, profile: Arc<dyn AuthProfile>) -> Self {
        Self { details, profile }
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }
}

impl fmt::Debug for AppRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppRuntime")
            .field("details", &self.details)
            .finish_non_exhaustive()
    }
}

/// Installed apps keyed by logical name
#[derive(Debug, Clone, Default)]
pub struct AppRegistry {
    apps: BTreeMap<String, AppRuntime>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from the `apps` section of the configuration
    pub fn from_config(config: &Config) -> Result<Self, ProfileError> {
        let mut registry = Self::new();
        for (name, app) in &config.apps {
            let auth = app.auth.clone().unwrap_or_default();
            let profile = ConfigurableAuthProfile::new(name, auth)?;
            registry.register(AppRuntime::new(app.details(name), Arc::new(profile)));
        }
        tracing::info!("Registered {} apps: {:?}", registry.len(), registry.names());
        Ok(registry)
    }

    pub fn register(&mut self, app: AppRuntime) {
        self.apps.insert(app.name().to_string(), app);
    }

    pub fn get(&self, name: &str) -> Option<&AppRuntime> {
        self.apps.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.apps.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{roundcube_auth, APP_CALENDAR, APP_EMAIL, APP_FILES};

    const ROUNDCUBE_LOGIN: &str = r#"<form name="form" method="post" action="./?_task=login">
        <input type="hidden" name="_token" value="Zx9aQ&amp;1">
        <input name="_user" id="rcmloginuser" required size="40" autocomplete="off" type="text">
        <input name="_pass" id="rcmloginpwd" type="password">
        <input type='hidden' name='_timezone' id='rcmlogintz' value='_default_'>
        <button type="submit" id="rcmloginsubmit">Login</button></form>"#;

    fn page(body: &str) -> UpstreamResponse {
        UpstreamResponse::new(
            Url::parse("https://cloud.example.com/roundcube/").unwrap(),
            200,
            body,
        )
    }

    fn app_url() -> Url {
        Url::parse("https://cloud.example.com/roundcube/").unwrap()
    }

    fn profile_with_markers(markers: &[&str]) -> ConfigurableAuthProfile {
        let config = AppAuthConfig {
            login_page_markers: markers.iter().map(|m| m.to_string()).collect(),
            ..AppAuthConfig::default()
        };
        ConfigurableAuthProfile::new("test", config).unwrap()
    }

    #[test]
    fn test_is_login_page_with_no_markers_present() {
        let profile = profile_with_markers(&["rcmloginuser", "rcmloginpwd", "rcmloginsubmit"]);
        assert!(!profile.is_login_page("<html><body>Inbox (3)</body></html>"));
    }

    #[test]
    fn test_is_login_page_with_one_marker_present() {
        let profile = profile_with_markers(&["rcmloginuser", "rcmloginpwd", "rcmloginsubmit"]);
        assert!(profile.is_login_page(r#"<input id="rcmloginpwd">"#));
    }

    #[test]
    fn test_is_login_page_with_all_markers_present() {
        let profile = profile_with_markers(&["rcmloginuser", "rcmloginpwd", "rcmloginsubmit"]);
        assert!(profile.is_login_page(ROUNDCUBE_LOGIN));
    }

    #[test]
    fn test_no_markers_never_a_login_page() {
        let profile = ConfigurableAuthProfile::new("plain", AppAuthConfig::default()).unwrap();
        assert!(!profile.is_login_page(ROUNDCUBE_LOGIN));
        assert!(!profile.is_registration_page(ROUNDCUBE_LOGIN));
    }

    #[test]
    fn test_roundcube_login_request() {
        let profile = ConfigurableAuthProfile::new(APP_EMAIL, roundcube_auth()).unwrap();
        let account = Account::new("alice", "wonderland");
        let ctx = LoginContext::new("Europe/Berlin", "1");

        let request = profile
            .build_login_request(&account, &page(ROUNDCUBE_LOGIN), &ctx, &app_url())
            .unwrap();

        assert_eq!(request.method, "POST");
        assert_eq!(request.url.as_str(), "https://cloud.example.com/roundcube/?_task=login");
        assert_eq!(request.form_value("_user"), Some("alice"));
        assert_eq!(request.form_value("_pass"), Some("wonderland"));
        assert_eq!(request.form_value("_task"), Some("login"));
        assert_eq!(request.form_value("_timezone"), Some("Europe/Berlin"));
        assert_eq!(request.form_value("_token"), Some("Zx9aQ&1"));
    }

    #[test]
    fn test_login_fields_posted_sorted_by_name() {
        let profile = ConfigurableAuthProfile::new(APP_EMAIL, roundcube_auth()).unwrap();
        let account = Account::new("alice", "wonderland");
        let ctx = LoginContext::new("Europe/Berlin", "1");

        let request = profile
            .build_login_request(&account, &page(ROUNDCUBE_LOGIN), &ctx, &app_url())
            .unwrap();

        let names: Vec<&str> = request.form.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["_action", "_pass", "_task", "_timezone", "_token", "_url", "_user"]);
    }

    #[test]
    fn test_login_path_resolves_from_query_app_url() {
        let profile = ConfigurableAuthProfile::new(APP_CALENDAR, roundcube_auth()).unwrap();
        let calendar = Url::parse("https://cloud.example.com/roundcube/?_task=calendar").unwrap();
        let request = profile
            .build_login_request(
                &Account::new("alice", "pw"),
                &page(ROUNDCUBE_LOGIN),
                &LoginContext::new("UTC", "0"),
                &calendar,
            )
            .unwrap();
        assert_eq!(request.url.as_str(), "https://cloud.example.com/roundcube/?_task=login");
    }

    #[test]
    fn test_pass_through_missing_input_is_empty() {
        let profile = ConfigurableAuthProfile::new(APP_EMAIL, roundcube_auth()).unwrap();
        let request = profile
            .build_login_request(
                &Account::new("alice", "pw"),
                &page("<html>no form</html>"),
                &LoginContext::new("UTC", "0"),
                &app_url(),
            )
            .unwrap();
        assert_eq!(request.form_value("_token"), Some(""));
    }

    #[test]
    fn test_input_value_handles_quote_styles() {
        assert_eq!(input_value(ROUNDCUBE_LOGIN, "_timezone").as_deref(), Some("_default_"));
        assert_eq!(input_value("<INPUT value=42 name=requesttoken>", "requesttoken").as_deref(), Some("42"));
        assert_eq!(input_value(ROUNDCUBE_LOGIN, "_user").as_deref(), Some(""));
        assert!(input_value(ROUNDCUBE_LOGIN, "missing").is_none());
    }

    #[test]
    fn test_registration_request_defaults_to_page_url() {
        let config = AppAuthConfig {
            registration_fields: Some(
                [("email".to_string(), "{{account.name}}@example.com".to_string())]
                    .into_iter()
                    .collect(),
            ),
            registration_method: "POST".to_string(),
            ..AppAuthConfig::default()
        };
        let profile = ConfigurableAuthProfile::new("wiki", config).unwrap();
        let signup = UpstreamResponse::new(
            Url::parse("https://cloud.example.com/wiki/signup").unwrap(),
            200,
            "",
        );
        let request = profile
            .build_registration_request(&Account::new("bob", "pw"), &signup, &LoginContext::new("UTC", "0"), &app_url())
            .unwrap()
            .unwrap();
        assert_eq!(request.url, signup.url);
        assert_eq!(request.form_value("email"), Some("bob@example.com"));

        let no_registration = ConfigurableAuthProfile::new("plain", AppAuthConfig::default()).unwrap();
        assert!(no_registration
            .build_registration_request(&Account::new("bob", "pw"), &signup, &LoginContext::new("UTC", "0"), &app_url())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_classify_redirect_precedence() {
        let config = AppAuthConfig {
            registration_redirect: Some(".*/register.*".to_string()),
            login_redirect: Some(".*/(register|home).*".to_string()),
            ..AppAuthConfig::default()
        };
        let profile = ConfigurableAuthProfile::new("wiki", config).unwrap();

        assert_eq!(profile.classify_redirect("/wiki/register?new=1"), Some(RedirectKind::Registration));
        assert_eq!(profile.classify_redirect("/wiki/home"), Some(RedirectKind::Login));
        assert_eq!(profile.classify_redirect("https://elsewhere.org/"), Some(RedirectKind::Relay));
    }

    #[test]
    fn test_classify_redirect_is_anchored() {
        let config = AppAuthConfig {
            login_redirect: Some("/wiki/home".to_string()),
            ..AppAuthConfig::default()
        };
        let profile = ConfigurableAuthProfile::new("wiki", config).unwrap();
        assert_eq!(profile.classify_redirect("/wiki/home"), Some(RedirectKind::Login));
        assert_eq!(profile.classify_redirect("/wiki/home/extra"), Some(RedirectKind::Relay));
    }

    #[test]
    fn test_classify_without_patterns_is_none() {
        let profile = ConfigurableAuthProfile::new(APP_EMAIL, roundcube_auth()).unwrap();
        assert_eq!(profile.classify_redirect("/roundcube/?_task=mail"), None);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = AppAuthConfig {
            login_redirect: Some("(unclosed".to_string()),
            ..AppAuthConfig::default()
        };
        let err = ConfigurableAuthProfile::new("wiki", config).unwrap_err();
        assert!(err.to_string().contains("login_redirect"));
    }

    #[test]
    fn test_registry_from_default_config() {
        let registry = AppRegistry::from_config(&Config::default()).unwrap();
        assert_eq!(registry.names(), vec![APP_CALENDAR, APP_EMAIL, APP_FILES]);
        let files = registry.get(APP_FILES).unwrap();
        assert_eq!(files.profile.home_path(), "index.php");
        assert!(registry.get("unknown").is_none());
    }
}
