// common/src/models/app.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifies one deployed variant of an app
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppRuntimeDetails {
    /// Logical name, used as the registry key
    pub name: String,
    /// Path below the public URI base, may carry a query string
    pub path: String,
    /// Virtual hostname prefix, e.g. `files` turns `https://example.com`
    /// into `https://files-example.com`
    #[serde(default)]
    pub hostname: Option<String>,
}

impl AppRuntimeDetails {
    pub fn new(name: impl Into<String>, path: impl Into<String>, hostname: Option<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            hostname,
        }
    }

    pub fn has_hostname(&self) -> bool {
        self.hostname.as_deref().is_some_and(|h| !h.is_empty())
    }

    pub fn has_path(&self) -> bool {
        !self.path.is_empty()
    }

    /// Resolve the absolute URL of this app against the platform's public URI base
    pub fn app_url(&self, public_uri_base: &str) -> String {
        let mut url = match self.hostname.as_deref() {
            Some(hostname) if !hostname.is_empty() => {
                public_uri_base.replacen("://", &format!("://{}-", hostname), 1)
            }
            _ => public_uri_base.to_string(),
        };

        if self.has_path() {
            match (url.ends_with('/'), self.path.starts_with('/')) {
                (false, false) => {
                    url.push('/');
                    url.push_str(&self.path);
                }
                (true, true) => url.push_str(&self.path[1..]),
                _ => url.push_str(&self.path),
            }
        }
        url
    }
}

fn default_method() -> String {
    "POST".to_string()
}

/// Scripted-login configuration for one app.
///
/// Field templates understand `{{account.name}}`, `{{account.password}}`,
/// `{{timezone-name}}` and `{{timezone-offset}}`. A template of exactly
/// `pass` copies the value of the same-named input from the page that was
/// fetched before the form is submitted.
///
/// Form fields are posted sorted by name, whatever order they were
/// configured in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppAuthConfig {
    #[serde(default)]
    pub login_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub login_path: String,
    #[serde(default = "default_method")]
    pub login_method: String,
    #[serde(default)]
    pub home_path: String,
    #[serde(default)]
    pub login_page_markers: Vec<String>,

    #[serde(default)]
    pub registration_fields: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub registration_path: Option<String>,
    #[serde(default = "default_method")]
    pub registration_method: String,
    #[serde(default)]
    pub registration_page_markers: Vec<String>,

    /// Regex matched against the whole `Location` of a post-login redirect
    #[serde(default)]
    pub registration_redirect: Option<String>,
    #[serde(default)]
    pub login_redirect: Option<String>,
}

impl Default for AppAuthConfig {
    fn default() -> Self {
        Self {
            login_fields: BTreeMap::new(),
            login_path: String::new(),
            login_method: default_method(),
            home_path: String::new(),
            login_page_markers: Vec::new(),
            registration_fields: None,
            registration_path: None,
            registration_method: default_method(),
            registration_page_markers: Vec::new(),
            registration_redirect: None,
            login_redirect: None,
        }
    }
}

impl AppAuthConfig {
    pub fn has_registration_redirect(&self) -> bool {
        self.registration_redirect.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub fn has_login_redirect(&self) -> bool {
        self.login_redirect.as_deref().is_some_and(|p| !p.is_empty())
    }
}
