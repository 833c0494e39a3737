// common/src/config.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use config::{Config as ConfigFile, File, Environment};

use crate::models::{AppAuthConfig, AppRuntimeDetails};

pub const APP_EMAIL: &str = "email";
pub const APP_CALENDAR: &str = "calendar";
pub const APP_FILES: &str = "files";

/// Central configuration for the app loader
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub web_server_addr: String,
    /// Public base URI of the platform, apps are resolved below it
    pub public_uri_base: String,
    /// The platform's own hostname, used to collapse transition redirects
    pub hostname: String,
    pub log_level: String,

    // Used for `{{timezone-*}}` tokens when the request carries no timezone
    pub default_timezone_name: String,
    pub default_timezone_offset: String,

    pub cache: CacheConfig,
    pub upstream: UpstreamConfig,
    pub rate_limit: RateLimitConfig,

    /// Installed apps keyed by logical name
    pub apps: BTreeMap<String, AppConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub cleanup_interval_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_secs: u64,
    pub paths: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub path: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub auth: Option<AppAuthConfig>,
}

impl AppConfig {
    pub fn details(&self, name: &str) -> AppRuntimeDetails {
        AppRuntimeDetails::new(name, self.path.clone(), self.hostname.clone())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            cleanup_interval_secs: 3600,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_secs: 60,
            paths: vec!["/api/app/load".to_string()],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web_server_addr: "127.0.0.1:8081".to_string(),
            public_uri_base: "http://127.0.0.1:8081".to_string(),
            hostname: "127.0.0.1".to_string(),
            log_level: "info".to_string(),
            default_timezone_name: "Etc/UTC".to_string(),
            default_timezone_offset: "0".to_string(),
            cache: CacheConfig::default(),
            upstream: UpstreamConfig::default(),
            rate_limit: RateLimitConfig::default(),
            apps: default_apps(),
        }
    }
}

fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn markers(values: &[&str]) -> Vec<String> {
    values.iter().map(|m| m.to_string()).collect()
}

/// Login settings shared by the Roundcube mail and calendar variants
pub fn roundcube_auth() -> AppAuthConfig {
    AppAuthConfig {
        login_fields: fields(&[
            ("_user", "{{account.name}}"),
            ("_pass", "{{account.password}}"),
            ("_timezone", "{{timezone-name}}"),
            ("_task", "login"),
            ("_action", "login"),
            ("_url", "_task=login"),
            ("_token", "pass"),
        ]),
        login_path: "./?_task=login".to_string(),
        login_page_markers: markers(&["rcmloginuser", "rcmloginpwd", "_token", "rcmloginsubmit"]),
        ..AppAuthConfig::default()
    }
}

pub fn owncloud_auth() -> AppAuthConfig {
    AppAuthConfig {
        login_fields: fields(&[
            ("user", "{{account.name}}"),
            ("password", "{{account.password}}"),
            ("remember_login", "1"),
            ("timezone-offset", "{{timezone-offset}}"),
            ("requesttoken", "pass"),
        ]),
        home_path: "index.php".to_string(),
        login_path: "index.php".to_string(),
        login_page_markers: markers(&["<form method=\"post\" name=\"login\">", "class=\"login primary\""]),
        ..AppAuthConfig::default()
    }
}

pub fn default_apps() -> BTreeMap<String, AppConfig> {
    let mut apps = BTreeMap::new();
    apps.insert(
        APP_EMAIL.to_string(),
        AppConfig {
            path: "/roundcube/".to_string(),
            hostname: None,
            auth: Some(roundcube_auth()),
        },
    );
    apps.insert(
        APP_CALENDAR.to_string(),
        AppConfig {
            path: "/roundcube/?_task=calendar".to_string(),
            hostname: None,
            auth: Some(roundcube_auth()),
        },
    );
    apps.insert(
        APP_FILES.to_string(),
        AppConfig {
            path: "/owncloud/".to_string(),
            hostname: None,
            auth: Some(owncloud_auth()),
        },
    );
    apps
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        // Get the run mode, defaulting to "development"
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        // Locate the config directory
        let config_dir = env::var("CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                // Check if we're in the project root or a subcrate
                let mut path = PathBuf::from("./config");
                if !path.exists() {
                    path = PathBuf::from("../config");
                }
                path
            });

        tracing::info!("Loading configuration from {}", config_dir.display());
        tracing::info!("Using run mode: {}", run_mode);

        let config = ConfigFile::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", run_mode))).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Environment variables with prefix "APP", e.g. APP__CACHE__TTL_SECS
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load from files, falling back to plain environment variables
    pub fn from_env() -> Self {
        match Self::load() {
            Ok(config) => {
                tracing::info!("Configuration loaded from files and environment");
                config
            },
            Err(e) => {
                tracing::warn!("Failed to load configuration from files: {}", e);
                tracing::info!("Falling back to environment variables only");

                let defaults = Self::default();

                let web_server_addr = env::var("WEB_SERVER_ADDR")
                    .unwrap_or(defaults.web_server_addr);

                let public_uri_base = env::var("PUBLIC_URI_BASE")
                    .unwrap_or(defaults.public_uri_base);

                let hostname = env::var("PLATFORM_HOSTNAME")
                    .unwrap_or(defaults.hostname);

                let log_level = env::var("LOG_LEVEL")
                    .unwrap_or(defaults.log_level);

                let ttl_secs = env::var("CACHE_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(defaults.cache.ttl_secs);

                let timeout_secs = env::var("UPSTREAM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(defaults.upstream.timeout_secs);

                Self {
                    web_server_addr,
                    public_uri_base,
                    hostname,
                    log_level,
                    cache: CacheConfig {
                        ttl_secs,
                        ..defaults.cache
                    },
                    upstream: UpstreamConfig { timeout_secs },
                    ..defaults
                }
            }
        }
    }
}
