// common/src/models/transition.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cookie captured from an upstream app during scripted login
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl StoredCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
        }
    }
}

/// Cached authenticated session for one account/app pair, replayed into the
/// browser by the transition endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthTransition {
    /// Opaque handle, fresh for every write
    pub uuid: String,
    /// Where the browser lands once the cookies are installed
    pub redirect_uri: String,
    pub cookies: Vec<StoredCookie>,
    pub created_at: DateTime<Utc>,
}

impl AuthTransition {
    pub fn new(redirect_uri: impl Into<String>, cookies: Vec<StoredCookie>) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            redirect_uri: redirect_uri.into(),
            cookies,
            created_at: Utc::now(),
        }
    }
}
