// app-loader/src/api/apps.rs
use actix_web::{get, http::header, web, HttpRequest, HttpResponse, Responder, ResponseError};
use common::{Account, Config};
use serde_json::json;

use crate::loader::AppLoader;
use crate::profile::{AppRegistry, LoginContext};

const TIMEZONE_NAME_HEADER: &str = "X-Timezone-Name";
const TIMEZONE_OFFSET_HEADER: &str = "X-Timezone-Offset";

#[get("/")]
pub async fn api_index(registry: web::Data<AppRegistry>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "name": "App Loader API",
        "version": env!("CARGO_PKG_VERSION"),
        "apps": registry.names(),
    }))
}

/// Account from HTTP Basic credentials
pub fn account_from_request(req: &HttpRequest) -> Option<Account> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (name, password) = credentials.split_once(':')?;
    if name.is_empty() {
        return None;
    }
    Some(Account::new(name, password))
}

/// Timezone tokens from the request, falling back to configured defaults
pub fn login_context(req: &HttpRequest, config: &Config) -> LoginContext {
    let header_value = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    LoginContext::new(
        header_value(TIMEZONE_NAME_HEADER).unwrap_or_else(|| config.default_timezone_name.clone()),
        header_value(TIMEZONE_OFFSET_HEADER).unwrap_or_else(|| config.default_timezone_offset.clone()),
    )
}

// Log the account into an app and send the browser to its transition
#[get("/app/load/{app}")]
pub async fn load_app(
    req: HttpRequest,
    path: web::Path<(String,)>,
    loader: web::Data<AppLoader>,
    registry: web::Data<AppRegistry>,
    config: web::Data<Config>,
) -> impl Responder {
    let app_name = &path.0;

    let account = match account_from_request(&req) {
        Some(account) => account,
        None => {
            tracing::warn!("Load request for {} without usable credentials", app_name);
            return HttpResponse::Unauthorized()
                .insert_header((header::WWW_AUTHENTICATE, "Basic realm=\"app-loader\""))
                .json(json!({
                    "error": "Credentials required"
                }));
        }
    };

    let app = match registry.get(app_name) {
        Some(app) => app,
        None => {
            tracing::info!("Load request for unknown app {}", app_name);
            return HttpResponse::NotFound().json(json!({
                "error": "App not found"
            }));
        }
    };

    let ctx = login_context(&req, &config);
    match loader.load_app(&account, app, &ctx).await {
        Ok(outcome) => {
            tracing::info!("Sending {} to {} via {}", account.name, app_name, outcome.location());
            outcome.into_response()
        },
        Err(e) => {
            tracing::error!("Error loading {} for {}: {}", app_name, account.name, e);
            e.error_response()
        }
    }
}
