// app-loader/src/api/transitions.rs
use actix_web::cookie::Cookie;
use actix_web::{get, http::header, web, HttpResponse, Responder, ResponseError};
use serde_json::json;

use crate::loader::AppLoader;

// Install a cached transition's cookies in the browser and send it on
#[get("/__cloudos__/api/app/auth/{id}")]
pub async fn replay_transition(
    path: web::Path<(String,)>,
    loader: web::Data<AppLoader>,
) -> impl Responder {
    replay(&path.0, &loader).await
}

// Same endpoint below an app's own path, where virtual-hostname apps send it
#[get("/{app_path:.+}/__cloudos__/api/app/auth/{id}")]
pub async fn replay_app_transition(
    path: web::Path<(String, String)>,
    loader: web::Data<AppLoader>,
) -> impl Responder {
    replay(&path.1, &loader).await
}

async fn replay(transition_id: &str, loader: &AppLoader) -> HttpResponse {
    let transition = match loader.cache().get(transition_id).await {
        Ok(Some(transition)) => transition,
        Ok(None) => {
            tracing::info!("Auth transition {} not found or expired", transition_id);
            return HttpResponse::NotFound().json(json!({
                "error": "Transition not found"
            }));
        },
        Err(e) => {
            tracing::error!("Error retrieving auth transition {}: {}", transition_id, e);
            return e.error_response();
        }
    };

    let mut response = HttpResponse::TemporaryRedirect();
    response.insert_header((header::LOCATION, transition.redirect_uri.as_str()));

    for stored in &transition.cookies {
        let cookie = Cookie::build(stored.name.clone(), stored.value.clone())
            .path(stored.path.clone().unwrap_or_else(|| "/".to_string()))
            .http_only(true)
            .finish();
        response.cookie(cookie);
    }

    tracing::info!(
        "Replaying {} cookies from auth transition {} to {}",
        transition.cookies.len(),
        transition_id,
        transition.redirect_uri
    );
    response.finish()
}
