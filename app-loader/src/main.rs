// App Loader - main.rs
// app-loader/src/main.rs
use actix::Actor;
use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use common::{setup_tracing, Config};
use std::sync::Arc;
use std::time::Duration;

use app_loader::api;
use app_loader::middleware::RateLimiter;
use app_loader::profile::AppRegistry;
use app_loader::store::{MemoryStore, StoreJanitor};
use app_loader::upstream::HttpUpstream;
use app_loader::AppLoader;

#[get("/")]
async fn index() -> impl Responder {
    HttpResponse::Ok().body("App Loader")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration
    let config = Config::from_env();

    // Setup tracing
    setup_tracing(&config.log_level);

    let registry = AppRegistry::from_config(&config).map_err(std::io::Error::other)?;
    tracing::info!("Registered apps: {}", registry.names().join(", "));

    // Transition store and its expiry sweeper
    let store = MemoryStore::new();
    StoreJanitor::new(
        store.clone(),
        Duration::from_secs(config.cache.cleanup_interval_secs.max(1)),
    )
    .start();

    let upstream = HttpUpstream::new(Duration::from_secs(config.upstream.timeout_secs))
        .map_err(std::io::Error::other)?;
    let loader = AppLoader::from_config(&config, Arc::new(store), Arc::new(upstream))
        .map_err(std::io::Error::other)?;

    // Save address before moving config into web::Data
    let server_addr = config.web_server_addr.clone();
    let rate_limiter = RateLimiter::from_config(&config.rate_limit);

    tracing::info!("Starting App Loader on {}", server_addr);

    // Create data references
    let loader_data = web::Data::new(loader);
    let registry_data = web::Data::new(registry);
    let config_data = web::Data::new(config);

    HttpServer::new(move || {
        App::new()
            .wrap(rate_limiter.clone())
            .app_data(loader_data.clone())
            .app_data(registry_data.clone())
            .app_data(config_data.clone())
            .service(index)
            .configure(api::configure)
    })
    .bind(&server_addr)?
    .run()
    .await
}
