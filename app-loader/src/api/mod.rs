// app-loader/src/api/mod.rs
pub mod apps;
pub mod transitions;

pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(
        actix_web::web::scope("/api")
            .service(apps::api_index)
            .service(apps::load_app)
    )
    .service(transitions::replay_transition)
    .service(transitions::replay_app_transition);
}
