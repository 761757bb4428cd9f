use actix_web::{web, App, HttpServer};
use log::info;
use log4rs;

use nimbus_fs::api;
use nimbus_fs::app_state::AppState;
use nimbus_fs::config::AppConfig;
// ^ use the name from your Cargo.toml [package].name

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::load().expect("Failed to load configuration");
    log4rs::init_file(&config.logging.config_file, Default::default()).unwrap();

    let host = config.server.host.clone();
    let port = config.server.port;
    let max_payload = config.server.max_payload_size as usize;
    info!("Starting server on {}:{}", host, port);

    let app_state = web::Data::new(
        AppState::from_config(config).expect("Failed to initialize application state"),
    );

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(web::PayloadConfig::default().limit(max_payload))
            .app_data(app_state.clone())
            .route("/fs/{path:.*}", web::put().to(api::write_handler))
            .route("/fs/{path:.*}", web::get().to(api::read_handler))
            .route("/fs/{path:.*}", web::delete().to(api::delete_handler))
            .route("/list/{path:.*}", web::get().to(api::list_handler))
            .route("/stat/{path:.*}", web::get().to(api::stat_handler))
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
