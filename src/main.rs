use actix_web::{web, App, HttpServer};
use actix_cors::Cors;
use huddle_server::{avatars, health_check, online_users, AppError, AppState, Settings};
use huddle_server::websocket::WebSocketServer;
use dotenv::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[actix_web::main]
async fn main() -> huddle_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    let config = Settings::new()?;
    info!("Configuration loaded successfully ({})", config.environment);

    let state = AppState::new(config.clone());

    let ws_listener = TcpListener::bind((config.server.host.as_str(), config.server.ws_port)).await?;
    info!("WebSocket server ready at ws://{}", ws_listener.local_addr()?);

    let ws_server = Arc::new(WebSocketServer::new(state.hub.clone()));
    tokio::spawn(async move {
        ws_server.run(ws_listener).await;
        warn!("WebSocket accept loop stopped");
    });

    let http_listener = std::net::TcpListener::bind((config.server.host.as_str(), config.server.port))?;
    info!("Starting HTTP server at {}", http_listener.local_addr()?);

    let state = web::Data::new(state);
    let cors_config = config.cors.clone();

    HttpServer::new(move || {
        let cors = if cors_config.enabled {
            let cors = if cors_config.allow_any_origin {
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
            } else {
                Cors::default()
                    .allowed_origin("http://localhost:8550")
                    .allowed_origin("http://127.0.0.1:8550")
                    .allowed_methods(vec!["GET"])
            };
            cors.max_age(cors_config.max_age as usize)
        } else {
            Cors::default()
        };

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .route("/health", web::get().to(health_check))
            .route("/online", web::get().to(online_users))
            .route("/avatars", web::get().to(avatars))
    })
    .listen(http_listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok(())
}
