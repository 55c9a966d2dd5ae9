/// HTTP server with WebSocket support for real-time grid updates
use actix_web::{middleware, web, App, Error, HttpRequest, HttpResponse, HttpServer};
use actix_web_actors::ws;

use crate::websocket::{AppState, GridWebSocket};

/// WebSocket endpoint handler
async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    ws::start(GridWebSocket::new(state), &req, stream)
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let grids = state.grids.lock().map(|g| g.len()).unwrap_or(0);
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "message": "LiveGrid WebSocket server is running",
        "grids": grids,
    }))
}

/// Start the HTTP server with WebSocket support
pub async fn run_server(host: &str, port: u16) -> std::io::Result<()> {
    serve(AppState::new(), host, port).await
}

/// Start the HTTP server over an existing set of grids
pub async fn serve(state: AppState, host: &str, port: u16) -> std::io::Result<()> {
    let state = web::Data::new(state);

    log::info!("LiveGrid WebSocket server");
    log::info!("WebSocket: ws://{}:{}/ws", host, port);
    log::info!("Health check: http://{}:{}/health", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            // CORS for development
            .wrap(
                actix_cors::Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .route("/ws", web::get().to(ws_index))
            .route("/health", web::get().to(health_check))
    })
    .bind((host, port))?
    .run()
    .await
}
