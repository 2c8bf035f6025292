pub mod config;
pub mod error;
pub mod server;
pub mod tls;
pub mod websocket;

use std::path::Path;
use actix_web::{web, HttpResponse};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use server::{LifecycleState, RelayServer};
pub use websocket::{ConnectionRegistry, RelayMessage};

/// Body returned by `GET /test`.
pub const TEST_RESPONSE: &str = "test is successful";

/// Health check endpoint handler
/// Returns a JSON response with server status, timestamp and live connections
pub async fn health_check(registry: web::Data<ConnectionRegistry>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connections": registry.len().await,
    }))
}

/// Liveness probe with a fixed plaintext body.
pub async fn test_endpoint() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(TEST_RESPONSE)
}

/// Registers `/ws`, `/test`, `/health` and, for every other path, the static
/// files under `static_dir`.
pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: &Path) {
    cfg.route("/ws", web::get().to(websocket::websocket_route))
        .route("/test", web::get().to(test_endpoint))
        .route("/health", web::get().to(health_check))
        .service(actix_files::Files::new("/", static_dir).index_file("index.html"));
}
