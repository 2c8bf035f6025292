use std::sync::Arc;
use std::time::Duration;
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{error, info};

use crate::config::RelayConfig;
use crate::error::{AppError, WebSocketError};
use super::channel::DistributionSender;
use super::connection::{Connection, SessionSink};
use super::reader::InboundReader;
use super::registry::ConnectionRegistry;

/// Accepts WebSocket upgrades and wires each new connection into the relay.
pub struct WebSocketServer {
    registry: Arc<ConnectionRegistry>,
    distribution: DistributionSender,
    max_frame_size: usize,
    idle_timeout: Option<Duration>,
}

impl WebSocketServer {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        distribution: DistributionSender,
        relay: &RelayConfig,
    ) -> Self {
        Self {
            registry,
            distribution,
            max_frame_size: relay.max_frame_size,
            idle_timeout: relay.idle_timeout(),
        }
    }

    /// Performs the handshake, then registers the connection and starts its
    /// reader on a separate task so the handler returns right away.
    pub fn accept(&self, req: &HttpRequest, body: web::Payload) -> Result<HttpResponse, AppError> {
        let remote_addr = req
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let (response, session, frames) = actix_ws::handle(req, body).map_err(|e| {
            error!(%remote_addr, "Error with websocket connection: {}", e);
            WebSocketError::UpgradeFailed(e.to_string())
        })?;

        info!(%remote_addr, "New WebSocket connection");

        let frames = frames
            .max_frame_size(self.max_frame_size)
            .aggregate_continuations()
            .max_continuation_size(self.max_frame_size);

        let connection = Connection::new(remote_addr, Arc::new(SessionSink::new(session)));
        let reader = InboundReader::new(
            connection.clone(),
            self.registry.clone(),
            self.distribution.clone(),
            self.idle_timeout,
        );
        let registry = self.registry.clone();

        actix_web::rt::spawn(async move {
            registry.register(connection).await;
            reader.run(frames).await;
        });

        Ok(response)
    }
}

/// `GET /ws`
pub async fn websocket_route(
    req: HttpRequest,
    body: web::Payload,
    server: web::Data<WebSocketServer>,
) -> Result<HttpResponse, AppError> {
    server.accept(&req, body)
}
