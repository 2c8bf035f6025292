use std::fmt;
use std::sync::Arc;
use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::error::WebSocketError;

/// Write side of an upgraded connection.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), WebSocketError>;

    async fn pong(&self, payload: &[u8]) -> Result<(), WebSocketError>;

    /// Sends a close frame. Closing an already closed sink is not an error.
    async fn close(&self);
}

/// `FrameSink` over an actix-ws session. The session is a cheap handle onto
/// the connection's outgoing queue, so every write works on its own clone.
pub struct SessionSink {
    session: actix_ws::Session,
}

impl SessionSink {
    pub fn new(session: actix_ws::Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl FrameSink for SessionSink {
    async fn send_text(&self, text: String) -> Result<(), WebSocketError> {
        let mut session = self.session.clone();
        session
            .text(text)
            .await
            .map_err(|e| WebSocketError::SendError(format!("{:?}", e)))
    }

    async fn pong(&self, payload: &[u8]) -> Result<(), WebSocketError> {
        let mut session = self.session.clone();
        session
            .pong(payload)
            .await
            .map_err(|e| WebSocketError::SendError(format!("{:?}", e)))
    }

    async fn close(&self) {
        if let Err(e) = self.session.clone().close(None).await {
            debug!("Session already closed: {:?}", e);
        }
    }
}

pub type ConnectionId = Uuid;

/// A live connection as seen by the registry and the broadcaster.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    remote_addr: String,
    sink: Arc<dyn FrameSink>,
}

impl Connection {
    pub fn new(remote_addr: impl Into<String>, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            id: Uuid::new_v4(),
            remote_addr: remote_addr.into(),
            sink,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub async fn send_text(&self, text: String) -> Result<(), WebSocketError> {
        self.sink.send_text(text).await
    }

    pub async fn pong(&self, payload: &[u8]) -> Result<(), WebSocketError> {
        self.sink.pong(payload).await
    }

    pub async fn close(&self) {
        self.sink.close().await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}
