use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::WebSocketError;
use super::channel::DistributionReceiver;
use super::connection::Connection;
use super::message::RelayMessage;
use super::registry::ConnectionRegistry;

/// Drains the distribution channel and fans every message out to the
/// registry.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    inbox: DistributionReceiver,
    write_timeout: Option<Duration>,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        inbox: DistributionReceiver,
        write_timeout: Option<Duration>,
    ) -> Self {
        Self { registry, inbox, write_timeout }
    }

    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }

    /// Runs until the channel is closed and drained. Returns how many
    /// messages were dispatched.
    pub async fn run(mut self) -> u64 {
        info!("Broadcaster started");
        let mut relayed = 0u64;

        while let Some(message) = self.inbox.recv().await {
            if self.dispatch(&message).await {
                relayed += 1;
            }
        }

        info!(relayed, "Broadcaster stopped");
        relayed
    }

    /// Starts one write per registered connection and returns without
    /// waiting for them.
    async fn dispatch(&self, message: &RelayMessage) -> bool {
        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode broadcast message: {}", e);
                return false;
            }
        };

        let targets = self.registry.snapshot_for_broadcast().await;
        debug!(
            sender = %message.sender_address,
            targets = targets.len(),
            "Broadcasting message"
        );

        for connection in targets {
            let text = text.clone();
            let write_timeout = self.write_timeout;
            tokio::spawn(async move {
                if let Err(e) = write_to(&connection, text, write_timeout).await {
                    warn!(
                        connection_id = %connection.id(),
                        remote_addr = connection.remote_addr(),
                        "Failed to write message: {}", e
                    );
                }
            });
        }
        true
    }
}

async fn write_to(
    connection: &Connection,
    text: String,
    write_timeout: Option<Duration>,
) -> Result<(), WebSocketError> {
    match write_timeout {
        Some(limit) => tokio::time::timeout(limit, connection.send_text(text))
            .await
            .map_err(|_| WebSocketError::WriteTimeout(limit))?,
        None => connection.send_text(text).await,
    }
}
