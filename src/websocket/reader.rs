use std::sync::Arc;
use std::time::Duration;
use actix_ws::{AggregatedMessage, ProtocolError};
use chrono::Local;
use futures::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use super::channel::DistributionSender;
use super::connection::Connection;
use super::message::RelayMessage;
use super::registry::ConnectionRegistry;

/// Why a reader loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    ClientClosed,
    StreamEnded,
    Protocol(String),
    InvalidMessage(String),
    IdleTimeout,
    ChannelClosed,
}

/// Reads one connection until it fails, forwarding every decoded message to
/// the broadcaster. Owns the connection's removal from the registry.
pub struct InboundReader {
    connection: Connection,
    registry: Arc<ConnectionRegistry>,
    distribution: DistributionSender,
    idle_timeout: Option<Duration>,
}

impl InboundReader {
    pub fn new(
        connection: Connection,
        registry: Arc<ConnectionRegistry>,
        distribution: DistributionSender,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self { connection, registry, distribution, idle_timeout }
    }

    pub async fn run<S>(self, frames: S) -> ExitReason
    where
        S: Stream<Item = Result<AggregatedMessage, ProtocolError>>,
    {
        let reason = self.read_loop(frames).await;
        let id = self.connection.id();

        match &reason {
            ExitReason::ClientClosed | ExitReason::StreamEnded => {
                info!(connection_id = %id, ?reason, "Client disconnected")
            }
            ExitReason::ChannelClosed => {
                debug!(connection_id = %id, "Relay is shutting down")
            }
            _ => error!(connection_id = %id, ?reason, "Failed to read from client"),
        }

        self.registry.unregister(&id).await;
        self.connection.close().await;
        reason
    }

    async fn read_loop<S>(&self, frames: S) -> ExitReason
    where
        S: Stream<Item = Result<AggregatedMessage, ProtocolError>>,
    {
        let mut frames = std::pin::pin!(frames);

        loop {
            let next = match self.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, frames.next()).await {
                    Ok(next) => next,
                    Err(_) => return ExitReason::IdleTimeout,
                },
                None => frames.next().await,
            };

            let raw = match next {
                Some(Ok(AggregatedMessage::Text(text))) => text.as_bytes().to_vec(),
                Some(Ok(AggregatedMessage::Binary(bytes))) => bytes.to_vec(),
                Some(Ok(AggregatedMessage::Ping(payload))) => {
                    if let Err(e) = self.connection.pong(&payload).await {
                        warn!(connection_id = %self.connection.id(), "Failed to answer ping: {}", e);
                    }
                    continue;
                }
                Some(Ok(AggregatedMessage::Pong(_))) => continue,
                Some(Ok(AggregatedMessage::Close(reason))) => {
                    debug!(connection_id = %self.connection.id(), ?reason, "Close frame received");
                    return ExitReason::ClientClosed;
                }
                Some(Err(e)) => return ExitReason::Protocol(e.to_string()),
                None => return ExitReason::StreamEnded,
            };

            let message = match RelayMessage::decode(&raw, self.connection.remote_addr(), Local::now()) {
                Ok(message) => message,
                Err(e) => return ExitReason::InvalidMessage(e.to_string()),
            };

            if self.distribution.submit(message).await.is_err() {
                return ExitReason::ChannelClosed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::channel::distribution_channel;
    use crate::websocket::connection::testing::RecordingSink;
    use futures::stream;

    fn text(raw: &'static str) -> Result<AggregatedMessage, ProtocolError> {
        Ok(AggregatedMessage::Text(raw.into()))
    }

    async fn registered(registry: &Arc<ConnectionRegistry>, sink: Arc<RecordingSink>) -> Connection {
        let connection = Connection::new("172.16.0.9:40000", sink);
        registry.register(connection.clone()).await;
        connection
    }

    #[tokio::test]
    async fn test_messages_are_stamped_and_forwarded() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (sink, _out) = RecordingSink::new();
        let connection = registered(&registry, sink.clone()).await;
        let (tx, mut rx, _closer) = distribution_channel(8);

        let frames = stream::iter(vec![
            text(r#"{"text":"hi","sender_address":"spoofed"}"#),
            Ok(AggregatedMessage::Binary(br#"{"n":2}"#.to_vec().into())),
        ]);
        let reason = InboundReader::new(connection.clone(), registry.clone(), tx, None)
            .run(frames)
            .await;
        assert_eq!(reason, ExitReason::StreamEnded);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.payload["text"], "hi");
        assert_eq!(first.sender_address, "172.16.0.9");
        assert_eq!(first.received_at.len(), 5);
        assert_eq!(rx.recv().await.unwrap().payload["n"], 2);

        assert!(!registry.contains(&connection.id()).await);
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_malformed_frame_ends_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (sink, _out) = RecordingSink::new();
        let connection = registered(&registry, sink).await;
        let (tx, mut rx, _closer) = distribution_channel(8);

        let frames = stream::iter(vec![text("not json"), text(r#"{"text":"never"}"#)]);
        let reason = InboundReader::new(connection, registry.clone(), tx, None).run(frames).await;

        assert!(matches!(reason, ExitReason::InvalidMessage(_)));
        assert!(registry.is_empty().await);
        // The sender went away with the reader, so nothing was queued.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_ping_is_answered_and_close_ends() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (sink, mut out) = RecordingSink::new();
        let connection = registered(&registry, sink).await;
        let (tx, _rx, _closer) = distribution_channel(8);

        let frames = stream::iter(vec![
            Ok(AggregatedMessage::Ping(b"beat".to_vec().into())),
            Ok(AggregatedMessage::Pong(Vec::<u8>::new().into())),
            Ok(AggregatedMessage::Close(None)),
            text(r#"{"text":"after close"}"#),
        ]);
        let reason = InboundReader::new(connection, registry.clone(), tx, None).run(frames).await;

        assert_eq!(reason, ExitReason::ClientClosed);
        assert_eq!(out.recv().await.unwrap(), "pong:beat");
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_protocol_error_ends_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (sink, _out) = RecordingSink::new();
        let connection = registered(&registry, sink).await;
        let (tx, _rx, _closer) = distribution_channel(8);

        let frames = stream::iter(vec![Err(ProtocolError::Overflow)]);
        let reason = InboundReader::new(connection, registry.clone(), tx, None).run(frames).await;

        assert!(matches!(reason, ExitReason::Protocol(_)));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_closed_channel_ends_reader() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (sink, _out) = RecordingSink::new();
        let connection = registered(&registry, sink).await;
        let (tx, mut rx, closer) = distribution_channel(8);
        closer.close();
        assert!(rx.recv().await.is_none());

        let frames = stream::iter(vec![text(r#"{"text":"late"}"#)]);
        let reason = InboundReader::new(connection, registry.clone(), tx, None).run(frames).await;
        assert_eq!(reason, ExitReason::ChannelClosed);
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (sink, _out) = RecordingSink::new();
        let connection = registered(&registry, sink).await;
        let (tx, _rx, _closer) = distribution_channel(8);

        let reason = InboundReader::new(connection, registry.clone(), tx, Some(Duration::from_secs(30)))
            .run(stream::pending())
            .await;
        assert_eq!(reason, ExitReason::IdleTimeout);
        assert!(registry.is_empty().await);
    }
}
