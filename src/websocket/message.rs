use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use tracing::warn;

use crate::error::WebSocketError;

pub const SENDER_ADDRESS_FIELD: &str = "sender_address";
pub const RECEIVED_AT_FIELD: &str = "received_at";

/// A client message on its way to every connected client.
///
/// Serializes as one flat JSON object: the client's own fields followed by
/// the two server-derived fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    #[serde(flatten)]
    pub payload: Map<String, Value>,
    pub sender_address: String,
    pub received_at: String,
}

impl RelayMessage {
    /// Decodes a client frame and stamps it. Client values for the derived
    /// fields are dropped.
    pub fn decode(
        raw: &[u8],
        remote_addr: &str,
        now: DateTime<Local>,
    ) -> Result<Self, WebSocketError> {
        let mut payload: Map<String, Value> = serde_json::from_slice(raw)
            .map_err(|e| WebSocketError::InvalidFormat(e.to_string()))?;
        payload.remove(SENDER_ADDRESS_FIELD);
        payload.remove(RECEIVED_AT_FIELD);

        Ok(Self {
            payload,
            sender_address: sender_host(remote_addr),
            received_at: format_received_at(now),
        })
    }

    pub fn encode(&self) -> Result<String, WebSocketError> {
        serde_json::to_string(self).map_err(|e| WebSocketError::InvalidFormat(e.to_string()))
    }
}

/// Host part of `ip:port`. Falls back to the raw value when it cannot be split.
pub fn sender_host(remote_addr: &str) -> String {
    match remote_addr.parse::<SocketAddr>() {
        Ok(addr) => addr.ip().to_string(),
        Err(e) => {
            warn!(remote_addr, error = %e, "Failed to split client address into host and port");
            remote_addr.to_string()
        }
    }
}

pub fn format_received_at(now: DateTime<Local>) -> String {
    now.format("%H:%M").to_string()
}
