//! Handoff between the per-connection readers and the broadcaster.
//!
//! Bounded FIFO: once `capacity` messages are queued, readers wait for the
//! broadcaster. The channel is closed once, from the shutdown path; the
//! broadcaster then drains what is queued and exits.

use tokio::sync::{mpsc, watch};

use crate::error::WebSocketError;
use super::message::RelayMessage;

/// Producer handle held by every reader.
#[derive(Debug, Clone)]
pub struct DistributionSender {
    tx: mpsc::Sender<RelayMessage>,
}

impl DistributionSender {
    /// Waits for room in the channel. Fails once the channel is closed.
    pub async fn submit(&self, message: RelayMessage) -> Result<(), WebSocketError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| WebSocketError::ChannelClosed)
    }
}

/// Consumer side, owned by the broadcaster.
#[derive(Debug)]
pub struct DistributionReceiver {
    rx: mpsc::Receiver<RelayMessage>,
    close_signal: watch::Receiver<bool>,
    closing: bool,
}

impl DistributionReceiver {
    /// Next message in submission order. `None` once the channel has been
    /// closed and everything queued before the close was handed out.
    pub async fn recv(&mut self) -> Option<RelayMessage> {
        if !self.closing {
            tokio::select! {
                biased;
                message = self.rx.recv() => return message,
                _ = self.close_signal.wait_for(|closed| *closed) => {
                    self.closing = true;
                    self.rx.close();
                }
            }
        }
        self.rx.recv().await
    }
}

/// Closes the channel. Owned by the lifecycle controller.
#[derive(Debug)]
pub struct DistributionCloser {
    close_signal: watch::Sender<bool>,
}

impl DistributionCloser {
    /// Returns true the first time, false if the channel was already closed.
    pub fn close(&self) -> bool {
        !self.close_signal.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.close_signal.borrow()
    }
}

pub fn distribution_channel(
    capacity: usize,
) -> (DistributionSender, DistributionReceiver, DistributionCloser) {
    let (tx, rx) = mpsc::channel(capacity);
    let (close_tx, close_rx) = watch::channel(false);
    (
        DistributionSender { tx },
        DistributionReceiver { rx, close_signal: close_rx, closing: false },
        DistributionCloser { close_signal: close_tx },
    )
}
