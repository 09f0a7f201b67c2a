//! Notification transport for preventive and operational alerts

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::DeliveryError;

/// One message addressed to one recipient
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub deep_link: String,
}

/// Delivers a message to an opaque recipient identifier
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        deep_link: &str,
    ) -> Result<(), DeliveryError>;
}

/// In-process transport publishing notifications on a broadcast channel.
///
/// Subscribers (for example a websocket fan-out) pick messages up with
/// [`BroadcastNotifier::subscribe`]. Sending with nobody subscribed is a
/// delivery failure.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        deep_link: &str,
    ) -> Result<(), DeliveryError> {
        let notification = Notification {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            deep_link: deep_link.to_string(),
        };

        self.tx
            .send(notification)
            .map(|_| ())
            .map_err(|_| DeliveryError::NoSubscribers(recipient.to_string()))
    }
}
