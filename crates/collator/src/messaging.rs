//! Messaging collaborator seam.
//!
//! The service publishes status text and new-artifact notifications to a
//! remote queue broker and receives configuration changes from it. The
//! wire side lives behind [`Messenger`] so the loops (and the tests) do
//! not care what the transport is; [`QueueMessenger`] is the production
//! implementation, a DEALER socket speaking JSON envelopes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use zeromq::{DealerSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

/// How long a settings poll waits on the socket before deciding the
/// queue is empty.
const RECV_POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// A batch of pending configuration changes, setting name to value.
/// May be empty. Unrecognized settings are the caller's problem to
/// ignore.
pub type SettingsBatch = HashMap<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Queue socket error: {0}")]
    Socket(String),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Envelope published to the queue broker.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueEvent {
    Status { service: String, text: String },
    NewArtifact { service: String, path: String },
}

/// Remote queue client as the loops see it.
///
/// `publish_status` is fire-and-forget (callers log and move on);
/// `poll_settings` is non-blocking and may return an empty batch.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn publish_status(&self, text: &str) -> Result<(), MessagingError>;
    async fn publish_new_artifact(&self, path: &Path) -> Result<(), MessagingError>;
    async fn poll_settings(&self) -> Result<SettingsBatch, MessagingError>;
}

/// DEALER-socket messenger. The socket needs `&mut` for send/recv, so it
/// sits behind an async Mutex; contention is negligible (three loops,
/// each touching the queue at most once per interval).
pub struct QueueMessenger {
    service_name: String,
    socket: Mutex<DealerSocket>,
}

impl QueueMessenger {
    /// Connect to the queue broker.
    pub async fn connect(addr: &str, service_name: &str) -> Result<Self, MessagingError> {
        let mut socket = DealerSocket::new();
        socket
            .connect(addr)
            .await
            .map_err(|e| MessagingError::Socket(format!("connect {addr}: {e}")))?;
        Ok(Self {
            service_name: service_name.to_string(),
            socket: Mutex::new(socket),
        })
    }

    async fn send_event(&self, event: &QueueEvent) -> Result<(), MessagingError> {
        let payload = serde_json::to_vec(event)?;
        let mut socket = self.socket.lock().await;
        socket
            .send(ZmqMessage::from(payload))
            .await
            .map_err(|e| MessagingError::Socket(e.to_string()))
    }
}

#[async_trait]
impl Messenger for QueueMessenger {
    async fn publish_status(&self, text: &str) -> Result<(), MessagingError> {
        self.send_event(&QueueEvent::Status {
            service: self.service_name.clone(),
            text: text.to_string(),
        })
        .await
    }

    async fn publish_new_artifact(&self, path: &Path) -> Result<(), MessagingError> {
        self.send_event(&QueueEvent::NewArtifact {
            service: self.service_name.clone(),
            path: path.to_string_lossy().into_owned(),
        })
        .await
    }

    async fn poll_settings(&self) -> Result<SettingsBatch, MessagingError> {
        let mut socket = self.socket.lock().await;
        match tokio::time::timeout(RECV_POLL_TIMEOUT, socket.recv()).await {
            Ok(Ok(multipart)) => {
                let frames = multipart.into_vec();
                let Some(frame) = frames.first() else {
                    return Ok(SettingsBatch::new());
                };
                let batch: SettingsBatch = serde_json::from_slice(frame)?;
                Ok(batch)
            }
            Ok(Err(e)) => Err(MessagingError::Socket(e.to_string())),
            // Timeout: nothing pending.
            Err(_) => Ok(SettingsBatch::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_events_serialize_with_a_kind_tag() {
        let event = QueueEvent::Status {
            service: "scanner-1".to_string(),
            text: "scanner-1 idle".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "status");
        assert_eq!(json["service"], "scanner-1");
    }

    #[test]
    fn settings_batch_parses_mixed_values() {
        let batch: SettingsBatch =
            serde_json::from_str(r#"{"Timeout": 500, "StatusUpdate": true, "Future": "x"}"#)
                .unwrap();
        assert_eq!(batch["Timeout"].as_u64(), Some(500));
        assert_eq!(batch["StatusUpdate"].as_bool(), Some(true));
        assert!(batch.contains_key("Future"));
    }
}
