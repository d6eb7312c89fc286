//! Delivery channel port and the runtime-swappable set of channels.

use crate::notification::domain::NotificationPayload;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Failure reported by a delivery channel.
///
/// Messages may contain endpoint URLs; the dispatcher redacts them before
/// anything is logged or stored.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SenderError {
    /// The request could not be sent or no response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// The receiver answered with a non-success status.
    #[error("receiver rejected delivery with status {status}: {body}")]
    Rejected {
        /// HTTP status or channel-specific code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The channel did not finish within the per-channel timeout.
    #[error("delivery timed out after {0} ms")]
    TimedOut(u64),
}

/// One delivery channel.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Channel name used in logs and error summaries.
    fn name(&self) -> &str;

    /// Delivers `payload`.
    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), SenderError>;
}

/// The channels the dispatcher currently delivers to.
///
/// Clones share the same set, so the owner can swap channels while the
/// dispatcher runs; each dispatch works on a snapshot.
#[derive(Clone, Default)]
pub struct SenderSet {
    senders: Arc<RwLock<Vec<Arc<dyn NotificationSender>>>>,
}

impl SenderSet {
    /// Creates a set holding `senders`.
    #[must_use]
    pub fn new(senders: Vec<Arc<dyn NotificationSender>>) -> Self {
        Self {
            senders: Arc::new(RwLock::new(senders)),
        }
    }

    /// Replaces every channel.
    pub async fn replace(&self, senders: Vec<Arc<dyn NotificationSender>>) {
        *self.senders.write().await = senders;
    }

    /// Returns the channels configured right now.
    pub async fn snapshot(&self) -> Vec<Arc<dyn NotificationSender>> {
        self.senders.read().await.clone()
    }
}

impl std::fmt::Debug for SenderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderSet").finish_non_exhaustive()
    }
}
