use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::traits::StatusSink;
use crate::types::JobId;

/// Live progress message for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub job_id: JobId,
    pub user_id: Option<String>,
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all updates.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<StatusUpdate>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn send(&self, update: StatusUpdate) {
        // Ignore error if no receivers
        let _ = self.tx.send(update);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StatusUpdate> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl StatusSink for EventBus {
    fn publish(
        &self,
        job_id: &JobId,
        user_id: Option<&str>,
        status: &str,
        message: &str,
    ) -> Result<()> {
        self.send(StatusUpdate {
            job_id: job_id.clone(),
            user_id: user_id.map(str::to_string),
            status: status.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
