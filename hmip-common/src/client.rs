use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::model::{ChangeEvent, Group};

/// Boundary trait for the upstream HomematicIP session.
///
/// One implementation talks to the real cloud access point; tests substitute
/// scripted implementations. The fetch call is expected to carry its own
/// timeout; callers impose no additional deadline.
#[async_trait]
pub trait HomeClient: Send + Sync {
    /// Fetch one complete snapshot of the group/device topology.
    async fn fetch_current_state(&self) -> Result<Vec<Group>>;

    /// Subscribe to change-notification batches.
    ///
    /// The returned receiver is fed by the client's own delivery task on its
    /// own schedule. The channel is bounded to `buffer` batches; delivery
    /// must drop batches rather than block when the consumer falls behind.
    async fn subscribe_changes(&self, buffer: usize) -> Result<mpsc::Receiver<Vec<ChangeEvent>>>;
}
