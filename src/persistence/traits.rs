//! Trait abstraction for state storage.
//!
//! Enables mock implementations for unit testing.

use crate::network::{NetworkSnapshot, StateChange};
use async_trait::async_trait;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt stored state: {0}")]
    Corrupt(String),
}

/// Durable home for the network state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the stored snapshot, if any state has been saved.
    async fn load(&self) -> StoreResult<Option<NetworkSnapshot>>;

    /// Replace the stored state with `snapshot` in one transaction.
    ///
    /// Used once, to seed an empty store after bootstrap.
    async fn save(&self, snapshot: &NetworkSnapshot) -> StoreResult<()>;

    /// Write the rows of one change in one transaction. Either every row
    /// lands or none does.
    async fn apply(&self, change: &StateChange) -> StoreResult<()>;
}
