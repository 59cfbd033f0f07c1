//! In-memory state store for testing.

use super::traits::*;
use crate::network::{NetworkSnapshot, StateChange};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock state store. Clones share the same storage.
#[derive(Clone, Default)]
pub struct MockStateStore {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    snapshot: Option<NetworkSnapshot>,
    changes: Vec<StateChange>,
    fail_writes: bool,
}

impl MockStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stored state with every applied change folded in.
    pub fn stored(&self) -> Option<NetworkSnapshot> {
        self.state().snapshot.clone()
    }

    /// Changes applied since the last full save, oldest first.
    pub fn changes(&self) -> Vec<StateChange> {
        self.state().changes.clone()
    }

    /// Make every subsequent save and apply fail (for error-path tests).
    pub fn fail_writes(&self) {
        self.state().fail_writes = true;
    }

    pub fn resume_writes(&self) {
        self.state().fail_writes = false;
    }
}

#[async_trait]
impl StateStore for MockStateStore {
    async fn load(&self) -> StoreResult<Option<NetworkSnapshot>> {
        Ok(self.state().snapshot.clone())
    }

    async fn save(&self, snapshot: &NetworkSnapshot) -> StoreResult<()> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(StoreError::Corrupt("mock write failure".to_string()));
        }
        state.snapshot = Some(snapshot.clone());
        state.changes.clear();
        Ok(())
    }

    async fn apply(&self, change: &StateChange) -> StoreResult<()> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(StoreError::Corrupt("mock write failure".to_string()));
        }
        let Some(snapshot) = state.snapshot.as_mut() else {
            return Err(StoreError::Corrupt("change applied before any save".to_string()));
        };
        // Stage on a copy so a refused change leaves the stored state alone.
        let mut staged = snapshot.clone();
        staged
            .apply(change)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        *snapshot = staged;
        state.changes.push(change.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{NetworkConfig, PollConfig, TrustNetwork};
    use crate::registry::MemberId;

    async fn snapshot() -> NetworkSnapshot {
        TrustNetwork::with_defaults(&NetworkConfig::default(), PollConfig::default().into_poll())
            .unwrap()
            .snapshot()
            .await
    }

    #[tokio::test]
    async fn test_apply_folds_into_saved_state() {
        let store = MockStateStore::new();
        let mut expected = snapshot().await;
        store.save(&expected).await.unwrap();

        let mut seed = expected.members[1].clone();
        seed.status = crate::registry::MemberStatus::Suspended;
        let change = StateChange::MemberUpdated(seed);
        store.apply(&change).await.unwrap();
        expected.apply(&change).unwrap();

        assert_eq!(store.changes(), vec![change]);
        assert_eq!(store.load().await.unwrap(), Some(expected));
    }

    #[tokio::test]
    async fn test_apply_before_save_is_refused() {
        let store = MockStateStore::new();
        let change = StateChange::CodesIssued(Vec::new());
        assert!(matches!(store.apply(&change).await, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_unknown_member_update_leaves_state_alone() {
        let store = MockStateStore::new();
        let saved = snapshot().await;
        store.save(&saved).await.unwrap();

        let mut ghost = saved.members[0].clone();
        ghost.id = MemberId::new("user-99");
        let result = store.apply(&StateChange::MemberUpdated(ghost)).await;

        assert!(matches!(result, Err(StoreError::Corrupt(_))));
        assert_eq!(store.stored(), Some(saved));
        assert!(store.changes().is_empty());
    }

    #[tokio::test]
    async fn test_failing_store_reports_errors() {
        let store = MockStateStore::new();
        store.fail_writes();

        let result = store.save(&snapshot().await).await;
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
        assert!(store.stored().is_none());

        store.resume_writes();
        store.save(&snapshot().await).await.unwrap();
        assert!(store.stored().is_some());
    }
}
