use std::time::Duration;

use scc::HashMap;

use crate::ports::proxy_host::RequestId;

/// Per-request retry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Deadline applied to every attempt for this request. Fixed at first
    /// observation, immutable afterwards.
    pub timeout: Duration,
    /// Replays issued so far. The original pass-through is not counted.
    pub attempts: u32,
}

/// Outcome of asking the store to admit one more replay for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAdmission {
    /// The replay was admitted; the count now stands at the given value
    Admitted(u32),
    /// The retry budget is spent; no further replay may be issued
    Exhausted,
}

/// Keyed table of live retry state, one record per in-flight request.
///
/// A record is created when a request carrying a usable timeout rule is
/// first seen and must be removed on every terminal path (completion,
/// exhaustion, hard failure); a record that outlives its request is a leak.
/// Operations are atomic per key; no cross-key coordination exists or is
/// needed, so unrelated requests never contend beyond the map itself.
#[derive(Debug, Default)]
pub struct RetryStateStore {
    entries: HashMap<RequestId, RetryState>,
}

impl RetryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        RetryStateStore {
            entries: HashMap::new(),
        }
    }

    /// Record a request's timeout at first sight.
    ///
    /// The first write wins: returns false and leaves the live record
    /// untouched when state for this id already exists.
    pub async fn insert(&self, id: RequestId, timeout: Duration) -> bool {
        self.entries
            .insert_async(
                id,
                RetryState {
                    timeout,
                    attempts: 0,
                },
            )
            .await
            .is_ok()
    }

    /// Configured timeout for a live request.
    pub async fn timeout(&self, id: &RequestId) -> Option<Duration> {
        self.entries
            .get_async(id)
            .await
            .map(|entry| entry.get().timeout)
    }

    /// Current replay count for a live request.
    pub async fn attempts(&self, id: &RequestId) -> Option<u32> {
        self.entries
            .get_async(id)
            .await
            .map(|entry| entry.get().attempts)
    }

    /// Atomically admit one more replay if the budget allows.
    ///
    /// The bound check and the increment are one read-modify-write on the
    /// key, so the stored count can never exceed `max` even under racing
    /// callers. Returns `None` when no state is live for the id.
    pub async fn try_admit_retry(&self, id: &RequestId, max: u32) -> Option<RetryAdmission> {
        self.entries
            .update_async(id, |_, state| {
                if state.attempts >= max {
                    RetryAdmission::Exhausted
                } else {
                    state.attempts += 1;
                    RetryAdmission::Admitted(state.attempts)
                }
            })
            .await
    }

    /// Drop all state for a request. Idempotent; removing an absent id is a
    /// no-op.
    pub async fn remove(&self, id: &RequestId) {
        let _ = self.entries.remove_async(id).await;
    }

    /// True while state for the id is live.
    pub async fn contains(&self, id: &RequestId) -> bool {
        self.entries.contains_async(id).await
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no records are live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> RequestId {
        RequestId::new(name)
    }

    #[tokio::test]
    async fn test_insert_then_read_back() {
        let store = RetryStateStore::new();
        assert!(store.insert(id("a"), Duration::from_millis(150)).await);

        assert_eq!(store.timeout(&id("a")).await, Some(Duration::from_millis(150)));
        assert_eq!(store.attempts(&id("a")).await, Some(0));
        assert!(store.contains(&id("a")).await);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_keeps_first_timeout() {
        let store = RetryStateStore::new();
        assert!(store.insert(id("a"), Duration::from_millis(100)).await);
        assert!(!store.insert(id("a"), Duration::from_millis(900)).await);

        assert_eq!(store.timeout(&id("a")).await, Some(Duration::from_millis(100)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_admission_counts_up_to_the_bound() {
        let store = RetryStateStore::new();
        store.insert(id("a"), Duration::from_millis(100)).await;

        assert_eq!(
            store.try_admit_retry(&id("a"), 3).await,
            Some(RetryAdmission::Admitted(1))
        );
        assert_eq!(
            store.try_admit_retry(&id("a"), 3).await,
            Some(RetryAdmission::Admitted(2))
        );
        assert_eq!(
            store.try_admit_retry(&id("a"), 3).await,
            Some(RetryAdmission::Admitted(3))
        );
        assert_eq!(
            store.try_admit_retry(&id("a"), 3).await,
            Some(RetryAdmission::Exhausted)
        );
        // The count stays pinned at the bound once exhausted.
        assert_eq!(store.attempts(&id("a")).await, Some(3));
    }

    #[tokio::test]
    async fn test_admission_without_live_state() {
        let store = RetryStateStore::new();
        assert_eq!(store.try_admit_retry(&id("ghost"), 5).await, None);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = RetryStateStore::new();
        store.insert(id("a"), Duration::from_millis(100)).await;

        store.remove(&id("a")).await;
        assert!(!store.contains(&id("a")).await);
        store.remove(&id("a")).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_keys_stay_independent() {
        let store = RetryStateStore::new();
        store.insert(id("a"), Duration::from_millis(100)).await;
        store.insert(id("b"), Duration::from_millis(250)).await;

        store.try_admit_retry(&id("a"), 5).await;
        store.try_admit_retry(&id("a"), 5).await;

        assert_eq!(store.attempts(&id("a")).await, Some(2));
        assert_eq!(store.attempts(&id("b")).await, Some(0));
        assert_eq!(store.timeout(&id("b")).await, Some(Duration::from_millis(250)));
    }
}
