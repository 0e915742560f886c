//! services/client/src/client/tracker.rs
//!
//! Bookkeeping that keeps late responses from overwriting newer view state:
//! per-resource request tickets, and cancellation scopes tied to a view.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, ClientResult};

/// Identifies what a request targets within one screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    /// The listing as a whole.
    Collection,
    Item(i64),
}

/// Proof that a request was started; only the latest ticket per key is current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<K> {
    key: K,
    generation: u64,
}

impl<K> Ticket<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

#[derive(Debug)]
pub struct RequestTracker<K> {
    generations: Mutex<HashMap<K, u64>>,
}

impl<K> Default for RequestTracker<K> {
    fn default() -> Self {
        Self {
            generations: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> RequestTracker<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a request for `key`, superseding every earlier ticket for it.
    pub fn begin(&self, key: K) -> Ticket<K> {
        let generation = self.bump(&key);
        Ticket { key, generation }
    }

    /// Whether no newer request (or retirement) happened since `ticket` was issued.
    pub fn is_current(&self, ticket: &Ticket<K>) -> bool {
        let generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
        generations.get(&ticket.key) == Some(&ticket.generation)
    }

    /// Invalidates every outstanding ticket for `key`, e.g. after a delete.
    pub fn retire(&self, key: &K) {
        self.bump(key);
    }

    fn bump(&self, key: &K) -> u64 {
        let mut generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = generations.entry(key.clone()).or_insert(0);
        *generation += 1;
        *generation
    }
}

/// Runs `work` until it finishes or `scope` is cancelled, whichever comes first.
pub async fn run_scoped<F, T>(scope: &CancellationToken, work: F) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    tokio::select! {
        _ = scope.cancelled() => Err(ClientError::Cancelled),
        result = work => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_tickets_supersede_older_ones() {
        let tracker = RequestTracker::new();
        let first = tracker.begin(ResourceKey::Item(42));
        let second = tracker.begin(ResourceKey::Item(42));
        let other = tracker.begin(ResourceKey::Item(7));

        assert!(!tracker.is_current(&first));
        assert!(tracker.is_current(&second));
        assert!(tracker.is_current(&other));
    }

    #[test]
    fn retiring_a_key_invalidates_its_tickets() {
        let tracker = RequestTracker::new();
        let ticket = tracker.begin(ResourceKey::Item(42));
        tracker.retire(&ResourceKey::Item(42));
        assert!(!tracker.is_current(&ticket));
        assert_eq!(ticket.key(), &ResourceKey::Item(42));
    }

    #[tokio::test]
    async fn cancelled_scope_abandons_work() {
        let scope = CancellationToken::new();
        scope.cancel();
        let result: ClientResult<()> =
            run_scoped(&scope, futures::future::pending::<ClientResult<()>>()).await;
        assert!(matches!(result, Err(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn live_scope_returns_the_result() {
        let scope = CancellationToken::new();
        let result = run_scoped(&scope, async { Ok::<_, ClientError>(5) }).await;
        assert_eq!(result.unwrap(), 5);
    }
}
