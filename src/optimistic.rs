//! Optimistic overlay for keyed records.
//!
//! A speculative value is visible through `get` from the moment an update
//! starts until its operation settles. Rollback is implicit: the entry is
//! dropped and readers fall back to the real collection.
//!
//! Concurrent updates to the same key are not serialized or cancelled.
//! Each entry carries the generation of the update that wrote it, and an
//! update only removes the entry if it is still its own, so a slower
//! earlier update never clears a newer speculative value.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::error::ApiError;

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

#[derive(Debug, Clone)]
struct Speculative<V> {
    value: V,
    generation: u64,
}

pub struct OptimisticUpdater<K, V, E = ApiError>
where
    K: Eq + Hash,
{
    entries: DashMap<K, Speculative<V>>,
    generation: AtomicU64,
    on_success: Option<Callback<V>>,
    on_error: Option<Callback<E>>,
}

impl<K, V, E> Default for OptimisticUpdater<K, V, E>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
    E: std::fmt::Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, E> OptimisticUpdater<K, V, E>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
    E: std::fmt::Display,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
            on_success: None,
            on_error: None,
        }
    }

    pub fn on_success(mut self, callback: impl Fn(&V) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&E) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Show `optimistic` under `key` while `operation` runs.
    ///
    /// Returns the authoritative result on success. On failure the entry is
    /// dropped, the error callback fires once, and `None` is returned.
    pub async fn perform<F>(&self, key: K, optimistic: V, operation: F) -> Option<V>
    where
        F: Future<Output = Result<V, E>>,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries.insert(
            key.clone(),
            Speculative {
                value: optimistic,
                generation,
            },
        );

        let outcome = operation.await;
        self.entries
            .remove_if(&key, |_, entry| entry.generation == generation);

        match outcome {
            Ok(result) => {
                if let Some(ref callback) = self.on_success {
                    callback(&result);
                }
                Some(result)
            }
            Err(err) => {
                log::warn!("Optimistic update for {:?} rolled back: {}", key, err);
                if let Some(ref callback) = self.on_error {
                    callback(&err);
                }
                None
            }
        }
    }

    /// Speculative value for `key`, or `fallback` when none is in flight.
    pub fn get(&self, key: &K, fallback: V) -> V {
        self.entries
            .get(key)
            .map(|entry| entry.value.clone())
            .unwrap_or(fallback)
    }

    pub fn has_pending(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    type Updater = OptimisticUpdater<String, String, String>;

    #[tokio::test]
    async fn test_value_visible_while_in_flight() {
        let successes = Arc::new(AtomicUsize::new(0));
        let counter = successes.clone();
        let updater = Updater::new().on_success(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let key = "L1".to_string();
        let (tx, rx) = oneshot::channel::<Result<String, String>>();

        let (result, ()) = tokio::join!(
            updater.perform(key.clone(), "speculative".to_string(), async move {
                rx.await.unwrap_or_else(|_| Err("dropped".to_string()))
            }),
            async {
                tokio::task::yield_now().await;
                assert!(updater.has_pending(&key));
                assert_eq!(updater.get(&key, "real".to_string()), "speculative");
                tx.send(Ok("authoritative".to_string())).unwrap();
            }
        );

        assert_eq!(result.as_deref(), Some("authoritative"));
        assert!(!updater.has_pending(&key));
        assert_eq!(updater.get(&key, "refreshed".to_string()), "refreshed");
        assert_eq!(successes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_and_reports_once() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let updater = Updater::new().on_error(move |err| sink.lock().unwrap().push(err.clone()));
        let key = "L2".to_string();

        let result = updater
            .perform(key.clone(), "speculative".to_string(), async {
                Err("boom".to_string())
            })
            .await;

        assert_eq!(result, None);
        assert!(!updater.has_pending(&key));
        assert_eq!(updater.get(&key, "original".to_string()), "original");
        assert_eq!(*errors.lock().unwrap(), vec!["boom".to_string()]);
    }

    #[tokio::test]
    async fn test_earlier_update_does_not_clear_newer_value() {
        let updater = Updater::new();
        let key = "L3".to_string();
        let (first_tx, first_rx) = oneshot::channel::<Result<String, String>>();
        let (second_tx, second_rx) = oneshot::channel::<Result<String, String>>();

        let ((first, second), ()) = tokio::join!(
            async {
                tokio::join!(
                    updater.perform(key.clone(), "first".to_string(), async move {
                        first_rx.await.unwrap_or_else(|_| Err("dropped".to_string()))
                    }),
                    updater.perform(key.clone(), "second".to_string(), async move {
                        second_rx.await.unwrap_or_else(|_| Err("dropped".to_string()))
                    }),
                )
            },
            async {
                tokio::task::yield_now().await;
                assert_eq!(updater.get(&key, String::new()), "second");
                first_tx.send(Ok("first-done".to_string())).unwrap();
                tokio::task::yield_now().await;
                tokio::task::yield_now().await;
                assert!(updater.has_pending(&key));
                assert_eq!(updater.get(&key, String::new()), "second");
                second_tx.send(Ok("second-done".to_string())).unwrap();
            }
        );

        assert_eq!(first.as_deref(), Some("first-done"));
        assert_eq!(second.as_deref(), Some("second-done"));
        assert!(!updater.has_pending(&key));
    }

    #[test]
    fn test_clear_drops_everything() {
        let updater: Updater = OptimisticUpdater::new();
        updater.entries.insert(
            "a".to_string(),
            Speculative {
                value: "x".to_string(),
                generation: 1,
            },
        );
        assert_eq!(updater.pending_count(), 1);
        updater.clear();
        assert_eq!(updater.pending_count(), 0);
    }
}
