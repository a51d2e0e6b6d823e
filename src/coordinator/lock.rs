// ABOUTME: Keyed task-serialization primitive for mutually exclusive work.
// ABOUTME: Callers name the lock keys they need; overlapping callers queue
// ABOUTME: in submission order and never interleave.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;

/// Per-key state: the lock itself plus how many callers currently hold or
/// await it. Entries with no participants are pruned.
struct KeySlot {
    lock: Arc<AsyncMutex<()>>,
    pending: usize,
}

/// Serializes named tasks by lock key.
///
/// A caller passes the set of keys it needs exclusivity over (its own task
/// key plus any keys it declares as blocking) and a unit of work; the work
/// runs once every key is free, and no two callers sharing a key ever
/// interleave. Waiters on a key are served in submission order.
///
/// # Deadlock freedom
///
/// Keys are sorted into canonical order before acquisition, so two callers
/// requesting overlapping key sets in different orders cannot deadlock.
pub struct LockCoordinator {
    slots: Mutex<HashMap<String, KeySlot>>,
}

impl Default for LockCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl LockCoordinator {
    /// Create a new coordinator with no keys.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Run `task` while holding every key in `keys`.
    ///
    /// All keys are acquired (in canonical order) before the task starts and
    /// released on every exit path, including panic unwind. The task's output
    /// is returned verbatim; an `Err` output flows through unchanged. An
    /// empty key set runs the task immediately.
    pub async fn run<I, F, T>(&self, keys: I, task: F) -> T
    where
        I: IntoIterator<Item = String>,
        F: Future<Output = T>,
    {
        let mut ordered: Vec<String> = keys.into_iter().collect();
        ordered.sort();
        ordered.dedup();

        // Register on every key in one registry pass so is_locked() sees
        // queued callers, then acquire outside the registry lock.
        let handles: Vec<Arc<AsyncMutex<()>>> = {
            let mut slots = self.lock_slots();
            ordered
                .iter()
                .map(|key| {
                    let slot = slots.entry(key.clone()).or_insert_with(|| KeySlot {
                        lock: Arc::new(AsyncMutex::new(())),
                        pending: 0,
                    });
                    slot.pending += 1;
                    Arc::clone(&slot.lock)
                })
                .collect()
        };
        let _registration = Registration {
            coordinator: self,
            keys: ordered,
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }

        let result = task.await;

        // Guards drop in canonical order; the registration guard then prunes
        // keys with no remaining participants.
        drop(guards);
        result
    }

    /// True iff `key` currently has any participant, held or queued.
    ///
    /// Non-blocking: only touches the registry, never waits on the key.
    pub fn is_locked(&self, key: &str) -> bool {
        self.lock_slots().contains_key(key)
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, KeySlot>> {
        // A poisoned registry only means a panicking task unwound through
        // the map; the data is still consistent.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Unregisters a caller's keys on drop, pruning empty entries.
struct Registration<'a> {
    coordinator: &'a LockCoordinator,
    keys: Vec<String>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut slots = self.coordinator.lock_slots();
        for key in &self.keys {
            if let Some(slot) = slots.get_mut(key) {
                slot.pending -= 1;
                if slot.pending == 0 {
                    slots.remove(key);
                }
            }
        }
    }
}
